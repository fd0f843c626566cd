//! Runs a small ring exchange on four local processes.
//!
//! Without `PARCOMM_PEERS` set, the executable starts itself four times with
//! a generated peer list and waits for the children to finish.

use parcomm::{config, Communicator};

const RANKS: usize = 4;

fn rank_main() -> parcomm::Result<()> {
    let comm = Communicator::from_env()?;
    let rank = comm.rank();
    let size = comm.size();
    tracing::info!("[rank {rank}] connected to {size} ranks");

    let next = (rank + 1) % size;
    let prev = (rank + size - 1) % size;

    let send: Vec<f64> = (0..=rank).map(|i| i as f64).collect();
    let mut recv = Vec::new();
    comm.send_receive(next, &send, prev, &mut recv)?;
    tracing::info!("[rank {rank}] received {recv:?} from rank {prev}");

    let mut total = recv.len() as u64;
    comm.sum(&mut total)?;

    let mut name = if rank == 0 { String::from("ring") } else { String::new() };
    comm.broadcast(&mut name, 0)?;

    let mut everything = send.clone();
    comm.allgather_vec(&mut everything)?;

    let consistent = comm.verify(&everything)?;
    tracing::info!("[rank {rank}] {name}: {total} values exchanged, consistent = {consistent}");

    comm.barrier()
}

fn main() {
    tracing_subscriber::fmt::init();

    if std::env::var(config::ENV_PEERS).is_ok() {
        if let Err(err) = rank_main() {
            tracing::error!("{}", err);
            std::process::exit(1);
        }
        return;
    }

    let peers: Vec<String> = (0..RANKS).map(|i| format!("127.0.0.1:{}", 47000 + i)).collect();
    let peers = peers.join(",");
    let executable = std::env::current_exe().expect("cannot locate the current executable");

    let children: Vec<_> = (0..RANKS)
        .map(|rank| {
            std::process::Command::new(&executable)
                .env(config::ENV_PEERS, &peers)
                .env(config::ENV_RANK, rank.to_string())
                .spawn()
                .expect("failed to spawn rank")
        })
        .collect();

    for mut child in children {
        let status = child.wait().expect("failed to wait for rank");
        if !status.success() {
            tracing::error!("rank exited with {}", status);
        }
    }
}
