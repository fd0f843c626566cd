use crossbeam::channel::Sender;

use crate::{
    error::{Error, Result},
    mailbox::Mailbox,
    protocol::{Envelope, Matcher, Ticket},
    transport::Transport,
};

/// Transport connecting ranks that live in the same process.
///
/// Each rank owns its memory and exchanges copied messages with the other
/// ranks over unbounded channels, which makes every send buffered. A
/// universe is typically driven by one thread per rank.
pub struct ChannelTransport {
    rank: usize,
    peers: Vec<Sender<Envelope>>,
    mailbox: Mailbox,
}

impl ChannelTransport {
    /// Creates `size` connected transports, one per rank, in rank order.
    pub fn universe(size: usize) -> Vec<Self> {
        assert!(size > 0, "a universe needs at least one rank");
        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..size).map(|_| crossbeam::channel::unbounded()).unzip();

        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| Self {
                rank,
                peers: senders.clone(),
                mailbox: Mailbox::new(inbox, size),
            })
            .collect()
    }
}

impl Transport for ChannelTransport {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn post(&self, dest: usize, envelope: Envelope) -> Result<()> {
        let peer = self.peers.get(dest).ok_or(Error::InvalidRank {
            rank: dest,
            size: self.peers.len(),
        })?;
        peer.send(envelope).map_err(|_| Error::Disconnected)
    }

    fn take(&self, matcher: Matcher) -> Result<Envelope> {
        self.mailbox.take(matcher)
    }

    fn reserve(&self, matcher: Matcher) -> Result<Ticket> {
        Ok(self.mailbox.reserve(matcher))
    }

    fn claim(&self, ticket: Ticket) -> Result<Envelope> {
        self.mailbox.claim(ticket)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::protocol::ANY_SOURCE;
    use crate::test::*;

    #[test]
    fn messages_to_self_are_delivered() -> crate::test::Result<()> {
        let mut universe = ChannelTransport::universe(1);
        let t = universe.remove(0);
        t.send(0, 3, vec![9])?;
        assert_eq!(t.recv(0, 3)?.payload, vec![9]);
        Ok(())
    }

    #[test]
    fn any_source_receives_from_everyone() {
        init_logger();

        let received = run_universe(4, |t| {
            if t.rank() == 0 {
                let mut sources: Vec<usize> = (1..t.size())
                    .map(|_| t.recv(ANY_SOURCE, 0).unwrap().source)
                    .collect();
                sources.sort();
                sources
            } else {
                t.send(0, 0, vec![t.rank() as u8]).unwrap();
                vec![]
            }
        });
        assert_eq!(received[0], vec![1, 2, 3]);
    }

    #[test]
    fn default_collectives() {
        init_logger();

        for size in 1..=7 {
            run_universe(size, |t| {
                let rank = t.rank() as u8;
                let n = t.size();

                t.barrier().unwrap();

                for root in 0..n {
                    let mut buf = if t.rank() == root { vec![root as u8; 3] } else { vec![0; 3] };
                    t.broadcast(&mut buf, root).unwrap();
                    assert_eq!(buf, vec![root as u8; 3]);
                }

                let mut gathered = vec![0; 2 * n];
                t.allgather(&[rank, rank + 100], &mut gathered).unwrap();
                let expected: Vec<u8> = (0..n as u8).flat_map(|r| [r, r + 100]).collect();
                assert_eq!(gathered, expected);

                let send: Vec<u8> = (0..n as u8).map(|dest| rank * 10 + dest).collect();
                let mut recv = vec![0; n];
                t.alltoall(&send, &mut recv).unwrap();
                let expected: Vec<u8> = (0..n as u8).map(|src| src * 10 + rank).collect();
                assert_eq!(recv, expected);
            });
        }
    }

    #[test]
    fn broadcast_with_different_sizes_fails() {
        let results = run_universe(2, |t| {
            let mut buf = vec![0; 2 + t.rank()];
            t.broadcast(&mut buf, 0)
        });
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(Error::SizeMismatch { expected: 3, actual: 2 })));
    }

    #[test]
    fn alltoall_rejects_indivisible_buffers() {
        let results = run_universe(2, |t| {
            let mut recv = vec![0; 3];
            t.alltoall(&[1, 2, 3], &mut recv)
        });
        for result in results {
            assert!(matches!(result, Err(Error::Indivisible { len: 3, size: 2 })));
        }
    }
}
