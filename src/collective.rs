//! Collective algorithms built on point-to-point messages.
//!
//! Broadcast and reduction use binomial trees rooted at an arbitrary rank:
//! ranks are renumbered relative to the root, and in round `k` every rank
//! that already holds the data forwards it `2^k` ranks further. Gathers are
//! linear into the root; all-to-all posts every block eagerly and then
//! collects.
//!
//! All traffic travels on the collective channel, so it never matches a
//! user receive.

use crate::{
    datatype::{reduce_bytes, DatatypeTag, ReduceOp},
    error::{Error, Result},
    protocol::{collective as tags, kind, Envelope, Matcher, Tag},
    transport::Transport,
};

fn post<T: Transport + ?Sized>(t: &T, dest: usize, tag: Tag, payload: Vec<u8>) -> Result<()> {
    t.post(
        dest,
        Envelope {
            source: t.rank(),
            tag,
            kind: kind::COLLECTIVE,
            payload,
        },
    )
}

fn take<T: Transport + ?Sized>(t: &T, source: usize, tag: Tag) -> Result<Vec<u8>> {
    Ok(t.take(Matcher::collective(source, tag))?.payload)
}

fn take_exact<T: Transport + ?Sized>(
    t: &T,
    source: usize,
    tag: Tag,
    expected: usize,
) -> Result<Vec<u8>> {
    let payload = take(t, source, tag)?;
    if payload.len() != expected {
        return Err(Error::SizeMismatch {
            expected,
            actual: payload.len(),
        });
    }
    Ok(payload)
}

fn tree_broadcast<T: Transport + ?Sized>(
    t: &T,
    buf: &mut [u8],
    root: usize,
    tag: Tag,
) -> Result<()> {
    let size = t.size();
    let relative = (t.rank() + size - root) % size;

    let mut mask = 1;
    while mask < size {
        if relative & mask != 0 {
            let parent = (relative - mask + root) % size;
            let payload = take_exact(t, parent, tag, buf.len())?;
            buf.copy_from_slice(&payload);
            break;
        }
        mask <<= 1;
    }

    mask >>= 1;
    while mask > 0 {
        if relative + mask < size {
            let child = (relative + mask + root) % size;
            post(t, child, tag, buf.to_vec())?;
        }
        mask >>= 1;
    }
    Ok(())
}

fn tree_reduce<T: Transport + ?Sized>(
    t: &T,
    buf: &mut [u8],
    datatype: DatatypeTag,
    op: ReduceOp,
    root: usize,
    tag: Tag,
) -> Result<()> {
    let size = t.size();
    let relative = (t.rank() + size - root) % size;

    let mut mask = 1;
    while mask < size {
        if relative & mask == 0 {
            let child = relative | mask;
            if child < size {
                let payload = take_exact(t, (child + root) % size, tag, buf.len())?;
                reduce_bytes(datatype, op, buf, &payload)?;
            }
        } else {
            let parent = ((relative & !mask) + root) % size;
            return post(t, parent, tag, buf.to_vec());
        }
        mask <<= 1;
    }
    Ok(())
}

pub fn barrier<T: Transport + ?Sized>(t: &T) -> Result<()> {
    tree_reduce(t, &mut [], DatatypeTag::U8, ReduceOp::Min, 0, tags::BARRIER)?;
    tree_broadcast(t, &mut [], 0, tags::BARRIER)
}

pub fn broadcast<T: Transport + ?Sized>(t: &T, buf: &mut [u8], root: usize) -> Result<()> {
    Error::check_rank(root, t.size())?;
    tree_broadcast(t, buf, root, tags::BROADCAST)
}

pub fn allreduce<T: Transport + ?Sized>(
    t: &T,
    buf: &mut [u8],
    datatype: DatatypeTag,
    op: ReduceOp,
) -> Result<()> {
    op.check(datatype)?;
    tree_reduce(t, buf, datatype, op, 0, tags::REDUCE)?;
    tree_broadcast(t, buf, 0, tags::REDUCE)
}

pub fn gatherv<T: Transport + ?Sized>(
    t: &T,
    send: &[u8],
    recv: &mut [u8],
    counts: &[usize],
    displs: &[usize],
    root: usize,
) -> Result<()> {
    let size = t.size();
    Error::check_rank(root, size)?;

    if t.rank() != root {
        return post(t, root, tags::GATHER, send.to_vec());
    }

    if counts.len() != size || displs.len() != size {
        return Err(Error::SizeMismatch {
            expected: size,
            actual: counts.len().min(displs.len()),
        });
    }
    if let Some(end) = counts.iter().zip(displs).map(|(c, d)| c + d).max() {
        if end > recv.len() {
            return Err(Error::Truncated {
                capacity: recv.len(),
                count: end,
            });
        }
    }

    for source in 0..size {
        let block = &mut recv[displs[source]..displs[source] + counts[source]];
        if source == root {
            if send.len() != block.len() {
                return Err(Error::SizeMismatch {
                    expected: block.len(),
                    actual: send.len(),
                });
            }
            block.copy_from_slice(send);
        } else {
            let payload = take_exact(t, source, tags::GATHER, block.len())?;
            block.copy_from_slice(&payload);
        }
    }
    Ok(())
}

/// Counts and displacements of `size` equally sized blocks.
fn uniform_layout(size: usize, block: usize) -> (Vec<usize>, Vec<usize>) {
    (vec![block; size], (0..size).map(|i| i * block).collect())
}

pub fn gather<T: Transport + ?Sized>(
    t: &T,
    send: &[u8],
    recv: &mut [u8],
    root: usize,
) -> Result<()> {
    let (counts, displs) = uniform_layout(t.size(), send.len());
    gatherv(t, send, recv, &counts, &displs, root)
}

pub fn allgatherv<T: Transport + ?Sized>(
    t: &T,
    send: &[u8],
    recv: &mut [u8],
    counts: &[usize],
    displs: &[usize],
) -> Result<()> {
    gatherv(t, send, recv, counts, displs, 0)?;
    tree_broadcast(t, recv, 0, tags::GATHER)
}

pub fn allgather<T: Transport + ?Sized>(t: &T, send: &[u8], recv: &mut [u8]) -> Result<()> {
    let (counts, displs) = uniform_layout(t.size(), send.len());
    allgatherv(t, send, recv, &counts, &displs)
}

pub fn alltoall<T: Transport + ?Sized>(t: &T, send: &[u8], recv: &mut [u8]) -> Result<()> {
    let size = t.size();
    let rank = t.rank();
    if send.len() % size != 0 {
        return Err(Error::Indivisible {
            len: send.len(),
            size,
        });
    }
    if recv.len() != send.len() {
        return Err(Error::SizeMismatch {
            expected: send.len(),
            actual: recv.len(),
        });
    }

    let block = send.len() / size;
    for dest in (0..size).filter(|&dest| dest != rank) {
        post(t, dest, tags::ALLTOALL, send[dest * block..(dest + 1) * block].to_vec())?;
    }

    recv[rank * block..(rank + 1) * block].copy_from_slice(&send[rank * block..(rank + 1) * block]);
    for source in (0..size).filter(|&source| source != rank) {
        let payload = take_exact(t, source, tags::ALLTOALL, block)?;
        recv[source * block..(source + 1) * block].copy_from_slice(&payload);
    }
    Ok(())
}
