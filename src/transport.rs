//! The boundary between typed operations and a message-passing backend.
//!
//! A [`Transport`] only has to move envelopes between ranks: [`post`] hands a
//! message to a peer without blocking and [`take`] blocks until a matching
//! message arrives. Every collective operation has a default implementation
//! built on these two primitives (binomial trees and linear gathers); a
//! backend with native collectives can override them.
//!
//! All buffers at this level are raw bytes. Counts and displacements are in
//! bytes as well.
//!
//! [`post`]: Transport::post
//! [`take`]: Transport::take

use crate::{
    collective,
    datatype::{DatatypeTag, ReduceOp},
    error::{Error, Result},
    protocol::{kind, Envelope, Matcher, Tag, Ticket, ANY_SOURCE},
};

/// A message-passing backend connecting `size` ranks.
pub trait Transport: Send {
    /// Rank of this process, `0 <= rank < size`.
    fn rank(&self) -> usize;

    /// Number of participating processes.
    fn size(&self) -> usize;

    /// Delivers `envelope` to `dest`.
    ///
    /// Sends are buffered by the transport and never wait for the receiver.
    fn post(&self, dest: usize, envelope: Envelope) -> Result<()>;

    /// Blocks until a message accepted by `matcher` arrives and returns it.
    ///
    /// Messages from the same source are delivered in the order they were
    /// posted.
    fn take(&self, matcher: Matcher) -> Result<Envelope>;

    /// Posts a receive for the next message accepted by `matcher` without
    /// blocking.
    ///
    /// The message is bound to the ticket in posting order: a later
    /// [`take`](Transport::take) or reservation with an overlapping matcher
    /// cannot receive it.
    fn reserve(&self, matcher: Matcher) -> Result<Ticket>;

    /// Blocks until the message bound to `ticket` arrives and returns it.
    fn claim(&self, ticket: Ticket) -> Result<Envelope>;

    /// Sends a tagged point-to-point message. `tag` must not be negative.
    fn send(&self, dest: usize, tag: Tag, payload: Vec<u8>) -> Result<()> {
        Error::check_rank(dest, self.size())?;
        if tag < 0 {
            return Err(Error::InvalidTag(tag));
        }
        self.post(
            dest,
            Envelope {
                source: self.rank(),
                tag,
                kind: kind::POINT_TO_POINT,
                payload,
            },
        )
    }

    /// Receives a point-to-point message. `source` may be
    /// [`ANY_SOURCE`] and `tag` may be [`ANY_TAG`](crate::protocol::ANY_TAG).
    fn recv(&self, source: usize, tag: Tag) -> Result<Envelope> {
        if source != ANY_SOURCE {
            Error::check_rank(source, self.size())?;
        }
        self.take(Matcher::point_to_point(source, tag))
    }

    /// Sends to `dest` and receives from `source`.
    fn send_receive(
        &self,
        dest: usize,
        send_tag: Tag,
        payload: Vec<u8>,
        source: usize,
        recv_tag: Tag,
    ) -> Result<Envelope> {
        self.send(dest, send_tag, payload)?;
        self.recv(source, recv_tag)
    }

    /// Returns once every rank has entered the barrier.
    fn barrier(&self) -> Result<()> {
        collective::barrier(self)
    }

    /// Replaces `buf` on every rank with the contents of `buf` on `root`.
    ///
    /// Every rank must pass a buffer of the same length.
    fn broadcast(&self, buf: &mut [u8], root: usize) -> Result<()> {
        collective::broadcast(self, buf, root)
    }

    /// Collects equally sized contributions in rank order on `root`.
    ///
    /// `recv` is only used on `root` and must hold `size * send.len()` bytes.
    fn gather(&self, send: &[u8], recv: &mut [u8], root: usize) -> Result<()> {
        collective::gather(self, send, recv, root)
    }

    /// Collects contributions of varying size on `root`, placing the
    /// contribution of rank `i` at `displs[i]`.
    ///
    /// `recv`, `counts` and `displs` are only used on `root`.
    fn gatherv(
        &self,
        send: &[u8],
        recv: &mut [u8],
        counts: &[usize],
        displs: &[usize],
        root: usize,
    ) -> Result<()> {
        collective::gatherv(self, send, recv, counts, displs, root)
    }

    /// Like [`gather`](Transport::gather), with the result on every rank.
    fn allgather(&self, send: &[u8], recv: &mut [u8]) -> Result<()> {
        collective::allgather(self, send, recv)
    }

    /// Like [`gatherv`](Transport::gatherv), with the result on every rank.
    fn allgatherv(
        &self,
        send: &[u8],
        recv: &mut [u8],
        counts: &[usize],
        displs: &[usize],
    ) -> Result<()> {
        collective::allgatherv(self, send, recv, counts, displs)
    }

    /// Splits `send` into `size` equal blocks and sends block `i` to rank
    /// `i`; block `j` of `recv` receives the block sent by rank `j`.
    fn alltoall(&self, send: &[u8], recv: &mut [u8]) -> Result<()> {
        collective::alltoall(self, send, recv)
    }

    /// Reduces `buf`, interpreted as an array of `datatype`, element-wise
    /// across all ranks and stores the result on every rank.
    fn allreduce(&self, buf: &mut [u8], datatype: DatatypeTag, op: ReduceOp) -> Result<()> {
        collective::allreduce(self, buf, datatype, op)
    }
}
