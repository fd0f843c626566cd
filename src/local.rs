use crate::{
    error::{Error, Result},
    protocol::{Envelope, Matcher, Ticket},
    transport::Transport,
};

/// Transport of a process running without peers.
///
/// The process is rank 0 of 1. There is nobody to exchange messages with,
/// so [`post`](Transport::post) and [`take`](Transport::take) fail with
/// [`Error::NoPeer`], while every collective degenerates to a local copy.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalTransport;

impl LocalTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for LocalTransport {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn post(&self, _dest: usize, _envelope: Envelope) -> Result<()> {
        Err(Error::NoPeer("send"))
    }

    fn take(&self, _matcher: Matcher) -> Result<Envelope> {
        Err(Error::NoPeer("receive"))
    }

    fn reserve(&self, _matcher: Matcher) -> Result<Ticket> {
        Err(Error::NoPeer("receive"))
    }

    fn claim(&self, _ticket: Ticket) -> Result<Envelope> {
        Err(Error::NoPeer("receive"))
    }

    fn barrier(&self) -> Result<()> {
        Ok(())
    }

    fn broadcast(&self, _buf: &mut [u8], root: usize) -> Result<()> {
        debug_assert_eq!(root, 0, "broadcast root out of range");
        Error::check_rank(root, 1)
    }
}
