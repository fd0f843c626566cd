//! Completion information of receive operations.

use crate::protocol::Tag;

/// Information about a received message.
///
/// `count` is the number of elements that were actually received, which
/// may be less than the capacity of the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    source: usize,
    tag: Tag,
    count: usize,
}

impl Status {
    pub(crate) fn new(source: usize, tag: Tag, count: usize) -> Self {
        Self { source, tag, count }
    }

    /// Rank the message was sent from.
    pub fn source(&self) -> usize {
        self.source
    }

    /// Tag the message was sent with.
    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// Number of elements received.
    pub fn count(&self) -> usize {
        self.count
    }
}
