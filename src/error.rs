//! Error types for parcomm.
//!
//! Every operation of a [`Communicator`](crate::Communicator) returns
//! [`Result`]. An error signals that the distributed computation can no
//! longer proceed consistently; no operation retries or returns partial
//! results.

use crate::{config::ConfigError, datatype::DatatypeTag, protocol::Tag, ReduceOp};

/// Result type for communication operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for communication operations.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A rank outside of `0..size` was passed.
    #[error("Invalid rank {rank} for a communicator of size {size}")]
    InvalidRank { rank: usize, size: usize },

    /// A point-to-point operation that needs a peer was called on a
    /// single-process communicator.
    #[error("No peer available for {0} in a single-process communicator")]
    NoPeer(&'static str),

    /// Messages are sent with non-negative tags only.
    #[error("Invalid tag {0} for a send")]
    InvalidTag(Tag),

    /// A receive request was completed twice or on another transport.
    #[error("Receive request is not pending")]
    UnknownRequest,

    /// A received message does not fit into the receive buffer.
    #[error("Message of {count} bytes does not fit into a buffer of {capacity} bytes")]
    Truncated { capacity: usize, count: usize },

    /// Participants disagree on the size of a fixed-size transfer.
    #[error("Expected {expected} bytes but got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// An all-to-all buffer is not evenly divisible by the number of processes.
    #[error("Buffer of length {len} cannot be split into {size} equal blocks")]
    Indivisible { len: usize, size: usize },

    /// The reduction operation is not defined for the datatype.
    #[error("Reduction {op:?} is not defined for {datatype:?}")]
    UnsupportedOp { op: ReduceOp, datatype: DatatypeTag },

    /// A message payload could not be decoded.
    #[error("Malformed message")]
    MalformedFrame,

    /// A peer sent an unexpected handshake while connecting.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// The connection to a peer was lost.
    #[error("Peer disconnected")]
    Disconnected,

    /// I/O error of the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The launch configuration is invalid.
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// A broadcast string is not valid UTF-8.
    #[error("Invalid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

impl Error {
    /// Checks that `rank` addresses a process of a communicator of `size`.
    pub(crate) fn check_rank(rank: usize, size: usize) -> Result<()> {
        if rank < size {
            Ok(())
        } else {
            Err(Error::InvalidRank { rank, size })
        }
    }
}
