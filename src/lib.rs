//! Typed point-to-point and collective communication between cooperating
//! processes.
//!
//! This crate provides a generic layer over a distributed-memory
//! message-passing transport, similar to the collective communication
//! routines found in MPI. Numerical code exchanges scalars, vectors,
//! booleans, complex numbers and strings through a [`Communicator`] without
//! caring how the bytes travel, and the same code runs unchanged on a single
//! process, where every operation completes locally.
//!
//! # Transports
//! A communicator owns one [`Transport`] selected at process start:
//! - [`LocalTransport`]: a single process without peers.
//! - [`ChannelTransport`]: several ranks within one process, e.g. one per
//!   thread.
//! - [`TcpTransport`]: separate processes connected over TCP, usually
//!   configured through the environment (see [`config`]).
//!
//! # Operations
//! - Reductions: [`min`](Communicator::min), [`max`](Communicator::max),
//!   [`sum`](Communicator::sum) and [`verify`](Communicator::verify).
//! - Point-to-point: [`send`](Communicator::send),
//!   [`recv`](Communicator::recv), [`isend`](Communicator::isend),
//!   [`irecv`](Communicator::irecv) and
//!   [`send_receive`](Communicator::send_receive).
//! - Gathers: [`gather`](Communicator::gather),
//!   [`allgather`](Communicator::allgather),
//!   [`alltoall`](Communicator::alltoall) and their variable-length
//!   variants.
//! - [`broadcast`](Communicator::broadcast) and
//!   [`barrier`](Communicator::barrier).
//!
//! # Important Notes
//! <div class="warning">
//! Collective operations must be called by every process in the same order.
//! An error returned by any operation means the processes can no longer be
//! assumed to agree on the state of the computation.
//! </div>

pub(crate) mod collective;
pub(crate) mod gather;
pub(crate) mod mailbox;
#[cfg(test)]
pub(crate) mod test;
pub(crate) mod utils;

pub mod bitpack;
pub mod broadcast;
pub mod channel;
pub mod communicator;
pub mod config;
pub mod datatype;
pub mod error;
pub mod local;
pub mod point_to_point;
pub mod protocol;
pub mod reduce;
pub mod request;
pub mod status;
pub mod tcp;
pub mod transport;

pub use broadcast::Broadcast;
pub use channel::ChannelTransport;
pub use communicator::Communicator;
pub use datatype::{Complex, Datatype, DatatypeTag, Equivalence, ReduceOp};
pub use error::{Error, Result};
pub use local::LocalTransport;
pub use point_to_point::Exchange;
pub use protocol::{Tag, Ticket, ANY_SOURCE, ANY_TAG};
pub use reduce::{Reducible, Summable, Verify};
pub use request::Request;
pub use status::Status;
pub use tcp::TcpTransport;
pub use transport::Transport;
