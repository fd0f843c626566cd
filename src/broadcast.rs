//! Root-to-all propagation of values.
//!
//! Fixed-size values and vectors are sent as they are, so every process
//! has to pass a value of the same size (vectors must be pre-sized by the
//! receivers). Strings first broadcast their length, which lets receivers
//! size their buffer before the bytes follow.

use crate::{
    bitpack::{pack_bools, unpack_bools},
    communicator::Communicator,
    datatype::{decode_into, encode, Equivalence},
    error::Result,
};

/// Values that support [`Communicator::broadcast`].
pub trait Broadcast {
    #[doc(hidden)]
    fn broadcast(&mut self, comm: &Communicator, root: usize) -> Result<()>;
}

fn broadcast_slice<T: Equivalence>(comm: &Communicator, values: &mut [T], root: usize) -> Result<()> {
    let mut buf = encode(values);
    comm.transport().broadcast(&mut buf, root)?;
    decode_into(&buf, values)
}

impl<T: Equivalence> Broadcast for T {
    fn broadcast(&mut self, comm: &Communicator, root: usize) -> Result<()> {
        broadcast_slice(comm, std::slice::from_mut(self), root)
    }
}

impl<T: Equivalence> Broadcast for Vec<T> {
    fn broadcast(&mut self, comm: &Communicator, root: usize) -> Result<()> {
        broadcast_slice(comm, self, root)
    }
}

impl Broadcast for bool {
    fn broadcast(&mut self, comm: &Communicator, root: usize) -> Result<()> {
        let mut byte = [u8::from(*self)];
        comm.transport().broadcast(&mut byte, root)?;
        *self = byte[0] != 0;
        Ok(())
    }
}

impl Broadcast for Vec<bool> {
    fn broadcast(&mut self, comm: &Communicator, root: usize) -> Result<()> {
        let mut words = pack_bools::<u8>(self);
        comm.transport().broadcast(&mut words, root)?;
        unpack_bools(&words, self);
        Ok(())
    }
}

impl Broadcast for String {
    fn broadcast(&mut self, comm: &Communicator, root: usize) -> Result<()> {
        let mut len = self.len() as u64;
        len.broadcast(comm, root)?;

        let mut bytes = std::mem::take(self).into_bytes();
        bytes.resize(len as usize, 0);
        comm.transport().broadcast(&mut bytes, root)?;
        *self = String::from_utf8(bytes)?;
        Ok(())
    }
}

impl Communicator {
    /// Replaces `value` on every process with `value` on `root`.
    ///
    /// Vectors must already have the root's length on every process;
    /// strings are resized automatically.
    pub fn broadcast<V: Broadcast + ?Sized>(&self, value: &mut V, root: usize) -> Result<()> {
        if self.size() == 1 {
            debug_assert_eq!(root, self.rank(), "broadcast root out of range");
            return Ok(());
        }
        self.check_rank(root)?;
        let _guard = tracing::trace_span!("broadcast", root).entered();
        value.broadcast(self, root)
    }
}
