//! Collective reductions.
//!
//! [`min`](Communicator::min), [`max`](Communicator::max) and
//! [`sum`](Communicator::sum) replace a value on every process with the
//! element-wise reduction over all processes. Booleans have no transport
//! type of their own: a single flag is reduced as a `u32`, and boolean
//! vectors are bit-packed into `u32` words which are combined with bitwise
//! AND (min) or OR (max).

use crate::{
    bitpack::{pack_bools, unpack_bools},
    communicator::Communicator,
    datatype::{decode_into, encode, Datatype, DatatypeTag, Equivalence, ReduceOp},
    error::{Error, Result},
};

/// Values that support [`Communicator::min`] and [`Communicator::max`].
pub trait Reducible {
    #[doc(hidden)]
    fn reduce(&mut self, comm: &Communicator, op: ReduceOp) -> Result<()>;
}

fn allreduce_slice<T: Equivalence>(
    comm: &Communicator,
    values: &mut [T],
    op: ReduceOp,
) -> Result<()> {
    let mut buf = encode(values);
    comm.transport()
        .allreduce(&mut buf, <T::Base as Datatype>::TAG, op)?;
    decode_into(&buf, values)
}

impl<T: Datatype + Equivalence> Reducible for T {
    fn reduce(&mut self, comm: &Communicator, op: ReduceOp) -> Result<()> {
        allreduce_slice(comm, std::slice::from_mut(self), op)
    }
}

impl<T: Datatype + Equivalence> Reducible for Vec<T> {
    fn reduce(&mut self, comm: &Communicator, op: ReduceOp) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        allreduce_slice(comm, self, op)
    }
}

impl Reducible for bool {
    fn reduce(&mut self, comm: &Communicator, op: ReduceOp) -> Result<()> {
        let mut value = u32::from(*self);
        value.reduce(comm, op)?;
        *self = value != 0;
        Ok(())
    }
}

impl Reducible for Vec<bool> {
    fn reduce(&mut self, comm: &Communicator, op: ReduceOp) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        let word_op = match op {
            ReduceOp::Min | ReduceOp::BitAnd => ReduceOp::BitAnd,
            ReduceOp::Max | ReduceOp::BitOr => ReduceOp::BitOr,
            ReduceOp::Sum => {
                return Err(Error::UnsupportedOp {
                    op,
                    datatype: DatatypeTag::U32,
                })
            }
        };
        let mut words = pack_bools::<u32>(self);
        words.reduce(comm, word_op)?;
        unpack_bools(&words, self);
        Ok(())
    }
}

/// Values that support [`Communicator::sum`].
///
/// Complex numbers are summed component-wise.
pub trait Summable {
    #[doc(hidden)]
    fn sum(&mut self, comm: &Communicator) -> Result<()>;
}

impl<T: Equivalence> Summable for T {
    fn sum(&mut self, comm: &Communicator) -> Result<()> {
        allreduce_slice(comm, std::slice::from_mut(self), ReduceOp::Sum)
    }
}

impl<T: Equivalence> Summable for Vec<T> {
    fn sum(&mut self, comm: &Communicator) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        allreduce_slice(comm, self, ReduceOp::Sum)
    }
}

/// Values that support [`Communicator::verify`].
pub trait Verify {
    #[doc(hidden)]
    fn verify(&self, comm: &Communicator) -> Result<bool>;
}

fn same_everywhere<V: Reducible + Clone + PartialEq>(value: &V, comm: &Communicator) -> Result<bool> {
    let mut min = value.clone();
    let mut max = value.clone();
    min.reduce(comm, ReduceOp::Min)?;
    max.reduce(comm, ReduceOp::Max)?;

    let mut verified = min == *value && max == *value;
    verified.reduce(comm, ReduceOp::Min)?;
    Ok(verified)
}

/// Compares the encoded bytes, so floats verify only when bit-identical.
fn same_bits_everywhere<T: Equivalence>(values: &[T], comm: &Communicator) -> Result<bool> {
    same_everywhere(&encode(values), comm)
}

impl<T: Datatype + Equivalence> Verify for T {
    fn verify(&self, comm: &Communicator) -> Result<bool> {
        same_bits_everywhere(std::slice::from_ref(self), comm)
    }
}

impl Verify for bool {
    fn verify(&self, comm: &Communicator) -> Result<bool> {
        same_everywhere(self, comm)
    }
}

impl<T: Datatype + Equivalence> Verify for Vec<T> {
    fn verify(&self, comm: &Communicator) -> Result<bool> {
        if !(self.len() as u64).verify(comm)? {
            return Ok(false);
        }
        same_bits_everywhere(self, comm)
    }
}

impl Verify for Vec<bool> {
    fn verify(&self, comm: &Communicator) -> Result<bool> {
        if !(self.len() as u64).verify(comm)? {
            return Ok(false);
        }
        same_everywhere(self, comm)
    }
}

impl Verify for str {
    fn verify(&self, comm: &Communicator) -> Result<bool> {
        let codes: Vec<i16> = self.bytes().map(i16::from).collect();
        codes.verify(comm)
    }
}

impl Verify for String {
    fn verify(&self, comm: &Communicator) -> Result<bool> {
        self.as_str().verify(comm)
    }
}

impl Communicator {
    /// Replaces `value` on every process with the minimum over all
    /// processes.
    pub fn min<V: Reducible + ?Sized>(&self, value: &mut V) -> Result<()> {
        if self.size() == 1 {
            return Ok(());
        }
        let _guard = tracing::trace_span!("min").entered();
        value.reduce(self, ReduceOp::Min)
    }

    /// Replaces `value` on every process with the maximum over all
    /// processes.
    pub fn max<V: Reducible + ?Sized>(&self, value: &mut V) -> Result<()> {
        if self.size() == 1 {
            return Ok(());
        }
        let _guard = tracing::trace_span!("max").entered();
        value.reduce(self, ReduceOp::Max)
    }

    /// Replaces `value` on every process with the sum over all processes.
    pub fn sum<V: Summable + ?Sized>(&self, value: &mut V) -> Result<()> {
        if self.size() == 1 {
            return Ok(());
        }
        let _guard = tracing::trace_span!("sum").entered();
        value.sum(self)
    }

    /// Returns `true` on every process if `value` is identical on all
    /// processes, and `false` on every process otherwise.
    ///
    /// Numbers are compared by their bit patterns: `0.0` and `-0.0` differ,
    /// and a NaN verifies if every process holds the same NaN.
    pub fn verify<V: Verify + ?Sized>(&self, value: &V) -> Result<bool> {
        if self.size() == 1 {
            return Ok(true);
        }
        let _guard = tracing::trace_span!("verify").entered();
        value.verify(self)
    }
}
