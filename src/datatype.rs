//! Datatype registry and element encodings.
//!
//! [`Datatype`] is a sealed trait that binds every supported primitive
//! scalar to a [`DatatypeTag`] at compile time. Transports only ever see raw
//! bytes plus such a tag, so using an unsupported type is a compile error
//! rather than a runtime lookup failure.
//!
//! | Rust Type | Tag Value |
//! |-----------|-----------|
//! | `i8`      | 0         |
//! | `u8`      | 1         |
//! | `i16`     | 2         |
//! | `u16`     | 3         |
//! | `i32`     | 4         |
//! | `u32`     | 5         |
//! | `i64`     | 6         |
//! | `u64`     | 7         |
//! | `f32`     | 8         |
//! | `f64`     | 9         |
//!
//! [`Equivalence`] describes how a transferable element maps onto its base
//! datatype. Scalars have a single component while [`Complex`] numbers are
//! sent as two contiguous components, so counts handed to the transport are
//! doubled for complex data.

use std::fmt::Debug;

use zerocopy::{AsBytes, FromBytes};

use crate::error::{Error, Result};

mod sealed {
    pub trait Sealed {}
}

/// Element-wise reduction operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReduceOp {
    Min = 0,
    Max = 1,
    /// Integer sums wrap on overflow.
    Sum = 2,
    /// Only defined for integer datatypes.
    BitAnd = 3,
    /// Only defined for integer datatypes.
    BitOr = 4,
}

impl ReduceOp {
    /// Returns an error if the operation is not defined for `tag`.
    pub fn check(self, tag: DatatypeTag) -> Result<()> {
        match self {
            ReduceOp::BitAnd | ReduceOp::BitOr if !tag.is_integer() => Err(Error::UnsupportedOp {
                op: self,
                datatype: tag,
            }),
            _ => Ok(()),
        }
    }
}

/// Transport-level type tag of a primitive scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DatatypeTag {
    I8 = 0,
    U8 = 1,
    I16 = 2,
    U16 = 3,
    I32 = 4,
    U32 = 5,
    I64 = 6,
    U64 = 7,
    F32 = 8,
    F64 = 9,
}

impl DatatypeTag {
    /// Size of a single value in bytes.
    pub const fn size(self) -> usize {
        match self {
            DatatypeTag::I8 | DatatypeTag::U8 => 1,
            DatatypeTag::I16 | DatatypeTag::U16 => 2,
            DatatypeTag::I32 | DatatypeTag::U32 | DatatypeTag::F32 => 4,
            DatatypeTag::I64 | DatatypeTag::U64 | DatatypeTag::F64 => 8,
        }
    }

    pub const fn is_integer(self) -> bool {
        !matches!(self, DatatypeTag::F32 | DatatypeTag::F64)
    }
}

/// Primitive scalar that can be handed to a transport.
///
/// This is a **sealed trait**; it is implemented for `i8`, `u8`, `i16`,
/// `u16`, `i32`, `u32`, `i64`, `u64`, `f32` and `f64`.
pub trait Datatype:
    sealed::Sealed
    + AsBytes
    + FromBytes
    + Copy
    + Default
    + PartialOrd
    + Debug
    + Send
    + Sync
    + 'static
{
    /// The tag used by transports to interpret raw bytes.
    const TAG: DatatypeTag;

    /// Combines two values, returning `None` if `op` is not defined for
    /// this type.
    fn combine(op: ReduceOp, a: Self, b: Self) -> Option<Self>;
}

macro_rules! impl_integer_datatype {
    ($($ty:ident),*) => {
        paste::paste! {
            $(
                impl sealed::Sealed for $ty {}
                impl Datatype for $ty {
                    const TAG: DatatypeTag = DatatypeTag::[< $ty:upper >];

                    fn combine(op: ReduceOp, a: Self, b: Self) -> Option<Self> {
                        Some(match op {
                            ReduceOp::Min => a.min(b),
                            ReduceOp::Max => a.max(b),
                            ReduceOp::Sum => a.wrapping_add(b),
                            ReduceOp::BitAnd => a & b,
                            ReduceOp::BitOr => a | b,
                        })
                    }
                }
            )*
        }
    };
}

macro_rules! impl_float_datatype {
    ($($ty:ident),*) => {
        paste::paste! {
            $(
                impl sealed::Sealed for $ty {}
                impl Datatype for $ty {
                    const TAG: DatatypeTag = DatatypeTag::[< $ty:upper >];

                    fn combine(op: ReduceOp, a: Self, b: Self) -> Option<Self> {
                        match op {
                            ReduceOp::Min => Some(a.min(b)),
                            ReduceOp::Max => Some(a.max(b)),
                            ReduceOp::Sum => Some(a + b),
                            ReduceOp::BitAnd | ReduceOp::BitOr => None,
                        }
                    }
                }
            )*
        }
    };
}

impl_integer_datatype!(i8, u8, i16, u16, i32, u32, i64, u64);
impl_float_datatype!(f32, f64);

/// Element type that is transferred as a fixed number of base scalars.
pub trait Equivalence: Copy + Default + Send + Sync + 'static {
    /// Scalar the element is composed of.
    type Base: Datatype;

    /// Number of base scalars per element.
    const COMPONENTS: usize;

    /// Encoded size of one element in bytes.
    const SIZE: usize = Self::COMPONENTS * std::mem::size_of::<Self::Base>();

    /// Appends the encoding of `values` to `out`.
    fn write_bytes(values: &[Self], out: &mut Vec<u8>);

    /// Decodes `bytes` into `out`.
    ///
    /// `bytes` must hold exactly `out.len()` encoded elements.
    fn read_bytes(bytes: &[u8], out: &mut [Self]);
}

macro_rules! impl_scalar_equivalence {
    ($($ty:ident),*) => {
        $(
            impl Equivalence for $ty {
                type Base = $ty;
                const COMPONENTS: usize = 1;

                fn write_bytes(values: &[Self], out: &mut Vec<u8>) {
                    out.extend_from_slice(values.as_bytes());
                }

                fn read_bytes(bytes: &[u8], out: &mut [Self]) {
                    out.as_bytes_mut().copy_from_slice(bytes);
                }
            }
        )*
    };
}

impl_scalar_equivalence!(i8, u8, i16, u16, i32, u32, i64, u64, f32, f64);

/// A complex number, transferred as its real part followed by its imaginary
/// part.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[repr(C)]
pub struct Complex<T> {
    pub re: T,
    pub im: T,
}

impl<T> Complex<T> {
    pub const fn new(re: T, im: T) -> Self {
        Self { re, im }
    }
}

impl<T: Datatype> Equivalence for Complex<T> {
    type Base = T;
    const COMPONENTS: usize = 2;

    fn write_bytes(values: &[Self], out: &mut Vec<u8>) {
        out.reserve(values.len() * Self::SIZE);
        for value in values {
            out.extend_from_slice(value.re.as_bytes());
            out.extend_from_slice(value.im.as_bytes());
        }
    }

    fn read_bytes(bytes: &[u8], out: &mut [Self]) {
        debug_assert_eq!(bytes.len(), out.len() * Self::SIZE);
        let width = std::mem::size_of::<T>();
        for (chunk, value) in bytes.chunks_exact(Self::SIZE).zip(out.iter_mut()) {
            let (re, im) = chunk.split_at(width);
            value.re = T::read_from(re).unwrap_or_default();
            value.im = T::read_from(im).unwrap_or_default();
        }
    }
}

/// Encodes a slice of elements into a fresh byte buffer.
pub(crate) fn encode<T: Equivalence>(values: &[T]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * T::SIZE);
    T::write_bytes(values, &mut out);
    out
}

/// Decodes `bytes` into a pre-sized slice, requiring an exact size match.
pub(crate) fn decode_into<T: Equivalence>(bytes: &[u8], out: &mut [T]) -> Result<()> {
    let expected = out.len() * T::SIZE;
    if bytes.len() != expected {
        return Err(Error::SizeMismatch {
            expected,
            actual: bytes.len(),
        });
    }
    T::read_bytes(bytes, out);
    Ok(())
}

/// Decodes `bytes` into a new vector.
pub(crate) fn decode_vec<T: Equivalence>(bytes: &[u8]) -> Result<Vec<T>> {
    if bytes.len() % T::SIZE != 0 {
        return Err(Error::MalformedFrame);
    }
    let mut out = vec![T::default(); bytes.len() / T::SIZE];
    T::read_bytes(bytes, &mut out);
    Ok(out)
}

fn reduce_slices<T: Datatype>(op: ReduceOp, acc: &mut [u8], incoming: &[u8]) -> Result<()> {
    let width = std::mem::size_of::<T>();
    if acc.len() != incoming.len() {
        return Err(Error::SizeMismatch {
            expected: acc.len(),
            actual: incoming.len(),
        });
    }
    if acc.len() % width != 0 {
        return Err(Error::MalformedFrame);
    }

    for (a, b) in acc.chunks_exact_mut(width).zip(incoming.chunks_exact(width)) {
        let (Some(x), Some(y)) = (T::read_from(&*a), T::read_from(b)) else {
            return Err(Error::MalformedFrame);
        };
        let z = T::combine(op, x, y).ok_or(Error::UnsupportedOp {
            op,
            datatype: T::TAG,
        })?;
        a.copy_from_slice(z.as_bytes());
    }
    Ok(())
}

/// Combines `incoming` into `acc` element-wise, interpreting both as arrays
/// of `tag`.
pub(crate) fn reduce_bytes(
    tag: DatatypeTag,
    op: ReduceOp,
    acc: &mut [u8],
    incoming: &[u8],
) -> Result<()> {
    match tag {
        DatatypeTag::I8 => reduce_slices::<i8>(op, acc, incoming),
        DatatypeTag::U8 => reduce_slices::<u8>(op, acc, incoming),
        DatatypeTag::I16 => reduce_slices::<i16>(op, acc, incoming),
        DatatypeTag::U16 => reduce_slices::<u16>(op, acc, incoming),
        DatatypeTag::I32 => reduce_slices::<i32>(op, acc, incoming),
        DatatypeTag::U32 => reduce_slices::<u32>(op, acc, incoming),
        DatatypeTag::I64 => reduce_slices::<i64>(op, acc, incoming),
        DatatypeTag::U64 => reduce_slices::<u64>(op, acc, incoming),
        DatatypeTag::F32 => reduce_slices::<f32>(op, acc, incoming),
        DatatypeTag::F64 => reduce_slices::<f64>(op, acc, incoming),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tags_are_sequential() {
        let tags = [
            i8::TAG,
            u8::TAG,
            i16::TAG,
            u16::TAG,
            i32::TAG,
            u32::TAG,
            i64::TAG,
            u64::TAG,
            f32::TAG,
            f64::TAG,
        ];
        for (i, tag) in tags.iter().enumerate() {
            assert_eq!(*tag as u8, i as u8, "tag {tag:?} should have value {i}");
        }
    }

    #[test]
    fn tag_sizes_match_types() {
        assert_eq!(i8::TAG.size(), std::mem::size_of::<i8>());
        assert_eq!(u16::TAG.size(), std::mem::size_of::<u16>());
        assert_eq!(i32::TAG.size(), std::mem::size_of::<i32>());
        assert_eq!(u64::TAG.size(), std::mem::size_of::<u64>());
        assert_eq!(f32::TAG.size(), std::mem::size_of::<f32>());
        assert_eq!(f64::TAG.size(), std::mem::size_of::<f64>());
    }

    #[test]
    fn complex_has_two_components() {
        assert_eq!(<Complex<f64> as Equivalence>::COMPONENTS, 2);
        assert_eq!(<Complex<f64> as Equivalence>::SIZE, 16);
        assert_eq!(<Complex<f32> as Equivalence>::SIZE, 8);
        assert_eq!(<u16 as Equivalence>::SIZE, 2);
    }

    #[test]
    fn complex_is_encoded_as_real_then_imaginary() {
        let values = [Complex::new(1.0f64, -2.0), Complex::new(3.5, 4.25)];
        let bytes = encode(&values);
        assert_eq!(bytes, encode(&[1.0f64, -2.0, 3.5, 4.25]));

        let decoded: Vec<Complex<f64>> = decode_vec(&bytes).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn decode_into_rejects_wrong_size() {
        let mut out = [0u32; 3];
        let err = decode_into(&encode(&[1u32, 2]), &mut out).unwrap_err();
        assert!(matches!(err, Error::SizeMismatch { expected: 12, actual: 8 }));
    }

    #[test]
    fn integer_sum_wraps() {
        assert_eq!(u8::combine(ReduceOp::Sum, 250, 10), Some(4));
        assert_eq!(i8::combine(ReduceOp::Sum, 127, 1), Some(-128));
    }

    #[test]
    fn bitwise_ops_are_integer_only() {
        assert_eq!(u32::combine(ReduceOp::BitAnd, 0b1100, 0b1010), Some(0b1000));
        assert_eq!(u32::combine(ReduceOp::BitOr, 0b1100, 0b1010), Some(0b1110));
        assert_eq!(f64::combine(ReduceOp::BitOr, 1.0, 2.0), None);
        assert!(ReduceOp::BitAnd.check(DatatypeTag::F32).is_err());
        assert!(ReduceOp::Min.check(DatatypeTag::F32).is_ok());
    }

    #[test]
    fn reduce_bytes_is_element_wise() {
        let mut acc = encode(&[1.0f64, 5.0, -3.0]);
        let incoming = encode(&[2.0f64, 4.0, -3.5]);

        let mut min = acc.clone();
        reduce_bytes(DatatypeTag::F64, ReduceOp::Min, &mut min, &incoming).unwrap();
        assert_eq!(decode_vec::<f64>(&min).unwrap(), vec![1.0, 4.0, -3.5]);

        reduce_bytes(DatatypeTag::F64, ReduceOp::Sum, &mut acc, &incoming).unwrap();
        assert_eq!(decode_vec::<f64>(&acc).unwrap(), vec![3.0, 9.0, -6.5]);
    }

    #[test]
    fn reduce_bytes_rejects_mismatched_lengths() {
        let mut acc = encode(&[1i32, 2]);
        let err = reduce_bytes(DatatypeTag::I32, ReduceOp::Max, &mut acc, &encode(&[1i32]))
            .unwrap_err();
        assert!(matches!(err, Error::SizeMismatch { .. }));
    }
}
