//! Packing of boolean sequences into unsigned words.
//!
//! Bit `i` of a sequence lives in word `i / W::BITS` at bit offset
//! `i % W::BITS` (least significant bit first). Unused high bits of the last
//! word are zero. Unpacking needs the original length, which the caller
//! carries separately.

use std::ops::{BitAnd, BitOr, Shl, Shr};

use crate::datatype::{Datatype, Equivalence};

/// Unsigned word type usable as bit-packing storage.
pub trait BitWord:
    Datatype
    + Equivalence
    + Eq
    + BitAnd<Output = Self>
    + BitOr<Output = Self>
    + Shl<usize, Output = Self>
    + Shr<usize, Output = Self>
{
    const BITS: usize;
    const ZERO: Self;
    const ONE: Self;
}

macro_rules! impl_bit_word {
    ($($ty:ty),*) => {
        $(
            impl BitWord for $ty {
                const BITS: usize = <$ty>::BITS as usize;
                const ZERO: Self = 0;
                const ONE: Self = 1;
            }
        )*
    };
}

impl_bit_word!(u8, u16, u32, u64);

/// Number of `W` words needed to hold `len` bits.
pub const fn packed_len<W: BitWord>(len: usize) -> usize {
    len.div_ceil(W::BITS)
}

/// Packs `bits` into `packed_len::<W>(bits.len())` words.
pub fn pack_bools<W: BitWord>(bits: &[bool]) -> Vec<W> {
    let mut words = vec![W::ZERO; packed_len::<W>(bits.len())];
    for (word, chunk) in words.iter_mut().zip(bits.chunks(W::BITS)) {
        for (offset, _) in chunk.iter().enumerate().filter(|(_, bit)| **bit) {
            *word = *word | (W::ONE << offset);
        }
    }
    words
}

/// Unpacks `words` into `bits`, whose length determines how many bits are
/// read.
pub fn unpack_bools<W: BitWord>(words: &[W], bits: &mut [bool]) {
    debug_assert_eq!(words.len(), packed_len::<W>(bits.len()));
    for (word, chunk) in words.iter().zip(bits.chunks_mut(W::BITS)) {
        for (offset, bit) in chunk.iter_mut().enumerate() {
            *bit = (*word >> offset) & W::ONE != W::ZERO;
        }
    }
}
