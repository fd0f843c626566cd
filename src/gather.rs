//! Gather, allgather and all-to-all.
//!
//! Variable-length gathers run in two steps: every process first learns
//! the length of every contribution (counted in base scalars, so complex
//! values count twice), then the contributions are collected in rank order
//! at their prefix-sum displacements.

use crate::{
    communicator::Communicator,
    datatype::{decode_into, decode_vec, encode, Equivalence},
    error::Result,
};

/// Offsets of consecutive blocks of the given sizes.
pub(crate) fn displacements(counts: &[usize]) -> Vec<usize> {
    counts
        .iter()
        .scan(0, |offset, count| {
            let displ = *offset;
            *offset += count;
            Some(displ)
        })
        .collect()
}

impl Communicator {
    /// Collects `value` from every process on `root`.
    ///
    /// On `root`, `out` is replaced by the values in rank order. On all
    /// other processes `out` is left untouched.
    pub fn gather<T: Equivalence>(&self, root: usize, value: T, out: &mut Vec<T>) -> Result<()> {
        if self.size() == 1 {
            debug_assert_eq!(root, self.rank(), "gather root out of range");
            out.clear();
            out.push(value);
            return Ok(());
        }
        self.check_rank(root)?;
        let _guard = tracing::trace_span!("gather", root).entered();

        let send = encode(std::slice::from_ref(&value));
        if self.rank() == root {
            let mut recv = vec![0u8; self.size() * T::SIZE];
            self.transport().gather(&send, &mut recv, root)?;
            *out = decode_vec(&recv)?;
        } else {
            self.transport().gather(&send, &mut [], root)?;
        }
        Ok(())
    }

    /// Concatenates `buf` of every process in rank order on `root`.
    ///
    /// The contributions may differ in length. On `root`, `buf` is replaced
    /// by the concatenation; on all other processes it is left untouched.
    pub fn gather_vec<T: Equivalence>(&self, root: usize, buf: &mut Vec<T>) -> Result<()> {
        if self.size() == 1 {
            debug_assert_eq!(root, self.rank(), "gather root out of range");
            return Ok(());
        }
        self.check_rank(root)?;
        let _guard = tracing::trace_span!("gather_vec", root, len = buf.len()).entered();

        let Some((counts, displs)) = self.block_layout::<T>(buf.len())? else {
            return Ok(());
        };
        let send = encode(buf);
        if self.rank() == root {
            let mut recv = vec![0u8; counts.iter().sum()];
            self.transport()
                .gatherv(&send, &mut recv, &counts, &displs, root)?;
            *buf = decode_vec(&recv)?;
        } else {
            self.transport()
                .gatherv(&send, &mut [], &counts, &displs, root)?;
        }
        Ok(())
    }

    /// Collects `value` from every process on every process, in rank
    /// order.
    pub fn allgather<T: Equivalence>(&self, value: T, out: &mut Vec<T>) -> Result<()> {
        if self.size() == 1 {
            out.clear();
            out.push(value);
            return Ok(());
        }
        let _guard = tracing::trace_span!("allgather").entered();

        let send = encode(std::slice::from_ref(&value));
        let mut recv = vec![0u8; self.size() * T::SIZE];
        self.transport().allgather(&send, &mut recv)?;
        *out = decode_vec(&recv)?;
        Ok(())
    }

    /// Replaces `buf` on every process with the concatenation of all
    /// processes' `buf` in rank order.
    pub fn allgather_vec<T: Equivalence>(&self, buf: &mut Vec<T>) -> Result<()> {
        if self.size() == 1 {
            return Ok(());
        }
        let _guard = tracing::trace_span!("allgather_vec", len = buf.len()).entered();

        let Some((counts, displs)) = self.block_layout::<T>(buf.len())? else {
            return Ok(());
        };
        let send = encode(buf);
        let mut recv = vec![0u8; counts.iter().sum()];
        self.transport()
            .allgatherv(&send, &mut recv, &counts, &displs)?;
        *buf = decode_vec(&recv)?;
        Ok(())
    }

    /// Exchanges equal blocks between all processes.
    ///
    /// `buf` is split into `size` blocks; block `i` is sent to process `i`,
    /// and afterwards block `j` of `buf` holds what process `j` sent here.
    /// The length of `buf` must be a multiple of the number of processes.
    pub fn alltoall<T: Equivalence>(&self, buf: &mut [T]) -> Result<()> {
        debug_assert_eq!(buf.len() % self.size(), 0, "alltoall buffer not divisible by size");
        if self.size() == 1 {
            return Ok(());
        }
        let _guard = tracing::trace_span!("alltoall", len = buf.len()).entered();

        let send = encode(buf);
        let mut recv = vec![0u8; send.len()];
        self.transport().alltoall(&send, &mut recv)?;
        decode_into(&recv, buf)
    }

    /// Byte counts and displacements of every process's contribution of
    /// `len` elements, or `None` if all contributions are empty.
    fn block_layout<T: Equivalence>(&self, len: usize) -> Result<Option<(Vec<usize>, Vec<usize>)>> {
        let components = (len * T::COMPONENTS) as u64;
        let mut recv = vec![0u8; self.size() * std::mem::size_of::<u64>()];
        self.transport()
            .allgather(&encode(&[components]), &mut recv)?;
        let components: Vec<u64> = decode_vec(&recv)?;

        if components.iter().all(|&c| c == 0) {
            return Ok(None);
        }
        let width = std::mem::size_of::<T::Base>();
        let counts: Vec<usize> = components.iter().map(|&c| c as usize * width).collect();
        let displs = displacements(&counts);
        Ok(Some((counts, displs)))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::datatype::Complex;
    use crate::test::*;
    use rand::Rng;

    #[test]
    fn prefix_sum_displacements() {
        assert_eq!(displacements(&[3, 0, 2, 5]), vec![0, 3, 3, 5]);
        assert!(displacements(&[]).is_empty());
    }

    #[test]
    fn single_process_gathers() {
        let comm = Communicator::new(ForbiddenTransport);

        let mut out = vec![9, 9, 9];
        comm.gather(0, 4u32, &mut out).unwrap();
        assert_eq!(out, vec![4]);

        comm.allgather(5u32, &mut out).unwrap();
        assert_eq!(out, vec![5]);

        let mut buf = vec![1.0f64, 2.0];
        comm.gather_vec(0, &mut buf).unwrap();
        comm.allgather_vec(&mut buf).unwrap();
        comm.alltoall(&mut buf).unwrap();
        assert_eq!(buf, vec![1.0, 2.0]);
    }

    #[test]
    fn gather_leaves_non_root_untouched() {
        init_logger();

        run_world(4, |comm| {
            for root in 0..comm.size() {
                let mut out = vec![-1i64; 2];
                comm.gather(root, comm.rank() as i64 * 10, &mut out).unwrap();
                if comm.rank() == root {
                    assert_eq!(out, vec![0, 10, 20, 30]);
                } else {
                    assert_eq!(out, vec![-1, -1]);
                }
            }
        });
    }

    #[test]
    fn gather_vec_of_varying_lengths() {
        run_world(4, |comm| {
            let rank = comm.rank();
            let mut buf: Vec<u16> = vec![rank as u16; rank];
            let original = buf.clone();
            comm.gather_vec(2, &mut buf).unwrap();

            if rank == 2 {
                assert_eq!(buf, vec![1, 2, 2, 3, 3, 3]);
            } else {
                assert_eq!(buf, original);
            }
        });
    }

    #[test]
    fn gather_vec_of_empty_buffers() {
        run_world(3, |comm| {
            let mut buf: Vec<f32> = vec![];
            comm.gather_vec(0, &mut buf).unwrap();
            assert!(buf.is_empty());
            comm.allgather_vec(&mut buf).unwrap();
            assert!(buf.is_empty());
        });
    }

    #[test]
    fn allgather_values() {
        run_world(5, |comm| {
            let mut out = vec![];
            comm.allgather(Complex::new(comm.rank() as f64, 1.0), &mut out).unwrap();
            let expected: Vec<_> = (0..5).map(|r| Complex::new(r as f64, 1.0)).collect();
            assert_eq!(out, expected);
        });
    }

    #[test]
    fn allgather_vec_concatenates_in_rank_order() {
        let lengths: Vec<usize> = {
            let mut rng = rand::thread_rng();
            (0..6).map(|_| rng.gen_range(0..10)).collect()
        };
        let expected: Vec<Complex<f32>> = lengths
            .iter()
            .enumerate()
            .flat_map(|(rank, &len)| (0..len).map(move |i| Complex::new(rank as f32, i as f32)))
            .collect();

        run_world(6, |comm| {
            let rank = comm.rank();
            let mut buf: Vec<Complex<f32>> =
                (0..lengths[rank]).map(|i| Complex::new(rank as f32, i as f32)).collect();
            comm.allgather_vec(&mut buf).unwrap();
            assert_eq!(buf, expected);
        });
    }

    #[test]
    fn alltoall_transposes_blocks() {
        run_world(3, |comm| {
            let rank = comm.rank() as i32;
            let mut buf: Vec<i32> = (0..3).flat_map(|dest| [rank * 100 + dest, -1]).collect();
            comm.alltoall(&mut buf).unwrap();
            let expected: Vec<i32> = (0..3).flat_map(|src| [src * 100 + rank, -1]).collect();
            assert_eq!(buf, expected);
        });
    }
}
