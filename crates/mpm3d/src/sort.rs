//! Power-of-two bitonic key/value sorter.
//!
//! Classic bitonic merge network, organized for wide parallelism:
//! compare-exchange strides smaller than the block width are fused into a
//! single block-local pass, while larger strides run as global passes over
//! disjoint aligned pair ranges.
//! Every pass touches disjoint element pairs, so passes parallelize without
//! synchronization.

use rayon::prelude::*;

use crate::error::{MpmError, MpmResult};

/// Elements sorted together within one block-local pass.
const BITONIC_BLOCK_SIZE: usize = 512;

/// Key/value pair sorted ascending by `key`. Ties reorder arbitrarily;
/// callers must not depend on insertion order within equal-key runs.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct SortPair {
    pub key: u32,
    pub value: u32,
}

/// Sorter fixed to one power-of-two element count.
///
/// The count restriction is a property of the merge network, so it is
/// reported at construction rather than per call.
pub struct BitonicSort {
    num_elements: usize,
    block_size: usize,
}

impl BitonicSort {
    /// Create a sorter for exactly `num_elements` pairs. Fails unless the
    /// count is an even power of two.
    pub fn new(num_elements: usize) -> MpmResult<Self> {
        if num_elements < 2 || !num_elements.is_power_of_two() {
            return Err(MpmError::InvalidConfig(format!(
                "bitonic sort size must be a power of two >= 2, got {}",
                num_elements
            )));
        }
        Ok(Self {
            num_elements,
            block_size: BITONIC_BLOCK_SIZE.min(num_elements),
        })
    }

    /// Element count the sorter was built for.
    pub fn num_elements(&self) -> usize {
        self.num_elements
    }

    /// Sort `data` ascending by key. `data` must have exactly the length the
    /// sorter was constructed with.
    pub fn sort(&self, data: &mut [SortPair]) {
        assert_eq!(
            data.len(),
            self.num_elements,
            "sort buffer length does not match the configured element count"
        );

        let n = self.num_elements;
        let block = self.block_size;

        let mut level = 2;
        while level <= n {
            // Strides that reach across blocks run as standalone global
            // passes; each aligned 2*stride range is an independent task.
            let mut stride = level >> 1;
            while stride >= block {
                Self::global_pass(data, level, stride);
                stride >>= 1;
            }

            // All remaining strides stay inside one block: fuse them into a
            // single parallel pass per block, like the shared-memory kernel.
            data.par_chunks_mut(block)
                .enumerate()
                .for_each(|(blk, chunk)| {
                    let base = blk * block;
                    let mut s = stride;
                    while s > 0 {
                        for i in 0..block {
                            let gi = base + i;
                            let partner = gi ^ s;
                            if partner > gi {
                                let ascending = (gi & level) == 0;
                                let a = chunk[gi - base];
                                let b = chunk[partner - base];
                                if (a.key > b.key) == ascending {
                                    chunk[gi - base] = b;
                                    chunk[partner - base] = a;
                                }
                            }
                        }
                        s >>= 1;
                    }
                });

            level <<= 1;
        }
    }

    /// One compare-exchange pass at `stride`, across blocks. Pairs are
    /// `(base + i, base + i + stride)` within aligned `2 * stride` ranges;
    /// the sort direction is constant per range because `level > stride`.
    fn global_pass(data: &mut [SortPair], level: usize, stride: usize) {
        data.par_chunks_mut(2 * stride)
            .enumerate()
            .for_each(|(range, chunk)| {
                let base = range * 2 * stride;
                let ascending = (base & level) == 0;
                for i in 0..stride {
                    let a = chunk[i];
                    let b = chunk[i + stride];
                    if (a.key > b.key) == ascending {
                        chunk[i] = b;
                        chunk[i + stride] = a;
                    }
                }
            });
    }
}
