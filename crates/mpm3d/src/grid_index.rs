//! Spatial grid index: sorted contribution pairs plus a per-cell interval
//! table.
//!
//! This is the "group-by cell" stage of the lock-free scatter: after sorting
//! the `(cellIndex, recordIndex)` pairs, all contributions aimed at one cell
//! are contiguous, and the interval table maps each cell to its run. Rebuilt
//! from scratch every step; purely derived data.

use rayon::prelude::*;

use crate::constants::SENTINEL_CELL;
use crate::error::MpmResult;
use crate::sort::{BitonicSort, SortPair};

/// Half-open run `[start, start + count)` into the sorted pair array.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CellInterval {
    pub start: u32,
    pub count: u32,
}

/// Sorted `(cellIndex, recordIndex)` pairs plus the per-cell interval table.
pub struct SpatialGridIndex {
    pairs: Vec<SortPair>,
    intervals: Vec<CellInterval>,
    sorter: BitonicSort,
    /// Slots writers may fill; the rest stay sentinel forever.
    record_capacity: usize,
}

impl SpatialGridIndex {
    /// Build an index for up to `max_records` contribution records across
    /// `num_cells` cells. The pair array is padded to the next power of two
    /// so the bitonic network accepts it; padding slots carry the sentinel
    /// key and sort to the end.
    pub fn new(max_records: usize, num_cells: usize) -> MpmResult<Self> {
        let padded = max_records.next_power_of_two().max(2);
        Ok(Self {
            pairs: vec![
                SortPair {
                    key: SENTINEL_CELL,
                    value: 0,
                };
                padded
            ],
            intervals: vec![CellInterval::default(); num_cells],
            sorter: BitonicSort::new(padded)?,
            record_capacity: max_records,
        })
    }

    /// Writable slots for the splat phase. Writers must set every slot in
    /// this range each step (sentinel key for unused ones); slots beyond it
    /// are permanently sentinel.
    pub fn pairs_mut(&mut self) -> &mut [SortPair] {
        &mut self.pairs[..self.record_capacity]
    }

    /// The sorted pair array, valid after [`build`](Self::build).
    pub fn pairs(&self) -> &[SortPair] {
        &self.pairs
    }

    /// Per-cell intervals, valid after [`build`](Self::build).
    pub fn intervals(&self) -> &[CellInterval] {
        &self.intervals
    }

    /// Sort the pairs by cell index and rebuild the interval table.
    pub fn build(&mut self) {
        self.sorter.sort(&mut self.pairs);

        self.intervals
            .par_iter_mut()
            .for_each(|iv| *iv = CellInterval::default());

        // Sorted and the sentinel is the maximum key, so the live prefix ends
        // at the first sentinel.
        let live = self.pairs.partition_point(|p| p.key != SENTINEL_CELL);
        if live == 0 {
            return;
        }

        // A slot starts a new interval iff its key differs from its left
        // neighbor (one task per element, O(1) neighbor compare).
        let pairs = &self.pairs[..live];
        let starts: Vec<usize> = pairs
            .par_iter()
            .enumerate()
            .filter(|&(i, p)| i == 0 || pairs[i - 1].key != p.key)
            .map(|(i, _)| i)
            .collect();

        for (s, seg) in starts.iter().enumerate() {
            let end = if s + 1 < starts.len() {
                starts[s + 1]
            } else {
                live
            };
            let cell = pairs[*seg].key as usize;
            self.intervals[cell] = CellInterval {
                start: *seg as u32,
                count: (end - *seg) as u32,
            };
        }
    }
}
