//! Lock-free scattering P2G: record contributions privately, sort them by
//! target cell, then reduce each cell's run with a single writer.

use glam::Vec3;
use rayon::prelude::*;

use super::{node_weight, P2gStrategy, SplatCoeffs};
use crate::constants::{CELL_NEIGHBOR_COUNT, SENTINEL_CELL};
use crate::error::MpmResult;
use crate::grid::MpmGrid;
use crate::grid_index::SpatialGridIndex;
use crate::particle::MpmParticle;
use crate::sort::SortPair;

/// One P2G contribution record: the mass and momentum a particle deposits at
/// one stencil node.
#[derive(Clone, Copy, Debug, Default)]
pub struct P2gMass {
    pub mass: f32,
    pub momentum: Vec3,
}

/// Three-phase lock-free scatter. Phase 1 writes each particle's 27 stencil
/// contributions into a private slice of the record buffer, tagging each with
/// its target cell. Phase 2 sorts the `(cell, record)` tags and builds the
/// per-cell interval table. Phase 3 walks the cells, each task reducing only
/// its own interval. No write ever contends: phase 1 slices are disjoint per
/// particle, phase 3 writers are disjoint per cell.
pub struct LockFreeScatterP2g {
    records: Vec<P2gMass>,
    index: SpatialGridIndex,
}

impl LockFreeScatterP2g {
    /// Buffers sized for `max_particles` (27 records each) over `num_cells`.
    pub fn new(max_particles: usize, num_cells: usize) -> MpmResult<Self> {
        let num_records = max_particles * CELL_NEIGHBOR_COUNT;
        Ok(Self {
            records: vec![P2gMass::default(); num_records],
            index: SpatialGridIndex::new(num_records, num_cells)?,
        })
    }
}

impl P2gStrategy for LockFreeScatterP2g {
    fn name(&self) -> &'static str {
        "lock-free-scattering"
    }

    fn particles_to_grid(
        &mut self,
        particles: &[MpmParticle],
        coeffs: &[SplatCoeffs],
        grid: &mut MpmGrid,
    ) {
        let Self { records, index } = self;
        debug_assert_eq!(records.len(), particles.len() * CELL_NEIGHBOR_COUNT);

        let origin = grid.origin;
        let spacing = grid.spacing;
        let (nx, ny, nz) = (
            grid.width as i32,
            grid.height as i32,
            grid.depth as i32,
        );
        let width = grid.width;
        let height = grid.height;

        // Phase 1: splat into disjoint per-particle record slices. Every slot
        // is rewritten each step, unused ones with the sentinel key.
        records
            .par_chunks_mut(CELL_NEIGHBOR_COUNT)
            .zip(index.pairs_mut().par_chunks_mut(CELL_NEIGHBOR_COUNT))
            .zip(particles.par_iter().zip(coeffs.par_iter()))
            .enumerate()
            .for_each(|(pi, ((recs, tags), (p, c)))| {
                for slot in 0..CELL_NEIGHBOR_COUNT {
                    recs[slot] = P2gMass::default();
                    tags[slot] = SortPair {
                        key: SENTINEL_CELL,
                        value: 0,
                    };
                }
                if !p.is_active() {
                    return;
                }

                let local = (p.position - origin) / spacing;
                let (ci, cj, ck) = (
                    local.x.floor() as i32,
                    local.y.floor() as i32,
                    local.z.floor() as i32,
                );
                let gx = local - 0.5;

                let mut slot = 0;
                for dk in -1..=1 {
                    for dj in -1..=1 {
                        for di in -1..=1 {
                            let (ni, nj, nk) = (ci + di, cj + dj, ck + dk);
                            let in_bounds =
                                ni >= 0 && ni < nx && nj >= 0 && nj < ny && nk >= 0 && nk < nz;
                            if in_bounds {
                                let w = node_weight(gx, ni, nj, nk);
                                if w >= 1e-10 {
                                    let center = origin
                                        + Vec3::new(
                                            ni as f32 + 0.5,
                                            nj as f32 + 0.5,
                                            nk as f32 + 0.5,
                                        ) * spacing;
                                    let d = center - p.position;
                                    let idx = ni as usize
                                        + nj as usize * width
                                        + nk as usize * width * height;
                                    recs[slot] = P2gMass {
                                        mass: c.mass * w,
                                        momentum: (c.momentum + c.affine * d) * w,
                                    };
                                    tags[slot] = SortPair {
                                        key: idx as u32,
                                        value: (pi * CELL_NEIGHBOR_COUNT + slot) as u32,
                                    };
                                }
                            }
                            slot += 1;
                        }
                    }
                }
            });

        // Phase 2: group records by target cell.
        index.build();

        // Phase 3: single writer per cell reduces its interval. Summation
        // order within a run follows the sorted tags, so it is stable for a
        // fixed particle set.
        let pairs = index.pairs();
        let intervals = index.intervals();
        let records = &*records;
        grid.cells_mut()
            .par_iter_mut()
            .enumerate()
            .for_each(|(ci, cell)| {
                let iv = intervals[ci];
                let mut mass = 0.0f32;
                let mut momentum = Vec3::ZERO;
                for s in iv.start..iv.start + iv.count {
                    let rec = records[pairs[s as usize].value as usize];
                    mass += rec.mass;
                    momentum += rec.momentum;
                }
                cell.mass += mass;
                cell.momentum += momentum;
            });
    }
}
