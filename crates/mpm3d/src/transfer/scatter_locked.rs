//! Locked scattering P2G: per-particle scatter with fixed-point atomic
//! accumulation.

use std::sync::atomic::{AtomicI64, Ordering};

use glam::Vec3;
use rayon::prelude::*;

use super::{node_weight, P2gStrategy, SplatCoeffs};
use crate::grid::MpmGrid;
use crate::particle::MpmParticle;

/// One parallel task per particle; each scatters its 27 stencil contributions
/// with atomic integer adds. Floats don't have atomic add, so contributions
/// are quantized to fixed point first; integer addition commutes exactly, so
/// the result is deterministic regardless of particle ordering (at the cost
/// of quantization error bounded by the scale).
pub struct LockedScatterP2g {
    mass: Vec<AtomicI64>,
    momentum: Vec<[AtomicI64; 3]>,
    scale: f32,
}

#[inline]
fn encode(v: f32, scale: f32) -> i64 {
    (v as f64 * scale as f64).round() as i64
}

#[inline]
fn decode(v: i64, scale: f32) -> f32 {
    (v as f64 / scale as f64) as f32
}

impl LockedScatterP2g {
    pub fn new(num_cells: usize, scale: f32) -> Self {
        Self {
            mass: (0..num_cells).map(|_| AtomicI64::new(0)).collect(),
            momentum: (0..num_cells)
                .map(|_| [AtomicI64::new(0), AtomicI64::new(0), AtomicI64::new(0)])
                .collect(),
            scale,
        }
    }

    fn reset(&self) {
        self.mass
            .par_iter()
            .zip(self.momentum.par_iter())
            .for_each(|(m, p)| {
                m.store(0, Ordering::Relaxed);
                for axis in p {
                    axis.store(0, Ordering::Relaxed);
                }
            });
    }
}

impl P2gStrategy for LockedScatterP2g {
    fn name(&self) -> &'static str {
        "locked-scattering"
    }

    fn particles_to_grid(
        &mut self,
        particles: &[MpmParticle],
        coeffs: &[SplatCoeffs],
        grid: &mut MpmGrid,
    ) {
        debug_assert_eq!(self.mass.len(), grid.num_cells());
        self.reset();

        let origin = grid.origin;
        let spacing = grid.spacing;
        let (nx, ny, nz) = (
            grid.width as i32,
            grid.height as i32,
            grid.depth as i32,
        );
        let width = grid.width;
        let height = grid.height;
        let scale = self.scale;
        let mass_acc = &self.mass;
        let momentum_acc = &self.momentum;

        particles
            .par_iter()
            .zip(coeffs.par_iter())
            .for_each(|(p, c)| {
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

                for dk in -1..=1 {
                    for dj in -1..=1 {
                        for di in -1..=1 {
                            let (ni, nj, nk) = (ci + di, cj + dj, ck + dk);
                            if ni < 0 || ni >= nx || nj < 0 || nj >= ny || nk < 0 || nk >= nz {
                                continue;
                            }
                            let w = node_weight(gx, ni, nj, nk);
                            if w < 1e-10 {
                                continue;
                            }

                            let center = origin
                                + Vec3::new(
                                    ni as f32 + 0.5,
                                    nj as f32 + 0.5,
                                    nk as f32 + 0.5,
                                ) * spacing;
                            let d = center - p.position;
                            let momentum = (c.momentum + c.affine * d) * w;

                            let idx =
                                ni as usize + nj as usize * width + nk as usize * width * height;
                            mass_acc[idx].fetch_add(encode(c.mass * w, scale), Ordering::Relaxed);
                            momentum_acc[idx][0]
                                .fetch_add(encode(momentum.x, scale), Ordering::Relaxed);
                            momentum_acc[idx][1]
                                .fetch_add(encode(momentum.y, scale), Ordering::Relaxed);
                            momentum_acc[idx][2]
                                .fetch_add(encode(momentum.z, scale), Ordering::Relaxed);
                        }
                    }
                }
            });

        // Decode pass: one task per cell, no contention.
        grid.cells_mut()
            .par_iter_mut()
            .enumerate()
            .for_each(|(idx, cell)| {
                cell.mass += decode(mass_acc[idx].load(Ordering::Relaxed), scale);
                cell.momentum += Vec3::new(
                    decode(momentum_acc[idx][0].load(Ordering::Relaxed), scale),
                    decode(momentum_acc[idx][1].load(Ordering::Relaxed), scale),
                    decode(momentum_acc[idx][2].load(Ordering::Relaxed), scale),
                );
            });
    }
}
