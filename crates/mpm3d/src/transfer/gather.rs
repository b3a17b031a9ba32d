//! Per-cell gathering P2G.

use glam::Vec3;
use rayon::prelude::*;

use super::{node_weight, P2gStrategy, SplatCoeffs};
use crate::grid::MpmGrid;
use crate::particle::MpmParticle;

/// Race-free baseline: one parallel task per cell, each scanning every
/// particle and keeping the contributions whose stencil covers it. Each cell
/// is written by exactly one task, so no reconciliation is needed. O(cells x
/// particles); the reference the scatter strategies are checked against.
pub struct GatherP2g;

impl P2gStrategy for GatherP2g {
    fn name(&self) -> &'static str {
        "gathering"
    }

    fn particles_to_grid(
        &mut self,
        particles: &[MpmParticle],
        coeffs: &[SplatCoeffs],
        grid: &mut MpmGrid,
    ) {
        let origin = grid.origin;
        let spacing = grid.spacing;
        let width = grid.width;
        let height = grid.height;

        grid.cells_mut()
            .par_iter_mut()
            .enumerate()
            .for_each(|(idx, cell)| {
                let i = idx % width;
                let j = (idx / width) % height;
                let k = idx / (width * height);
                let center = origin
                    + Vec3::new(i as f32 + 0.5, j as f32 + 0.5, k as f32 + 0.5) * spacing;

                let mut mass = 0.0f32;
                let mut momentum = Vec3::ZERO;

                for (p, c) in particles.iter().zip(coeffs) {
                    if !p.is_active() {
                        continue;
                    }
                    let gx = (p.position - origin) / spacing - 0.5;
                    let w = node_weight(gx, i as i32, j as i32, k as i32);
                    if w < 1e-10 {
                        continue;
                    }
                    let d = center - p.position;
                    mass += c.mass * w;
                    momentum += (c.momentum + c.affine * d) * w;
                }

                cell.mass += mass;
                cell.momentum += momentum;
            });
    }
}
