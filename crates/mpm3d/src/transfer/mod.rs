//! Particle <-> grid transfer engine.
//!
//! One step runs P2G (under the configured write-reconciliation strategy),
//! the per-cell grid update, then G2P. The phases are strictly sequential;
//! every parallel pass joins before the next phase reads its output.

mod gather;
mod scatter_locked;
mod scatter_lockfree;

pub use gather::GatherP2g;
pub use scatter_locked::LockedScatterP2g;
pub use scatter_lockfree::{LockFreeScatterP2g, P2gMass};

use glam::{Mat3, Vec3};
use rayon::prelude::*;

use crate::config::{P2gStrategyKind, SimulationParams};
use crate::constants::BOUNDARY_MARGIN;
use crate::error::MpmResult;
use crate::grid::MpmGrid;
use crate::kernels::{apic_d_inverse, quadratic_bspline_1d};
use crate::materials::{ConstitutiveModel, MaterialParams};
use crate::particle::MpmParticle;

/// Per-particle splat coefficients, precomputed once per step so all three
/// P2G strategies accumulate numerically identical contributions.
///
/// A node at world position `x` receives `w * mass` and
/// `w * (momentum + affine * (x - position))`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SplatCoeffs {
    /// Particle mass (zero for inactive slots).
    pub mass: f32,
    /// mass * velocity.
    pub momentum: Vec3,
    /// Fused APIC + stress matrix: `mass * C - dt * volume * D_inv * tau`.
    pub affine: Mat3,
}

/// One P2G write-reconciliation strategy. All implementations fulfil the same
/// contract: accumulate mass and momentum of every active particle into the
/// (pre-cleared) grid, equivalently up to float tolerance.
pub trait P2gStrategy: Send {
    /// Strategy name for diagnostics.
    fn name(&self) -> &'static str;

    /// Scatter or gather all particle contributions into the grid.
    fn particles_to_grid(
        &mut self,
        particles: &[MpmParticle],
        coeffs: &[SplatCoeffs],
        grid: &mut MpmGrid,
    );
}

/// Instantiate the strategy selected in the configuration, with its scratch
/// buffers sized for the run. Selected once; not interchangeable mid-run.
pub fn make_strategy(params: &SimulationParams) -> MpmResult<Box<dyn P2gStrategy>> {
    Ok(match params.strategy {
        P2gStrategyKind::Gathering => Box::new(GatherP2g),
        P2gStrategyKind::LockedScattering => Box::new(LockedScatterP2g::new(
            params.num_cells(),
            params.fixed_point_scale,
        )),
        P2gStrategyKind::LockFreeScattering => Box::new(LockFreeScatterP2g::new(
            params.max_particles,
            params.num_cells(),
        )?),
    })
}

/// Stencil weight of the node at integer coordinates `(i, j, k)` for a
/// particle at node-space position `gx` (world position mapped through
/// `(p - origin) / h - 0.5`).
#[inline]
pub(crate) fn node_weight(gx: Vec3, i: i32, j: i32, k: i32) -> f32 {
    quadratic_bspline_1d(gx.x - i as f32)
        * quadratic_bspline_1d(gx.y - j as f32)
        * quadratic_bspline_1d(gx.z - k as f32)
}

/// Compute the splat coefficients for every particle slot in parallel.
pub(crate) fn compute_splat_coeffs(
    particles: &[MpmParticle],
    model: &dyn ConstitutiveModel,
    mat: &MaterialParams,
    spacing: f32,
    dt: f32,
    out: &mut Vec<SplatCoeffs>,
) {
    out.clear();
    out.resize(particles.len(), SplatCoeffs::default());

    let d_inv = apic_d_inverse(spacing);
    out.par_iter_mut()
        .zip(particles.par_iter())
        .for_each(|(c, p)| {
            if !p.is_active() {
                *c = SplatCoeffs::default();
                return;
            }
            let stress = model.kirchhoff_stress(p, mat);
            c.mass = p.mass;
            c.momentum = p.velocity * p.mass;
            c.affine = p.c * p.mass + stress * (-dt * p.volume * d_inv);
        });
}

/// Per-cell grid update: momentum to velocity, gravity, wall boundary
/// conditions. Cells are independent; no inter-cell race.
pub fn update_grid(grid: &mut MpmGrid, gravity: Vec3, dt: f32) {
    let width = grid.width;
    let height = grid.height;
    let (nx, ny, nz) = (
        grid.width as i32,
        grid.height as i32,
        grid.depth as i32,
    );

    grid.cells_mut()
        .par_iter_mut()
        .enumerate()
        .for_each(|(idx, cell)| {
            if cell.mass <= 0.0 {
                // Explicit empty-cell guard: velocity stays exactly zero
                // instead of 0/0 NaN.
                cell.velocity = Vec3::ZERO;
                return;
            }

            let mut v = cell.momentum / cell.mass + gravity * dt;

            let i = (idx % width) as i32;
            let j = ((idx / width) % height) as i32;
            let k = (idx / (width * height)) as i32;

            // Zero outgoing velocity at the domain walls.
            if (i < BOUNDARY_MARGIN && v.x < 0.0) || (i >= nx - BOUNDARY_MARGIN && v.x > 0.0) {
                v.x = 0.0;
            }
            if (j < BOUNDARY_MARGIN && v.y < 0.0) || (j >= ny - BOUNDARY_MARGIN && v.y > 0.0) {
                v.y = 0.0;
            }
            if (k < BOUNDARY_MARGIN && v.z < 0.0) || (k >= nz - BOUNDARY_MARGIN && v.z > 0.0) {
                v.z = 0.0;
            }

            cell.velocity = v;
        });
}

/// G2P: gather the updated grid velocities back onto each particle, rebuild
/// the APIC matrix, integrate position and the deformation gradient.
///
/// Particles own their state, so this phase is race-free; it only reads grid
/// memory written by the (already completed) grid update.
pub fn grid_to_particles(grid: &MpmGrid, particles: &mut [MpmParticle], dt: f32) {
    let spacing = grid.spacing;
    let origin = grid.origin;
    let d_inv = apic_d_inverse(spacing);
    let (lo, hi) = grid.bounds();
    let margin = Vec3::splat(spacing);

    particles.par_iter_mut().for_each(|p| {
        if !p.is_active() {
            return;
        }

        let (ci, cj, ck) = grid.world_to_cell(p.position);
        let gx = (p.position - origin) / spacing - 0.5;

        let mut vel = Vec3::ZERO;
        let mut c = Mat3::ZERO;
        let mut weight_sum = 0.0f32;

        for dk in -1..=1 {
            for dj in -1..=1 {
                for di in -1..=1 {
                    let (ni, nj, nk) = (ci + di, cj + dj, ck + dk);
                    if !grid.cell_in_bounds(ni, nj, nk) {
                        continue;
                    }
                    let w = node_weight(gx, ni, nj, nk);
                    if w < 1e-10 {
                        continue;
                    }

                    let idx = grid.cell_index(ni as usize, nj as usize, nk as usize);
                    let node_vel = grid.cells()[idx].velocity;
                    let d = grid.cell_center(ni as usize, nj as usize, nk as usize) - p.position;

                    vel += node_vel * w;
                    // v (x) d, scaled by D_inv
                    c += Mat3::from_cols(node_vel * d.x, node_vel * d.y, node_vel * d.z)
                        * (w * d_inv);
                    weight_sum += w;
                }
            }
        }

        // Normalize so boundary particles with clipped stencils are not
        // artificially dampened.
        if weight_sum > 1e-6 {
            vel /= weight_sum;
            c *= 1.0 / weight_sum;
        } else {
            vel = Vec3::ZERO;
            c = Mat3::ZERO;
        }

        if !vel.is_finite() {
            vel = Vec3::ZERO;
        }

        p.velocity = vel;
        p.c = c;
        p.position = (p.position + vel * dt).clamp(lo + margin, hi - margin);
        p.fe = (Mat3::IDENTITY + c * dt) * p.fe;
    });
}
