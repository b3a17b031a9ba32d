//! Simulation configuration and validation.
//!
//! All configuration problems are fatal at construction time
//! ([`SimulationParams::validate`] is called by `MpmSimulation::new`); a
//! running simulation never re-checks them.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{MpmError, MpmResult};
use crate::particle::{ParticleType, SphereEmitter};

/// How concurrent particle writes to the same grid cell are reconciled
/// during the P2G transfer.
///
/// Selected once for the whole run; the scratch buffer layout differs per
/// strategy, so it cannot be switched mid-run.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum P2gStrategyKind {
    /// One task per grid cell gathers from all particles. Race-free by
    /// ownership; cost scales with cells x particles.
    #[default]
    Gathering,
    /// One task per particle scatters 27 contributions with fixed-point
    /// integer atomic adds.
    LockedScattering,
    /// One task per particle emits contribution records which are sorted by
    /// cell index and reduced per interval. No atomics at all.
    LockFreeScattering,
}

/// Full configuration for one simulation run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationParams {
    /// Grid resolution in cells along X.
    pub grid_width: usize,
    /// Grid resolution in cells along Y.
    pub grid_height: usize,
    /// Grid resolution in cells along Z.
    pub grid_depth: usize,
    /// Cell spacing h in world units.
    pub grid_spacing: f32,
    /// World position of the minimum corner of the grid. The domain may be
    /// repositioned between steps; cell mapping always derives from the
    /// current origin.
    pub grid_origin: Vec3,

    /// Young's modulus E.
    pub youngs_modulus: f32,
    /// Poisson ratio nu, strictly inside (-1, 0.5).
    pub poisson_ratio: f32,
    /// Snow hardening coefficient.
    pub hardening: f32,

    /// Mass assigned to each particle at emission, fixed for its lifetime.
    pub particle_mass: f32,
    /// Initial particle volume.
    pub particle_volume: f32,
    /// Fixed particle pool capacity. A power of two keeps the lock-free
    /// contribution buffer unpadded, but any positive value works.
    pub max_particles: usize,

    /// Emission region.
    pub emitter: SphereEmitter,
    /// Material type given to emitted particles.
    pub emit_kind: ParticleType,
    /// Emission only proceeds in multiples of this batch size.
    pub emission_batch: usize,
    /// Particles requested from the pool each step.
    pub emission_per_step: usize,

    /// External acceleration applied in the grid update.
    pub gravity: Vec3,
    /// P2G write-reconciliation strategy for the whole run.
    pub strategy: P2gStrategyKind,
    /// Fixed-point quantization scale for the locked-scattering path.
    pub fixed_point_scale: f32,
    /// Seed for the emitter's RNG; runs are reproducible per seed.
    pub seed: u64,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            grid_width: 80,
            grid_height: 80,
            grid_depth: 80,
            grid_spacing: 0.5,
            grid_origin: Vec3::ZERO,
            youngs_modulus: 1.4e4,
            poisson_ratio: 0.2,
            hardening: 10.0,
            particle_mass: 1.0,
            particle_volume: 1.0,
            max_particles: 1024,
            emitter: SphereEmitter {
                center: Vec3::splat(20.0),
                radius: 3.0,
            },
            emit_kind: ParticleType::Elastic,
            emission_batch: 64,
            emission_per_step: 64,
            gravity: Vec3::new(0.0, crate::constants::GRAVITY, 0.0),
            strategy: P2gStrategyKind::Gathering,
            fixed_point_scale: 65536.0,
            seed: 42,
        }
    }
}

impl SimulationParams {
    /// Number of grid cells.
    pub fn num_cells(&self) -> usize {
        self.grid_width * self.grid_height * self.grid_depth
    }

    /// Check every configuration invariant. Fatal at initialization; never
    /// re-checked at runtime.
    pub fn validate(&self) -> MpmResult<()> {
        if self.grid_width == 0 || self.grid_height == 0 || self.grid_depth == 0 {
            return Err(MpmError::InvalidConfig(format!(
                "grid resolution must be positive, got {}x{}x{}",
                self.grid_width, self.grid_height, self.grid_depth
            )));
        }
        if !(self.grid_spacing > 0.0) {
            return Err(MpmError::InvalidConfig(format!(
                "grid spacing must be positive, got {}",
                self.grid_spacing
            )));
        }
        if !(self.poisson_ratio > -1.0 && self.poisson_ratio < 0.5) {
            return Err(MpmError::InvalidConfig(format!(
                "poisson ratio must lie strictly in (-1, 0.5), got {}",
                self.poisson_ratio
            )));
        }
        if !(self.youngs_modulus > 0.0) {
            return Err(MpmError::InvalidConfig(format!(
                "young's modulus must be positive, got {}",
                self.youngs_modulus
            )));
        }
        if self.max_particles == 0 {
            return Err(MpmError::InvalidConfig(
                "max_particles must be positive".into(),
            ));
        }
        if self.emission_batch == 0 {
            return Err(MpmError::InvalidConfig(
                "emission_batch must be positive".into(),
            ));
        }
        if !(self.particle_mass > 0.0) {
            return Err(MpmError::InvalidConfig(format!(
                "particle mass must be positive, got {}",
                self.particle_mass
            )));
        }
        if !(self.emitter.radius > 0.0) {
            return Err(MpmError::InvalidConfig(format!(
                "emitter radius must be positive, got {}",
                self.emitter.radius
            )));
        }
        if !(self.fixed_point_scale > 0.0) {
            return Err(MpmError::InvalidConfig(format!(
                "fixed-point scale must be positive, got {}",
                self.fixed_point_scale
            )));
        }
        Ok(())
    }
}
