//! 3D MLS-MPM Solver
//!
//! A wide-parallel implementation of the MLS-MPM (Moving Least Squares
//! Material Point Method) with APIC transfers and selectable P2G
//! write-reconciliation strategies: per-cell gathering, fixed-point atomic
//! scattering, and sort-based lock-free scattering.
//!
//! # Example
//!
//! ```
//! use mpm3d::{MpmSimulation, SimulationParams};
//! use glam::Vec3;
//!
//! let params = SimulationParams {
//!     grid_width: 16,
//!     grid_height: 16,
//!     grid_depth: 16,
//!     grid_spacing: 0.5,
//!     max_particles: 64,
//!     emission_batch: 16,
//!     emission_per_step: 16,
//!     emitter: mpm3d::SphereEmitter {
//!         center: Vec3::splat(4.0),
//!         radius: 1.5,
//!     },
//!     ..Default::default()
//! };
//! let mut sim = MpmSimulation::new(params).unwrap();
//!
//! // Run simulation steps; particles are emitted in batches each step
//! for _ in 0..4 {
//!     sim.step(1.0 / 60.0);
//! }
//! assert!(sim.active_particle_count() > 0);
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod grid;
pub mod grid_index;
pub mod kernels;
pub mod materials;
pub mod particle;
pub mod sort;
pub mod transfer;

pub use config::{P2gStrategyKind, SimulationParams};
pub use error::{MpmError, MpmResult};
pub use glam::{Mat3, Vec3};
pub use grid::{MpmCell, MpmGrid};
pub use materials::{ConstitutiveModel, HyperElastic, MaterialParams};
pub use particle::{MpmParticle, ParticlePool, ParticleType, SphereEmitter};
pub use transfer::{P2gStrategy, SplatCoeffs};

use rand::rngs::StdRng;
use rand::SeedableRng;

use transfer::compute_splat_coeffs;

/// 3D MLS-MPM simulation.
pub struct MpmSimulation {
    params: SimulationParams,
    /// Background Eulerian grid.
    pub grid: MpmGrid,
    /// Fixed-capacity particle pool.
    pub pool: ParticlePool,

    strategy: Box<dyn P2gStrategy>,
    model: Box<dyn ConstitutiveModel>,
    /// Per-particle splat coefficients (pre-allocated, rebuilt every step).
    coeffs: Vec<SplatCoeffs>,
    rng: StdRng,

    /// Current simulation frame.
    pub frame: u32,
}

impl MpmSimulation {
    /// Create a simulation from a validated configuration. All scratch
    /// buffers are allocated here; stepping never allocates.
    pub fn new(params: SimulationParams) -> MpmResult<Self> {
        params.validate()?;

        let grid = MpmGrid::new(
            params.grid_width,
            params.grid_height,
            params.grid_depth,
            params.grid_spacing,
            params.grid_origin,
        );
        let pool = ParticlePool::new(
            params.max_particles,
            params.emission_batch,
            params.particle_mass,
            params.particle_volume,
        );
        let strategy = transfer::make_strategy(&params)?;

        log::info!(
            "mpm simulation: grid {}x{}x{} h={}, pool {}, strategy {}",
            params.grid_width,
            params.grid_height,
            params.grid_depth,
            params.grid_spacing,
            params.max_particles,
            strategy.name()
        );

        Ok(Self {
            rng: StdRng::seed_from_u64(params.seed),
            grid,
            pool,
            strategy,
            model: Box::new(HyperElastic),
            coeffs: Vec::with_capacity(params.max_particles),
            params,
            frame: 0,
        })
    }

    /// Run one simulation step.
    pub fn step(&mut self, dt: f32) {
        assert!(dt >= 0.0, "dt must be non-negative, got {}", dt);

        // 1. Reset the grid; nothing carries over between steps
        self.grid.clear();

        // 2. Emit new particles (free count is refreshed once, so emission
        //    sees at most a one-step-stale value)
        self.pool.refresh_free_count();
        self.pool.emit(
            self.params.emission_per_step,
            &self.params.emitter,
            self.params.emit_kind,
            &mut self.rng,
        );

        // 3. Per-particle splat coefficients (stress evaluation happens here,
        //    once, so all strategies see identical contributions)
        let mat = MaterialParams::from_params(&self.params);
        compute_splat_coeffs(
            self.pool.particles(),
            self.model.as_ref(),
            &mat,
            self.params.grid_spacing,
            dt,
            &mut self.coeffs,
        );

        // 4. P2G under the configured strategy
        self.strategy
            .particles_to_grid(self.pool.particles(), &self.coeffs, &mut self.grid);

        // 5. Grid update: momentum to velocity, gravity, walls
        transfer::update_grid(&mut self.grid, self.params.gravity, dt);

        // 6. G2P: velocities, APIC matrix, advection, deformation gradient
        transfer::grid_to_particles(&self.grid, self.pool.particles_mut(), dt);

        self.frame += 1;
    }

    /// Activate one particle at an exact position, bypassing the batched
    /// emitter. Scenario setup path.
    pub fn spawn_particle(
        &mut self,
        position: Vec3,
        velocity: Vec3,
        kind: ParticleType,
    ) -> Option<usize> {
        self.pool.spawn_at(position, velocity, kind)
    }

    /// The run configuration.
    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    /// All particle slots, for render consumers.
    pub fn particles(&self) -> &[MpmParticle] {
        self.pool.particles()
    }

    /// Number of live particles.
    pub fn active_particle_count(&self) -> usize {
        self.pool.active_count()
    }

    /// Name of the active P2G strategy.
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }
}
