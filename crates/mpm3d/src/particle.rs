//! Particle storage: fixed-capacity pool with a free-index stack and batched
//! emission.

use glam::{Mat3, Vec3};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Material type of a particle. `Inactive` particles are skipped by every
/// physics kernel and are exactly the indices held in the pool's free stack.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum ParticleType {
    #[default]
    Inactive,
    Elastic,
    Snow,
    Liquid,
}

/// A single material point.
#[derive(Clone, Copy, Debug)]
pub struct MpmParticle {
    /// Material type; `Inactive` until emitted.
    pub kind: ParticleType,
    /// World position.
    pub position: Vec3,
    /// Velocity.
    pub velocity: Vec3,
    /// Mass; fixed at emission for the particle's lifetime.
    pub mass: f32,
    /// Material volume.
    pub volume: f32,
    /// APIC affine velocity matrix C.
    pub c: Mat3,
    /// Elastic deformation gradient Fe; identity at emission.
    pub fe: Mat3,
    /// Plastic volume ratio Jp; 1.0 at emission.
    pub jp: f32,
}

impl Default for MpmParticle {
    fn default() -> Self {
        Self {
            kind: ParticleType::Inactive,
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            mass: 0.0,
            volume: 0.0,
            c: Mat3::ZERO,
            fe: Mat3::IDENTITY,
            jp: 1.0,
        }
    }
}

impl MpmParticle {
    /// Whether any physics kernel should touch this particle.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.kind != ParticleType::Inactive
    }
}

/// Spherical emission region; new particles are sampled uniformly inside it.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SphereEmitter {
    pub center: Vec3,
    pub radius: f32,
}

impl SphereEmitter {
    /// Uniform sample inside the sphere (rejection from the unit cube).
    pub fn sample(&self, rng: &mut impl Rng) -> Vec3 {
        loop {
            let v = Vec3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            );
            if v.length_squared() <= 1.0 {
                return self.center + v * self.radius;
            }
        }
    }
}

/// Fixed-capacity particle pool.
///
/// All particles exist from initialization; `Inactive` slots are tracked by a
/// free-index stack and become live only through emission. The free count the
/// emitter sees is refreshed once per step (mirroring an asynchronous counter
/// readback), so it may be one step stale; emission is rate-limited, not
/// precision-critical.
pub struct ParticlePool {
    particles: Vec<MpmParticle>,
    free_stack: Vec<u32>,
    cached_free_count: usize,
    emission_batch: usize,
    particle_mass: f32,
    particle_volume: f32,
}

impl ParticlePool {
    /// Create `capacity` inactive particles and a free stack holding every
    /// index.
    pub fn new(capacity: usize, emission_batch: usize, mass: f32, volume: f32) -> Self {
        assert!(capacity > 0, "pool capacity must be positive");
        assert!(emission_batch > 0, "emission batch must be positive");
        Self {
            particles: vec![MpmParticle::default(); capacity],
            free_stack: (0..capacity as u32).rev().collect(),
            cached_free_count: capacity,
            emission_batch,
            particle_mass: mass,
            particle_volume: volume,
        }
    }

    /// Refresh the cached free count. Called once per step before emission.
    pub fn refresh_free_count(&mut self) {
        self.cached_free_count = self.free_stack.len();
    }

    /// Emit up to `count` particles sampled from `emitter`, in whole batches
    /// only. Returns the number actually emitted; silently 0 when the free
    /// stack cannot cover a batch.
    pub fn emit(
        &mut self,
        count: usize,
        emitter: &SphereEmitter,
        kind: ParticleType,
        rng: &mut impl Rng,
    ) -> usize {
        let available = count.min(self.cached_free_count);
        let n = available - available % self.emission_batch;
        if n == 0 {
            if count > 0 {
                log::debug!(
                    "emission skipped: requested {}, free {}, batch {}",
                    count,
                    self.cached_free_count,
                    self.emission_batch
                );
            }
            return 0;
        }

        for _ in 0..n {
            // cached_free_count <= free_stack.len(), so the pop cannot fail
            let idx = self.free_stack.pop().unwrap() as usize;
            self.particles[idx] = MpmParticle {
                kind,
                position: emitter.sample(rng),
                velocity: Vec3::ZERO,
                mass: self.particle_mass,
                volume: self.particle_volume,
                c: Mat3::ZERO,
                fe: Mat3::IDENTITY,
                jp: 1.0,
            };
        }
        self.cached_free_count -= n;
        n
    }

    /// Activate a single particle at an exact position, bypassing the batched
    /// emitter. Scenario/test setup path. Returns the slot index, or `None`
    /// when the pool is exhausted.
    pub fn spawn_at(&mut self, position: Vec3, velocity: Vec3, kind: ParticleType) -> Option<usize> {
        let idx = self.free_stack.pop()? as usize;
        self.cached_free_count = self.cached_free_count.min(self.free_stack.len());
        self.particles[idx] = MpmParticle {
            kind,
            position,
            velocity,
            mass: self.particle_mass,
            volume: self.particle_volume,
            c: Mat3::ZERO,
            fe: Mat3::IDENTITY,
            jp: 1.0,
        };
        Some(idx)
    }

    /// All particle slots, active and inactive.
    pub fn particles(&self) -> &[MpmParticle] {
        &self.particles
    }

    /// Mutable access to all particle slots.
    pub fn particles_mut(&mut self) -> &mut [MpmParticle] {
        &mut self.particles
    }

    /// Number of active particles.
    pub fn active_count(&self) -> usize {
        self.particles.len() - self.free_stack.len()
    }

    /// Pool capacity.
    pub fn capacity(&self) -> usize {
        self.particles.len()
    }

    /// Current free-slot count (exact, not the cached readback).
    pub fn free_count(&self) -> usize {
        self.free_stack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn emitter() -> SphereEmitter {
        SphereEmitter {
            center: Vec3::splat(5.0),
            radius: 2.0,
        }
    }

    #[test]
    fn test_pool_starts_inactive() {
        let pool = ParticlePool::new(64, 8, 1.0, 1.0);
        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.free_count(), 64);
        assert!(pool.particles().iter().all(|p| !p.is_active()));
    }

    #[test]
    fn test_emit_rounds_down_to_batch() {
        let mut pool = ParticlePool::new(64, 8, 1.0, 1.0);
        let mut rng = StdRng::seed_from_u64(1);
        pool.refresh_free_count();

        let emitted = pool.emit(21, &emitter(), ParticleType::Elastic, &mut rng);
        assert_eq!(emitted, 16); // 21 rounded down to a multiple of 8
        assert_eq!(pool.active_count(), 16);
    }

    #[test]
    fn test_emit_never_exceeds_free_stack() {
        let mut pool = ParticlePool::new(24, 8, 1.0, 1.0);
        let mut rng = StdRng::seed_from_u64(2);
        pool.refresh_free_count();

        let emitted = pool.emit(1000, &emitter(), ParticleType::Snow, &mut rng);
        assert_eq!(emitted, 24);
        assert_eq!(pool.free_count(), 0);

        // Exhausted pool degrades to zero emission, not an error
        pool.refresh_free_count();
        let emitted = pool.emit(8, &emitter(), ParticleType::Snow, &mut rng);
        assert_eq!(emitted, 0);
    }

    #[test]
    fn test_emit_below_batch_is_skipped() {
        let mut pool = ParticlePool::new(64, 16, 1.0, 1.0);
        let mut rng = StdRng::seed_from_u64(3);
        pool.refresh_free_count();

        assert_eq!(pool.emit(15, &emitter(), ParticleType::Liquid, &mut rng), 0);
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn test_emitted_particle_state() {
        let mut pool = ParticlePool::new(16, 4, 2.5, 0.75);
        let mut rng = StdRng::seed_from_u64(4);
        pool.refresh_free_count();
        pool.emit(4, &emitter(), ParticleType::Elastic, &mut rng);

        let e = emitter();
        for p in pool.particles().iter().filter(|p| p.is_active()) {
            assert_eq!(p.kind, ParticleType::Elastic);
            assert_eq!(p.velocity, Vec3::ZERO);
            assert_eq!(p.mass, 2.5);
            assert_eq!(p.volume, 0.75);
            assert_eq!(p.fe, Mat3::IDENTITY);
            assert_eq!(p.jp, 1.0);
            assert!(
                (p.position - e.center).length() <= e.radius + 1e-5,
                "particle outside emitter: {:?}",
                p.position
            );
        }
    }

    #[test]
    fn test_inactive_indices_match_free_stack() {
        let mut pool = ParticlePool::new(32, 8, 1.0, 1.0);
        let mut rng = StdRng::seed_from_u64(5);
        pool.refresh_free_count();
        pool.emit(8, &emitter(), ParticleType::Elastic, &mut rng);

        let inactive: Vec<u32> = pool
            .particles()
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.is_active())
            .map(|(i, _)| i as u32)
            .collect();
        let mut free = pool.free_stack.clone();
        free.sort_unstable();
        assert_eq!(inactive, free);
    }

    #[test]
    fn test_stale_free_count_is_tolerated() {
        // spawn_at bypasses the cached count; emission must still never pop
        // more than the stack holds.
        let mut pool = ParticlePool::new(16, 4, 1.0, 1.0);
        let mut rng = StdRng::seed_from_u64(6);
        pool.refresh_free_count();
        for _ in 0..12 {
            pool.spawn_at(Vec3::ZERO, Vec3::ZERO, ParticleType::Elastic);
        }
        let emitted = pool.emit(16, &emitter(), ParticleType::Elastic, &mut rng);
        assert_eq!(emitted, 4);
        assert_eq!(pool.free_count(), 0);
    }
}
