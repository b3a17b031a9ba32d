//! Hyper-elastic material parameters and the pluggable stress kernel.
//!
//! The transfer pipeline only requires a Kirchhoff stress per particle; the
//! exact constitutive arithmetic sits behind [`ConstitutiveModel`] so kernels
//! can be swapped without touching the transfer protocol.

use glam::{Mat3, Vec3};

use crate::config::SimulationParams;
use crate::particle::{MpmParticle, ParticleType};

/// First Lame parameter mu from Young's modulus and Poisson ratio.
#[inline]
pub fn lame_mu(youngs_modulus: f32, poisson_ratio: f32) -> f32 {
    youngs_modulus / (2.0 * (1.0 + poisson_ratio))
}

/// Second Lame parameter lambda from Young's modulus and Poisson ratio.
#[inline]
pub fn lame_lambda(youngs_modulus: f32, poisson_ratio: f32) -> f32 {
    (youngs_modulus * poisson_ratio)
        / ((1.0 + poisson_ratio) * (1.0 - 2.0 * poisson_ratio))
}

/// Lame parameters plus hardening, derived once per step from the
/// configuration.
#[derive(Clone, Copy, Debug)]
pub struct MaterialParams {
    pub mu: f32,
    pub lambda: f32,
    pub hardening: f32,
}

impl MaterialParams {
    /// Derive from the run configuration.
    pub fn from_params(params: &SimulationParams) -> Self {
        Self {
            mu: lame_mu(params.youngs_modulus, params.poisson_ratio),
            lambda: lame_lambda(params.youngs_modulus, params.poisson_ratio),
            hardening: params.hardening,
        }
    }
}

/// Pluggable per-particle stress kernel.
///
/// Implementations must return a finite matrix for every particle state the
/// pipeline can produce; degenerate deformation gradients are clamped here,
/// never propagated as NaN.
pub trait ConstitutiveModel: Send + Sync {
    /// Kirchhoff stress tau = P(F) * F^T for the particle's current
    /// deformation state.
    fn kirchhoff_stress(&self, particle: &MpmParticle, mat: &MaterialParams) -> Mat3;
}

/// Default neo-Hookean model with snow hardening and a pressure-only branch
/// for liquid.
#[derive(Clone, Copy, Debug, Default)]
pub struct HyperElastic;

impl ConstitutiveModel for HyperElastic {
    fn kirchhoff_stress(&self, particle: &MpmParticle, mat: &MaterialParams) -> Mat3 {
        match particle.kind {
            ParticleType::Inactive => Mat3::ZERO,
            ParticleType::Liquid => {
                let j = particle.fe.determinant();
                if j <= 0.0 {
                    return Mat3::ZERO;
                }
                // Volume-preserving pressure term only; no shear resistance.
                Mat3::from_diagonal(Vec3::splat(mat.lambda * (j - 1.0) * j))
            }
            ParticleType::Elastic | ParticleType::Snow => {
                let f = particle.fe;
                let j = f.determinant();
                if j <= 1e-6 {
                    // Inverted element; drop its stress rather than emit NaN.
                    return Mat3::ZERO;
                }

                let harden = if particle.kind == ParticleType::Snow {
                    (mat.hardening * (1.0 - particle.jp)).exp()
                } else {
                    1.0
                };
                let mu = mat.mu * harden;
                let lambda = mat.lambda * harden;

                let f_inv_t = f.inverse().transpose();
                let pk1 = (f - f_inv_t) * mu + f_inv_t * (lambda * j.ln());
                pk1 * f.transpose()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_lame_mu_reference() {
        // Regression anchor for E = 1.4e4, nu = 0.2
        let mu = lame_mu(1.4e4, 0.2);
        assert!((mu - 5833.33).abs() < 0.1, "mu = {}", mu);
    }

    #[test]
    fn test_lame_lambda_reference() {
        let lambda = lame_lambda(1.4e4, 0.2);
        assert!((lambda - 3888.89).abs() < 0.1, "lambda = {}", lambda);
    }

    #[test]
    fn test_rest_state_is_stress_free() {
        // Fe = I, Jp = 1 (the emission state) must produce zero stress for
        // every material type, so a freshly emitted particle exerts no force.
        let mat = MaterialParams {
            mu: 5833.33,
            lambda: 3888.89,
            hardening: 10.0,
        };
        let model = HyperElastic;
        for kind in [ParticleType::Elastic, ParticleType::Snow, ParticleType::Liquid] {
            let mut p = MpmParticle::default();
            p.kind = kind;
            let stress = model.kirchhoff_stress(&p, &mat);
            assert!(
                stress.abs_diff_eq(Mat3::ZERO, 1e-3),
                "{:?} rest stress = {:?}",
                kind,
                stress
            );
        }
    }

    #[test]
    fn test_stretched_elastic_resists() {
        let mat = MaterialParams {
            mu: 5833.33,
            lambda: 3888.89,
            hardening: 10.0,
        };
        let mut p = MpmParticle::default();
        p.kind = ParticleType::Elastic;
        p.fe = Mat3::from_diagonal(Vec3::new(1.1, 1.0, 1.0));

        let stress = HyperElastic.kirchhoff_stress(&p, &mat);
        // Tension along X must show up on the XX component.
        assert!(stress.x_axis.x > 0.0, "stress = {:?}", stress);
        assert!(stress.is_finite());
    }

    #[test]
    fn test_inverted_element_clamped() {
        let mat = MaterialParams {
            mu: 5833.33,
            lambda: 3888.89,
            hardening: 10.0,
        };
        let mut p = MpmParticle::default();
        p.kind = ParticleType::Elastic;
        p.fe = Mat3::from_diagonal(Vec3::new(-1.0, 1.0, 1.0));

        let stress = HyperElastic.kirchhoff_stress(&p, &mat);
        assert_eq!(stress, Mat3::ZERO);
    }
}
