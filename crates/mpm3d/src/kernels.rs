//! Quadratic B-spline kernel functions for APIC/MLS-MPM transfers.

use glam::Vec3;

use crate::constants::BSPLINE_SUPPORT_RADIUS;

/// 1D Quadratic B-spline weight.
/// Support: [-1.5, 1.5] (covers 3 grid nodes)
#[inline]
pub fn quadratic_bspline_1d(r: f32) -> f32 {
    let r_abs = r.abs();
    if r_abs < 0.5 {
        0.75 - r_abs * r_abs
    } else if r_abs < BSPLINE_SUPPORT_RADIUS {
        let t = BSPLINE_SUPPORT_RADIUS - r_abs;
        0.5 * t * t
    } else {
        0.0
    }
}

/// 3D Quadratic B-spline (tensor product of 1D).
/// Returns weight for position delta from grid node, in cell units.
#[inline]
pub fn quadratic_bspline_3d(delta: Vec3) -> f32 {
    quadratic_bspline_1d(delta.x) * quadratic_bspline_1d(delta.y) * quadratic_bspline_1d(delta.z)
}

/// APIC D matrix inverse for quadratic B-splines.
/// D = (1/4) * h^2 * I, so D_inv = 4 / h^2
#[inline]
pub fn apic_d_inverse(cell_size: f32) -> f32 {
    4.0 / (cell_size * cell_size)
}
