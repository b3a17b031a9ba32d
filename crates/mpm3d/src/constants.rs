//! Shared constants for the MPM solver.

/// Gravity acceleration (m/s^2) - negative Y direction.
pub const GRAVITY: f32 = -9.81;

/// Support radius of the quadratic B-spline kernel, in cells.
pub const BSPLINE_SUPPORT_RADIUS: f32 = 1.5;

/// Number of cells in the 3x3x3 transfer stencil.
pub const CELL_NEIGHBOR_COUNT: usize = 27;

/// Cells adjacent to a domain wall where outgoing velocity is zeroed.
pub const BOUNDARY_MARGIN: i32 = 2;

/// Sentinel cell index marking unused contribution slots; sorts past every
/// real cell index.
pub const SENTINEL_CELL: u32 = u32::MAX;
