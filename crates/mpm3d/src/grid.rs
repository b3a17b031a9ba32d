//! Background Eulerian grid: fixed cell array, per-step reset, index math.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use rayon::prelude::*;

/// One background cell. Mass and momentum are accumulated by P2G; velocity is
/// derived once per step by the grid update. Plain-float layout shared by the
/// gathering and lock-free paths (the locked path accumulates into a separate
/// fixed-point buffer and decodes into this struct).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MpmCell {
    /// Accumulated mass.
    pub mass: f32,
    /// Accumulated momentum (mass x velocity).
    pub momentum: Vec3,
    /// Velocity, written once per step after force integration.
    pub velocity: Vec3,
    /// Accumulated force (strategy-dependent, may stay zero).
    pub force: Vec3,
}

/// Fixed-size background grid addressed by flattened 3D index.
pub struct MpmGrid {
    /// Number of cells along X.
    pub width: usize,
    /// Number of cells along Y.
    pub height: usize,
    /// Number of cells along Z.
    pub depth: usize,
    /// Cell spacing h.
    pub spacing: f32,
    /// World position of the minimum corner. May move between steps; cell
    /// mapping always derives from the current value, never a cached one.
    pub origin: Vec3,

    cells: Vec<MpmCell>,
}

impl MpmGrid {
    /// Allocate a zeroed grid. Resizing means re-initialization; the cell
    /// array itself never grows.
    pub fn new(width: usize, height: usize, depth: usize, spacing: f32, origin: Vec3) -> Self {
        assert!(spacing > 0.0, "spacing must be positive, got {}", spacing);
        Self {
            width,
            height,
            depth,
            spacing,
            origin,
            cells: vec![MpmCell::zeroed(); width * height * depth],
        }
    }

    /// Total number of cells.
    #[inline]
    pub fn num_cells(&self) -> usize {
        self.width * self.height * self.depth
    }

    /// Read-only cell array for render consumers and tests.
    pub fn cells(&self) -> &[MpmCell] {
        &self.cells
    }

    /// Mutable cell array for the transfer phases.
    pub fn cells_mut(&mut self) -> &mut [MpmCell] {
        &mut self.cells
    }

    /// Raw byte view of the cell array for upload to a render backend.
    pub fn cells_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.cells)
    }

    /// Zero every cell. Runs at the start of every step; no mass or momentum
    /// survives across steps.
    pub fn clear(&mut self) {
        self.cells.par_iter_mut().for_each(|c| *c = MpmCell::zeroed());
    }

    /// World-space axis-aligned bounds derived from the current origin.
    pub fn bounds(&self) -> (Vec3, Vec3) {
        let size = Vec3::new(
            self.width as f32,
            self.height as f32,
            self.depth as f32,
        ) * self.spacing;
        (self.origin, self.origin + size)
    }

    /// Flatten 3D cell indices: `x + y * width + z * width * height`.
    #[inline]
    pub fn cell_index(&self, i: usize, j: usize, k: usize) -> usize {
        i + j * self.width + k * self.width * self.height
    }

    /// Invert [`cell_index`](Self::cell_index).
    #[inline]
    pub fn cell_coords(&self, index: usize) -> (usize, usize, usize) {
        let i = index % self.width;
        let j = (index / self.width) % self.height;
        let k = index / (self.width * self.height);
        (i, j, k)
    }

    /// Cell containing a world position, derived from the current origin.
    #[inline]
    pub fn world_to_cell(&self, pos: Vec3) -> (i32, i32, i32) {
        let local = (pos - self.origin) / self.spacing;
        (
            local.x.floor() as i32,
            local.y.floor() as i32,
            local.z.floor() as i32,
        )
    }

    /// Whether signed cell indices are inside the grid.
    #[inline]
    pub fn cell_in_bounds(&self, i: i32, j: i32, k: i32) -> bool {
        i >= 0
            && i < self.width as i32
            && j >= 0
            && j < self.height as i32
            && k >= 0
            && k < self.depth as i32
    }

    /// World position of a cell center.
    #[inline]
    pub fn cell_center(&self, i: usize, j: usize, k: usize) -> Vec3 {
        self.origin
            + Vec3::new(i as f32 + 0.5, j as f32 + 0.5, k as f32 + 0.5) * self.spacing
    }

    /// Sum of cell masses (test/diagnostic reduction).
    pub fn total_mass(&self) -> f32 {
        self.cells.iter().map(|c| c.mass).sum()
    }

    /// Sum of cell momenta (test/diagnostic reduction).
    pub fn total_momentum(&self) -> Vec3 {
        self.cells
            .iter()
            .fold(Vec3::ZERO, |acc, c| acc + c.momentum)
    }
}
