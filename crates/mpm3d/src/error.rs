//! Error types for the MPM solver.
//!
//! Only configuration problems are surfaced as errors; they are fatal at
//! initialization and never retried. Emission shortfall degrades silently to
//! zero particles, and zero-mass cells are guarded in the grid update rather
//! than reported.

use thiserror::Error;

/// Unified error type for the solver.
#[derive(Debug, Error)]
pub enum MpmError {
    /// Configuration value is invalid (bad Poisson ratio, zero grid spacing,
    /// non-power-of-two sort size, ...).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience alias for `Result<T, MpmError>`.
pub type MpmResult<T> = Result<T, MpmError>;
