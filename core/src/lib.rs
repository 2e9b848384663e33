//! Shared types for the parallax stereo correspondence workspace.
//!
//! This crate holds the geometry and result aggregates exchanged between the
//! sparse matcher, the flow tracker and the depth utilities, together with
//! the common error type and the global thread-pool runtime.

pub mod intrinsics;
pub mod point;
pub mod runtime;

pub use intrinsics::*;
pub use point::*;
pub use runtime::*;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Runtime error: {0}")]
    RuntimeError(String),
}
