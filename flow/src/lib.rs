//! Constrained pyramidal point tracking.
//!
//! A variant of the classical pyramidal Lucas-Kanade tracker for
//! row-rectified stereo frames: the per-iteration correction is solved from
//! the usual 2x2 system but applied on the horizontal axis only, so
//! rectification noise cannot accumulate as vertical drift.

pub mod fixed;
pub mod lk;

pub use lk::*;

pub type Result<T> = std::result::Result<T, FlowError>;

#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("Image size mismatch: {0}")]
    SizeMismatch(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Pyramid error: {0}")]
    PyramidError(String),
}
