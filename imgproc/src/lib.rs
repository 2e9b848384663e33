//! Image-pyramid construction and patch sampling.
//!
//! These are the collaborator primitives consumed by the sparse stereo
//! matcher and the horizontal flow tracker: multi-resolution pyramids with
//! optional derivative levels, sub-pixel rectangle extraction and exact
//! decimation.

pub mod decimate;
pub mod pyramid;
pub mod sample;

pub use decimate::*;
pub use pyramid::*;
pub use sample::*;

pub type Result<T> = std::result::Result<T, ImgprocError>;

#[derive(Debug, thiserror::Error)]
pub enum ImgprocError {
    #[error("Image error: {0}")]
    ImageError(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
}
