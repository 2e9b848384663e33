//! Sparse stereo correspondence and per-feature depth recovery.
//!
//! Facade over the workspace crates: [`stereo`] holds the coarse-to-fine
//! sparse matcher and depth utilities, [`flow`] the horizontal-only
//! pyramidal tracker, [`imgproc`] the pyramid and sampling primitives and
//! [`core`] the shared types.

pub use parallax_core as core;
pub use parallax_flow as flow;
pub use parallax_imgproc as imgproc;
pub use parallax_stereo as stereo;

/// Initialize a single global Rayon thread pool for all CPU-parallel
/// routines.
///
/// Call this once at application startup before running heavy workloads.
/// Repeated calls are idempotent and return the first initialization result.
///
/// Priority order:
/// 1. explicit `num_threads`
/// 2. `PARALLAX_CPU_THREADS` env var
/// 3. Rayon default
pub fn init_thread_pool(num_threads: Option<usize>) -> Result<(), String> {
    parallax_core::init_global_thread_pool(num_threads)
}
