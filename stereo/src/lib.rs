//! Stereo correspondence and depth recovery.
//!
//! The centerpiece is [`StereoSparseMatcher`], a coarse-to-fine block
//! matcher that locates, for a sparse set of left-image points, the matching
//! column in the right image of a row-rectified pair and refines it to
//! sub-pixel precision. Around it sit the dense [`BlockMatcher`], the
//! disparity/depth conversion helpers and depth-map registration.

use image::GrayImage;

pub mod block_matching;
pub mod correspond;
pub mod cost;
pub mod depth;
pub mod registration;
mod subpixel;

pub use block_matching::*;
pub use correspond::*;
pub use cost::*;
pub use depth::*;
pub use registration::*;

pub use parallax_core::{Error, Result};

/// Dense disparity map.
///
/// `data` is row-major; negative entries mark pixels with no accepted match.
#[derive(Debug, Clone)]
pub struct DisparityMap {
    pub data: Vec<f32>,
    pub width: u32,
    pub height: u32,
    pub min_disparity: i32,
    pub max_disparity: i32,
}

impl DisparityMap {
    pub fn new(width: u32, height: u32, min_d: i32, max_d: i32) -> Self {
        let size = (width * height) as usize;
        Self {
            data: vec![0.0; size],
            width,
            height,
            min_disparity: min_d,
            max_disparity: max_d,
        }
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        let idx = (y * self.width + x) as usize;
        self.data.get(idx).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, x: u32, y: u32, value: f32) {
        let idx = (y * self.width + x) as usize;
        if let Some(cell) = self.data.get_mut(idx) {
            *cell = value;
        }
    }

    /// Convert to a grayscale image for visualization, normalized over the
    /// observed disparity range.
    pub fn to_image(&self) -> GrayImage {
        let mut img = GrayImage::new(self.width, self.height);

        let min_val = self.data.iter().copied().fold(f32::INFINITY, f32::min);
        let max_val = self.data.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let range = max_val - min_val;

        for y in 0..self.height {
            for x in 0..self.width {
                let disparity = self.get(x, y);
                let normalized = if range > 0.0 {
                    ((disparity - min_val) / range * 255.0) as u8
                } else {
                    0
                };
                img.put_pixel(x, y, image::Luma([normalized]));
            }
        }

        img
    }
}

/// Stereo rig parameters.
#[derive(Debug, Clone, Copy)]
pub struct StereoParams {
    pub focal_length: f32,
    pub baseline: f32,
    pub cx: f32,
    pub cy: f32,
}

impl StereoParams {
    pub fn new(focal_length: f32, baseline: f32, cx: f32, cy: f32) -> Self {
        Self {
            focal_length,
            baseline,
            cx,
            cy,
        }
    }

    /// Depth in the baseline's unit from a disparity in pixels.
    pub fn disparity_to_depth(&self, disparity: f32) -> Option<f32> {
        if disparity.abs() < 1e-6 {
            None
        } else {
            Some((self.focal_length * self.baseline) / disparity)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disparity_map() {
        let mut disp = DisparityMap::new(10, 10, 0, 64);

        disp.set(5, 5, 32.0);
        assert_eq!(disp.get(5, 5), 32.0);

        let img = disp.to_image();
        assert_eq!(img.width(), 10);
        assert_eq!(img.height(), 10);
    }

    #[test]
    fn test_stereo_params() {
        let params = StereoParams::new(500.0, 0.1, 320.0, 240.0);

        // depth = (f * B) / disparity
        assert_eq!(params.disparity_to_depth(50.0), Some(1.0));
        assert_eq!(params.disparity_to_depth(0.0), None);
    }
}
