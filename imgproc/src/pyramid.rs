//! Multi-resolution pyramids for coarse-to-fine matching.
//!
//! Every level is stored with a replicated border of the search window size
//! so that patch reads near the image edge need no bounds branch, and may
//! carry a 2-channel Scharr derivative level with the same layout (zero
//! border). Level 0 is the full-resolution input; each following level is
//! downsampled by two with a 5-tap binomial kernel.

use image::GrayImage;
use log::debug;

use crate::{ImgprocError, Result};

/// One pyramid level with `pad_x`/`pad_y` pixels of replicated border on
/// every side.
///
/// Coordinates passed to [`PyramidLevel::get`] are in the inner (unpadded)
/// frame; any `x` in `[-pad_x, width + pad_x)` and `y` in
/// `[-pad_y, height + pad_y)` is valid.
#[derive(Debug, Clone)]
pub struct PyramidLevel {
    data: Vec<u8>,
    width: i32,
    height: i32,
    pad_x: i32,
    pad_y: i32,
}

impl PyramidLevel {
    pub fn from_image(img: &GrayImage, pad_x: i32, pad_y: i32) -> Self {
        let width = img.width() as i32;
        let height = img.height() as i32;
        let stride = width + 2 * pad_x;
        let mut data = vec![0u8; (stride * (height + 2 * pad_y)) as usize];

        for y in -pad_y..height + pad_y {
            let sy = y.clamp(0, height - 1) as u32;
            let row = ((y + pad_y) * stride) as usize;
            for x in -pad_x..width + pad_x {
                let sx = x.clamp(0, width - 1) as u32;
                data[row + (x + pad_x) as usize] = img.get_pixel(sx, sy)[0];
            }
        }

        Self {
            data,
            width,
            height,
            pad_x,
            pad_y,
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn padding(&self) -> (i32, i32) {
        (self.pad_x, self.pad_y)
    }

    #[inline]
    fn stride(&self) -> i32 {
        self.width + 2 * self.pad_x
    }

    #[inline]
    pub fn get(&self, x: i32, y: i32) -> u8 {
        debug_assert!(x >= -self.pad_x && x < self.width + self.pad_x);
        debug_assert!(y >= -self.pad_y && y < self.height + self.pad_y);
        self.data[((y + self.pad_y) * self.stride() + x + self.pad_x) as usize]
    }

    /// The inner (unpadded) image, mainly for sampling and inspection.
    pub fn to_image(&self) -> GrayImage {
        let mut img = GrayImage::new(self.width as u32, self.height as u32);
        for y in 0..self.height {
            for x in 0..self.width {
                img.put_pixel(x as u32, y as u32, image::Luma([self.get(x, y)]));
            }
        }
        img
    }
}

/// Per-level 2-channel Scharr derivative (horizontal, vertical), stored as
/// i16 with the same padded layout as its image level; the border is zero.
#[derive(Debug, Clone)]
pub struct ScharrDeriv {
    data: Vec<i16>,
    width: i32,
    height: i32,
    pad_x: i32,
    pad_y: i32,
}

impl ScharrDeriv {
    fn from_level(level: &PyramidLevel) -> Self {
        let (width, height) = (level.width(), level.height());
        let (pad_x, pad_y) = level.padding();
        let stride = (width + 2 * pad_x) * 2;
        let mut data = vec![0i16; (stride * (height + 2 * pad_y)) as usize];

        // 3-10-3 smoothing across the first difference; the replicated image
        // border stands in for the usual replicate handling at the edges.
        for y in 0..height {
            let row = ((y + pad_y) * stride) as usize;
            for x in 0..width {
                let a00 = level.get(x - 1, y - 1) as i32;
                let a01 = level.get(x, y - 1) as i32;
                let a02 = level.get(x + 1, y - 1) as i32;
                let a10 = level.get(x - 1, y) as i32;
                let a12 = level.get(x + 1, y) as i32;
                let a20 = level.get(x - 1, y + 1) as i32;
                let a21 = level.get(x, y + 1) as i32;
                let a22 = level.get(x + 1, y + 1) as i32;

                let dx = 3 * (a02 - a00) + 10 * (a12 - a10) + 3 * (a22 - a20);
                let dy = 3 * (a20 - a00) + 10 * (a21 - a01) + 3 * (a22 - a02);

                let i = row + ((x + pad_x) * 2) as usize;
                data[i] = dx as i16;
                data[i + 1] = dy as i16;
            }
        }

        Self {
            data,
            width,
            height,
            pad_x,
            pad_y,
        }
    }

    #[inline]
    fn stride(&self) -> i32 {
        (self.width + 2 * self.pad_x) * 2
    }

    #[inline]
    pub fn get(&self, x: i32, y: i32) -> (i16, i16) {
        debug_assert!(x >= -self.pad_x && x < self.width + self.pad_x);
        debug_assert!(y >= -self.pad_y && y < self.height + self.pad_y);
        let i = ((y + self.pad_y) * self.stride() + (x + self.pad_x) * 2) as usize;
        (self.data[i], self.data[i + 1])
    }
}

/// An image pyramid ready for coarse-to-fine point matching.
#[derive(Debug, Clone)]
pub struct FlowPyramid {
    levels: Vec<PyramidLevel>,
    derivs: Option<Vec<ScharrDeriv>>,
    win_size: (i32, i32),
}

impl FlowPyramid {
    pub fn levels(&self) -> &[PyramidLevel] {
        &self.levels
    }

    pub fn level(&self, level: usize) -> &PyramidLevel {
        &self.levels[level]
    }

    pub fn deriv(&self, level: usize) -> Option<&ScharrDeriv> {
        self.derivs.as_ref().map(|d| &d[level])
    }

    pub fn has_derivatives(&self) -> bool {
        self.derivs.is_some()
    }

    /// Index of the coarsest level.
    pub fn max_level(&self) -> i32 {
        self.levels.len() as i32 - 1
    }

    /// The window size the levels were padded for.
    pub fn win_size(&self) -> (i32, i32) {
        self.win_size
    }
}

/// Downsample by two with the 5-tap binomial kernel (1 4 6 4 1)/16 in each
/// direction. The output is `((w+1)/2, (h+1)/2)`; edges are replicated.
pub fn pyr_down(src: &GrayImage) -> GrayImage {
    const K: [i32; 5] = [1, 4, 6, 4, 1];

    let w = src.width() as i32;
    let h = src.height() as i32;
    let dw = (w + 1) / 2;
    let dh = (h + 1) / 2;

    // Horizontal pass at the decimated columns.
    let mut tmp = vec![0i32; (dw * h) as usize];
    for y in 0..h {
        for x in 0..dw {
            let mut acc = 0;
            for (k, &kv) in K.iter().enumerate() {
                let sx = (2 * x + k as i32 - 2).clamp(0, w - 1) as u32;
                acc += kv * src.get_pixel(sx, y as u32)[0] as i32;
            }
            tmp[(y * dw + x) as usize] = acc;
        }
    }

    // Vertical pass on the decimated rows, with /256 rounding.
    let mut dst = GrayImage::new(dw as u32, dh as u32);
    for y in 0..dh {
        for x in 0..dw {
            let mut acc = 0;
            for (k, &kv) in K.iter().enumerate() {
                let sy = (2 * y + k as i32 - 2).clamp(0, h - 1);
                acc += kv * tmp[(sy * dw + x) as usize];
            }
            dst.put_pixel(x as u32, y as u32, image::Luma([((acc + 128) >> 8) as u8]));
        }
    }

    dst
}

/// Build a matching pyramid from a full-resolution image.
///
/// Levels are added until `max_level` is reached or a level would no longer
/// contain the search window, whichever comes first; the achieved depth is
/// `FlowPyramid::max_level`. With `with_derivatives`, every level carries a
/// Scharr derivative level for gradient-based tracking.
pub fn build_flow_pyramid(
    image: &GrayImage,
    win_size: (i32, i32),
    max_level: i32,
    with_derivatives: bool,
) -> Result<FlowPyramid> {
    if win_size.0 <= 2 || win_size.1 <= 2 {
        return Err(ImgprocError::InvalidParameters(format!(
            "window size must be at least 3x3, got {}x{}",
            win_size.0, win_size.1
        )));
    }
    if max_level < 0 {
        return Err(ImgprocError::InvalidParameters(format!(
            "pyramid depth must be non-negative, got {max_level}"
        )));
    }
    if image.width() == 0 || image.height() == 0 {
        return Err(ImgprocError::ImageError("empty input image".to_string()));
    }

    let mut levels = vec![PyramidLevel::from_image(image, win_size.0, win_size.1)];
    let mut current = image.clone();
    for _ in 1..=max_level {
        let next_w = (current.width() as i32 + 1) / 2;
        let next_h = (current.height() as i32 + 1) / 2;
        if next_w <= win_size.0 || next_h <= win_size.1 {
            break;
        }
        current = pyr_down(&current);
        levels.push(PyramidLevel::from_image(&current, win_size.0, win_size.1));
    }

    if levels.len() as i32 - 1 < max_level {
        debug!(
            "pyramid clamped to {} levels for {}x{} image with {}x{} window",
            levels.len(),
            image.width(),
            image.height(),
            win_size.0,
            win_size.1
        );
    }

    let derivs = with_derivatives.then(|| levels.iter().map(ScharrDeriv::from_level).collect());

    Ok(FlowPyramid {
        levels,
        derivs,
        win_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn ramp_image(width: u32, height: u32) -> GrayImage {
        let mut img = GrayImage::new(width, height);
        for y in 0..height {
            for x in 0..width {
                img.put_pixel(x, y, Luma([(2 * x) as u8]));
            }
        }
        img
    }

    #[test]
    fn test_level_sizes_halve() {
        let img = ramp_image(120, 80);
        let pyr = build_flow_pyramid(&img, (7, 7), 3, false).unwrap();

        assert_eq!(pyr.max_level(), 3);
        assert_eq!(pyr.level(0).width(), 120);
        assert_eq!(pyr.level(1).width(), 60);
        assert_eq!(pyr.level(2).width(), 30);
        assert_eq!(pyr.level(3).width(), 15);
        assert_eq!(pyr.level(3).height(), 10);
    }

    #[test]
    fn test_depth_clamped_to_window() {
        // 32x32 halves to 16, then 8, which no longer contains a 9x9 window.
        let img = ramp_image(32, 32);
        let pyr = build_flow_pyramid(&img, (9, 9), 5, false).unwrap();
        assert_eq!(pyr.max_level(), 1);
    }

    #[test]
    fn test_padding_replicates_edges() {
        let img = ramp_image(16, 16);
        let pyr = build_flow_pyramid(&img, (5, 5), 0, false).unwrap();
        let level = pyr.level(0);

        assert_eq!(level.get(-5, 0), level.get(0, 0));
        assert_eq!(level.get(20, 3), level.get(15, 3));
        assert_eq!(level.get(4, -2), level.get(4, 0));
    }

    #[test]
    fn test_scharr_on_horizontal_ramp() {
        // I(x, y) = 2x: dx = (3 + 10 + 3) * 2 * 2 = 64, dy = 0.
        let img = ramp_image(16, 16);
        let pyr = build_flow_pyramid(&img, (5, 5), 0, true).unwrap();
        let deriv = pyr.deriv(0).unwrap();

        let (dx, dy) = deriv.get(8, 8);
        assert_eq!(dx, 64);
        assert_eq!(dy, 0);
    }

    #[test]
    fn test_pyr_down_constant_image() {
        let mut img = GrayImage::new(20, 20);
        for p in img.pixels_mut() {
            *p = Luma([77]);
        }
        let half = pyr_down(&img);
        assert_eq!(half.dimensions(), (10, 10));
        assert!(half.pixels().all(|p| p[0] == 77));
    }

    #[test]
    fn test_rejects_bad_parameters() {
        let img = ramp_image(16, 16);
        assert!(build_flow_pyramid(&img, (2, 5), 1, false).is_err());
        assert!(build_flow_pyramid(&img, (5, 5), -1, false).is_err());
    }
}
