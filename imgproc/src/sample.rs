//! Sub-pixel rectangle extraction.

use image::{GrayImage, ImageBuffer, Luma};

/// Single-channel f32 image, used for sub-pixel sampled patches.
pub type GrayImageF32 = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Extract a `size` rectangle centered on the floating-point `center` with
/// bilinear interpolation. Samples falling outside the image take the
/// nearest edge pixel.
pub fn sample_rect(image: &GrayImage, size: (u32, u32), center: (f32, f32)) -> GrayImageF32 {
    let (w, h) = image.dimensions();
    let x0 = center.0 - (size.0 - 1) as f32 * 0.5;
    let y0 = center.1 - (size.1 - 1) as f32 * 0.5;

    let mut out = GrayImageF32::new(size.0, size.1);
    for y in 0..size.1 {
        for x in 0..size.0 {
            let sx = x0 + x as f32;
            let sy = y0 + y as f32;

            let fx = sx.floor();
            let fy = sy.floor();
            let ax = sx - fx;
            let ay = sy - fy;

            let x1 = clamp_coord(fx as i64, w);
            let x2 = clamp_coord(fx as i64 + 1, w);
            let y1 = clamp_coord(fy as i64, h);
            let y2 = clamp_coord(fy as i64 + 1, h);

            let v00 = image.get_pixel(x1, y1)[0] as f32;
            let v10 = image.get_pixel(x2, y1)[0] as f32;
            let v01 = image.get_pixel(x1, y2)[0] as f32;
            let v11 = image.get_pixel(x2, y2)[0] as f32;

            let v0 = v00 * (1.0 - ax) + v10 * ax;
            let v1 = v01 * (1.0 - ax) + v11 * ax;
            out.put_pixel(x, y, Luma([v0 * (1.0 - ay) + v1 * ay]));
        }
    }

    out
}

#[inline]
fn clamp_coord(v: i64, len: u32) -> u32 {
    v.clamp(0, len as i64 - 1) as u32
}
