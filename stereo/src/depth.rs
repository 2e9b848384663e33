//! Disparity and depth conversion.
//!
//! Depth images come in two encodings: `f32` meters and `u16` millimeters.
//! Conversions into millimeters clamp-and-count values past the u16 range;
//! the count is logged, never fatal.

use image::{ImageBuffer, Luma};
use log::warn;
use nalgebra::Point3;

use parallax_core::{Correspondences, Error, Point2f, Result};

use crate::{DisparityMap, StereoParams};

/// Depth image in meters.
pub type DepthImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Depth image in millimeters.
pub type DepthImageMm = ImageBuffer<Luma<u16>, Vec<u16>>;

/// Depth map in meters from a dense disparity map. Pixels with no positive
/// disparity or non-positive depth stay zero.
pub fn depth_from_disparity(disparity: &DisparityMap, params: &StereoParams) -> DepthImage {
    let mut depth = DepthImage::new(disparity.width, disparity.height);
    for y in 0..disparity.height {
        for x in 0..disparity.width {
            let d = disparity.get(x, y);
            if d > 0.0 {
                let z = params.baseline * params.focal_length / d;
                if z > 0.0 {
                    depth.put_pixel(x, y, Luma([z]));
                }
            }
        }
    }
    depth
}

/// Sparse disparity image from matched correspondences: each valid pair
/// writes `left.x - right.x` at the rounded left position.
pub fn disparity_from_correspondences(
    size: (u32, u32),
    left_points: &[Point2f],
    matches: &Correspondences,
) -> Result<DisparityMap> {
    if left_points.len() != matches.len() {
        return Err(Error::DimensionMismatch(format!(
            "{} left points vs {} matches",
            left_points.len(),
            matches.len()
        )));
    }

    let mut disparity = DisparityMap::new(size.0, size.1, 0, 0);
    for (i, right) in matches.iter_valid() {
        let left = left_points[i];
        let (x, y) = rounded_position(left, size)?;
        disparity.set(x, y, left.x - right.x);
    }
    Ok(disparity)
}

/// Sparse depth image in meters from matched correspondences. Pairs with a
/// non-positive disparity are skipped.
pub fn depth_from_correspondences(
    size: (u32, u32),
    left_points: &[Point2f],
    matches: &Correspondences,
    params: &StereoParams,
) -> Result<DepthImage> {
    if left_points.len() != matches.len() {
        return Err(Error::DimensionMismatch(format!(
            "{} left points vs {} matches",
            left_points.len(),
            matches.len()
        )));
    }

    let mut depth = DepthImage::new(size.0, size.1);
    for (i, right) in matches.iter_valid() {
        let left = left_points[i];
        let disparity = left.x - right.x;
        if disparity > 0.0 {
            let (x, y) = rounded_position(left, size)?;
            depth.put_pixel(x, y, Luma([params.baseline * params.focal_length / disparity]));
        }
    }
    Ok(depth)
}

fn rounded_position(p: Point2f, size: (u32, u32)) -> Result<(u32, u32)> {
    let x = (p.x + 0.5) as i64;
    let y = (p.y + 0.5) as i64;
    if x < 0 || x >= size.0 as i64 || y < 0 || y >= size.1 as i64 {
        return Err(Error::InvalidInput(format!(
            "point ({}, {}) outside {}x{} output",
            p.x, p.y, size.0, size.1
        )));
    }
    Ok((x as u32, y as u32))
}

/// Convert a meter depth image to millimeters. Depths past the u16 range are
/// dropped and counted.
pub fn depth_to_millimeters(depth: &DepthImage) -> DepthImageMm {
    let mut out = DepthImageMm::new(depth.width(), depth.height());
    let mut over_max = 0usize;
    for (x, y, px) in depth.enumerate_pixels() {
        let mm = px[0] * 1000.0;
        if mm > 0.0 && mm <= u16::MAX as f32 {
            out.put_pixel(x, y, Luma([mm as u16]));
        } else if mm > u16::MAX as f32 {
            over_max += 1;
        }
    }
    if over_max > 0 {
        warn!(
            "{over_max} depth values dropped: over the maximum representable depth (65535 mm)"
        );
    }
    out
}

/// Convert a millimeter depth image to meters.
pub fn depth_to_meters(depth: &DepthImageMm) -> DepthImage {
    let mut out = DepthImage::new(depth.width(), depth.height());
    for (x, y, px) in depth.enumerate_pixels() {
        out.put_pixel(x, y, Luma([px[0] as f32 / 1000.0]));
    }
    out
}

/// Depth at a sub-pixel position, optionally averaged over the 3x3
/// neighborhood with weights
///
/// ```text
/// | 1 | 2 | 1 |
/// | 2 | 4 | 2 |
/// | 1 | 2 | 1 |
/// ```
///
/// Neighbors that are invalid or differ from the center by more than
/// `max_z_error` are left out. Returns 0 for invalid positions.
pub fn depth_at(depth: &DepthImage, x: f32, y: f32, smoothing: bool, max_z_error: f32) -> f32 {
    let u = (x + 0.5) as i64;
    let v = (y + 0.5) as i64;

    let (w, h) = depth.dimensions();
    if u < 0 || u >= w as i64 || v < 0 || v >= h as i64 {
        return 0.0;
    }
    let (u, v) = (u as u32, v as u32);

    let center = depth.get_pixel(u, v)[0];
    if center == 0.0 || !center.is_finite() {
        return 0.0;
    }
    if !smoothing {
        return center;
    }

    let u_start = u.saturating_sub(1);
    let v_start = v.saturating_sub(1);
    let u_end = (u + 1).min(w - 1);
    let v_end = (v + 1).min(h - 1);

    let mut sum_weights = 4.0f32;
    let mut sum_depths = center * 4.0;
    for uu in u_start..=u_end {
        for vv in v_start..=v_end {
            if uu == u && vv == v {
                continue;
            }
            let d = depth.get_pixel(uu, vv)[0];
            if d != 0.0 && d.is_finite() && (d - center).abs() < max_z_error {
                let weight = if uu == u || vv == v { 2.0 } else { 1.0 };
                sum_weights += weight;
                sum_depths += d * weight;
            }
        }
    }

    sum_depths / sum_weights
}

/// 3D point in the left camera frame from a pixel and its disparity.
pub fn point_from_disparity(
    x: f32,
    y: f32,
    disparity: f32,
    params: &StereoParams,
) -> Option<Point3<f32>> {
    if disparity.abs() < 1e-6 {
        return None;
    }

    let depth = (params.focal_length * params.baseline) / disparity;
    let x_n = (x - params.cx) / params.focal_length;
    let y_n = (y - params.cy) / params.focal_length;

    Some(Point3::new(x_n * depth, y_n * depth, depth))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parallax_core::Point2f;

    fn params() -> StereoParams {
        StereoParams::new(500.0, 0.1, 320.0, 240.0)
    }

    #[test]
    fn test_depth_from_disparity() {
        let mut disparity = DisparityMap::new(10, 10, 0, 64);
        disparity.set(5, 5, 50.0);
        disparity.set(6, 5, -1.0);

        let depth = depth_from_disparity(&disparity, &params());

        // (500 * 0.1) / 50 = 1.0 m
        assert_eq!(depth.get_pixel(5, 5)[0], 1.0);
        assert_eq!(depth.get_pixel(6, 5)[0], 0.0);
    }

    #[test]
    fn test_correspondences_to_disparity_and_depth() {
        let left = vec![Point2f::new(20.0, 10.0), Point2f::new(30.0, 12.0)];
        let matches = Correspondences {
            points: vec![Point2f::new(15.0, 10.0), Point2f::new(28.0, 12.0)],
            status: vec![true, false],
        };

        let disparity = disparity_from_correspondences((64, 32), &left, &matches).unwrap();
        assert_eq!(disparity.get(20, 10), 5.0);
        // Invalid pairs leave their cell untouched.
        assert_eq!(disparity.get(30, 12), 0.0);

        let depth = depth_from_correspondences((64, 32), &left, &matches, &params()).unwrap();
        assert_eq!(depth.get_pixel(20, 10)[0], 500.0 * 0.1 / 5.0);
    }

    #[test]
    fn test_point_outside_output_is_precondition_error() {
        let left = vec![Point2f::new(100.0, 10.0)];
        let matches = Correspondences {
            points: vec![Point2f::new(90.0, 10.0)],
            status: vec![true],
        };
        assert!(disparity_from_correspondences((64, 32), &left, &matches).is_err());
    }

    #[test]
    fn test_millimeter_round_trip_and_clamping() {
        let mut depth = DepthImage::new(4, 1);
        depth.put_pixel(0, 0, Luma([1.5]));
        depth.put_pixel(1, 0, Luma([0.0]));
        depth.put_pixel(2, 0, Luma([70.0])); // 70 m: past the u16 range

        let mm = depth_to_millimeters(&depth);
        assert_eq!(mm.get_pixel(0, 0)[0], 1500);
        assert_eq!(mm.get_pixel(1, 0)[0], 0);
        assert_eq!(mm.get_pixel(2, 0)[0], 0);

        let meters = depth_to_meters(&mm);
        assert_eq!(meters.get_pixel(0, 0)[0], 1.5);
    }

    #[test]
    fn test_depth_at_smoothing_rejects_outliers() {
        let mut depth = DepthImage::new(3, 3);
        for y in 0..3 {
            for x in 0..3 {
                depth.put_pixel(x, y, Luma([2.0]));
            }
        }
        // An inconsistent neighbor is excluded from the mean.
        depth.put_pixel(0, 0, Luma([10.0]));

        assert_eq!(depth_at(&depth, 1.0, 1.0, false, 0.5), 2.0);
        assert_eq!(depth_at(&depth, 1.0, 1.0, true, 0.5), 2.0);
        assert_eq!(depth_at(&depth, -5.0, 1.0, true, 0.5), 0.0);
    }

    #[test]
    fn test_point_from_disparity() {
        let p = point_from_disparity(320.0, 240.0, 50.0, &params()).unwrap();
        assert!(p.x.abs() < 1e-6);
        assert!(p.y.abs() < 1e-6);
        assert!((p.z - 1.0).abs() < 1e-6);

        assert!(point_from_disparity(320.0, 240.0, 0.0, &params()).is_none());
    }
}
