//! Depth-map registration across camera frames.

use image::Luma;
use nalgebra::{Isometry3, Point3};

use parallax_core::CameraIntrinsics;

use crate::depth::DepthImageMm;

/// Reproject a millimeter depth image from its own camera into another
/// camera's frame through a rigid transform. Where several source pixels
/// land on the same target pixel the nearest depth wins; pixels nothing
/// lands on stay zero (see [`fill_registered_depth_holes`]).
pub fn register_depth(
    depth: &DepthImageMm,
    depth_k: &CameraIntrinsics,
    target_k: &CameraIntrinsics,
    transform: &Isometry3<f32>,
) -> DepthImageMm {
    let (w, h) = depth.dimensions();
    let mut registered = DepthImageMm::new(w, h);

    for y in 0..h {
        for x in 0..w {
            let dz = depth.get_pixel(x, y)[0] as f32 * 0.001;
            if dz <= 0.0 {
                continue;
            }

            let p = Point3::new(
                (x as f32 - depth_k.cx) * dz / depth_k.fx,
                (y as f32 - depth_k.cy) * dz / depth_k.fy,
                dz,
            );
            let q = transform * p;
            if q.z <= 0.0 {
                continue;
            }

            let inv_z = 1.0 / q.z;
            let tx = (target_k.fx * q.x * inv_z + target_k.cx) as i64;
            let ty = (target_k.fy * q.y * inv_z + target_k.cy) as i64;
            if tx < 0 || tx >= w as i64 || ty < 0 || ty >= h as i64 {
                continue;
            }

            let mm = q.z * 1000.0;
            if mm > u16::MAX as f32 {
                continue;
            }
            let z16 = mm as u16;
            if z16 == 0 {
                continue;
            }

            let cell = registered.get_pixel_mut(tx as u32, ty as u32);
            if cell[0] == 0 || z16 < cell[0] {
                *cell = Luma([z16]);
            }
        }
    }

    registered
}

/// Scan direction of the hole-filling pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillDirection {
    Vertical,
    Horizontal,
    Both,
}

impl FillDirection {
    fn vertical(&self) -> bool {
        matches!(self, FillDirection::Vertical | FillDirection::Both)
    }

    fn horizontal(&self) -> bool {
        matches!(self, FillDirection::Horizontal | FillDirection::Both)
    }
}

/// Configuration for [`fill_registered_depth_holes`].
#[derive(Debug, Clone, Copy)]
pub struct HoleFillOptions {
    pub direction: FillDirection,
    /// Also bridge two-pixel holes with quarter-step interpolation.
    pub fill_double_holes: bool,
}

impl Default for HoleFillOptions {
    fn default() -> Self {
        Self {
            direction: FillDirection::Both,
            fill_double_holes: false,
        }
    }
}

// The 1% consistency tolerance between the two bridging depths.
fn tolerance(a: u32, b: u32) -> u32 {
    (0.01 * ((a + b) / 2) as f32) as u32
}

// A cell is fillable when it is empty between two valid depths, or sticks
// out past both by more than the tolerance.
fn fillable(b: u32, a: u32, c: u32, err: u32) -> bool {
    (b == 0 && a > 0 && c > 0) || (b > a + err && b > c + err)
}

fn consistent(a: u32, c: u32, err: u32) -> bool {
    if a > c {
        a - c <= err
    } else {
        c - a <= err
    }
}

/// Interpolate one- and optionally two-pixel holes left by registration.
///
/// A hole is filled only when the depths on both sides agree within 1%, so
/// occlusion boundaries are not bridged.
pub fn fill_registered_depth_holes(depth: &mut DepthImageMm, options: &HoleFillOptions) {
    let w = depth.width() as i64;
    let h = depth.height() as i64;
    let margin: i64 = if options.fill_double_holes { 2 } else { 1 };
    if w <= margin + 1 || h <= margin + 1 {
        return;
    }

    let at = |img: &DepthImageMm, x: i64, y: i64| -> u32 { img.get_pixel(x as u32, y as u32)[0] as u32 };
    let vertical = options.direction.vertical();
    let horizontal = options.direction.horizontal();

    for x in 1..(w - margin) {
        let mut y: i64 = 1;
        while y < h - margin {
            let b = at(depth, x, y);
            let mut set = false;

            if vertical {
                let a = at(depth, x, y - 1);
                let c = at(depth, x, y + 1);
                if a > 0 && c > 0 {
                    let err = tolerance(a, c);
                    if fillable(b, a, c, err) && consistent(a, c, err) {
                        depth.put_pixel(x as u32, y as u32, Luma([((a + c) / 2) as u16]));
                        set = true;
                        if !horizontal {
                            y += 1;
                        }
                    }
                }
                if !set && options.fill_double_holes {
                    let c = at(depth, x, y + 1);
                    let d = at(depth, x, y + 2);
                    if a > 0 && d > 0 && (b == 0 || c == 0) {
                        let err = tolerance(a, d);
                        if fillable(b, a, d, err)
                            && fillable(c, a, d, err)
                            && consistent(a, d, err)
                        {
                            let (near, step) = if a > d {
                                (d, (a - d) / 4)
                            } else {
                                (a, (d - a) / 4)
                            };
                            depth.put_pixel(x as u32, y as u32, Luma([(near + step) as u16]));
                            depth.put_pixel(x as u32, (y + 1) as u32, Luma([(near + 3 * step) as u16]));
                            set = true;
                            if !horizontal {
                                y += 2;
                            }
                        }
                    }
                }
            }

            if !set && horizontal {
                let a = at(depth, x - 1, y);
                let c = at(depth, x + 1, y);
                if a > 0 && c > 0 {
                    let err = tolerance(a, c);
                    if fillable(b, a, c, err) && consistent(a, c, err) {
                        depth.put_pixel(x as u32, y as u32, Luma([((a + c) / 2) as u16]));
                        set = true;
                    }
                }
                if !set && options.fill_double_holes {
                    let c = at(depth, x + 1, y);
                    let d = at(depth, x + 2, y);
                    if a > 0 && d > 0 && (b == 0 || c == 0) {
                        let err = tolerance(a, d);
                        if fillable(b, a, d, err)
                            && fillable(c, a, d, err)
                            && consistent(a, d, err)
                        {
                            let (near, step) = if a > d {
                                (d, (a - d) / 4)
                            } else {
                                (a, (d - a) / 4)
                            };
                            depth.put_pixel(x as u32, y as u32, Luma([(near + step) as u16]));
                            depth.put_pixel((x + 1) as u32, y as u32, Luma([(near + 3 * step) as u16]));
                        }
                    }
                }
            }

            y += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Translation3, UnitQuaternion};

    fn intrinsics() -> CameraIntrinsics {
        CameraIntrinsics::new(100.0, 100.0, 16.0, 16.0)
    }

    #[test]
    fn test_identity_registration_preserves_depth() {
        let mut depth = DepthImageMm::new(32, 32);
        depth.put_pixel(16, 16, Luma([2000]));
        depth.put_pixel(10, 12, Luma([1500]));

        let k = intrinsics();
        let registered = register_depth(&depth, &k, &k, &Isometry3::identity());

        assert_eq!(registered.get_pixel(16, 16)[0], 2000);
        assert_eq!(registered.get_pixel(10, 12)[0], 1500);
    }

    #[test]
    fn test_translation_shifts_projection() {
        let mut depth = DepthImageMm::new(32, 32);
        depth.put_pixel(16, 16, Luma([1000]));

        let k = intrinsics();
        // Camera shifted 0.1 m along -x: the point moves +0.1 in camera
        // coordinates, i.e. fx * 0.1 / 1.0 = 10 px to the right.
        let t = Isometry3::from_parts(
            Translation3::new(0.1, 0.0, 0.0),
            UnitQuaternion::identity(),
        );
        let registered = register_depth(&depth, &k, &k, &t);

        assert_eq!(registered.get_pixel(26, 16)[0], 1000);
        assert_eq!(registered.get_pixel(16, 16)[0], 0);
    }

    #[test]
    fn test_nearest_depth_wins() {
        let k = CameraIntrinsics::new(1.0, 1.0, 0.0, 0.0);
        let mut depth = DepthImageMm::new(4, 4);
        depth.put_pixel(0, 0, Luma([2000]));
        depth.put_pixel(1, 0, Luma([1000]));

        // A 1 m sideways shift makes both pixels land on target (0, 0); the
        // closer 1 m depth must win over the 2 m one.
        let t = Isometry3::from_parts(
            Translation3::new(-1.0, 0.0, 0.0),
            UnitQuaternion::identity(),
        );
        let registered = register_depth(&depth, &k, &k, &t);

        assert_eq!(registered.get_pixel(0, 0)[0], 1000);
    }

    #[test]
    fn test_single_hole_filled_when_consistent() {
        let mut depth = DepthImageMm::new(8, 8);
        depth.put_pixel(4, 3, Luma([1000]));
        depth.put_pixel(4, 5, Luma([1004]));

        fill_registered_depth_holes(
            &mut depth,
            &HoleFillOptions {
                direction: FillDirection::Vertical,
                fill_double_holes: false,
            },
        );

        assert_eq!(depth.get_pixel(4, 4)[0], 1002);
    }

    #[test]
    fn test_inconsistent_edges_not_bridged() {
        let mut depth = DepthImageMm::new(8, 8);
        depth.put_pixel(4, 3, Luma([1000]));
        depth.put_pixel(4, 5, Luma([3000]));

        fill_registered_depth_holes(&mut depth, &HoleFillOptions::default());

        assert_eq!(depth.get_pixel(4, 4)[0], 0);
    }

    #[test]
    fn test_double_hole_interpolated() {
        let mut depth = DepthImageMm::new(8, 8);
        depth.put_pixel(4, 2, Luma([1000]));
        depth.put_pixel(4, 5, Luma([1008]));

        fill_registered_depth_holes(
            &mut depth,
            &HoleFillOptions {
                direction: FillDirection::Vertical,
                fill_double_holes: true,
            },
        );

        assert_eq!(depth.get_pixel(4, 3)[0], 1002);
        assert_eq!(depth.get_pixel(4, 4)[0], 1006);
    }

    #[test]
    fn test_horizontal_fill() {
        let mut depth = DepthImageMm::new(8, 8);
        depth.put_pixel(3, 4, Luma([2000]));
        depth.put_pixel(5, 4, Luma([2010]));

        fill_registered_depth_holes(
            &mut depth,
            &HoleFillOptions {
                direction: FillDirection::Horizontal,
                fill_double_holes: false,
            },
        );

        assert_eq!(depth.get_pixel(4, 4)[0], 2005);
    }
}
