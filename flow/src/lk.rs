//! Pyramidal gradient tracking restricted to horizontal motion.

use image::GrayImage;
use log::debug;
use rayon::prelude::*;

use parallax_core::{Point2f, TrackedPoints};
use parallax_imgproc::{build_flow_pyramid, FlowPyramid};

use crate::fixed::{bilinear_weights, descale, FLT_SCALE, W_BITS};
use crate::{FlowError, Result};

/// Iteration stopping criteria for the per-level solver.
#[derive(Debug, Clone, Copy)]
pub struct TermCriteria {
    /// Iteration cap per pyramid level; clamped to `[0, 100]`.
    pub max_count: i32,
    /// Displacement threshold in pixels; clamped to `[0, 10]`.
    pub epsilon: f64,
}

impl Default for TermCriteria {
    fn default() -> Self {
        Self {
            max_count: 30,
            epsilon: 0.01,
        }
    }
}

impl TermCriteria {
    pub fn new(max_count: i32, epsilon: f64) -> Self {
        Self { max_count, epsilon }
    }
}

/// Per-point tracking-quality measure reported alongside the estimates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMeasure {
    /// No error output.
    None,
    /// Mean absolute patch residual at the final estimate.
    #[default]
    Residual,
    /// Smallest eigenvalue of the structure matrix, normalized by patch
    /// area.
    MinEigenvalue,
}

/// Pyramidal gradient tracker that solves only for horizontal displacement.
///
/// Both frames are assumed row-rectified, so true motion is purely
/// horizontal; the vertical component of the per-iteration correction is
/// forced to zero and the vertical coordinate of every output equals its
/// pyramid-scaled initial value exactly. Patch resampling uses the
/// fixed-point weights from [`crate::fixed`].
#[derive(Debug, Clone)]
pub struct HorizontalFlowTracker {
    pub win_size: (i32, i32),
    pub max_level: i32,
    pub criteria: TermCriteria,
    pub min_eig_threshold: f32,
    pub error_measure: ErrorMeasure,
}

impl Default for HorizontalFlowTracker {
    fn default() -> Self {
        Self {
            win_size: (21, 21),
            max_level: 3,
            criteria: TermCriteria::default(),
            min_eig_threshold: 1e-4,
            error_measure: ErrorMeasure::Residual,
        }
    }
}

impl HorizontalFlowTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window_size(mut self, width: i32, height: i32) -> Self {
        self.win_size = (width, height);
        self
    }

    pub fn with_max_level(mut self, max_level: i32) -> Self {
        self.max_level = max_level;
        self
    }

    pub fn with_criteria(mut self, criteria: TermCriteria) -> Self {
        self.criteria = criteria;
        self
    }

    pub fn with_min_eig_threshold(mut self, threshold: f32) -> Self {
        self.min_eig_threshold = threshold;
        self
    }

    pub fn with_error_measure(mut self, measure: ErrorMeasure) -> Self {
        self.error_measure = measure;
        self
    }

    /// Track `points` from `prev` to `next`, building the pyramids
    /// internally. `guesses`, when given, seeds the estimates at the
    /// coarsest level in full-resolution coordinates.
    pub fn track(
        &self,
        prev: &GrayImage,
        next: &GrayImage,
        points: &[Point2f],
        guesses: Option<&[Point2f]>,
    ) -> Result<TrackedPoints> {
        self.validate()?;
        let prev_pyr = build_flow_pyramid(prev, self.win_size, self.max_level, true)
            .map_err(|e| FlowError::PyramidError(e.to_string()))?;
        let next_pyr = build_flow_pyramid(next, self.win_size, self.max_level, false)
            .map_err(|e| FlowError::PyramidError(e.to_string()))?;
        self.track_pyramids(&prev_pyr, &next_pyr, points, guesses)
    }

    /// Track `points` across prebuilt pyramids. The previous-frame pyramid
    /// must carry derivative levels; both pyramids must agree level by
    /// level in size.
    pub fn track_pyramids(
        &self,
        prev: &FlowPyramid,
        next: &FlowPyramid,
        points: &[Point2f],
        guesses: Option<&[Point2f]>,
    ) -> Result<TrackedPoints> {
        self.validate()?;
        if !prev.has_derivatives() {
            return Err(FlowError::InvalidParameters(
                "previous pyramid lacks derivative levels".to_string(),
            ));
        }
        for pyr in [prev, next] {
            let (px, py) = pyr.level(0).padding();
            if px < self.win_size.0 || py < self.win_size.1 {
                return Err(FlowError::InvalidParameters(format!(
                    "pyramid padding ({px},{py}) smaller than window ({},{})",
                    self.win_size.0, self.win_size.1
                )));
            }
        }
        if let Some(g) = guesses {
            if g.len() != points.len() {
                return Err(FlowError::InvalidParameters(format!(
                    "{} guesses for {} points",
                    g.len(),
                    points.len()
                )));
            }
        }

        let max_level = self.max_level.min(prev.max_level()).min(next.max_level());
        for level in 0..=max_level as usize {
            let (pl, nl) = (prev.level(level), next.level(level));
            if pl.width() != nl.width() || pl.height() != nl.height() {
                return Err(FlowError::SizeMismatch(format!(
                    "level {level}: {}x{} vs {}x{}",
                    pl.width(),
                    pl.height(),
                    nl.width(),
                    nl.height()
                )));
            }
        }

        let max_count = self.criteria.max_count.clamp(0, 100);
        let epsilon = self.criteria.epsilon.clamp(0.0, 10.0);
        let eps2 = epsilon * epsilon;

        debug!(
            "tracking {} points: win=({},{}), levels 0..={max_level}, max_count={max_count}",
            points.len(),
            self.win_size.0,
            self.win_size.1
        );

        let results: Vec<(Point2f, bool, f32)> = points
            .par_iter()
            .enumerate()
            .map(|(i, &pt)| {
                self.track_point(pt, guesses.map(|g| g[i]), prev, next, max_level, max_count, eps2)
            })
            .collect();

        Ok(TrackedPoints {
            points: results.iter().map(|r| r.0).collect(),
            status: results.iter().map(|r| r.1).collect(),
            errors: (self.error_measure != ErrorMeasure::None)
                .then(|| results.iter().map(|r| r.2).collect()),
        })
    }

    fn validate(&self) -> Result<()> {
        if self.win_size.0 <= 2 || self.win_size.1 <= 2 {
            return Err(FlowError::InvalidParameters(format!(
                "window must be at least 3x3, got {}x{}",
                self.win_size.0, self.win_size.1
            )));
        }
        if self.max_level < 0 {
            return Err(FlowError::InvalidParameters(format!(
                "pyramid depth must be non-negative, got {}",
                self.max_level
            )));
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn track_point(
        &self,
        prev_pt_full: Point2f,
        guess: Option<Point2f>,
        prev: &FlowPyramid,
        next: &FlowPyramid,
        max_level: i32,
        max_count: i32,
        eps2: f64,
    ) -> (Point2f, bool, f32) {
        let (win_w, win_h) = self.win_size;
        let half_w = (win_w - 1) as f32 * 0.5;
        let half_h = (win_h - 1) as f32 * 0.5;
        let area = (win_w * win_h) as usize;

        // Previous-frame patch and its gradients, resampled once per level.
        let mut iwin = vec![0i16; area];
        let mut dwin = vec![0i16; area * 2];

        let mut status = true;
        let mut err = 0.0f32;
        let mut out = Point2f::default();

        for level in (0..=max_level).rev() {
            let scale = 1.0 / (1 << level) as f32;
            let i_level = prev.level(level as usize);
            let j_level = next.level(level as usize);
            let deriv = prev
                .deriv(level as usize)
                .expect("derivative levels checked before tracking");

            let prev_pt = prev_pt_full.scaled(scale);
            let next_pt = if level == max_level {
                match guess {
                    Some(g) => g.scaled(scale),
                    None => prev_pt,
                }
            } else {
                out.scaled(2.0)
            };
            out = next_pt;

            let cols = i_level.width();
            let rows = i_level.height();

            // Integer corner of the previous-frame window.
            let px = prev_pt.x - half_w;
            let py = prev_pt.y - half_h;
            let ipx = px.floor() as i32;
            let ipy = py.floor() as i32;

            if ipx < -win_w || ipx >= cols || ipy < -win_h || ipy >= rows {
                if level == 0 {
                    status = false;
                    err = 0.0;
                }
                continue;
            }
            // The finest level demands full in-image support; a window over
            // the border would track replicated pixels.
            if level == 0 && (ipx < 0 || ipy < 0 || ipx + win_w > cols || ipy + win_h > rows) {
                status = false;
                err = 0.0;
                continue;
            }

            let w = bilinear_weights(px - ipx as f32, py - ipy as f32);

            // Resample the patch and accumulate the structure matrix.
            let mut ia11 = 0.0f32;
            let mut ia12 = 0.0f32;
            let mut ia22 = 0.0f32;
            for y in 0..win_h {
                for x in 0..win_w {
                    let gx = ipx + x;
                    let gy = ipy + y;
                    let s00 = i_level.get(gx, gy) as i32;
                    let s01 = i_level.get(gx + 1, gy) as i32;
                    let s10 = i_level.get(gx, gy + 1) as i32;
                    let s11 = i_level.get(gx + 1, gy + 1) as i32;
                    let ival =
                        descale(s00 * w[0] + s01 * w[1] + s10 * w[2] + s11 * w[3], W_BITS - 5);

                    let (dx00, dy00) = deriv.get(gx, gy);
                    let (dx01, dy01) = deriv.get(gx + 1, gy);
                    let (dx10, dy10) = deriv.get(gx, gy + 1);
                    let (dx11, dy11) = deriv.get(gx + 1, gy + 1);
                    let ixval = descale(
                        dx00 as i32 * w[0] + dx01 as i32 * w[1] + dx10 as i32 * w[2]
                            + dx11 as i32 * w[3],
                        W_BITS,
                    );
                    let iyval = descale(
                        dy00 as i32 * w[0] + dy01 as i32 * w[1] + dy10 as i32 * w[2]
                            + dy11 as i32 * w[3],
                        W_BITS,
                    );

                    let idx = (y * win_w + x) as usize;
                    iwin[idx] = ival as i16;
                    dwin[idx * 2] = ixval as i16;
                    dwin[idx * 2 + 1] = iyval as i16;

                    ia11 += (ixval * ixval) as f32;
                    ia12 += (ixval * iyval) as f32;
                    ia22 += (iyval * iyval) as f32;
                }
            }

            let a11 = ia11 * FLT_SCALE;
            let a12 = ia12 * FLT_SCALE;
            let a22 = ia22 * FLT_SCALE;

            let det = a11 * a22 - a12 * a12;
            let min_eig = (a22 + a11 - ((a11 - a22) * (a11 - a22) + 4.0 * a12 * a12).sqrt())
                / (2.0 * win_w as f32 * win_h as f32);

            if self.error_measure == ErrorMeasure::MinEigenvalue {
                err = min_eig;
            }

            // A textureless or degenerate patch cannot be tracked.
            if min_eig < self.min_eig_threshold || det < f32::EPSILON {
                if level == 0 {
                    status = false;
                }
                continue;
            }
            let det_inv = 1.0 / det;

            // Iterate on the horizontal displacement only; the vertical
            // window position is fixed for the whole level.
            let mut nx = next_pt.x - half_w;
            let ny = next_pt.y - half_h;
            let iny = ny.floor() as i32;
            let b_frac = ny - iny as f32;

            let mut prev_delta_x = 0.0f32;
            for iter in 0..max_count {
                let inx = nx.floor() as i32;
                if inx < -win_w || inx >= cols || iny < -win_h || iny >= rows {
                    if level == 0 {
                        status = false;
                    }
                    break;
                }

                let w = bilinear_weights(nx - inx as f32, b_frac);
                let mut ib1 = 0.0f32;
                let mut ib2 = 0.0f32;
                for y in 0..win_h {
                    for x in 0..win_w {
                        let gx = inx + x;
                        let gy = iny + y;
                        let j00 = j_level.get(gx, gy) as i32;
                        let j01 = j_level.get(gx + 1, gy) as i32;
                        let j10 = j_level.get(gx, gy + 1) as i32;
                        let j11 = j_level.get(gx + 1, gy + 1) as i32;
                        let jval =
                            descale(j00 * w[0] + j01 * w[1] + j10 * w[2] + j11 * w[3], W_BITS - 5);

                        let idx = (y * win_w + x) as usize;
                        let diff = jval - iwin[idx] as i32;
                        ib1 += (diff * dwin[idx * 2] as i32) as f32;
                        ib2 += (diff * dwin[idx * 2 + 1] as i32) as f32;
                    }
                }
                let b1 = ib1 * FLT_SCALE;
                let b2 = ib2 * FLT_SCALE;

                // The full solution would also move the estimate by
                // (a12*b1 - a11*b2) * det_inv vertically; rectified rows
                // pin that component to zero.
                let delta_x = (a12 * b2 - a22 * b1) * det_inv;

                nx += delta_x;
                out = Point2f::new(nx + half_w, next_pt.y);

                if (delta_x as f64 * delta_x as f64) <= eps2 {
                    break;
                }
                if iter > 0 && (delta_x + prev_delta_x).abs() < 0.01 {
                    // Oscillating around the minimum: split the difference
                    // and stop early.
                    out.x -= delta_x * 0.5;
                    break;
                }
                prev_delta_x = delta_x;
            }

            if status && level == 0 && self.error_measure == ErrorMeasure::Residual {
                let rx = out.x - half_w;
                let ry = out.y - half_h;
                let irx = rx.floor() as i32;
                let iry = ry.floor() as i32;
                if irx < -win_w || irx >= cols || iry < -win_h || iry >= rows {
                    status = false;
                    continue;
                }

                let w = bilinear_weights(rx - irx as f32, ry - iry as f32);
                let mut residual = 0.0f32;
                for y in 0..win_h {
                    for x in 0..win_w {
                        let gx = irx + x;
                        let gy = iry + y;
                        let j00 = j_level.get(gx, gy) as i32;
                        let j01 = j_level.get(gx + 1, gy) as i32;
                        let j10 = j_level.get(gx, gy + 1) as i32;
                        let j11 = j_level.get(gx + 1, gy + 1) as i32;
                        let jval =
                            descale(j00 * w[0] + j01 * w[1] + j10 * w[2] + j11 * w[3], W_BITS - 5);

                        let idx = (y * win_w + x) as usize;
                        residual += ((jval - iwin[idx] as i32) as f32).abs();
                    }
                }
                err = residual / (32.0 * win_w as f32 * win_h as f32);
            }
        }

        (out, status, err)
    }
}
