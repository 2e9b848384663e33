//! Coarse-to-fine sparse disparity search.

use image::GrayImage;
use log::{debug, trace};
use rayon::prelude::*;

use parallax_core::{Correspondences, Error, Point2f, Result};
use parallax_imgproc::{build_flow_pyramid, sample_rect, FlowPyramid, PyramidLevel};

use crate::cost::{MatchingCost, Patch};
use crate::subpixel::refine_along_x;

/// Coarse-to-fine block matcher for sparse points on a row-rectified pair.
///
/// For every left-image point the matcher scans the same row of the right
/// image over `[min_disparity, max_disparity]` (columns to the left of the
/// point), narrowing and re-centering the scanned range while descending the
/// pyramid, then refines the winning column to sub-pixel precision. Points
/// whose window leaves the image, whose scores are degenerate or whose
/// refinement drifts out of trust are reported with a cleared status flag;
/// the batch call itself only fails on precondition violations.
#[derive(Debug, Clone)]
pub struct StereoSparseMatcher {
    pub win_size: (i32, i32),
    pub max_level: i32,
    /// Upper cap on the sub-pixel refinement budget; 0 leaves the budget at
    /// the number of disparity candidates evaluated by the pyramid search.
    pub iterations: i32,
    pub min_disparity: i32,
    pub max_disparity: i32,
    pub cost: MatchingCost,
}

impl Default for StereoSparseMatcher {
    fn default() -> Self {
        Self {
            win_size: (15, 3),
            max_level: 3,
            iterations: 30,
            min_disparity: 0,
            max_disparity: 64,
            cost: MatchingCost::Ssd,
        }
    }
}

impl StereoSparseMatcher {
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

    pub fn with_iterations(mut self, iterations: i32) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_disparity_range(mut self, min: i32, max: i32) -> Self {
        self.min_disparity = min;
        self.max_disparity = max;
        self
    }

    pub fn with_cost(mut self, cost: MatchingCost) -> Self {
        self.cost = cost;
        self
    }

    /// Locate the right-image match of every left point.
    ///
    /// The result is index-aligned with `left_points`; consult `status`
    /// before using a match.
    pub fn compute(
        &self,
        left: &GrayImage,
        right: &GrayImage,
        left_points: &[Point2f],
    ) -> Result<Correspondences> {
        if left.dimensions() != right.dimensions() {
            return Err(Error::DimensionMismatch(format!(
                "left {}x{} vs right {}x{}",
                left.width(),
                left.height(),
                right.width(),
                right.height()
            )));
        }
        if self.max_level < 0 {
            return Err(Error::InvalidInput(format!(
                "pyramid depth must be non-negative, got {}",
                self.max_level
            )));
        }
        if self.min_disparity < 0 || self.max_disparity < self.min_disparity {
            return Err(Error::InvalidInput(format!(
                "invalid disparity bounds [{}, {}]",
                self.min_disparity, self.max_disparity
            )));
        }

        let win = odd_win_size(self.win_size);
        debug!(
            "win_size=({},{}) max_level={} disparities=[{},{}] cost={:?}",
            win.0, win.1, self.max_level, self.min_disparity, self.max_disparity, self.cost
        );

        let left_pyr = build_flow_pyramid(left, win, self.max_level, false)
            .map_err(|e| Error::InvalidInput(e.to_string()))?;
        let right_pyr = build_flow_pyramid(right, win, self.max_level, false)
            .map_err(|e| Error::InvalidInput(e.to_string()))?;
        let max_level = left_pyr.max_level().min(right_pyr.max_level());

        let results: Vec<(Point2f, bool)> = left_points
            .par_iter()
            .map(|&pt| self.match_point(pt, left, right, &left_pyr, &right_pyr, max_level, win))
            .collect();

        let matched = results.iter().filter(|r| r.1).count();
        debug!("{matched}/{} points matched", left_points.len());

        Ok(Correspondences {
            points: results.iter().map(|r| r.0).collect(),
            status: results.iter().map(|r| r.1).collect(),
        })
    }

    fn match_point(
        &self,
        pt: Point2f,
        left: &GrayImage,
        right: &GrayImage,
        left_pyr: &FlowPyramid,
        right_pyr: &FlowPyramid,
        max_level: i32,
        win: (i32, i32),
    ) -> (Point2f, bool) {
        let half = ((win.0 - 1) / 2, (win.1 - 1) / 2);

        let mut best_score = -1.0f32;
        let mut second_best = -1.0f32;
        let mut best_index = -1i32;
        let mut tmp_min = self.min_disparity;
        let mut tmp_max = self.max_disparity;
        let mut evaluated = 0usize;

        for level in (0..=max_level).rev() {
            let level_left = left_pyr.level(level as usize);
            let level_right = right_pyr.level(level as usize);
            let cols = level_left.width();
            let rows = level_left.height();
            let inv = 1 << level;

            let cx = (pt.x / inv as f32) as i32;
            let cy = (pt.y / inv as f32) as i32;

            best_score = -1.0;
            second_best = -1.0;
            best_index = -1;
            let mut oi = 0i32;
            let (mut local_min, mut local_max) = scaled_bounds(tmp_min, tmp_max, inv);

            // Level 0 keeps one extra column on each side free for the
            // sub-pixel sampling that follows.
            let guard = if level == 0 { 1 } else { 0 };
            let fits = cx - half.0 - guard >= 0
                && cx + half.0 + guard < cols
                && cy - half.1 >= 0
                && cy + half.1 < rows;

            if fits {
                let left_win = window_patch(level_left, cx, cy, half);
                (local_min, local_max) = clamp_to_level(local_min, local_max, cx, half.0, cols);

                let mut d = local_min;
                while d > local_max {
                    evaluated += 1;
                    let right_win = window_patch(level_right, cx + d, cy, half);
                    let score = self.cost.score_unchecked(&left_win, &right_win);
                    if score > 0.0 && (best_score < 0.0 || score < best_score) {
                        second_best = best_score;
                        best_index = oi;
                        best_score = score;
                    }
                    oi += 1;
                    d -= 1;
                }

                if best_index >= 0 && level > 0 {
                    (tmp_min, tmp_max) = recentered_bounds(
                        tmp_min,
                        best_index,
                        level,
                        (self.min_disparity, self.max_disparity),
                    );
                    trace!(
                        "level {level}: winner {best_index} (score {best_score}, second {second_best}), bounds [{tmp_min},{tmp_max}]"
                    );
                }
            }
        }

        if best_index < 0 {
            return (Point2f::default(), false);
        }

        // Sub-pixel refinement at full resolution around the integer winner.
        let d = -(tmp_min + best_index);
        let win_u = (win.0 as u32, win.1 as u32);
        let left_win = Patch::from(&sample_rect(left, win_u, (pt.x, pt.y)));

        let mut vc = best_score;
        if pt.x.fract() != 0.0 {
            // The integer search compared windows at the rounded position;
            // restate the starting cost at the true fractional coordinate.
            let right_win = Patch::from(&sample_rect(right, win_u, (pt.x + d as f32, pt.y)));
            vc = self.cost.score_unchecked(&left_win, &right_win);
        }

        let mut budget = evaluated;
        if self.iterations > 0 {
            budget = budget.min(self.iterations as usize);
        }

        let start_x = pt.x + d as f32;
        let outcome = refine_along_x(start_x, vc, budget, |x| {
            let right_win = Patch::from(&sample_rect(right, win_u, (x, pt.y)));
            self.cost.score_unchecked(&left_win, &right_win)
        });

        (Point2f::new(outcome.x, pt.y), !outcome.rejected)
    }
}

/// Round even window dimensions up to the next odd value.
pub(crate) fn odd_win_size(win: (i32, i32)) -> (i32, i32) {
    let w = if win.0 % 2 == 0 { win.0 + 1 } else { win.0 };
    let h = if win.1 % 2 == 0 { win.1 + 1 } else { win.1 };
    (w, h)
}

/// Level-local search range: the global `[min, max]` disparity bounds,
/// negated into column offsets and divided by the level scale. The range is
/// traversed from `local_min` down to just above `local_max`.
fn scaled_bounds(tmp_min: i32, tmp_max: i32, inv: i32) -> (i32, i32) {
    (-tmp_min / inv, -tmp_max / inv)
}

/// Shrink the level-local range so that no compared right window reads
/// outside the level, taking columns from whichever side overflows.
fn clamp_to_level(
    mut local_min: i32,
    mut local_max: i32,
    cx: i32,
    half_w: i32,
    cols: i32,
) -> (i32, i32) {
    let min_col = cx + local_max - half_w - 1;
    if min_col < 0 {
        local_max -= min_col;
    }
    let max_col = cx + local_min + half_w + 1;
    if max_col >= cols {
        local_min += max_col - cols - 1;
    }
    if local_min < local_max {
        local_max = local_min;
    }
    (local_min, local_max)
}

/// Disparity bounds for the next finer level, re-centered around the winner
/// and one step wider on each side at the current scale, clamped to the
/// global bounds. The trailing `% level` trim mirrors the reference search;
/// it is not a power-of-two bound and is kept for compatibility.
fn recentered_bounds(
    tmp_min: i32,
    best_index: i32,
    level: i32,
    global: (i32, i32),
) -> (i32, i32) {
    let inv = 1 << level;

    let mut tmp_max = tmp_min + (best_index + 1) * inv;
    tmp_max += tmp_max % level;
    if tmp_max > global.1 {
        tmp_max = global.1;
    }

    let mut new_min = tmp_min + (best_index - 1) * inv;
    new_min -= new_min % level;
    if new_min < global.0 {
        new_min = global.0;
    }

    (new_min, tmp_max)
}

fn window_patch(level: &PyramidLevel, cx: i32, cy: i32, half: (i32, i32)) -> Patch {
    let w = (2 * half.0 + 1) as usize;
    let h = (2 * half.1 + 1) as usize;
    let mut data = Vec::with_capacity(w * h);
    for y in (cy - half.1)..=(cy + half.1) {
        for x in (cx - half.0)..=(cx + half.0) {
            data.push(level.get(x, y));
        }
    }
    Patch::from_u8(data, w, h)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_windows_are_rounded_up() {
        assert_eq!(odd_win_size((10, 4)), (11, 5));
        assert_eq!(odd_win_size((15, 3)), (15, 3));
        assert_eq!(odd_win_size((8, 9)), (9, 9));
    }

    #[test]
    fn test_scaled_bounds_negate_and_divide() {
        assert_eq!(scaled_bounds(0, 64, 4), (0, -16));
        assert_eq!(scaled_bounds(2, 64, 2), (-1, -32));
    }

    #[test]
    fn test_clamp_shrinks_left_overflow() {
        // The far end of the range would read left of column 0 and gives
        // up exactly the overflowing columns.
        let (local_min, local_max) = clamp_to_level(0, -16, 10, 2, 100);
        assert_eq!(local_min, 0);
        assert_eq!(local_max, -7);
    }

    #[test]
    fn test_clamp_shrinks_right_overflow() {
        // cx + half + 1 lands exactly on the image width.
        let (local_min, local_max) = clamp_to_level(0, -16, 97, 2, 100);
        assert_eq!(local_min, -1);
        assert_eq!(local_max, -16);
    }

    #[test]
    fn test_clamp_collapses_inverted_range() {
        let (local_min, local_max) = clamp_to_level(0, -2, 2, 2, 100);
        assert_eq!(local_min, local_max);
    }

    #[test]
    fn test_recentering_narrows_and_stays_in_bounds() {
        for level in 1..=3 {
            let inv = 1 << level;
            for best_index in 0..32 {
                let (new_min, new_max) = recentered_bounds(0, best_index, level, (0, 64));

                assert!(new_min >= 0);
                assert!(new_max <= 64);
                // One step on each side of the winner at this scale, plus
                // the remainder trim, never widens past the next level's
                // doubled range.
                assert!(new_max - new_min <= 2 * inv + 2 * level);
            }
        }
    }
}
