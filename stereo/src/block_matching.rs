//! Dense block-matching stereo.
//!
//! This is the workspace's off-the-shelf dense primitive; the sparse engine
//! in [`crate::correspond`] does not depend on it.

use image::GrayImage;
use rayon::prelude::*;

use parallax_core::{Error, Result};

use crate::cost::{sad_u8, ssd_u8, MatchingCost};
use crate::DisparityMap;

/// Dense block matcher over full rectified frames.
pub struct BlockMatcher {
    pub block_size: usize,
    pub min_disparity: i32,
    pub max_disparity: i32,
    pub cost: MatchingCost,
    /// A match is kept only when the runner-up cost (outside the winner's
    /// immediate neighborhood) exceeds the winner's by this fraction.
    pub uniqueness_ratio: f32,
}

impl Default for BlockMatcher {
    fn default() -> Self {
        Self {
            block_size: 11,
            min_disparity: 0,
            max_disparity: 64,
            cost: MatchingCost::Sad,
            uniqueness_ratio: 0.15,
        }
    }
}

impl BlockMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_block_size(mut self, size: usize) -> Self {
        self.block_size = size;
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

    pub fn with_uniqueness_ratio(mut self, ratio: f32) -> Self {
        self.uniqueness_ratio = ratio;
        self
    }

    pub fn compute(&self, left: &GrayImage, right: &GrayImage) -> Result<DisparityMap> {
        if left.dimensions() != right.dimensions() {
            return Err(Error::DimensionMismatch(
                "left and right images must have the same dimensions".to_string(),
            ));
        }
        if self.min_disparity < 0 || self.max_disparity < self.min_disparity {
            return Err(Error::InvalidInput(format!(
                "invalid disparity bounds [{}, {}]",
                self.min_disparity, self.max_disparity
            )));
        }

        let width = left.width() as i32;
        let height = left.height() as i32;
        let width_usize = left.width() as usize;
        let half_block = (self.block_size / 2) as i32;

        let left_data = left.as_raw();
        let right_data = right.as_raw();

        let mut disparity = DisparityMap::new(
            left.width(),
            left.height(),
            self.min_disparity,
            self.max_disparity,
        );

        // Row-parallel: each output row is written by exactly one task.
        disparity
            .data
            .par_chunks_mut(width_usize)
            .enumerate()
            .for_each(|(y_usize, row)| {
                let y = y_usize as i32;
                if y < half_block || y >= height - half_block {
                    return;
                }
                let mut costs = Vec::with_capacity((self.max_disparity - self.min_disparity + 1) as usize);
                for x in half_block..width - half_block {
                    row[x as usize] = self.find_best_disparity(
                        left_data,
                        right_data,
                        width_usize,
                        x,
                        y,
                        half_block,
                        &mut costs,
                    );
                }
            });

        Ok(disparity)
    }

    #[allow(clippy::too_many_arguments)]
    fn find_best_disparity(
        &self,
        left_data: &[u8],
        right_data: &[u8],
        width: usize,
        x: i32,
        y: i32,
        half_block: i32,
        costs: &mut Vec<f32>,
    ) -> f32 {
        // Clamp the search so every right-image read stays in bounds.
        let min_valid = (x + half_block - (width as i32 - 1)).max(self.min_disparity);
        let max_valid = (x - half_block).min(self.max_disparity);
        if min_valid > max_valid {
            return -1.0;
        }

        costs.clear();
        let mut best_cost = f32::INFINITY;
        let mut best_disparity = min_valid;

        for d in min_valid..=max_valid {
            let cost = self.block_cost(left_data, right_data, width, x, y, d, half_block);
            costs.push(cost);
            if cost < best_cost {
                best_cost = cost;
                best_disparity = d;
            }
        }

        // Uniqueness: the best cost must beat everything outside its
        // immediate neighborhood by the configured margin.
        let mut runner_up = f32::INFINITY;
        for (i, &cost) in costs.iter().enumerate() {
            let d = min_valid + i as i32;
            if (d - best_disparity).abs() > 1 && cost < runner_up {
                runner_up = cost;
            }
        }
        if runner_up < best_cost * (1.0 + self.uniqueness_ratio) {
            return -1.0;
        }

        best_disparity as f32
    }

    #[allow(clippy::too_many_arguments)]
    fn block_cost(
        &self,
        left_data: &[u8],
        right_data: &[u8],
        width: usize,
        x: i32,
        y: i32,
        disparity: i32,
        half_block: i32,
    ) -> f32 {
        let row_len = (2 * half_block + 1) as usize;
        let mut cost = 0.0f32;
        for dy in -half_block..=half_block {
            let ly = (y + dy) as usize;
            let l0 = ly * width + (x - half_block) as usize;
            let r0 = ly * width + (x - half_block - disparity) as usize;
            let l = &left_data[l0..l0 + row_len];
            let r = &right_data[r0..r0 + row_len];
            cost += match self.cost {
                MatchingCost::Ssd => ssd_u8(l, r),
                MatchingCost::Sad => sad_u8(l, r),
            };
        }
        cost
    }
}

/// Full disparity map from a rectified pair through the standard
/// configuration (15x15 blocks, disparities 0..64, 15% uniqueness).
pub fn disparity_from_stereo_images(left: &GrayImage, right: &GrayImage) -> Result<DisparityMap> {
    BlockMatcher::new()
        .with_block_size(15)
        .with_disparity_range(0, 64)
        .with_uniqueness_ratio(0.15)
        .compute(left, right)
}
