//! Depth preprocessing: downscale, hole fill, temporal average, motion mask

use std::collections::VecDeque;

use depthgrid::{DepthFrame, INVALID_DEPTH};
use ndarray::Array2;

use crate::settings::DepthUtilitySettings;

/// Turns a stream of raw depth frames into stable downscaled depth plus a
/// binary velocity mask marking motion seed candidates.
///
/// All history lives here; the output buffers are owned by the caller's
/// frame context and fully rewritten each frame.
#[derive(Debug)]
pub struct DepthUtility {
    settings: DepthUtilitySettings,
    width: usize,
    height: usize,
    full_width: usize,
    full_height: usize,

    mat_depth_filled: Array2<f32>,
    mat_depth_avg: Array2<f32>,
    mat_depth_vel: Array2<f32>,
    mat_depth_vel_erode: Array2<f32>,
    fill_scratch: Array2<f32>,
    filled_mask: Array2<u8>,
    history: VecDeque<Array2<f32>>,
}

impl DepthUtility {
    pub fn new(width: usize, height: usize, settings: DepthUtilitySettings) -> Self {
        let shape = (height, width);
        Self {
            settings,
            width,
            height,
            full_width: 0,
            full_height: 0,
            mat_depth_filled: Array2::zeros(shape),
            mat_depth_avg: Array2::zeros(shape),
            mat_depth_vel: Array2::zeros(shape),
            mat_depth_vel_erode: Array2::zeros(shape),
            fill_scratch: Array2::zeros(shape),
            filled_mask: Array2::zeros(shape),
            history: VecDeque::new(),
        }
    }

    /// Clear all temporal history. The next frame becomes the new baseline
    /// and produces an empty motion mask.
    pub fn reset(&mut self) {
        self.history.clear();
        self.mat_depth_filled.fill(0.0);
        self.mat_depth_avg.fill(0.0);
        self.mat_depth_vel.fill(0.0);
        self.mat_depth_vel_erode.fill(0.0);
    }

    pub fn mat_depth_filled(&self) -> &Array2<f32> {
        &self.mat_depth_filled
    }

    pub fn mat_depth_avg(&self) -> &Array2<f32> {
        &self.mat_depth_avg
    }

    pub fn mat_depth_vel(&self) -> &Array2<f32> {
        &self.mat_depth_vel
    }

    pub fn mat_depth_vel_erode(&self) -> &Array2<f32> {
        &self.mat_depth_vel_erode
    }

    /// Preprocess one raw frame into `mat_depth`, `mat_depth_full` and the
    /// velocity mask. Returns true when the input dimensions changed and the
    /// utility re-baselined itself.
    pub fn process_depth_to_velocity_signal(
        &mut self,
        frame: &DepthFrame,
        mat_depth: &mut Array2<f32>,
        mat_depth_full: &mut Array2<f32>,
        velocity_signal: &mut Array2<u8>,
    ) -> bool {
        let dimensions_changed =
            frame.width() != self.full_width || frame.height() != self.full_height;
        if dimensions_changed {
            log::debug!(
                "depth input changed to {}x{}, re-baselining",
                frame.width(),
                frame.height()
            );
            self.full_width = frame.width();
            self.full_height = frame.height();
            self.reset();
        }

        self.copy_full_size(frame, mat_depth_full);
        self.downscale(mat_depth_full, mat_depth);
        self.fill_holes(mat_depth);
        self.accumulate_average(mat_depth);
        self.compute_velocity(mat_depth);
        self.erode_velocity();
        self.threshold_signal(mat_depth, velocity_signal);

        dimensions_changed
    }

    fn copy_full_size(&self, frame: &DepthFrame, mat_depth_full: &mut Array2<f32>) {
        let out = mat_depth_full.as_slice_mut().unwrap();
        for (dst, &raw) in out.iter_mut().zip(frame.data()) {
            *dst = if raw == 0 { INVALID_DEPTH } else { raw as f32 };
        }
    }

    fn downscale(&self, mat_depth_full: &Array2<f32>, mat_depth: &mut Array2<f32>) {
        let stride_x = (self.full_width / self.width).max(1);
        let stride_y = (self.full_height / self.height).max(1);
        for y in 0..self.height {
            let src_y = (y * stride_y).min(self.full_height - 1);
            for x in 0..self.width {
                let src_x = (x * stride_x).min(self.full_width - 1);
                mat_depth[(y, x)] = mat_depth_full[(src_y, src_x)];
            }
        }
    }

    /// Small grayscale closing: pull the nearest valid surface into sentinel
    /// pixels, then relax filled pixels toward the farthest valid neighbor.
    fn fill_holes(&mut self, mat_depth: &Array2<f32>) {
        self.filled_mask.fill(0);
        for y in 0..self.height {
            for x in 0..self.width {
                let d = mat_depth[(y, x)];
                if d < INVALID_DEPTH {
                    self.mat_depth_filled[(y, x)] = d;
                    continue;
                }
                let mut best = INVALID_DEPTH;
                for ny in y.saturating_sub(1)..=(y + 1).min(self.height - 1) {
                    for nx in x.saturating_sub(1)..=(x + 1).min(self.width - 1) {
                        best = best.min(mat_depth[(ny, nx)]);
                    }
                }
                self.mat_depth_filled[(y, x)] = best;
                if best < INVALID_DEPTH {
                    self.filled_mask[(y, x)] = 1;
                }
            }
        }

        self.fill_scratch.assign(&self.mat_depth_filled);
        for y in 0..self.height {
            for x in 0..self.width {
                if self.filled_mask[(y, x)] == 0 {
                    continue;
                }
                let mut farthest = self.fill_scratch[(y, x)];
                for ny in y.saturating_sub(1)..=(y + 1).min(self.height - 1) {
                    for nx in x.saturating_sub(1)..=(x + 1).min(self.width - 1) {
                        let d = self.fill_scratch[(ny, nx)];
                        if d < INVALID_DEPTH {
                            farthest = farthest.max(d);
                        }
                    }
                }
                self.mat_depth_filled[(y, x)] = farthest;
            }
        }
    }

    /// Ring the raw downscaled frames and average them per pixel.
    fn accumulate_average(&mut self, mat_depth: &Array2<f32>) {
        // Recycle the oldest ring entry instead of reallocating.
        if self.history.len() == self.settings.depth_smoothing_frames {
            let mut recycled = self.history.pop_front().unwrap();
            recycled.assign(mat_depth);
            self.history.push_back(recycled);
        } else {
            self.history.push_back(mat_depth.clone());
        }

        self.mat_depth_avg.fill(0.0);
        for past in &self.history {
            self.mat_depth_avg += past;
        }
        let count = self.history.len() as f32;
        self.mat_depth_avg.mapv_inplace(|v| v / count);
    }

    fn compute_velocity(&mut self, mat_depth: &Array2<f32>) {
        let cap = self.settings.max_velocity;
        for ((depth, avg), vel) in mat_depth
            .iter()
            .zip(self.mat_depth_avg.iter())
            .zip(self.mat_depth_vel.iter_mut())
        {
            *vel = (depth - avg).abs().min(cap);
        }
    }

    /// Grayscale erosion (window minimum) suppresses isolated motion pixels.
    fn erode_velocity(&mut self) {
        let radius = self.settings.erosion_size;
        for y in 0..self.height {
            for x in 0..self.width {
                let mut minimum = self.mat_depth_vel[(y, x)];
                for ny in y.saturating_sub(radius)..=(y + radius).min(self.height - 1) {
                    for nx in x.saturating_sub(radius)..=(x + radius).min(self.width - 1) {
                        minimum = minimum.min(self.mat_depth_vel[(ny, nx)]);
                    }
                }
                self.mat_depth_vel_erode[(y, x)] = minimum;
            }
        }
    }

    fn threshold_signal(&self, mat_depth: &Array2<f32>, velocity_signal: &mut Array2<u8>) {
        let s = &self.settings;
        for ((erode, depth), signal) in self
            .mat_depth_vel_erode
            .iter()
            .zip(mat_depth.iter())
            .zip(velocity_signal.iter_mut())
        {
            *signal = u8::from(*erode > s.velocity_threshold && *depth >= s.min_depth && *depth <= s.max_depth);
        }
    }
}
