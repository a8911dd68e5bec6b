//! Summed-area table over per-pixel values

use ndarray::Array2;

use crate::point::GridRect;

/// Integral image over an `(height, width)` grid of `f32` values, answering
/// rectangle sums in O(1). Sums accumulate in `f64`; single-precision
/// accumulation loses digits on grids past ~10k pixels.
#[derive(Debug, Clone)]
pub struct IntegralImage {
    /// Padded `(height+1, width+1)` cumulative sums; row/col 0 are zero.
    sums: Array2<f64>,
    width: usize,
    height: usize,
}

impl IntegralImage {
    pub fn from_values(values: &Array2<f32>) -> Self {
        let (height, width) = values.dim();
        let mut integral = Self {
            sums: Array2::zeros((height + 1, width + 1)),
            width,
            height,
        };
        integral.fill(values);
        integral
    }

    /// Rebuild from new values of the same dimensions, reusing the
    /// allocation. Reallocates only when dimensions changed.
    pub fn recompute(&mut self, values: &Array2<f32>) {
        let (height, width) = values.dim();
        if height != self.height || width != self.width {
            self.sums = Array2::zeros((height + 1, width + 1));
            self.width = width;
            self.height = height;
        }
        self.fill(values);
    }

    fn fill(&mut self, values: &Array2<f32>) {
        for y in 0..self.height {
            let mut row_sum = 0.0f64;
            for x in 0..self.width {
                row_sum += values[(y, x)] as f64;
                self.sums[(y + 1, x + 1)] = self.sums[(y, x + 1)] + row_sum;
            }
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Sum of values over `rect` (inclusive bounds, clamped to the grid).
    pub fn sum(&self, rect: GridRect) -> f32 {
        if self.width == 0 || self.height == 0 {
            return 0.0;
        }
        let x0 = rect.x0.min(self.width - 1);
        let y0 = rect.y0.min(self.height - 1);
        let x1 = rect.x1.min(self.width - 1);
        let y1 = rect.y1.min(self.height - 1);
        if x1 < x0 || y1 < y0 {
            return 0.0;
        }
        let total = self.sums[(y1 + 1, x1 + 1)] - self.sums[(y0, x1 + 1)] - self.sums[(y1 + 1, x0)]
            + self.sums[(y0, x0)];
        total as f32
    }
}
