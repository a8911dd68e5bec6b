//! Per-frame matrix bundle shared by the pipeline stages
//!
//! All buffers are allocated once at construction (and on dimension change)
//! and re-zeroed at frame start, keeping allocation out of the per-frame
//! path. Stages borrow the context sequentially; there is no locking.

use depthgrid::{IntegralImage, PixelPoint, ScalingCoordinateMapper};
use nalgebra::Point3;
use ndarray::Array2;
use rayon::prelude::*;

use crate::types::TestPhase;

/// Everything the segmentation engine and point processor read and write
/// while processing one frame.
#[derive(Debug)]
pub struct FrameContext {
    width: usize,
    height: usize,
    full_width: usize,
    full_height: usize,

    /// Downscaled depth at processing resolution (mm, invalid = sentinel)
    pub mat_depth: Array2<f32>,
    /// Original-resolution depth (mm, invalid = sentinel)
    pub mat_depth_full: Array2<f32>,
    /// Binary motion mask; 1 marks a seed candidate
    pub velocity_signal: Array2<u8>,
    /// Physical area per pixel (mm²); zero outside the usable depth range
    pub mat_area: Array2<f32>,
    pub mat_area_sqrt: Array2<f32>,
    /// Summed-area table over `mat_area`
    pub integral_area: IntegralImage,
    /// Back-projection of every processing-resolution pixel, row-major
    pub world_points: Vec<Point3<f32>>,

    pub update_segmentation: Array2<u8>,
    pub create_segmentation: Array2<u8>,
    pub layer_edge_distance: Array2<f32>,
    pub update_searched: Array2<u8>,
    pub create_searched: Array2<u8>,
}

impl FrameContext {
    pub fn new(width: usize, height: usize) -> Self {
        let shape = (height, width);
        Self {
            width,
            height,
            full_width: 0,
            full_height: 0,
            mat_depth: Array2::zeros(shape),
            mat_depth_full: Array2::zeros((0, 0)),
            velocity_signal: Array2::zeros(shape),
            mat_area: Array2::zeros(shape),
            mat_area_sqrt: Array2::zeros(shape),
            integral_area: IntegralImage::from_values(&Array2::zeros(shape)),
            world_points: vec![Point3::origin(); width * height],
            update_segmentation: Array2::zeros(shape),
            create_segmentation: Array2::zeros(shape),
            layer_edge_distance: Array2::zeros(shape),
            update_searched: Array2::zeros(shape),
            create_searched: Array2::zeros(shape),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn full_width(&self) -> usize {
        self.full_width
    }

    pub fn full_height(&self) -> usize {
        self.full_height
    }

    /// Ratio of full to processing width.
    pub fn full_scale(&self) -> f32 {
        if self.width == 0 {
            return 1.0;
        }
        self.full_width as f32 / self.width as f32
    }

    /// (Re)allocate the full-resolution buffer. Returns true when the
    /// dimensions actually changed.
    pub fn ensure_full_size(&mut self, full_width: usize, full_height: usize) -> bool {
        if full_width == self.full_width && full_height == self.full_height {
            return false;
        }
        self.full_width = full_width;
        self.full_height = full_height;
        self.mat_depth_full = Array2::zeros((full_height, full_width));
        true
    }

    /// Zero every frame-scoped layer and mask. The depth and velocity
    /// buffers are fully rewritten by the depth utility instead.
    pub fn begin_frame(&mut self) {
        self.update_segmentation.fill(0);
        self.create_segmentation.fill(0);
        self.layer_edge_distance.fill(0.0);
        self.update_searched.fill(0);
        self.create_searched.fill(0);
    }

    /// Fill the world-point grid, per-pixel area maps and the integral area
    /// image for the current depth. Must run once per frame before any
    /// geometric test touches the context.
    pub fn compute_common(
        &mut self,
        mapper: &ScalingCoordinateMapper,
        min_depth: f32,
        max_depth: f32,
    ) {
        let width = self.width;
        if self.world_points.len() != width * self.height {
            self.world_points = vec![Point3::origin(); width * self.height];
        }

        let depth = &self.mat_depth;
        self.world_points
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, world) in row.iter_mut().enumerate() {
                    *world = mapper.depth_to_world(x as f32, y as f32, depth[(y, x)]);
                }
            });

        let area = self.mat_area.as_slice_mut().unwrap();
        area.par_chunks_mut(width).enumerate().for_each(|(y, row)| {
            for (x, cell) in row.iter_mut().enumerate() {
                let d = depth[(y, x)];
                *cell = if d >= min_depth && d <= max_depth {
                    mapper.pixel_area(d)
                } else {
                    0.0
                };
            }
        });

        let area = &self.mat_area;
        let area_sqrt = self.mat_area_sqrt.as_slice_mut().unwrap();
        area_sqrt
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, cell) in row.iter_mut().enumerate() {
                    *cell = area[(y, x)].sqrt();
                }
            });

        self.integral_area.recompute(&self.mat_area);
    }

    #[inline]
    pub fn in_bounds(&self, p: PixelPoint) -> bool {
        p.x < self.width && p.y < self.height
    }

    #[inline]
    pub fn depth_at(&self, p: PixelPoint) -> f32 {
        self.mat_depth[(p.y, p.x)]
    }

    #[inline]
    pub fn world_at(&self, p: PixelPoint) -> Point3<f32> {
        self.world_points[p.y * self.width + p.x]
    }

    pub fn searched(&self, phase: TestPhase) -> &Array2<u8> {
        match phase {
            TestPhase::Update => &self.update_searched,
            TestPhase::Create => &self.create_searched,
        }
    }

    pub fn searched_mut(&mut self, phase: TestPhase) -> &mut Array2<u8> {
        match phase {
            TestPhase::Update => &mut self.update_searched,
            TestPhase::Create => &mut self.create_searched,
        }
    }

    pub fn segmentation_layer(&self, phase: TestPhase) -> &Array2<u8> {
        match phase {
            TestPhase::Update => &self.update_segmentation,
            TestPhase::Create => &self.create_segmentation,
        }
    }
}
