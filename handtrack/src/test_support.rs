//! Synthetic depth scenes shared by the unit tests

use depthgrid::{DepthFrame, ProjectionCache, ScalingCoordinateMapper, INVALID_DEPTH};
use ndarray::Array2;

use crate::context::FrameContext;
use crate::settings::HandSettings;

/// Lens model used throughout the tests: a 320x240 depth camera with a
/// roughly 58-degree horizontal field of view.
pub fn test_projection() -> ProjectionCache {
    ProjectionCache::new(320.0, 240.0, 1.11, 0.83).unwrap()
}

/// All-zero (no reading) raw frame.
pub fn empty_frame(width: usize, height: usize, index: u64) -> DepthFrame {
    DepthFrame::new(width, height, index, vec![0u16; width * height]).unwrap()
}

/// Raw frame with a constant-depth disk stamped on a no-reading background.
pub fn disk_frame(
    width: usize,
    height: usize,
    cx: usize,
    cy: usize,
    radius: usize,
    depth_mm: u16,
    index: u64,
) -> DepthFrame {
    let mut data = vec![0u16; width * height];
    stamp_disk(&mut data, width, height, cx, cy, radius, depth_mm);
    DepthFrame::new(width, height, index, data).unwrap()
}

/// Stamp a disk into an existing raw buffer (for multi-object scenes).
pub fn stamp_disk(
    data: &mut [u16],
    width: usize,
    height: usize,
    cx: usize,
    cy: usize,
    radius: usize,
    depth_mm: u16,
) {
    let r2 = (radius * radius) as isize;
    for y in 0..height {
        for x in 0..width {
            let dx = x as isize - cx as isize;
            let dy = y as isize - cy as isize;
            if dx * dx + dy * dy <= r2 {
                data[y * width + x] = depth_mm;
            }
        }
    }
}

/// Processing-resolution context with a disk already in `mat_depth` and the
/// common calculations done, ready for segmentation calls.
pub fn disk_context(
    settings: &HandSettings,
    cx: usize,
    cy: usize,
    radius: usize,
    depth_mm: f32,
) -> (FrameContext, ScalingCoordinateMapper) {
    let width = settings.processing_size_width;
    let height = settings.processing_size_height;
    let scale = 320.0 / width as f32;
    let mapper = ScalingCoordinateMapper::new(test_projection(), scale).unwrap();

    let mut ctx = FrameContext::new(width, height);
    ctx.ensure_full_size(320, 240);
    ctx.mat_depth = Array2::from_elem((height, width), INVALID_DEPTH);
    let r2 = (radius * radius) as isize;
    for y in 0..height {
        for x in 0..width {
            let dx = x as isize - cx as isize;
            let dy = y as isize - cy as isize;
            if dx * dx + dy * dy <= r2 {
                ctx.mat_depth[(y, x)] = depth_mm;
            }
        }
    }
    ctx.begin_frame();
    ctx.compute_common(
        &mapper,
        settings.depth_utility.min_depth,
        settings.depth_utility.max_depth,
    );
    (ctx, mapper)
}
