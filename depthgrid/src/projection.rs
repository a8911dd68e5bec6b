//! Lens projection: pixel + depth to world millimeters and back

use nalgebra::Point3;

use crate::error::{GridError, Result};

/// Immutable per-stream lens parameters sufficient to convert between
/// `(pixel, depth)` and world coordinates in millimeters.
///
/// `xz_factor`/`yz_factor` are the tangent-derived horizontal and vertical
/// field factors of the lens, so that at depth `d` the full frame spans
/// `d * xz_factor` millimeters horizontally.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionCache {
    pub resolution_x: f32,
    pub resolution_y: f32,
    pub xz_factor: f32,
    pub yz_factor: f32,
}

impl ProjectionCache {
    pub fn new(resolution_x: f32, resolution_y: f32, xz_factor: f32, yz_factor: f32) -> Result<Self> {
        if resolution_x <= 0.0 || resolution_y <= 0.0 {
            return Err(GridError::projection(format!(
                "non-positive resolution {resolution_x}x{resolution_y}"
            )));
        }
        if xz_factor <= 0.0 || yz_factor <= 0.0 {
            return Err(GridError::projection(format!(
                "non-positive field factors {xz_factor}/{yz_factor}"
            )));
        }
        Ok(Self {
            resolution_x,
            resolution_y,
            xz_factor,
            yz_factor,
        })
    }

    /// Back-project a full-resolution pixel with a depth reading into world
    /// millimeters.
    #[inline]
    pub fn depth_to_world(&self, x: f32, y: f32, depth: f32) -> Point3<f32> {
        let normalized_x = x / self.resolution_x - 0.5;
        let normalized_y = 0.5 - y / self.resolution_y;
        Point3::new(
            normalized_x * depth * self.xz_factor,
            normalized_y * depth * self.yz_factor,
            depth,
        )
    }

    /// Exact inverse of [`depth_to_world`](Self::depth_to_world): world point
    /// to `(x, y, depth)` in full-resolution pixels. Returns the origin pixel
    /// for degenerate (non-positive depth) points.
    #[inline]
    pub fn world_to_depth(&self, world: &Point3<f32>) -> (f32, f32, f32) {
        let depth = world.z;
        if depth <= 0.0 {
            return (0.0, 0.0, depth);
        }
        let x = (world.x / (depth * self.xz_factor) + 0.5) * self.resolution_x;
        let y = (0.5 - world.y / (depth * self.yz_factor)) * self.resolution_y;
        (x, y, depth)
    }
}

/// Converts between processing-resolution pixels, physical millimeters at a
/// given depth, and world coordinates.
///
/// `scale` is the ratio of full camera width to processing width; processing
/// pixels are mapped into the lens model by multiplying through it.
#[derive(Debug, Clone, Copy)]
pub struct ScalingCoordinateMapper {
    cache: ProjectionCache,
    scale: f32,
}

impl ScalingCoordinateMapper {
    pub fn new(cache: ProjectionCache, scale: f32) -> Result<Self> {
        if scale <= 0.0 {
            return Err(GridError::projection(format!("non-positive scale {scale}")));
        }
        Ok(Self { cache, scale })
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn cache(&self) -> &ProjectionCache {
        &self.cache
    }

    /// Processing-resolution pixel + depth to world millimeters.
    #[inline]
    pub fn depth_to_world(&self, x: f32, y: f32, depth: f32) -> Point3<f32> {
        self.cache
            .depth_to_world(x * self.scale, y * self.scale, depth)
    }

    /// World point to processing-resolution pixel coordinates.
    #[inline]
    pub fn world_to_depth(&self, world: &Point3<f32>) -> (f32, f32, f32) {
        let (x, y, depth) = self.cache.world_to_depth(world);
        (x / self.scale, y / self.scale, depth)
    }

    /// Physical horizontal length at `depth` converted to processing-grid
    /// pixels. Zero when the depth is not positive.
    #[inline]
    pub fn mm_to_pixels(&self, depth: f32, mm: f32) -> f32 {
        if depth <= 0.0 {
            return 0.0;
        }
        mm * self.cache.resolution_x / (self.cache.xz_factor * depth * self.scale)
    }

    /// Processing-grid pixel length converted to physical millimeters at
    /// `depth`.
    #[inline]
    pub fn pixels_to_mm(&self, depth: f32, pixels: f32) -> f32 {
        pixels * self.scale * self.cache.xz_factor * depth / self.cache.resolution_x
    }

    /// Physical area covered by one processing-grid pixel at `depth`, in mm².
    /// Horizontal and vertical extents differ when the lens factors do.
    #[inline]
    pub fn pixel_area(&self, depth: f32) -> f32 {
        if depth <= 0.0 {
            return 0.0;
        }
        let mm_x = self.scale * self.cache.xz_factor * depth / self.cache.resolution_x;
        let mm_y = self.scale * self.cache.yz_factor * depth / self.cache.resolution_y;
        mm_x * mm_y
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn cache() -> ProjectionCache {
        // Roughly a 58x45 degree depth lens at 320x240.
        ProjectionCache::new(320.0, 240.0, 1.11, 0.83).unwrap()
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(ProjectionCache::new(0.0, 240.0, 1.0, 1.0).is_err());
        assert!(ProjectionCache::new(320.0, 240.0, -1.0, 1.0).is_err());
        assert!(ScalingCoordinateMapper::new(cache(), 0.0).is_err());
    }

    #[test]
    fn test_center_pixel_projects_on_axis() {
        let c = cache();
        let w = c.depth_to_world(160.0, 120.0, 1000.0);
        assert_abs_diff_eq!(w.x, 0.0, epsilon = 1e-4);
        assert_abs_diff_eq!(w.y, 0.0, epsilon = 1e-4);
        assert_abs_diff_eq!(w.z, 1000.0, epsilon = 1e-4);
    }

    #[test]
    fn test_round_trip_is_subpixel() {
        let c = cache();
        for &(x, y, d) in &[
            (0.0f32, 0.0f32, 500.0f32),
            (319.0, 239.0, 700.0),
            (77.0, 191.0, 1234.0),
            (160.0, 120.0, 4000.0),
        ] {
            let w = c.depth_to_world(x, y, d);
            let (rx, ry, rd) = c.world_to_depth(&w);
            assert_abs_diff_eq!(rx, x, epsilon = 1e-2);
            assert_abs_diff_eq!(ry, y, epsilon = 1e-2);
            assert_abs_diff_eq!(rd, d, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_scaled_round_trip() {
        let mapper = ScalingCoordinateMapper::new(cache(), 2.0).unwrap();
        let w = mapper.depth_to_world(40.0, 30.0, 800.0);
        let (x, y, d) = mapper.world_to_depth(&w);
        assert_abs_diff_eq!(x, 40.0, epsilon = 1e-2);
        assert_abs_diff_eq!(y, 30.0, epsilon = 1e-2);
        assert_abs_diff_eq!(d, 800.0, epsilon = 1e-3);
    }

    #[test]
    fn test_mm_pixel_conversions_invert() {
        let mapper = ScalingCoordinateMapper::new(cache(), 2.0).unwrap();
        let px = mapper.mm_to_pixels(700.0, 100.0);
        assert_abs_diff_eq!(mapper.pixels_to_mm(700.0, px), 100.0, epsilon = 1e-3);
        // Farther objects span fewer pixels.
        assert!(mapper.mm_to_pixels(1400.0, 100.0) < px);
        assert_eq!(mapper.mm_to_pixels(0.0, 100.0), 0.0);
    }

    #[test]
    fn test_pixel_area_grows_with_depth_squared() {
        let mapper = ScalingCoordinateMapper::new(cache(), 2.0).unwrap();
        let near = mapper.pixel_area(500.0);
        let far = mapper.pixel_area(1000.0);
        assert_abs_diff_eq!(far / near, 4.0, epsilon = 1e-3);
    }
}
