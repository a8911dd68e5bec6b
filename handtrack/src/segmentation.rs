//! Geometric plausibility tests and foreground extraction
//!
//! Given a seed pixel, the engine decides whether a hand-sized, hand-shaped
//! patch of foreground surrounds it, and if so extracts the connected region
//! and its area-weighted centroid. Every threshold is physical (mm / mm²)
//! and converted to pixels at the seed's depth, so the tests are
//! depth-invariant.

use std::collections::VecDeque;

use depthgrid::{GridRect, PixelPoint, ScalingCoordinateMapper};
use nalgebra::{Point3, Vector3};
use ndarray::Array2;

use crate::context::FrameContext;
use crate::settings::HandSettings;
use crate::types::{TestBehavior, TestPhase};

/// Eight compass directions used by ray walks.
const COMPASS: [(isize, isize); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

/// A connected foreground region extracted by [`segment_foreground`].
#[derive(Debug, Clone)]
pub struct Segment {
    /// Area-weighted centroid, back-projected to the processing grid
    pub centroid_pixel: PixelPoint,
    pub centroid_world: Point3<f32>,
    pub bounding_box: GridRect,
    pub pixel_count: usize,
    /// Physical surface area of the region (mm²)
    pub physical_area: f32,
}

/// Scan the velocity mask in row-major order from `search_start`, returning
/// the first set pixel not already searched. `search_start` advances past
/// the returned pixel so repeated calls iterate every seed exactly once.
pub fn find_next_velocity_seed_pixel(
    velocity_signal: &Array2<u8>,
    searched: &Array2<u8>,
    search_start: &mut PixelPoint,
) -> Option<PixelPoint> {
    let (height, width) = velocity_signal.dim();
    let mut index = search_start.y * width + search_start.x;
    let total = width * height;

    while index < total {
        let y = index / width;
        let x = index % width;
        if velocity_signal[(y, x)] != 0 && searched[(y, x)] == 0 {
            let next = index + 1;
            *search_start = PixelPoint::new(next % width, next / width);
            return Some(PixelPoint::new(x, y));
        }
        index += 1;
    }

    *search_start = PixelPoint::new(0, height);
    None
}

/// Depth at the pixel lies inside the usable range.
pub fn test_point_in_range(
    ctx: &FrameContext,
    settings: &HandSettings,
    p: PixelPoint,
    behavior: TestBehavior,
) -> bool {
    let depth = ctx.depth_at(p);
    let d = &settings.depth_utility;
    let pass = depth >= d.min_depth && depth <= d.max_depth;
    if behavior == TestBehavior::Log {
        log::trace!("range test at {p}: depth {depth:.0} -> {pass}");
    }
    pass
}

/// Foreground area inside a hand-sized window around the pixel, queried in
/// O(1) from the integral area image, lies inside the configured band.
pub fn test_point_area_integral(
    ctx: &FrameContext,
    mapper: &ScalingCoordinateMapper,
    settings: &HandSettings,
    p: PixelPoint,
    behavior: TestBehavior,
) -> bool {
    let depth = ctx.depth_at(p);
    let a = &settings.segmentation.area_test;
    let window_px = mapper.mm_to_pixels(depth, a.window_size_mm);
    let radius = ((window_px / 2.0).round() as usize).max(1);
    let rect = GridRect::window(p, radius, ctx.width(), ctx.height());
    let area = ctx.integral_area.sum(rect);
    let pass = area >= a.area_min && area <= a.area_max;
    if behavior == TestBehavior::Log {
        log::trace!(
            "area test at {p}: {area:.0} mm² in {}x{} window -> {pass}",
            rect.width(),
            rect.height()
        );
    }
    pass
}

/// Perimeter pixels of a circle, clipped to the grid. Midpoint rasterization
/// keeps the walk deterministic and allocation-light.
pub fn get_circumference_points(
    width: usize,
    height: usize,
    center: PixelPoint,
    radius_px: f32,
) -> Vec<PixelPoint> {
    let radius = radius_px.round() as isize;
    if radius < 1 {
        return Vec::new();
    }
    let cx = center.x as isize;
    let cy = center.y as isize;
    let mut points = Vec::new();
    let mut push = |px: isize, py: isize| {
        if px >= 0 && py >= 0 && (px as usize) < width && (py as usize) < height {
            points.push(PixelPoint::new(px as usize, py as usize));
        }
    };

    let mut x = radius;
    let mut y = 0isize;
    let mut err = 1 - radius;
    while x >= y {
        push(cx + x, cy + y);
        push(cx + y, cy + x);
        push(cx - y, cy + x);
        push(cx - x, cy + y);
        push(cx - x, cy - y);
        push(cx - y, cy - x);
        push(cx + y, cy - x);
        push(cx + x, cy - y);
        y += 1;
        if err < 0 {
            err += 2 * y + 1;
        } else {
            x -= 1;
            err += 2 * (y - x) + 1;
        }
    }
    points
}

/// Two concentric circles around the pixel must both be covered by in-band
/// foreground, the inner one more densely than the outer.
pub fn test_foreground_radius_percentage(
    ctx: &FrameContext,
    mapper: &ScalingCoordinateMapper,
    settings: &HandSettings,
    p: PixelPoint,
    behavior: TestBehavior,
) -> bool {
    let depth = ctx.depth_at(p);
    let band = settings.segmentation.segment_band_width;
    let c = &settings.segmentation.circumference_test;

    let mut percentages = [0.0f32; 2];
    for (slot, radius_mm) in [c.foreground_radius1, c.foreground_radius2].iter().enumerate() {
        let radius_px = mapper.mm_to_pixels(depth, *radius_mm);
        let points = get_circumference_points(ctx.width(), ctx.height(), p, radius_px);
        if points.is_empty() {
            if behavior == TestBehavior::Log {
                log::trace!("radius test at {p}: no samples at {radius_mm} mm -> false");
            }
            return false;
        }
        let in_band = points
            .iter()
            .filter(|q| (ctx.depth_at(**q) - depth).abs() < band)
            .count();
        percentages[slot] = in_band as f32 / points.len() as f32;
    }

    let pass =
        percentages[0] >= c.radius1_min_percent && percentages[1] >= c.radius2_min_percent;
    if behavior == TestBehavior::Log {
        log::trace!(
            "radius test at {p}: {:.2}/{:.2} vs {:.2}/{:.2} -> {pass}",
            percentages[0],
            percentages[1],
            c.radius1_min_percent,
            c.radius2_min_percent
        );
    }
    pass
}

/// Rays in the compass directions must leave the depth band within the
/// configured distance: a hand has bounded extent in most directions, with
/// a tolerance for the wrist.
pub fn test_natural_edges(
    ctx: &FrameContext,
    mapper: &ScalingCoordinateMapper,
    settings: &HandSettings,
    p: PixelPoint,
    behavior: TestBehavior,
) -> bool {
    let depth = ctx.depth_at(p);
    let band = settings.segmentation.segment_band_width;
    let e = &settings.segmentation.natural_edge_test;
    let width = ctx.width();
    let height = ctx.height();

    let mut passing = 0usize;
    for (dx, dy) in COMPASS {
        let step_px = ((dx * dx + dy * dy) as f32).sqrt();
        let step_mm = mapper.pixels_to_mm(depth, step_px);
        if step_mm <= 0.0 {
            continue;
        }
        let max_steps = (e.max_edge_distance / step_mm).ceil() as usize;

        let mut q = p;
        let mut terminated = false;
        for _ in 0..max_steps {
            match q.offset(dx, dy, width, height) {
                // Leaving the grid bounds the extent as well.
                None => {
                    terminated = true;
                    break;
                }
                Some(n) => {
                    if (ctx.depth_at(n) - depth).abs() >= band {
                        terminated = true;
                        break;
                    }
                    q = n;
                }
            }
        }
        if terminated {
            passing += 1;
        }
    }

    let pass = passing >= e.min_passing_rays;
    if behavior == TestBehavior::Log {
        log::trace!(
            "edge test at {p}: {passing}/8 rays within {:.0} mm -> {pass}",
            e.max_edge_distance
        );
    }
    pass
}

/// All four geometric tests, short-circuiting in the order the cheapest
/// failures come first.
pub fn point_passes_all_tests(
    ctx: &FrameContext,
    mapper: &ScalingCoordinateMapper,
    settings: &HandSettings,
    p: PixelPoint,
    behavior: TestBehavior,
) -> bool {
    test_point_in_range(ctx, settings, p, behavior)
        && test_point_area_integral(ctx, mapper, settings, p, behavior)
        && test_foreground_radius_percentage(ctx, mapper, settings, p, behavior)
        && test_natural_edges(ctx, mapper, settings, p, behavior)
}

/// Breadth-first flood fill from `seed`. A pixel joins the segment when its
/// depth is within the band of the seed's depth and its world point stays
/// within the segment radius of the seed's. The phase's searched mask doubles
/// as the visited set, so overlapping fills within one frame never compete
/// for the same pixels.
///
/// Returns `None` when the seed is out of range or the visited budget is
/// exhausted. The seed pixel is marked searched either way, so seed
/// iteration always advances.
pub fn segment_foreground(
    ctx: &mut FrameContext,
    mapper: &ScalingCoordinateMapper,
    settings: &HandSettings,
    phase: TestPhase,
    seed: PixelPoint,
) -> Option<Segment> {
    let width = ctx.width();
    let height = ctx.height();
    let seed_depth = ctx.depth_at(seed);
    let seed_world = ctx.world_at(seed);

    ctx.searched_mut(phase)[(seed.y, seed.x)] = 1;
    let d = &settings.depth_utility;
    if seed_depth < d.min_depth || seed_depth > d.max_depth {
        return None;
    }

    let band = settings.segmentation.segment_band_width;
    let max_radius = settings.segmentation.max_segment_radius;
    let budget = settings.segmentation.max_search_pixels;

    let ctx = &mut *ctx;
    let (searched, layer) = match phase {
        TestPhase::Update => (&mut ctx.update_searched, &mut ctx.update_segmentation),
        TestPhase::Create => (&mut ctx.create_searched, &mut ctx.create_segmentation),
    };
    let mat_depth = &ctx.mat_depth;
    let mat_area = &ctx.mat_area;
    let world_points = &ctx.world_points;

    let mut queue = VecDeque::new();
    queue.push_back(seed);

    let mut visited = 0usize;
    let mut pixel_count = 0usize;
    let mut area_total = 0.0f64;
    let mut weighted = Vector3::<f64>::zeros();
    let mut bbox = GridRect::new(seed.x, seed.y, seed.x, seed.y);

    while let Some(p) = queue.pop_front() {
        visited += 1;
        if visited > budget {
            return None;
        }

        layer[(p.y, p.x)] = 1;
        bbox.expand_to(p);
        pixel_count += 1;

        let area = mat_area[(p.y, p.x)] as f64;
        let world = world_points[p.y * width + p.x];
        area_total += area;
        weighted += Vector3::new(world.x as f64, world.y as f64, world.z as f64) * area;

        for (dx, dy) in [(1isize, 0isize), (-1, 0), (0, 1), (0, -1)] {
            let Some(n) = p.offset(dx, dy, width, height) else {
                continue;
            };
            if searched[(n.y, n.x)] != 0 {
                continue;
            }
            if (mat_depth[(n.y, n.x)] - seed_depth).abs() >= band {
                continue;
            }
            if (world_points[n.y * width + n.x] - seed_world).norm() > max_radius {
                continue;
            }
            searched[(n.y, n.x)] = 1;
            queue.push_back(n);
        }
    }

    let centroid_world = if area_total > 0.0 {
        Point3::new(
            (weighted.x / area_total) as f32,
            (weighted.y / area_total) as f32,
            (weighted.z / area_total) as f32,
        )
    } else {
        seed_world
    };
    let (cx, cy, _) = mapper.world_to_depth(&centroid_world);
    let centroid_pixel = PixelPoint::new(
        (cx.round() as isize).clamp(0, width as isize - 1) as usize,
        (cy.round() as isize).clamp(0, height as isize - 1) as usize,
    );

    write_edge_distances(layer, &mut ctx.layer_edge_distance, bbox);

    Some(Segment {
        centroid_pixel,
        centroid_world,
        bounding_box: bbox,
        pixel_count,
        physical_area: area_total as f32,
    })
}

/// Two-pass chamfer transform over the segment's bounding box: distance in
/// pixels from each segment pixel to the nearest non-segment pixel. Pixels
/// outside the bounding box count as background.
fn write_edge_distances(layer: &Array2<u8>, edge_distance: &mut Array2<f32>, bbox: GridRect) {
    const DIAG: f32 = std::f32::consts::SQRT_2;
    const FAR: f32 = f32::MAX / 4.0;

    let inside = |x: isize, y: isize, edge: &Array2<f32>| -> f32 {
        if x < bbox.x0 as isize || y < bbox.y0 as isize || x > bbox.x1 as isize || y > bbox.y1 as isize
        {
            0.0
        } else {
            edge[(y as usize, x as usize)]
        }
    };

    for y in bbox.y0..=bbox.y1 {
        for x in bbox.x0..=bbox.x1 {
            edge_distance[(y, x)] = if layer[(y, x)] != 0 { FAR } else { 0.0 };
        }
    }

    for y in bbox.y0..=bbox.y1 {
        for x in bbox.x0..=bbox.x1 {
            if layer[(y, x)] == 0 {
                continue;
            }
            let (xi, yi) = (x as isize, y as isize);
            let mut best = edge_distance[(y, x)];
            best = best.min(inside(xi - 1, yi, edge_distance) + 1.0);
            best = best.min(inside(xi, yi - 1, edge_distance) + 1.0);
            best = best.min(inside(xi - 1, yi - 1, edge_distance) + DIAG);
            best = best.min(inside(xi + 1, yi - 1, edge_distance) + DIAG);
            edge_distance[(y, x)] = best;
        }
    }

    for y in (bbox.y0..=bbox.y1).rev() {
        for x in (bbox.x0..=bbox.x1).rev() {
            if layer[(y, x)] == 0 {
                continue;
            }
            let (xi, yi) = (x as isize, y as isize);
            let mut best = edge_distance[(y, x)];
            best = best.min(inside(xi + 1, yi, edge_distance) + 1.0);
            best = best.min(inside(xi, yi + 1, edge_distance) + 1.0);
            best = best.min(inside(xi + 1, yi + 1, edge_distance) + DIAG);
            best = best.min(inside(xi - 1, yi + 1, edge_distance) + DIAG);
            edge_distance[(y, x)] = best;
        }
    }
}
