//! Tracked-point database and lifecycle state machine
//!
//! Points are keyed by their tracking id in a `BTreeMap`; ids come from a
//! monotonically increasing counter, so map order is insertion order and
//! every ascending iteration doubles as the emission and tie-breaking order.

use std::collections::BTreeMap;

use depthgrid::{GridRect, PixelPoint, ScalingCoordinateMapper};
use nalgebra::{Point3, Vector3};

use crate::context::FrameContext;
use crate::segmentation::{point_passes_all_tests, segment_foreground};
use crate::settings::HandSettings;
use crate::types::{TestBehavior, TestPhase, TrackedPoint, TrackingStatus};

#[derive(Debug)]
pub struct PointProcessor {
    settings: HandSettings,
    points: BTreeMap<u32, TrackedPoint>,
    next_tracking_id: u32,
}

impl PointProcessor {
    pub fn new(settings: HandSettings) -> Self {
        Self {
            settings,
            points: BTreeMap::new(),
            next_tracking_id: 1,
        }
    }

    /// Drop all points. Ids keep counting up; they are never reused within
    /// the process lifetime.
    pub fn reset(&mut self) {
        self.points.clear();
    }

    pub fn points(&self) -> &BTreeMap<u32, TrackedPoint> {
        &self.points
    }

    /// Fill the per-frame derived matrices. Must run before any test or
    /// segmentation call of the frame.
    pub fn initialize_common_calculations(
        &self,
        ctx: &mut FrameContext,
        mapper: &ScalingCoordinateMapper,
    ) {
        let d = &self.settings.depth_utility;
        ctx.compute_common(mapper, d.min_depth, d.max_depth);
    }

    /// Evolve every existing point against the current frame. Runs before
    /// seed creation so a briefly lost hand is recovered by its own update
    /// rather than respawned under a fresh id.
    pub fn update_tracked_points(&mut self, ctx: &mut FrameContext, mapper: &ScalingCoordinateMapper) {
        let ids: Vec<u32> = self.points.keys().copied().collect();
        for point in self.points.values_mut() {
            point.updated_this_frame = false;
        }
        for id in ids {
            self.update_tracked_point(ctx, mapper, id, None);
        }
    }

    fn update_tracked_point(
        &mut self,
        ctx: &mut FrameContext,
        mapper: &ScalingCoordinateMapper,
        id: u32,
        seed_override: Option<PixelPoint>,
    ) {
        let Some(point) = self.points.get(&id) else {
            return;
        };
        if point.is_dead() || point.updated_this_frame {
            return;
        }

        let s = self.settings.point_processor.clone();
        let status = point.status;
        let position = point.position;
        let last_world = point.world_position;

        // A Lost point past its recovery window may no longer come back.
        let recovery_allowed =
            status != TrackingStatus::Lost || point.inactive_frame_count < s.lost_timeout;

        let anchor = if recovery_allowed {
            seed_override.or_else(|| self.find_update_anchor(ctx, mapper, position, last_world))
        } else {
            None
        };

        let segment = anchor.and_then(|anchor| {
            if point_passes_all_tests(ctx, mapper, &self.settings, anchor, TestBehavior::Silent) {
                segment_foreground(ctx, mapper, &self.settings, TestPhase::Update, anchor)
            } else {
                None
            }
        });

        let point = self.points.get_mut(&id).unwrap();
        match segment {
            Some(segment) => {
                point.position = segment.centroid_pixel;
                point.world_position = segment.centroid_world;
                point.inactive_frame_count = 0;
                point.failed_test_count = 0;
                point.consecutive_tracked = point.consecutive_tracked.saturating_add(1);
                point.updated_this_frame = true;
                point.status = match point.status {
                    TrackingStatus::Candidate => {
                        if point.consecutive_tracked >= s.second_chance_min_frames {
                            log::debug!("point {id} promoted to tracking");
                            TrackingStatus::Tracking
                        } else {
                            TrackingStatus::Candidate
                        }
                    }
                    TrackingStatus::Lost => {
                        log::debug!("point {id} recovered");
                        TrackingStatus::Tracking
                    }
                    other => other,
                };
            }
            None => {
                point.failed_test_count += 1;
                point.inactive_frame_count += 1;
                point.consecutive_tracked = 0;
                if point.status == TrackingStatus::Tracking {
                    log::debug!("point {id} lost");
                    point.status = TrackingStatus::Lost;
                }
                if point.failed_test_count >= s.max_failed_tests
                    || point.inactive_frame_count >= s.dead_timeout
                {
                    point.status = TrackingStatus::Dead;
                }
            }
        }
    }

    /// Pick the update seed: the in-range, in-band pixel nearest in depth to
    /// the point's previous depth, within a window sized to the recovery
    /// radius at that depth. Depth ties go to the pixel closest to the
    /// previous position, so an unmoved hand is re-anchored at its own
    /// centroid.
    fn find_update_anchor(
        &self,
        ctx: &FrameContext,
        mapper: &ScalingCoordinateMapper,
        position: PixelPoint,
        last_world: Point3<f32>,
    ) -> Option<PixelPoint> {
        let d = &self.settings.depth_utility;
        let band = self.settings.segmentation.segment_band_width;
        let last_depth = last_world.z;
        let radius = mapper
            .mm_to_pixels(last_depth, self.settings.point_processor.recover_world_radius)
            .round() as usize;
        let rect = GridRect::window(position, radius.max(1), ctx.width(), ctx.height());

        let mut best: Option<(f32, isize, PixelPoint)> = None;
        for y in rect.y0..=rect.y1 {
            for x in rect.x0..=rect.x1 {
                let depth = ctx.mat_depth[(y, x)];
                if depth < d.min_depth || depth > d.max_depth {
                    continue;
                }
                let diff = (depth - last_depth).abs();
                if diff >= band {
                    continue;
                }
                let dx = x as isize - position.x as isize;
                let dy = y as isize - position.y as isize;
                let dist2 = dx * dx + dy * dy;
                let better = best.map_or(true, |(best_diff, best_dist2, _)| {
                    diff < best_diff || (diff == best_diff && dist2 < best_dist2)
                });
                if better {
                    best = Some((diff, dist2, PixelPoint::new(x, y)));
                }
            }
        }
        best.map(|(_, _, p)| p)
    }

    /// O(n²) pairwise duplicate scan; of two points within the duplicate
    /// radius the lower id survives.
    pub fn remove_duplicate_points(&mut self) {
        let ids: Vec<u32> = self.points.keys().copied().collect();
        for i in 0..ids.len() {
            let a = ids[i];
            if self.points[&a].is_dead() {
                continue;
            }
            let world_a = self.points[&a].world_position;
            for &b in &ids[i + 1..] {
                let other = &self.points[&b];
                if other.is_dead() {
                    continue;
                }
                if (other.world_position - world_a).norm()
                    <= self.settings.point_processor.duplicate_world_radius
                {
                    log::debug!("point {b} is a duplicate of {a}");
                    self.points.get_mut(&b).unwrap().status = TrackingStatus::Dead;
                }
            }
        }
    }

    /// Handle one motion seed: recover the nearest existing point if one is
    /// close enough in world space, otherwise attempt to create a candidate.
    pub fn update_or_create_from_seed(
        &mut self,
        ctx: &mut FrameContext,
        mapper: &ScalingCoordinateMapper,
        seed: PixelPoint,
    ) {
        if !ctx.in_bounds(seed) {
            return;
        }
        // Mark the seed searched up front so the seed scan always advances,
        // whatever the tests below decide.
        ctx.create_searched[(seed.y, seed.x)] = 1;
        let seed_world = ctx.world_at(seed);

        let s = self.settings.point_processor.clone();
        let mut closest: Option<(f32, u32)> = None;
        for (id, point) in &self.points {
            if point.is_dead() {
                continue;
            }
            let dist = (point.world_position - seed_world).norm();
            if dist <= s.recover_world_radius && closest.map_or(true, |(best, _)| dist < best) {
                closest = Some((dist, *id));
            }
        }
        if let Some((_, id)) = closest {
            self.update_tracked_point(ctx, mapper, id, Some(seed));
            return;
        }

        if !point_passes_all_tests(ctx, mapper, &self.settings, seed, TestBehavior::Silent) {
            return;
        }
        let Some(segment) = segment_foreground(ctx, mapper, &self.settings, TestPhase::Create, seed)
        else {
            return;
        };
        if segment.centroid_world.z <= 0.0 {
            return;
        }

        let id = self.next_tracking_id;
        self.next_tracking_id += 1;
        log::debug!(
            "created candidate {id} at {} ({:.0} mm, {:.0} mm²)",
            segment.centroid_pixel,
            segment.centroid_world.z,
            segment.physical_area
        );
        self.points.insert(
            id,
            TrackedPoint::new_candidate(
                id,
                segment.centroid_pixel,
                segment.centroid_world,
                ctx.full_scale(),
            ),
        );
    }

    /// Evict terminal points at the end of the frame.
    pub fn remove_old_or_dead_points(&mut self) {
        let dead_timeout = self.settings.point_processor.dead_timeout;
        self.points.retain(|id, point| {
            let keep = !point.is_dead() && point.inactive_frame_count <= dead_timeout;
            if !keep {
                log::debug!("removing point {id} ({})", point.status);
            }
            keep
        });
    }

    /// Re-locate each live point inside a full-resolution window and store
    /// the refined pixel and world positions. Falls back to the
    /// working-resolution values when the window holds no foreground, or for
    /// the whole frame after a dimension change.
    pub fn update_full_resolution_points(
        &mut self,
        ctx: &FrameContext,
        full_mapper: &ScalingCoordinateMapper,
        drop_full_size: bool,
    ) {
        let scale = ctx.full_scale();
        let full_width = ctx.full_width();
        let full_height = ctx.full_height();
        let band = self.settings.segmentation.segment_band_width;
        let max_radius = self.settings.segmentation.max_segment_radius;
        let radius = (self.settings.point_processor.full_size_window_side / 2).max(1);

        for point in self.points.values_mut() {
            if point.is_dead() {
                continue;
            }
            let center = PixelPoint::new(
                ((point.position.x as f32 * scale) as usize).min(full_width.saturating_sub(1)),
                ((point.position.y as f32 * scale) as usize).min(full_height.saturating_sub(1)),
            );
            point.full_size_position = center;
            point.full_size_world_position = point.world_position;
            if drop_full_size || full_width == 0 || full_height == 0 {
                continue;
            }

            let rect = GridRect::window(center, radius, full_width, full_height);
            let reference = point.world_position;
            let mut area_total = 0.0f64;
            let mut weighted = Vector3::<f64>::zeros();
            for y in rect.y0..=rect.y1 {
                for x in rect.x0..=rect.x1 {
                    let depth = ctx.mat_depth_full[(y, x)];
                    if (depth - reference.z).abs() >= band {
                        continue;
                    }
                    let world = full_mapper.depth_to_world(x as f32, y as f32, depth);
                    if (world - reference).norm() > max_radius {
                        continue;
                    }
                    let area = full_mapper.pixel_area(depth) as f64;
                    area_total += area;
                    weighted += Vector3::new(world.x as f64, world.y as f64, world.z as f64) * area;
                }
            }

            if area_total > 0.0 {
                let refined = Point3::new(
                    (weighted.x / area_total) as f32,
                    (weighted.y / area_total) as f32,
                    (weighted.z / area_total) as f32,
                );
                let (x, y, _) = full_mapper.world_to_depth(&refined);
                point.full_size_position = PixelPoint::new(
                    (x.round() as isize).clamp(0, full_width as isize - 1) as usize,
                    (y.round() as isize).clamp(0, full_height as isize - 1) as usize,
                );
                point.full_size_world_position = refined;
            }
        }
    }

    /// Push the frame's world positions into the trajectory rings and
    /// refresh the delta fields.
    pub fn update_trajectories(&mut self) {
        let capacity = self.settings.point_processor.trajectory_history_length;
        for point in self.points.values_mut() {
            if point.is_dead() {
                continue;
            }
            point.record_trajectory(capacity);
        }
    }

    #[cfg(test)]
    fn insert_for_test(&mut self, point: TrackedPoint) {
        self.next_tracking_id = self.next_tracking_id.max(point.tracking_id + 1);
        self.points.insert(point.tracking_id, point);
    }
}
