//! Hand tracker facade: the single per-frame entry point
//!
//! The collaborator owns this struct and calls [`HandTracker::on_frame`]
//! with each depth frame plus the stream's projection cache; the tracker
//! answers with a fixed-length hand frame. Stage order within a frame is
//! part of the contract: preprocess, common calculations, update existing
//! points, duplicate removal, seed creation, eviction, full-resolution
//! refinement, trajectories.

use depthgrid::{DepthFrame, PixelPoint, ProjectionCache, ScalingCoordinateMapper};
use ndarray::Array2;
use num::cast;

use crate::context::FrameContext;
use crate::depth_utility::DepthUtility;
use crate::error::Result;
use crate::point_processor::PointProcessor;
use crate::segmentation;
use crate::settings::HandSettings;
use crate::types::{DebugHandViewType, HandFrame, HandRecord, TrackedPoint, TrackingStatus};

pub struct HandTracker {
    settings: HandSettings,
    depth_utility: DepthUtility,
    ctx: FrameContext,
    processor: PointProcessor,
    hand_consumers: bool,
    debug_consumers: bool,
}

impl HandTracker {
    /// Build a tracker, rejecting invalid settings so the pipeline never
    /// starts in an inconsistent state. All matrices are allocated here.
    pub fn new(settings: HandSettings) -> Result<Self> {
        settings.validate()?;
        let width = settings.processing_size_width;
        let height = settings.processing_size_height;
        log::info!("hand tracker starting, processing resolution {width}x{height}");
        Ok(Self {
            depth_utility: DepthUtility::new(width, height, settings.depth_utility.clone()),
            ctx: FrameContext::new(width, height),
            processor: PointProcessor::new(settings.clone()),
            settings,
            hand_consumers: true,
            debug_consumers: false,
        })
    }

    pub fn settings(&self) -> &HandSettings {
        &self.settings
    }

    /// Drop all temporal state: depth history and tracked points. Tracking
    /// ids keep counting up.
    pub fn reset(&mut self) {
        log::info!("hand tracker reset");
        self.depth_utility.reset();
        self.processor.reset();
    }

    /// Mirror of the output streams' connection state. With no consumer on
    /// either stream a frame is skipped right after preprocessing.
    pub fn set_hand_consumers(&mut self, connected: bool) {
        self.hand_consumers = connected;
    }

    pub fn set_debug_consumers(&mut self, connected: bool) {
        self.debug_consumers = connected;
    }

    pub fn has_consumers(&self) -> bool {
        self.hand_consumers || self.debug_consumers
    }

    /// Live tracked points, in ascending id order.
    pub fn tracked_points(&self) -> impl Iterator<Item = &TrackedPoint> + '_ {
        self.processor.points().values()
    }

    /// Process one depth frame and emit the hand records.
    pub fn on_frame(
        &mut self,
        frame: &DepthFrame,
        projection: &ProjectionCache,
    ) -> Result<HandFrame> {
        let scale = frame.width() as f32 / self.settings.processing_size_width as f32;
        let mapper = ScalingCoordinateMapper::new(*projection, scale)?;
        let full_mapper = ScalingCoordinateMapper::new(*projection, 1.0)?;

        self.ctx.ensure_full_size(frame.width(), frame.height());
        let dimensions_changed = self.depth_utility.process_depth_to_velocity_signal(
            frame,
            &mut self.ctx.mat_depth,
            &mut self.ctx.mat_depth_full,
            &mut self.ctx.velocity_signal,
        );

        if !self.has_consumers() {
            return Ok(HandFrame::empty(
                frame.frame_index(),
                self.settings.point_processor.max_hand_count,
            ));
        }

        self.ctx.begin_frame();
        self.processor
            .initialize_common_calculations(&mut self.ctx, &mapper);

        // Update existing points before considering new seeds, so a briefly
        // lost point is recovered instead of respawned under a fresh id.
        self.processor.update_tracked_points(&mut self.ctx, &mapper);
        self.processor.remove_duplicate_points();

        let mut next_search = PixelPoint::new(0, 0);
        while let Some(seed) = segmentation::find_next_velocity_seed_pixel(
            &self.ctx.velocity_signal,
            &self.ctx.create_searched,
            &mut next_search,
        ) {
            self.processor
                .update_or_create_from_seed(&mut self.ctx, &mapper, seed);
        }

        self.processor.remove_old_or_dead_points();
        self.processor
            .update_full_resolution_points(&self.ctx, &full_mapper, dimensions_changed);
        self.processor.update_trajectories();

        let hand_frame = self.generate_hand_frame(frame.frame_index());
        log::debug!(
            "frame {}: {} live points, {} emitted",
            frame.frame_index(),
            self.processor.points().len(),
            hand_frame.hand_count
        );
        Ok(hand_frame)
    }

    fn generate_hand_frame(&self, frame_index: u64) -> HandFrame {
        let s = &self.settings.point_processor;
        let mut hand_frame = HandFrame::empty(frame_index, s.max_hand_count);

        let mut index = 0usize;
        for point in self.processor.points().values() {
            if index >= s.max_hand_count {
                break;
            }
            let include = match point.status {
                TrackingStatus::Tracking | TrackingStatus::Lost => true,
                TrackingStatus::Candidate => s.include_candidate_points,
                TrackingStatus::NotTracking | TrackingStatus::Dead => false,
            };
            if !include {
                continue;
            }
            let world = point.full_size_world_position;
            let delta = point.full_size_world_delta;
            hand_frame.hands[index] = HandRecord {
                tracking_id: cast(point.tracking_id).unwrap_or(i32::MAX),
                pixel_x: point.full_size_position.x as i32,
                pixel_y: point.full_size_position.y as i32,
                world_position: [world.x, world.y, world.z],
                world_delta: [delta.x, delta.y, delta.z],
                status: point.status,
            };
            index += 1;
        }
        hand_frame.hand_count = index;
        hand_frame
    }

    /// Normalized copy of the selected internal buffer, for debug
    /// consumers. Rendering to RGB is the consumer's concern.
    pub fn debug_view(&self, view: DebugHandViewType) -> Array2<f32> {
        let max_depth = self.settings.depth_utility.max_depth;
        let max_velocity = self.settings.depth_utility.max_velocity;
        let normalize_depth = |m: &Array2<f32>| m.mapv(|v| (v / max_depth).clamp(0.0, 1.0));
        let normalize_velocity = |m: &Array2<f32>| m.mapv(|v| (v / max_velocity).clamp(0.0, 1.0));
        let mask = |m: &Array2<u8>| m.mapv(|v| f32::from(v.min(1)));

        match view {
            DebugHandViewType::Depth => normalize_depth(&self.ctx.mat_depth),
            DebugHandViewType::DepthFilled => normalize_depth(self.depth_utility.mat_depth_filled()),
            DebugHandViewType::DepthAvg => normalize_depth(self.depth_utility.mat_depth_avg()),
            DebugHandViewType::Velocity => normalize_velocity(self.depth_utility.mat_depth_vel()),
            DebugHandViewType::FilteredVelocity => {
                normalize_velocity(self.depth_utility.mat_depth_vel_erode())
            }
            DebugHandViewType::VelocitySignal => mask(&self.ctx.velocity_signal),
            DebugHandViewType::UpdateSegmentation => mask(&self.ctx.update_segmentation),
            DebugHandViewType::CreateSegmentation => mask(&self.ctx.create_segmentation),
            DebugHandViewType::UpdateSearched => mask(&self.ctx.update_searched),
            DebugHandViewType::CreateSearched => mask(&self.ctx.create_searched),
            DebugHandViewType::EdgeDistance => {
                let max = self
                    .ctx
                    .layer_edge_distance
                    .iter()
                    .fold(0.0f32, |acc, &v| acc.max(v));
                if max > 0.0 {
                    self.ctx.layer_edge_distance.mapv(|v| v / max)
                } else {
                    self.ctx.layer_edge_distance.clone()
                }
            }
        }
    }
}
