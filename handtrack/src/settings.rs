//! Tunable configuration for the hand tracking core
//!
//! Every distance, radius and band is specified in millimeters (areas in
//! mm²) and converted to pixel units at the relevant depth through the
//! coordinate mapper, so thresholds behave the same for near and far hands.

use serde::{Deserialize, Serialize};

use crate::error::{HandTrackerError, Result};

/// Depth preprocessing tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthUtilitySettings {
    /// Closest depth considered a usable reading (mm)
    pub min_depth: f32,
    /// Farthest depth considered a usable reading (mm)
    pub max_depth: f32,
    /// Minimum per-pixel depth change treated as motion (mm/frame)
    pub velocity_threshold: f32,
    /// Cap applied to the velocity layer before erosion (mm/frame)
    pub max_velocity: f32,
    /// Temporal averaging window, in frames
    pub depth_smoothing_frames: usize,
    /// Erosion kernel radius; kernel side is `2 * erosion_size + 1`
    pub erosion_size: usize,
}

impl Default for DepthUtilitySettings {
    fn default() -> Self {
        Self {
            min_depth: 300.0,
            max_depth: 4000.0,
            velocity_threshold: 15.0,
            max_velocity: 1000.0,
            depth_smoothing_frames: 5,
            erosion_size: 1,
        }
    }
}

/// Thresholds for the physical-area test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaTestSettings {
    /// Minimum foreground area around a seed (mm²)
    pub area_min: f32,
    /// Maximum foreground area around a seed (mm²)
    pub area_max: f32,
    /// Side of the query window, as a physical size at the seed's depth (mm)
    pub window_size_mm: f32,
}

impl Default for AreaTestSettings {
    fn default() -> Self {
        Self {
            area_min: 3000.0,
            area_max: 35_000.0,
            window_size_mm: 150.0,
        }
    }
}

/// Thresholds for the concentric foreground-circle test. The inner circle
/// must be covered more densely than the outer one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircumferenceTestSettings {
    /// Inner sampling radius (mm)
    pub foreground_radius1: f32,
    /// Outer sampling radius (mm)
    pub foreground_radius2: f32,
    /// Minimum in-band fraction on the inner circle
    pub radius1_min_percent: f32,
    /// Minimum in-band fraction on the outer circle
    pub radius2_min_percent: f32,
}

impl Default for CircumferenceTestSettings {
    fn default() -> Self {
        Self {
            foreground_radius1: 30.0,
            foreground_radius2: 60.0,
            radius1_min_percent: 0.5,
            radius2_min_percent: 0.25,
        }
    }
}

/// Thresholds for the bounded-extent ray test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NaturalEdgeTestSettings {
    /// A ray must leave the depth band within this distance (mm)
    pub max_edge_distance: f32,
    /// How many of the 8 compass rays must terminate in time
    pub min_passing_rays: usize,
}

impl Default for NaturalEdgeTestSettings {
    fn default() -> Self {
        Self {
            max_edge_distance: 150.0,
            min_passing_rays: 5,
        }
    }
}

/// Segmentation engine tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationSettings {
    /// Half-width of the depth band around a seed (mm)
    pub segment_band_width: f32,
    /// Maximum world distance a segment may extend from its seed (mm)
    pub max_segment_radius: f32,
    /// Flood-fill visited budget; exceeding it fails the seed
    pub max_search_pixels: usize,
    pub area_test: AreaTestSettings,
    pub circumference_test: CircumferenceTestSettings,
    pub natural_edge_test: NaturalEdgeTestSettings,
}

impl Default for SegmentationSettings {
    fn default() -> Self {
        Self {
            segment_band_width: 200.0,
            max_segment_radius: 250.0,
            max_search_pixels: 8192,
            area_test: AreaTestSettings::default(),
            circumference_test: CircumferenceTestSettings::default(),
            natural_edge_test: NaturalEdgeTestSettings::default(),
        }
    }
}

/// Tracked-point lifecycle tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointProcessorSettings {
    /// Maximum hand records emitted per frame
    pub max_hand_count: usize,
    /// Frames during which a Lost point may still recover
    pub lost_timeout: u32,
    /// Frames without a confirmed update before a point dies
    pub dead_timeout: u32,
    /// Consecutive failed geometry tests before a point dies
    pub max_failed_tests: u32,
    /// Two points closer than this are duplicates (mm)
    pub duplicate_world_radius: f32,
    /// A seed this close to an existing point updates it instead (mm)
    pub recover_world_radius: f32,
    /// Consecutive tracked frames before a candidate is promoted
    pub second_chance_min_frames: u32,
    /// Side of the full-resolution refinement window (full-size px)
    pub full_size_window_side: usize,
    /// Capacity of the per-point trajectory ring
    pub trajectory_history_length: usize,
    /// Emit unpromoted candidates in the hand frame
    pub include_candidate_points: bool,
}

impl Default for PointProcessorSettings {
    fn default() -> Self {
        Self {
            max_hand_count: 2,
            lost_timeout: 45,
            dead_timeout: 60,
            max_failed_tests: 90,
            duplicate_world_radius: 80.0,
            recover_world_radius: 100.0,
            second_chance_min_frames: 5,
            full_size_window_side: 32,
            trajectory_history_length: 10,
            include_candidate_points: false,
        }
    }
}

/// Complete configuration for [`HandTracker`](crate::tracker::HandTracker).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandSettings {
    /// Working resolution the pipeline downscales to
    pub processing_size_width: usize,
    pub processing_size_height: usize,
    pub depth_utility: DepthUtilitySettings,
    pub segmentation: SegmentationSettings,
    pub point_processor: PointProcessorSettings,
}

impl Default for HandSettings {
    fn default() -> Self {
        Self {
            processing_size_width: 160,
            processing_size_height: 120,
            depth_utility: DepthUtilitySettings::default(),
            segmentation: SegmentationSettings::default(),
            point_processor: PointProcessorSettings::default(),
        }
    }
}

impl HandSettings {
    /// Parse settings from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject configurations the pipeline cannot run with. Called by the
    /// tracker constructor so an inconsistent core never starts.
    pub fn validate(&self) -> Result<()> {
        if self.processing_size_width == 0 || self.processing_size_height == 0 {
            return Err(HandTrackerError::config(format!(
                "processing size must be positive, got {}x{}",
                self.processing_size_width, self.processing_size_height
            )));
        }

        let d = &self.depth_utility;
        if d.min_depth < 0.0 || d.min_depth >= d.max_depth {
            return Err(HandTrackerError::config(format!(
                "depth range [{}, {}] is empty or negative",
                d.min_depth, d.max_depth
            )));
        }
        if d.velocity_threshold <= 0.0 || d.max_velocity <= d.velocity_threshold {
            return Err(HandTrackerError::config(
                "velocity threshold must be positive and below the velocity cap",
            ));
        }
        if d.depth_smoothing_frames == 0 {
            return Err(HandTrackerError::config(
                "depth smoothing window must hold at least one frame",
            ));
        }

        let s = &self.segmentation;
        if s.segment_band_width <= 0.0 || s.max_segment_radius <= 0.0 {
            return Err(HandTrackerError::config(
                "segment band width and radius must be positive",
            ));
        }
        if s.max_search_pixels == 0 {
            return Err(HandTrackerError::config("flood-fill budget must be positive"));
        }
        let a = &s.area_test;
        if a.area_min < 0.0 || a.area_min >= a.area_max || a.window_size_mm <= 0.0 {
            return Err(HandTrackerError::config(format!(
                "area test range [{}, {}] / window {} is invalid",
                a.area_min, a.area_max, a.window_size_mm
            )));
        }
        let c = &s.circumference_test;
        if c.foreground_radius1 <= 0.0 || c.foreground_radius2 <= c.foreground_radius1 {
            return Err(HandTrackerError::config(
                "circumference radii must be positive and ordered inner < outer",
            ));
        }
        for pct in [c.radius1_min_percent, c.radius2_min_percent] {
            if !(0.0..=1.0).contains(&pct) || pct == 0.0 {
                return Err(HandTrackerError::config(format!(
                    "circumference percentage {pct} outside (0, 1]"
                )));
            }
        }
        if c.radius1_min_percent < c.radius2_min_percent {
            return Err(HandTrackerError::config(
                "inner-circle threshold must not be below the outer one",
            ));
        }
        let e = &s.natural_edge_test;
        if e.max_edge_distance <= 0.0 || e.min_passing_rays == 0 || e.min_passing_rays > 8 {
            return Err(HandTrackerError::config(
                "natural edge test needs a positive distance and 1..=8 rays",
            ));
        }

        let p = &self.point_processor;
        if p.max_hand_count == 0 {
            return Err(HandTrackerError::config("max hand count must be positive"));
        }
        if !(p.lost_timeout <= p.dead_timeout && p.dead_timeout <= p.max_failed_tests) {
            return Err(HandTrackerError::config(format!(
                "timeouts must be ordered lost ({}) <= dead ({}) <= failed-tests ({})",
                p.lost_timeout, p.dead_timeout, p.max_failed_tests
            )));
        }
        if p.duplicate_world_radius <= 0.0 || p.recover_world_radius <= 0.0 {
            return Err(HandTrackerError::config(
                "duplicate and recovery radii must be positive",
            ));
        }
        if p.second_chance_min_frames == 0 {
            return Err(HandTrackerError::config(
                "candidate promotion needs at least one tracked frame",
            ));
        }
        if p.full_size_window_side == 0 || p.trajectory_history_length < 2 {
            return Err(HandTrackerError::config(
                "refinement window and trajectory history must be usable",
            ));
        }

        Ok(())
    }
}
