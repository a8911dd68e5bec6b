//! Core data types: point lifecycle, tracked points, output frames

use std::collections::VecDeque;

use depthgrid::PixelPoint;
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Lifecycle of a tracked point.
///
/// A point is born `Candidate` and promotes to `Tracking` once it has been
/// confirmed for enough consecutive frames; `Lost` points keep their identity
/// for a recovery window; `Dead` is terminal. `NotTracking` only appears in
/// emitted filler records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackingStatus {
    NotTracking,
    Candidate,
    Tracking,
    Lost,
    Dead,
}

impl std::fmt::Display for TrackingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NotTracking => "not-tracking",
            Self::Candidate => "candidate",
            Self::Tracking => "tracking",
            Self::Lost => "lost",
            Self::Dead => "dead",
        };
        write!(f, "{name}")
    }
}

/// Which pipeline phase a segmentation call serves. Each phase owns its own
/// searched mask and debug layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestPhase {
    Create,
    Update,
}

/// Logging arm for the geometric tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestBehavior {
    Silent,
    Log,
}

/// Internal state of one tracked hand point.
#[derive(Debug, Clone)]
pub struct TrackedPoint {
    /// Dense unique id, never reused within the process lifetime
    pub tracking_id: u32,
    /// Working-resolution pixel position
    pub position: PixelPoint,
    /// World position in millimeters
    pub world_position: Point3<f32>,
    /// Per-frame world displacement
    pub world_delta: Vector3<f32>,
    /// Refined position in full-resolution pixels
    pub full_size_position: PixelPoint,
    pub full_size_world_position: Point3<f32>,
    pub full_size_world_delta: Vector3<f32>,
    pub status: TrackingStatus,
    /// Frames since the last confirmed update
    pub inactive_frame_count: u32,
    /// Frames since the last passing geometry test
    pub failed_test_count: u32,
    /// Consecutive confirmed frames, gating candidate promotion
    pub consecutive_tracked: u32,
    /// Whether the update phase confirmed this point in the current frame
    pub updated_this_frame: bool,
    /// Bounded ring of recent world positions
    pub trajectory: VecDeque<Point3<f32>>,
    prev_full_size_world: Option<Point3<f32>>,
}

impl TrackedPoint {
    /// A freshly created candidate. Creation counts as the point's first
    /// confirmed frame.
    pub fn new_candidate(
        tracking_id: u32,
        position: PixelPoint,
        world_position: Point3<f32>,
        full_scale: f32,
    ) -> Self {
        let full_size_position = PixelPoint::new(
            (position.x as f32 * full_scale) as usize,
            (position.y as f32 * full_scale) as usize,
        );
        Self {
            tracking_id,
            position,
            world_position,
            world_delta: Vector3::zeros(),
            full_size_position,
            full_size_world_position: world_position,
            full_size_world_delta: Vector3::zeros(),
            status: TrackingStatus::Candidate,
            inactive_frame_count: 0,
            failed_test_count: 0,
            consecutive_tracked: 1,
            updated_this_frame: true,
            trajectory: VecDeque::new(),
            prev_full_size_world: None,
        }
    }

    pub fn is_dead(&self) -> bool {
        self.status == TrackingStatus::Dead
    }

    /// Push the current world position into the trajectory ring and refresh
    /// both delta fields. `capacity` bounds the ring.
    pub fn record_trajectory(&mut self, capacity: usize) {
        if let Some(previous) = self.trajectory.back() {
            self.world_delta = self.world_position - previous;
        } else {
            self.world_delta = Vector3::zeros();
        }
        self.trajectory.push_back(self.world_position);
        while self.trajectory.len() > capacity {
            self.trajectory.pop_front();
        }

        if let Some(previous) = self.prev_full_size_world {
            self.full_size_world_delta = self.full_size_world_position - previous;
        } else {
            self.full_size_world_delta = Vector3::zeros();
        }
        self.prev_full_size_world = Some(self.full_size_world_position);
    }
}

/// One emitted hand record. Unused slots carry `tracking_id = -1` and
/// `NotTracking` status.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HandRecord {
    pub tracking_id: i32,
    /// Full-resolution pixel position
    pub pixel_x: i32,
    pub pixel_y: i32,
    /// World position in millimeters
    pub world_position: [f32; 3],
    /// Per-frame world displacement in millimeters
    pub world_delta: [f32; 3],
    pub status: TrackingStatus,
}

impl HandRecord {
    pub fn unused() -> Self {
        Self {
            tracking_id: -1,
            pixel_x: 0,
            pixel_y: 0,
            world_position: [0.0; 3],
            world_delta: [0.0; 3],
            status: TrackingStatus::NotTracking,
        }
    }

    pub fn is_used(&self) -> bool {
        self.tracking_id >= 0
    }
}

/// Per-frame output: a fixed-length array of hand records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandFrame {
    /// Index of the source depth frame
    pub frame_index: u64,
    /// Number of populated records at the front of `hands`
    pub hand_count: usize,
    pub hands: Vec<HandRecord>,
}

impl HandFrame {
    pub fn empty(frame_index: u64, max_hand_count: usize) -> Self {
        Self {
            frame_index,
            hand_count: 0,
            hands: vec![HandRecord::unused(); max_hand_count],
        }
    }

    /// The populated records.
    pub fn active_hands(&self) -> &[HandRecord] {
        &self.hands[..self.hand_count]
    }
}

/// Selects which internal buffer a debug consumer wants to look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DebugHandViewType {
    Depth,
    DepthFilled,
    DepthAvg,
    Velocity,
    FilteredVelocity,
    VelocitySignal,
    UpdateSegmentation,
    CreateSegmentation,
    UpdateSearched,
    CreateSearched,
    EdgeDistance,
}
