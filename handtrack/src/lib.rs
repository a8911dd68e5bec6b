//! Depth-camera hand tracking core
//!
//! Maintains a small population of tracked 3D hand points across a stream
//! of depth frames: motion seeds are discovered from a velocity mask,
//! confirmed by geometric plausibility tests, segmented by a bounded flood
//! fill, tracked frame to frame through a lifecycle state machine, and
//! refined at full resolution before emission.
//!
//! The crate is synchronous and allocation-free on the per-frame path; the
//! collaborator owns the [`HandTracker`] and drives it through
//! [`HandTracker::on_frame`]. All I/O — camera drivers, stream plumbing,
//! debug rendering — stays outside.
//!
//! ```rust,ignore
//! use hand_tracker::{HandSettings, HandTracker};
//!
//! let mut tracker = HandTracker::new(HandSettings::default())?;
//! let hand_frame = tracker.on_frame(&depth_frame, &projection)?;
//! for hand in hand_frame.active_hands() {
//!     println!("hand {} at {:?}", hand.tracking_id, hand.world_position);
//! }
//! ```

pub mod context;
pub mod depth_utility;
pub mod error;
pub mod point_processor;
pub mod segmentation;
pub mod settings;
pub mod tracker;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use context::FrameContext;
pub use depth_utility::DepthUtility;
pub use error::{HandTrackerError, Result};
pub use point_processor::PointProcessor;
pub use segmentation::Segment;
pub use settings::{
    AreaTestSettings, CircumferenceTestSettings, DepthUtilitySettings, HandSettings,
    NaturalEdgeTestSettings, PointProcessorSettings, SegmentationSettings,
};
pub use tracker::HandTracker;
pub use types::{
    DebugHandViewType, HandFrame, HandRecord, TestBehavior, TestPhase, TrackedPoint,
    TrackingStatus,
};

/// Library version, from the crate manifest.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
