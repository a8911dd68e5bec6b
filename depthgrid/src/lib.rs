//! Pure Rust depth-grid math primitives
//!
//! This crate provides the geometry shared by depth-camera tracking
//! pipelines: validated depth frames, pixel/world projection, physical
//! scaling at depth, and summed-area tables for O(1) area queries.
//! It holds no pipeline state and performs no I/O.
//!
//! All 2D buffers follow the `ndarray` convention of shape
//! `(height, width)` indexed as `[(y, x)]`.

pub mod error;
pub mod frame;
pub mod integral;
pub mod point;
pub mod projection;

pub use error::GridError;
pub use frame::DepthFrame;
pub use integral::IntegralImage;
pub use point::{GridRect, PixelPoint};
pub use projection::{ProjectionCache, ScalingCoordinateMapper};

/// Depth value substituted for "no reading" (0 mm) pixels, far beyond any
/// plausible operating range so invalid pixels never pass range tests.
pub const INVALID_DEPTH: f32 = 10_000.0;
