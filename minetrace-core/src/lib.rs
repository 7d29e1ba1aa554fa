//! minetrace Core - domain model and signal-processing primitives
//!
//! This crate provides the runtime-free building blocks:
//! - Detected signals, measurements, direction estimates and fused detections
//! - Geodesy helpers (haversine distance, forward azimuth)
//! - The signature catalog of known emitter frequencies
//! - The four-stage noise filter
//! - Domain-scoped detection registries
//! - The multi-method direction tracker

pub mod signals;
pub mod geo;
pub mod signatures;
pub mod noise;
pub mod registry;
pub mod direction;

pub use signals::*;
pub use geo::*;
pub use signatures::*;
pub use noise::*;
pub use registry::*;
pub use direction::*;

/// Absolute tolerance (Hz) for "is this a catalogued frequency" lookups
pub const KNOWN_FREQUENCY_TOLERANCE: f64 = 1000.0;

/// Confidence reported for frequencies the catalog does not know
pub const DEFAULT_CATALOG_CONFIDENCE: f64 = 0.5;

/// Upper bound of the normalized signal strength scale
pub const MAX_STRENGTH: f64 = 100.0;

/// Minimum confidence
pub const MIN_CONFIDENCE: f64 = 0.0;

/// Maximum confidence
pub const MAX_CONFIDENCE: f64 = 1.0;

/// Direction estimates at or below this confidence are never exposed
pub const DIRECTION_ACCEPTANCE_THRESHOLD: f64 = 0.5;
