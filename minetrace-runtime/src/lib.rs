//! minetrace Runtime
//!
//! Runs tracking sessions:
//! - Starts every configured detector concurrently
//! - Correlates electromagnetic and acoustic detections on a fixed cadence
//! - Estimates direction for each fused detection
//! - Drives audio guidance toward the best candidate

pub mod config;
pub mod correlation;
pub mod guidance;
pub mod tracker;

pub use config::*;
pub use correlation::*;
pub use guidance::*;
pub use tracker::*;
