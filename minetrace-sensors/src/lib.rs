//! minetrace Sensors
//!
//! Hardware boundary contracts and their stand-ins:
//! - Sampling capability per sensor domain (scripted and seeded simulation)
//! - Operator position provider
//! - Tone output for audio guidance

pub mod sampler;
pub mod position;
pub mod tone;

pub use sampler::*;
pub use position::*;
pub use tone::*;
