//! minetrace Detectors
//!
//! One detector per sensor domain, each polling its bands concurrently:
//! - **RF**: three radio sub-bands, free-space path-loss distance
//! - **EM field**: broad field probe, inverse-square distance
//! - **Power line**: conducted mains noise, inverse-square distance
//! - **Acoustic**: infrasonic, audible and ultrasonic microphones
//!
//! Detections are appended to the shared registries and published on the
//! [`EventBus`]. Every loop exits when the session's [`StopSignal`] fires.

pub mod traits;
pub mod session;
pub mod events;
pub mod rf;
pub mod em_field;
pub mod power_line;
pub mod acoustic;
pub mod runner;

pub use traits::*;
pub use session::*;
pub use events::*;
pub use rf::*;
pub use em_field::*;
pub use power_line::*;
pub use acoustic::*;
pub use runner::*;
