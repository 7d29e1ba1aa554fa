//! Audio guidance
//!
//! Turns the best detection's distance and bearing into a continuous beep
//! that rises in pitch, quickens and lengthens as the operator closes in,
//! plus one-shot directional, warning and success patterns.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use minetrace_core::normalize_bearing;
use minetrace_detectors::StopSignal;
use minetrace_sensors::{Tone, ToneSink};

use crate::GuidanceConfig;

pub const MIN_GUIDANCE_DISTANCE: f64 = 0.5;
pub const MAX_GUIDANCE_DISTANCE: f64 = 100.0;

pub const MIN_BEEP_FREQUENCY: f64 = 400.0;
pub const MAX_BEEP_FREQUENCY: f64 = 2000.0;
pub const MIN_BEEP_INTERVAL_MS: f64 = 100.0;
pub const MAX_BEEP_INTERVAL_MS: f64 = 2000.0;
pub const MIN_BEEP_DURATION_MS: f64 = 50.0;
pub const MAX_BEEP_DURATION_MS: f64 = 200.0;
pub const MIN_BEEP_VOLUME: f64 = 20.0;
pub const MAX_BEEP_VOLUME: f64 = 100.0;

const SHORT_BEEP_MS: u64 = 80;
const WARNING_FREQUENCY: f64 = 400.0;
const WARNING_BEEP_MS: u64 = 150;
const SUCCESS_SWEEP: [f64; 5] = [800.0, 900.0, 1000.0, 1100.0, 1200.0];
const SUCCESS_STEP_MS: u64 = 60;

/// Poll delay of the beep loop while guidance is inactive
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Beep parameters derived from a distance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeepParams {
    pub frequency: f64,
    pub interval_ms: u64,
    pub duration_ms: u64,
    pub volume: f64,
}

impl BeepParams {
    /// Piecewise-linear interpolation over [0.5, 100] meters
    ///
    /// Closer means a shorter interval and a longer beep, so 100 m gives
    /// 2000 ms / 50 ms and 0.5 m gives 100 ms / 200 ms.
    pub fn for_distance(distance: f64) -> Self {
        let d = if distance.is_nan() {
            MAX_GUIDANCE_DISTANCE
        } else {
            distance.clamp(MIN_GUIDANCE_DISTANCE, MAX_GUIDANCE_DISTANCE)
        };
        let t = (d - MIN_GUIDANCE_DISTANCE) / (MAX_GUIDANCE_DISTANCE - MIN_GUIDANCE_DISTANCE);

        Self {
            frequency: (2000.0 - t * 1600.0).clamp(MIN_BEEP_FREQUENCY, MAX_BEEP_FREQUENCY),
            interval_ms: (100.0 + t * 1900.0)
                .clamp(MIN_BEEP_INTERVAL_MS, MAX_BEEP_INTERVAL_MS)
                .round() as u64,
            duration_ms: (200.0 - t * 150.0)
                .clamp(MIN_BEEP_DURATION_MS, MAX_BEEP_DURATION_MS)
                .round() as u64,
            volume: (20.0 + t * 80.0).clamp(MIN_BEEP_VOLUME, MAX_BEEP_VOLUME),
        }
    }
}

/// Snapshot of the guidance state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeepStatus {
    pub active: bool,
    pub current_distance: f64,
    pub previous_distance: f64,
    pub frequency: f64,
    pub interval_ms: u64,
    pub duration_ms: u64,
    pub volume: f64,
    pub getting_closer: bool,
}

impl Default for BeepStatus {
    fn default() -> Self {
        let params = BeepParams::for_distance(MAX_GUIDANCE_DISTANCE);
        Self {
            active: false,
            current_distance: MAX_GUIDANCE_DISTANCE,
            previous_distance: MAX_GUIDANCE_DISTANCE,
            frequency: params.frequency,
            interval_ms: params.interval_ms,
            duration_ms: params.duration_ms,
            volume: params.volume,
            getting_closer: false,
        }
    }
}

impl BeepStatus {
    fn apply(&mut self, params: BeepParams) {
        self.frequency = params.frequency;
        self.interval_ms = params.interval_ms;
        self.duration_ms = params.duration_ms;
        self.volume = params.volume;
    }
}

/// One-shot pattern queued for the beep loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cue {
    Directional(f64),
    Warning,
    Success,
}

/// Which way a directional pattern points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionalCue {
    Left,
    Right,
    Ahead,
}

impl DirectionalCue {
    pub fn for_bearing(bearing: f64) -> Self {
        let b = normalize_bearing(bearing);
        if b > 270.0 || b < 90.0 {
            DirectionalCue::Left
        } else if (90.0..=270.0).contains(&b) {
            DirectionalCue::Right
        } else {
            DirectionalCue::Ahead
        }
    }
}

#[derive(Debug, Default)]
struct GuidanceState {
    status: BeepStatus,
    cues: VecDeque<Cue>,
    last_cued_bearing: Option<f64>,
    receding: bool,
    arrived: bool,
}

/// Adaptive beep controller
pub struct AudioGuidance {
    sink: Arc<dyn ToneSink>,
    config: GuidanceConfig,
    state: Mutex<GuidanceState>,
}

impl AudioGuidance {
    pub fn new(sink: Arc<dyn ToneSink>, config: GuidanceConfig) -> Self {
        Self {
            sink,
            config,
            state: Mutex::new(GuidanceState::default()),
        }
    }

    pub fn config(&self) -> &GuidanceConfig {
        &self.config
    }

    /// Activate guidance at `distance`; the running beep loop picks it up
    pub fn start_guidance(&self, distance: f64, bearing: Option<f64>) {
        let mut state = self.state.lock();
        *state = GuidanceState::default();

        state.status.active = true;
        state.status.current_distance = distance;
        state.status.previous_distance = distance;
        state.status.apply(BeepParams::for_distance(distance));

        if let Some(bearing) = bearing {
            state.cues.push_back(Cue::Directional(bearing));
            state.last_cued_bearing = Some(bearing);
        }
        if distance <= self.config.success_distance_m {
            state.cues.push_back(Cue::Success);
            state.arrived = true;
        }
        info!("Guidance started at {:.1} m", distance);
    }

    /// Recompute beep parameters for a new distance and queue trend cues
    pub fn update_guidance(&self, distance: f64, bearing: Option<f64>) {
        let mut state = self.state.lock();
        if !state.status.active {
            drop(state);
            self.start_guidance(distance, bearing);
            return;
        }

        let previous = state.status.current_distance;
        state.status.previous_distance = previous;
        state.status.current_distance = distance;
        state.status.getting_closer = distance < previous;
        state.status.apply(BeepParams::for_distance(distance));

        if distance <= self.config.success_distance_m {
            if !state.arrived {
                state.cues.push_back(Cue::Success);
                state.arrived = true;
            }
        } else {
            state.arrived = false;
        }

        if distance > previous {
            if !state.receding {
                state.cues.push_back(Cue::Warning);
                state.receding = true;
            }
        } else if distance < previous {
            state.receding = false;
        }

        if let Some(bearing) = bearing {
            let changed = state.last_cued_bearing.map_or(true, |last| {
                angular_difference(last, bearing) >= self.config.directional_change_deg
            });
            if changed {
                state.cues.push_back(Cue::Directional(bearing));
                state.last_cued_bearing = Some(bearing);
            }
        }

        debug!(
            "Guidance {:.1} m -> {:.0} Hz every {} ms",
            distance, state.status.frequency, state.status.interval_ms
        );
    }

    /// Start on first call, update afterwards
    pub fn track(&self, distance: f64, bearing: Option<f64>) {
        if self.state.lock().status.active {
            self.update_guidance(distance, bearing);
        } else {
            self.start_guidance(distance, bearing);
        }
    }

    /// Deactivate and drop any queued cues
    pub fn stop_guidance(&self) {
        let mut state = self.state.lock();
        if state.status.active {
            info!("Guidance stopped");
        }
        state.status.active = false;
        state.cues.clear();
    }

    pub fn status(&self) -> BeepStatus {
        self.state.lock().status
    }

    /// Two short beeps for left, three for right, one for straight ahead
    pub fn play_directional_beep(&self, bearing: f64) {
        let status = self.status();
        let short = Tone::new(status.frequency, SHORT_BEEP_MS, status.volume);
        let (count, tone) = match DirectionalCue::for_bearing(bearing) {
            DirectionalCue::Left => (2, short),
            DirectionalCue::Right => (3, short),
            DirectionalCue::Ahead => (
                1,
                Tone::new(status.frequency, status.duration_ms, status.volume),
            ),
        };
        for _ in 0..count {
            self.sink.play(tone);
        }
    }

    /// Three low beeps: moving away
    pub fn play_warning_beep(&self) {
        let volume = self.status().volume;
        for _ in 0..3 {
            self.sink.play(Tone::new(WARNING_FREQUENCY, WARNING_BEEP_MS, volume));
        }
    }

    /// Ascending sweep: very close
    pub fn play_success_beep(&self) {
        let volume = self.status().volume;
        for frequency in SUCCESS_SWEEP {
            self.sink.play(Tone::new(frequency, SUCCESS_STEP_MS, volume));
        }
    }

    fn play_cue(&self, cue: Cue) {
        match cue {
            Cue::Directional(bearing) => self.play_directional_beep(bearing),
            Cue::Warning => self.play_warning_beep(),
            Cue::Success => self.play_success_beep(),
        }
    }

    /// Continuous beep loop; re-reads the parameters every cycle
    pub async fn run(&self, stop: StopSignal) {
        loop {
            if stop.is_stopped() {
                break;
            }

            let (status, cues) = {
                let mut state = self.state.lock();
                (state.status, state.cues.drain(..).collect::<Vec<_>>())
            };

            for cue in cues {
                self.play_cue(cue);
            }

            let pause = if status.active {
                self.sink.play(Tone::new(
                    status.frequency,
                    status.duration_ms,
                    status.volume,
                ));
                Duration::from_millis(status.interval_ms)
            } else {
                IDLE_POLL
            };

            if stop.sleep(pause).await {
                break;
            }
        }
        debug!("Beep loop exited");
    }

    pub fn spawn(self: &Arc<Self>, stop: StopSignal) -> JoinHandle<()> {
        let guidance = self.clone();
        tokio::spawn(async move { guidance.run(stop).await })
    }
}

/// Smallest absolute angle between two bearings (degrees)
fn angular_difference(a: f64, b: f64) -> f64 {
    let diff = normalize_bearing(a - b);
    diff.min(360.0 - diff)
}
