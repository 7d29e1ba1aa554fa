//! Sampling capability - the hardware boundary for every sensor domain
//!
//! Real receivers, magnetometers and microphones implement [`Sampler`].
//! Two stand-ins ship here: a scripted sampler replaying a fixed sequence,
//! and a seeded simulation of one virtual emitter.

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

use minetrace_core::{FrequencyRange, RawReading};

/// Errors from a sampling capability
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SamplerError {
    #[error("Sensor read failed: {0}")]
    Read(String),

    #[error("Sensor disconnected: {0}")]
    Disconnected(String),

    #[error("Requested range {min}..{max} Hz is not supported")]
    UnsupportedRange { min: f64, max: f64 },
}

/// One sensor's sampling capability
#[async_trait]
pub trait Sampler: Send + Sync {
    /// Human-readable sensor name
    fn name(&self) -> &str;

    /// Acquire one reading within `range`, or `None` when nothing was heard
    async fn sample(&self, range: FrequencyRange) -> Result<Option<RawReading>, SamplerError>;
}

/// One step of a scripted sequence
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    Reading(RawReading),
    Silence,
    Fail(String),
}

/// Replays a fixed sequence of readings; deterministic test double
pub struct ScriptedSampler {
    name: String,
    steps: Mutex<VecDeque<ScriptStep>>,
    /// Returned once the script runs out
    after_script: ScriptStep,
    calls: AtomicUsize,
}

impl ScriptedSampler {
    pub fn new(name: &str, steps: Vec<ScriptStep>) -> Self {
        Self {
            name: name.to_string(),
            steps: Mutex::new(steps.into()),
            after_script: ScriptStep::Silence,
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns the same reading forever
    pub fn repeating(name: &str, reading: RawReading) -> Self {
        Self::new(name, Vec::new()).then(ScriptStep::Reading(reading))
    }

    /// What to return after the script is exhausted
    pub fn then(mut self, step: ScriptStep) -> Self {
        self.after_script = step;
        self
    }

    /// Number of `sample` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn remaining(&self) -> usize {
        self.steps.lock().len()
    }
}

#[async_trait]
impl Sampler for ScriptedSampler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn sample(&self, range: FrequencyRange) -> Result<Option<RawReading>, SamplerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let step = self
            .steps
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.after_script.clone());

        match step {
            ScriptStep::Reading(reading) if range.contains(reading.frequency) => Ok(Some(reading)),
            ScriptStep::Reading(_) | ScriptStep::Silence => Ok(None),
            ScriptStep::Fail(msg) => Err(SamplerError::Read(msg)),
        }
    }
}

/// Virtual emitter parameters for the simulated sampler
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedEmitter {
    /// Emitter frequency in Hz
    pub frequency: f64,
    /// Amplitude at the operator's position (0-100)
    pub strength: f64,
    /// Probability a sample hears the emitter when it is in range
    pub hit_rate: f64,
    /// Frequency jitter (± Hz)
    pub jitter_hz: f64,
    /// Probability of a low-level background reading otherwise
    pub background_rate: f64,
}

impl Default for SimulatedEmitter {
    fn default() -> Self {
        Self {
            frequency: 62_500.0,
            strength: 60.0,
            hit_rate: 0.6,
            jitter_hz: 40.0,
            background_rate: 0.2,
        }
    }
}

/// Seeded simulation of a single emitter plus background noise
pub struct SimulatedSampler {
    name: String,
    emitter: SimulatedEmitter,
    rng: Mutex<StdRng>,
}

impl SimulatedSampler {
    pub fn new(name: &str, emitter: SimulatedEmitter, seed: u64) -> Self {
        Self {
            name: name.to_string(),
            emitter,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn emitter(&self) -> &SimulatedEmitter {
        &self.emitter
    }

    fn next_reading(&self, range: FrequencyRange) -> Option<RawReading> {
        let mut rng = self.rng.lock();
        let emitter = &self.emitter;

        if range.contains(emitter.frequency) && rng.gen_bool(emitter.hit_rate.clamp(0.0, 1.0)) {
            let jitter = if emitter.jitter_hz > 0.0 {
                rng.gen_range(-emitter.jitter_hz..=emitter.jitter_hz)
            } else {
                0.0
            };
            let amplitude = (emitter.strength + rng.gen_range(-5.0..=5.0)).clamp(0.0, 100.0);
            let phase = rng.gen_range(0.0..std::f64::consts::TAU);
            return Some(RawReading::new(emitter.frequency + jitter, amplitude).with_phase(phase));
        }

        if range.width() > 0.0 && rng.gen_bool(emitter.background_rate.clamp(0.0, 1.0)) {
            let frequency = rng.gen_range(range.min..range.max);
            let amplitude = rng.gen_range(0.0..10.0);
            return Some(RawReading::new(frequency, amplitude));
        }

        None
    }
}

#[async_trait]
impl Sampler for SimulatedSampler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn sample(&self, range: FrequencyRange) -> Result<Option<RawReading>, SamplerError> {
        if !(range.min.is_finite() && range.max.is_finite()) || range.min > range.max {
            return Err(SamplerError::UnsupportedRange {
                min: range.min,
                max: range.max,
            });
        }
        Ok(self.next_reading(range))
    }
}
