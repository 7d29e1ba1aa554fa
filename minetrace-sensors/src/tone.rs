//! Tone output for audio guidance

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A single beep
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tone {
    pub frequency_hz: f64,
    pub duration_ms: u64,
    /// Volume in percent (0-100)
    pub volume: f64,
}

impl Tone {
    pub fn new(frequency_hz: f64, duration_ms: u64, volume: f64) -> Self {
        Self {
            frequency_hz,
            duration_ms,
            volume: volume.clamp(0.0, 100.0),
        }
    }
}

/// Audio output device; `play` must return without waiting for the tone to finish
pub trait ToneSink: Send + Sync {
    fn play(&self, tone: Tone);
}

/// Discards every tone
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentToneSink;

impl ToneSink for SilentToneSink {
    fn play(&self, _tone: Tone) {}
}

/// Writes tones to the debug log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogToneSink;

impl ToneSink for LogToneSink {
    fn play(&self, tone: Tone) {
        debug!(
            "Beep {:.0} Hz for {} ms at {:.0}%",
            tone.frequency_hz, tone.duration_ms, tone.volume
        );
    }
}

/// Keeps every tone for later inspection
#[derive(Debug, Default)]
pub struct RecordingToneSink {
    tones: Mutex<Vec<Tone>>,
}

impl RecordingToneSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tones(&self) -> Vec<Tone> {
        self.tones.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.tones.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.tones.lock().clear();
    }
}

impl ToneSink for RecordingToneSink {
    fn play(&self, tone: Tone) {
        self.tones.lock().push(tone);
    }
}
