//! Four-stage environmental noise filter
//!
//! Applied to a buffer of spectral bins before classification:
//! 1. Notch out mains hum and its harmonics
//! 2. Bandpass to the requested domain and sub-range
//! 3. Attenuate recognized environmental noise classes
//! 4. Subtract an adaptive, slowly tracking noise floor
//!
//! The floor is tracked per band and only from readings the caller did not
//! classify as an emitter, so a steady emitter never raises its own floor.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

use crate::{FrequencyRange, SignatureCatalog, SignatureDomain};

/// Mains hum family (50/60 Hz and harmonics)
pub const ENVIRONMENTAL_FREQUENCIES: &[f64] = &[
    50.0, 60.0, 100.0, 120.0, 150.0, 180.0, 200.0, 240.0, 250.0, 300.0, 360.0,
];

/// Distance (Hz) within which a frequency counts as environmental
pub const ENVIRONMENTAL_MATCH_TOLERANCE: f64 = 1.0;

/// One frequency/amplitude pair in a sample buffer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectralBin {
    pub frequency: f64,
    pub amplitude: f64,
}

impl SpectralBin {
    pub fn new(frequency: f64, amplitude: f64) -> Self {
        Self {
            frequency,
            amplitude,
        }
    }
}

/// Recognized environmental noise classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoisePattern {
    Fan,
    AirConditioning,
    Traffic,
    Speech,
    Electronics,
}

impl NoisePattern {
    pub const ALL: [NoisePattern; 5] = [
        NoisePattern::Fan,
        NoisePattern::AirConditioning,
        NoisePattern::Traffic,
        NoisePattern::Speech,
        NoisePattern::Electronics,
    ];

    pub fn range(&self) -> FrequencyRange {
        match self {
            NoisePattern::Fan => FrequencyRange::new(100.0, 1_000.0),
            NoisePattern::AirConditioning => FrequencyRange::new(50.0, 500.0),
            NoisePattern::Traffic => FrequencyRange::new(20.0, 200.0),
            NoisePattern::Speech => FrequencyRange::new(300.0, 3_400.0),
            NoisePattern::Electronics => FrequencyRange::new(10_000.0, 20_000.0),
        }
    }

    /// Fraction of amplitude removed inside the pattern's range (0-1)
    pub fn attenuation(&self) -> f64 {
        match self {
            NoisePattern::Fan => 0.6,
            NoisePattern::AirConditioning => 0.5,
            NoisePattern::Traffic => 0.7,
            NoisePattern::Speech => 0.8,
            NoisePattern::Electronics => 0.3,
        }
    }
}

/// Tunables for the filter stages
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseFilterConfig {
    /// Half width of each mains notch in Hz
    pub notch_half_width: f64,
    /// Gain applied inside a notch
    pub notch_gain: f64,
    /// Floor tracking rate per background observation (0-1)
    pub adaptive_rate: f64,
    /// Fraction of the tracked floor subtracted from each bin
    pub adaptive_gain: f64,
}

impl Default for NoiseFilterConfig {
    fn default() -> Self {
        Self {
            notch_half_width: 2.0,
            notch_gain: 0.1,
            adaptive_rate: 0.05,
            adaptive_gain: 0.5,
        }
    }
}

/// Environmental noise filter shared by all detectors
#[derive(Debug)]
pub struct NoiseFilter {
    catalog: Arc<SignatureCatalog>,
    config: NoiseFilterConfig,
    /// Tracked background level per band
    floors: Mutex<HashMap<String, f64>>,
}

impl NoiseFilter {
    pub fn new(catalog: Arc<SignatureCatalog>) -> Self {
        Self::with_config(catalog, NoiseFilterConfig::default())
    }

    pub fn with_config(catalog: Arc<SignatureCatalog>, config: NoiseFilterConfig) -> Self {
        Self {
            catalog,
            config,
            floors: Mutex::new(HashMap::new()),
        }
    }

    pub fn catalog(&self) -> &SignatureCatalog {
        &self.catalog
    }

    /// Run all four stages over `bins` for `domain`, limited to `range`,
    /// subtracting the floor tracked for `band`
    pub fn filter(
        &self,
        bins: &[SpectralBin],
        band: &str,
        domain: SignatureDomain,
        range: FrequencyRange,
    ) -> Vec<SpectralBin> {
        self.subtract_floor(band, &self.shape(bins, domain, range))
    }

    /// Stages 1-3, without the adaptive floor
    pub fn shape(
        &self,
        bins: &[SpectralBin],
        domain: SignatureDomain,
        range: FrequencyRange,
    ) -> Vec<SpectralBin> {
        let notched = self.suppress_environmental(bins);
        let banded = Self::bandpass(&notched, domain, range);
        Self::attenuate_patterns(&banded)
    }

    /// Stage 1: notch suppression of mains hum and harmonics
    pub fn suppress_environmental(&self, bins: &[SpectralBin]) -> Vec<SpectralBin> {
        bins.iter()
            .map(|bin| {
                let in_notch = ENVIRONMENTAL_FREQUENCIES
                    .iter()
                    .any(|f| (bin.frequency - f).abs() <= self.config.notch_half_width);
                if in_notch {
                    SpectralBin::new(bin.frequency, bin.amplitude * self.config.notch_gain)
                } else {
                    *bin
                }
            })
            .collect()
    }

    /// Stage 2: keep only bins inside both the domain bounds and `range`
    pub fn bandpass(
        bins: &[SpectralBin],
        domain: SignatureDomain,
        range: FrequencyRange,
    ) -> Vec<SpectralBin> {
        let Some(pass) = domain.bounds().intersect(&range) else {
            return Vec::new();
        };

        bins.iter()
            .filter(|bin| pass.contains(bin.frequency))
            .copied()
            .collect()
    }

    /// Stage 3: attenuate recognized noise classes
    pub fn attenuate_patterns(bins: &[SpectralBin]) -> Vec<SpectralBin> {
        bins.iter()
            .map(|bin| {
                let gain = NoisePattern::ALL
                    .iter()
                    .filter(|pattern| pattern.range().contains(bin.frequency))
                    .fold(1.0, |gain, pattern| gain * (1.0 - pattern.attenuation()));
                SpectralBin::new(bin.frequency, bin.amplitude * gain)
            })
            .collect()
    }

    /// Stage 4: subtract part of the floor tracked for `band`
    pub fn subtract_floor(&self, band: &str, bins: &[SpectralBin]) -> Vec<SpectralBin> {
        let subtract = self.config.adaptive_gain * self.noise_floor(band);
        bins.iter()
            .map(|bin| SpectralBin::new(bin.frequency, (bin.amplitude - subtract).max(0.0)))
            .collect()
    }

    /// Move the floor for `band` toward the mean of unclassified, shaped bins
    pub fn observe_background(&self, band: &str, bins: &[SpectralBin]) {
        if bins.is_empty() {
            return;
        }

        let mean = bins.iter().map(|b| b.amplitude).sum::<f64>() / bins.len() as f64;
        let mut floors = self.floors.lock();
        let floor = floors.entry(band.to_string()).or_insert(0.0);
        *floor += self.config.adaptive_rate * (mean - *floor);
        trace!("Noise floor for {} now {:.3}", band, *floor);
    }

    /// Current tracked floor for `band`
    pub fn noise_floor(&self, band: &str) -> f64 {
        self.floors.lock().get(band).copied().unwrap_or(0.0)
    }

    /// Forget all tracked floors (start of a new session)
    pub fn reset(&self) {
        self.floors.lock().clear();
    }

    /// True if within 1 Hz of a catalogued environmental frequency
    pub fn is_environmental_noise(&self, frequency: f64) -> bool {
        ENVIRONMENTAL_FREQUENCIES
            .iter()
            .any(|f| (frequency - f).abs() <= ENVIRONMENTAL_MATCH_TOLERANCE)
    }

    /// Confidence that a reading is an emitter rather than background noise
    pub fn miner_signal_confidence(
        &self,
        frequency: f64,
        amplitude: f64,
        domain: SignatureDomain,
    ) -> f64 {
        let mut confidence: f64 = 0.5;
        if self.is_environmental_noise(frequency) {
            confidence *= 0.3;
        }
        if self.catalog.is_known_frequency(frequency) {
            confidence *= 1.5;
        }

        trace!(
            "Emitter confidence {:.3} for {:.1} Hz at {:.1} ({})",
            confidence,
            frequency,
            amplitude,
            domain.as_str()
        );
        confidence.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> NoiseFilter {
        NoiseFilter::new(Arc::new(SignatureCatalog::load()))
    }

    #[test]
    fn test_notch_suppresses_mains_hum() {
        let f = filter();
        let out = f.suppress_environmental(&[
            SpectralBin::new(60.5, 80.0),
            SpectralBin::new(75.0, 80.0),
        ]);

        assert!((out[0].amplitude - 8.0).abs() < 1e-9);
        assert_eq!(out[1].amplitude, 80.0);
    }

    #[test]
    fn test_bandpass_limits_to_domain_and_range() {
        let bins = [
            SpectralBin::new(10.0, 50.0),
            SpectralBin::new(2_000.0, 50.0),
            SpectralBin::new(30_000.0, 50.0),
        ];

        let out = NoiseFilter::bandpass(
            &bins,
            SignatureDomain::Acoustic,
            FrequencyRange::new(0.0, 1_000_000.0),
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].frequency, 2_000.0);

        let disjoint = NoiseFilter::bandpass(
            &bins,
            SignatureDomain::Infrasonic,
            FrequencyRange::new(1_000.0, 5_000.0),
        );
        assert!(disjoint.is_empty());
    }

    #[test]
    fn test_pattern_attenuation_compounds() {
        // 150 Hz sits in Fan, AirConditioning and Traffic
        let out = NoiseFilter::attenuate_patterns(&[SpectralBin::new(150.0, 100.0)]);
        let expected = 100.0 * 0.4 * 0.5 * 0.3;
        assert!((out[0].amplitude - expected).abs() < 1e-9);

        let untouched = NoiseFilter::attenuate_patterns(&[SpectralBin::new(62_500.0, 100.0)]);
        assert_eq!(untouched[0].amplitude, 100.0);
    }

    #[test]
    fn test_adaptive_floor_tracks_background() {
        let f = filter();
        let range = SignatureDomain::Radio.bounds();
        let bins = [SpectralBin::new(62_500.0, 40.0)];

        let first = f.filter(&bins, "rf-lf", SignatureDomain::Radio, range);
        assert_eq!(first[0].amplitude, 40.0);

        f.observe_background("rf-lf", &[SpectralBin::new(70_000.0, 20.0)]);
        assert!((f.noise_floor("rf-lf") - 1.0).abs() < 1e-9);

        let second = f.filter(&bins, "rf-lf", SignatureDomain::Radio, range);
        assert!((second[0].amplitude - 39.5).abs() < 1e-9);

        // Floors are tracked per band, even within one domain
        assert_eq!(f.noise_floor("field"), 0.0);
        let other = f.filter(&bins, "field", SignatureDomain::Radio, range);
        assert_eq!(other[0].amplitude, 40.0);

        f.reset();
        assert_eq!(f.noise_floor("rf-lf"), 0.0);
    }

    #[test]
    fn test_constant_emitter_keeps_strength() {
        let f = filter();
        let range = FrequencyRange::new(30_000.0, 300_000.0);
        let bins = [SpectralBin::new(62_500.0, 70.0)];

        // Classified readings are never fed back as background
        for _ in 0..200 {
            let out = f.filter(&bins, "rf-lf", SignatureDomain::Radio, range);
            assert_eq!(out[0].amplitude, 70.0);
        }
        assert_eq!(f.noise_floor("rf-lf"), 0.0);
    }

    #[test]
    fn test_observe_background_ignores_empty_buffers() {
        let f = filter();
        f.observe_background("audible", &[]);
        assert_eq!(f.noise_floor("audible"), 0.0);
    }

    #[test]
    fn test_environmental_noise_detection() {
        let f = filter();
        assert!(f.is_environmental_noise(50.0));
        assert!(f.is_environmental_noise(120.9));
        assert!(!f.is_environmental_noise(122.5));
    }

    #[test]
    fn test_miner_signal_confidence() {
        let f = filter();

        // Unknown, not noise
        assert_eq!(f.miner_signal_confidence(777_777.0, 50.0, SignatureDomain::Radio), 0.5);
        // Known emitter frequency
        assert!((f.miner_signal_confidence(62_500.0, 50.0, SignatureDomain::Radio) - 0.75).abs() < 1e-9);
        // Mains hum, but still within catalog tolerance of the infrasonic rows
        let hum = f.miner_signal_confidence(60.0, 50.0, SignatureDomain::Acoustic);
        assert!((hum - 0.5 * 0.3 * 1.5).abs() < 1e-9);
        // Amplitude does not enter the score
        assert!((f.miner_signal_confidence(62_500.0, 0.0, SignatureDomain::Radio) - 0.75).abs() < 1e-9);
    }
}
