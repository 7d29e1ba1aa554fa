//! Common traits for signal detectors

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use minetrace_core::{
    DetectedSignal, FrequencyRange, NoiseFilter, SensorDomain, SignatureCatalog,
    SignatureDomain, SpectralBin, MAX_STRENGTH,
};
use minetrace_sensors::{Sampler, SamplerError};

/// Errors from detector operations
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Sampling error: {0}")]
    Sampling(#[from] SamplerError),

    #[error("Invalid band {band}: {reason}")]
    InvalidBand { band: String, reason: String },

    #[error("No reading available")]
    NoReading,
}

/// One polled frequency sub-range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBand {
    pub name: String,
    /// Spectral domain used for filtering and catalog matching
    pub domain: SignatureDomain,
    pub range: FrequencyRange,
}

impl FrequencyBand {
    pub fn new(name: &str, domain: SignatureDomain, min: f64, max: f64) -> Self {
        Self {
            name: name.to_string(),
            domain,
            range: FrequencyRange::new(min, max),
        }
    }

    pub fn validate(&self) -> Result<(), DetectorError> {
        let invalid = |reason: &str| DetectorError::InvalidBand {
            band: self.name.clone(),
            reason: reason.to_string(),
        };

        if !(self.range.min.is_finite() && self.range.max.is_finite()) {
            return Err(invalid("range must be finite"));
        }
        if self.range.min >= self.range.max {
            return Err(invalid("min must be below max"));
        }
        if self.domain.bounds().intersect(&self.range).is_none() {
            return Err(invalid("range lies outside its domain"));
        }
        Ok(())
    }
}

/// Detector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Unique detector ID
    pub id: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Delay between polls of each band
    pub poll_interval_ms: u64,
    /// Bands polled concurrently, one loop each
    pub bands: Vec<FrequencyBand>,
}

fn default_enabled() -> bool {
    true
}

impl DetectorConfig {
    pub fn new(id: &str, poll_interval_ms: u64, bands: Vec<FrequencyBand>) -> Self {
        Self {
            id: id.to_string(),
            enabled: true,
            poll_interval_ms,
            bands,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_bands(mut self, bands: Vec<FrequencyBand>) -> Self {
        self.bands = bands;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn validate(&self) -> Result<(), DetectorError> {
        self.bands.iter().try_for_each(FrequencyBand::validate)
    }
}

/// Common interface for all signal detectors
#[async_trait]
pub trait SignalDetector: Send + Sync {
    /// Unique detector identifier
    fn id(&self) -> &str;

    /// Sensor domain this detector samples
    fn domain(&self) -> SensorDomain;

    fn config(&self) -> &DetectorConfig;

    /// Sampling capability backing this detector
    fn sampler(&self) -> &dyn Sampler;

    /// Device class when a filtered bin matches this domain's signatures
    fn classify(
        &self,
        catalog: &SignatureCatalog,
        band: &FrequencyBand,
        bin: &SpectralBin,
    ) -> Option<String>;

    /// Distance in meters implied by a detection's strength
    fn estimate_distance(&self, frequency: f64, strength: f64) -> f64;

    fn bands(&self) -> &[FrequencyBand] {
        &self.config().bands
    }

    fn poll_interval(&self) -> Duration {
        self.config().poll_interval()
    }

    /// Acquire, filter and classify one reading from `band`
    async fn poll(
        &self,
        band: &FrequencyBand,
        filter: &NoiseFilter,
    ) -> Result<Vec<DetectedSignal>, DetectorError> {
        let reading = self
            .sampler()
            .sample(band.range)
            .await?
            .ok_or(DetectorError::NoReading)?;

        let bins = [SpectralBin::new(reading.frequency, reading.amplitude)];
        let shaped = filter.shape(&bins, band.domain, band.range);
        let filtered = filter.subtract_floor(&band.name, &shaped);

        let mut detected = Vec::new();
        let mut background = Vec::new();
        for (raw, bin) in shaped.iter().zip(filtered) {
            let Some(device_class) = self.classify(filter.catalog(), band, &bin) else {
                background.push(*raw);
                continue;
            };

            let strength = bin.amplitude.clamp(0.0, MAX_STRENGTH);
            let confidence =
                filter.miner_signal_confidence(bin.frequency, bin.amplitude, band.domain);

            detected.push(
                DetectedSignal::builder(self.domain(), bin.frequency, bin.amplitude)
                    .band(&band.name)
                    .strength(strength)
                    .confidence(confidence)
                    .distance(self.estimate_distance(bin.frequency, strength))
                    .device_class(&device_class)
                    .build(),
            );
        }
        filter.observe_background(&band.name, &background);

        Ok(detected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_validation() {
        assert!(FrequencyBand::new("ok", SignatureDomain::Radio, 30_000.0, 300_000.0)
            .validate()
            .is_ok());
        assert!(FrequencyBand::new("inverted", SignatureDomain::Radio, 5.0, 1.0)
            .validate()
            .is_err());
        assert!(FrequencyBand::new("outside", SignatureDomain::Infrasonic, 1_000.0, 2_000.0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_detector_config_builders() {
        let config = DetectorConfig::new("x", 0, Vec::new())
            .with_id("rf-2")
            .with_poll_interval(75);
        assert_eq!(config.id, "rf-2");
        assert_eq!(config.poll_interval(), Duration::from_millis(75));
        assert!(config.enabled);

        // Zero interval would spin
        assert_eq!(
            DetectorConfig::new("z", 0, Vec::new()).poll_interval(),
            Duration::from_millis(1)
        );
    }
}
