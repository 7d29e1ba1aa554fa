//! Acoustic Detector
//!
//! Polls infrasonic, audible and ultrasonic bands, each matched against
//! its own slice of the signature catalog.

use async_trait::async_trait;
use std::sync::Arc;

use minetrace_core::{
    log_distance, SensorDomain, SignatureCatalog, SignatureDomain, SpectralBin, MAX_STRENGTH,
};
use minetrace_sensors::Sampler;

use crate::{DetectorConfig, FrequencyBand, SignalDetector};

/// Spherical spreading exponent for airborne sound
pub const ACOUSTIC_PATH_LOSS_EXPONENT: f64 = 2.0;

pub const ACOUSTIC_MIN_DISTANCE: f64 = 1.0;
pub const ACOUSTIC_MAX_DISTANCE: f64 = 1_000.0;

impl DetectorConfig {
    pub fn acoustic_default() -> Self {
        Self::new(
            "acoustic-1",
            100,
            vec![
                FrequencyBand::new("infrasonic", SignatureDomain::Infrasonic, 1.0, 20.0),
                FrequencyBand::new("audible", SignatureDomain::Acoustic, 20.0, 20_000.0),
                FrequencyBand::new("ultrasonic", SignatureDomain::Ultrasonic, 20_000.0, 100_000.0),
            ],
        )
    }
}

/// Microphone / vibration detector
pub struct AcousticDetector {
    config: DetectorConfig,
    sampler: Arc<dyn Sampler>,
}

impl AcousticDetector {
    pub fn new(config: DetectorConfig, sampler: Arc<dyn Sampler>) -> Self {
        Self { config, sampler }
    }

    pub fn with_default_bands(sampler: Arc<dyn Sampler>) -> Self {
        Self::new(DetectorConfig::acoustic_default(), sampler)
    }
}

#[async_trait]
impl SignalDetector for AcousticDetector {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn domain(&self) -> SensorDomain {
        SensorDomain::Acoustic
    }

    fn config(&self) -> &DetectorConfig {
        &self.config
    }

    fn sampler(&self) -> &dyn Sampler {
        self.sampler.as_ref()
    }

    fn classify(
        &self,
        catalog: &SignatureCatalog,
        band: &FrequencyBand,
        bin: &SpectralBin,
    ) -> Option<String> {
        catalog
            .match_in_domain(band.domain, bin.frequency, bin.amplitude)
            .map(|signature| signature.device_class.clone())
    }

    fn estimate_distance(&self, _frequency: f64, strength: f64) -> f64 {
        log_distance(strength, MAX_STRENGTH, ACOUSTIC_PATH_LOSS_EXPONENT)
            .clamp(ACOUSTIC_MIN_DISTANCE, ACOUSTIC_MAX_DISTANCE)
    }
}
