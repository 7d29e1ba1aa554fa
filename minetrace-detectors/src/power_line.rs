//! Power Line Detector
//!
//! Listens for conducted emissions coupled onto mains wiring.

use async_trait::async_trait;
use std::sync::Arc;

use minetrace_core::{RawReading, SensorDomain, SignatureCatalog, SignatureDomain, SpectralBin};
use minetrace_sensors::Sampler;

use crate::em_field::{inverse_square_distance, label_near};
use crate::{DetectorConfig, FrequencyBand, SignalDetector};

/// Conducted amplitude × distance² calibration constant
pub const POWER_LINE_CALIBRATION: f64 = 2_500.0;

/// Label for conducted emissions with no catalogued device nearby
pub const CONDUCTED_EMISSION: &str = "conducted-emission";

impl DetectorConfig {
    pub fn power_line_default() -> Self {
        Self::new(
            "power-line-1",
            150,
            vec![FrequencyBand::new(
                "mains",
                SignatureDomain::Radio,
                3_000.0,
                150_000.0,
            )],
        )
    }
}

/// Mains-coupled emission detector
pub struct PowerLineDetector {
    config: DetectorConfig,
    sampler: Arc<dyn Sampler>,
}

impl PowerLineDetector {
    pub fn new(config: DetectorConfig, sampler: Arc<dyn Sampler>) -> Self {
        Self { config, sampler }
    }

    pub fn with_default_bands(sampler: Arc<dyn Sampler>) -> Self {
        Self::new(DetectorConfig::power_line_default(), sampler)
    }
}

#[async_trait]
impl SignalDetector for PowerLineDetector {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn domain(&self) -> SensorDomain {
        SensorDomain::PowerLine
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
        _band: &FrequencyBand,
        bin: &SpectralBin,
    ) -> Option<String> {
        catalog
            .matches_power_signature(&RawReading::new(bin.frequency, bin.amplitude))
            .then(|| label_near(catalog, bin.frequency, CONDUCTED_EMISSION))
    }

    fn estimate_distance(&self, _frequency: f64, strength: f64) -> f64 {
        inverse_square_distance(strength, POWER_LINE_CALIBRATION)
    }
}
