//! RF Detector
//!
//! Polls three disjoint radio sub-bands concurrently.
//! - Matches: radio-domain catalog signatures
//! - Distance: free-space path-loss inversion, clamped to [1, 10000] m

use async_trait::async_trait;
use std::sync::Arc;

use minetrace_core::{SensorDomain, SignatureCatalog, SignatureDomain, SpectralBin};
use minetrace_sensors::Sampler;

use crate::{DetectorConfig, FrequencyBand, SignalDetector};

/// Lower clamp of the RF distance model (meters)
pub const RF_MIN_DISTANCE: f64 = 1.0;

/// Upper clamp of the RF distance model (meters)
pub const RF_MAX_DISTANCE: f64 = 10_000.0;

/// Free-space path-loss distance from frequency and 0-100 strength
pub fn rf_path_loss_distance(frequency: f64, strength: f64) -> f64 {
    let path_loss = 32.44 + 20.0 * frequency.log10() - (100.0 - strength);
    (10f64.powf(path_loss / 20.0) * 1000.0).clamp(RF_MIN_DISTANCE, RF_MAX_DISTANCE)
}

impl DetectorConfig {
    /// LF, MF and HF sub-bands
    pub fn rf_default() -> Self {
        Self::new(
            "rf-1",
            100,
            vec![
                FrequencyBand::new("rf-lf", SignatureDomain::Radio, 30_000.0, 300_000.0),
                FrequencyBand::new("rf-mf", SignatureDomain::Radio, 300_000.0, 3_000_000.0),
                FrequencyBand::new("rf-hf", SignatureDomain::Radio, 3_000_000.0, 30_000_000.0),
            ],
        )
    }
}

/// Radio sub-band detector
pub struct RfDetector {
    config: DetectorConfig,
    sampler: Arc<dyn Sampler>,
}

impl RfDetector {
    pub fn new(config: DetectorConfig, sampler: Arc<dyn Sampler>) -> Self {
        Self { config, sampler }
    }

    pub fn with_default_bands(sampler: Arc<dyn Sampler>) -> Self {
        Self::new(DetectorConfig::rf_default(), sampler)
    }
}

#[async_trait]
impl SignalDetector for RfDetector {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn domain(&self) -> SensorDomain {
        SensorDomain::Rf
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

    fn estimate_distance(&self, frequency: f64, strength: f64) -> f64 {
        rf_path_loss_distance(frequency, strength)
    }
}
