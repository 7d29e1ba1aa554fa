//! EM Field Detector
//!
//! Watches the near-field magnetic window where switching regulators radiate.
//! - Matches: field strength above threshold inside the field window
//! - Distance: inverse-square calibration

use async_trait::async_trait;
use std::sync::Arc;

use minetrace_core::{
    SensorDomain, SignatureCatalog, SignatureDomain, SpectralBin, FIELD_SIGNATURE_RANGE,
};
use minetrace_sensors::Sampler;

use crate::{DetectorConfig, FrequencyBand, SignalDetector};

/// Field strength × distance² calibration constant
pub const EM_FIELD_CALIBRATION: f64 = 10_000.0;

/// Label for field anomalies with no catalogued device nearby
pub const EM_FIELD_ANOMALY: &str = "em-field-anomaly";

/// Distance from an inverse-square field falloff
pub fn inverse_square_distance(strength: f64, calibration: f64) -> f64 {
    (calibration / strength.max(1.0)).sqrt()
}

/// First catalogued class near `frequency`, or `fallback`
pub(crate) fn label_near(catalog: &SignatureCatalog, frequency: f64, fallback: &str) -> String {
    catalog
        .device_classes_near(frequency)
        .first()
        .map(|class| class.to_string())
        .unwrap_or_else(|| fallback.to_string())
}

impl DetectorConfig {
    pub fn em_field_default() -> Self {
        Self::new(
            "em-field-1",
            200,
            vec![FrequencyBand::new(
                "field",
                SignatureDomain::Radio,
                FIELD_SIGNATURE_RANGE.min,
                FIELD_SIGNATURE_RANGE.max,
            )],
        )
    }
}

/// Near-field magnetometer detector
pub struct EmFieldDetector {
    config: DetectorConfig,
    sampler: Arc<dyn Sampler>,
}

impl EmFieldDetector {
    pub fn new(config: DetectorConfig, sampler: Arc<dyn Sampler>) -> Self {
        Self { config, sampler }
    }

    pub fn with_default_bands(sampler: Arc<dyn Sampler>) -> Self {
        Self::new(DetectorConfig::em_field_default(), sampler)
    }
}

#[async_trait]
impl SignalDetector for EmFieldDetector {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn domain(&self) -> SensorDomain {
        SensorDomain::EmField
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
            .matches_field_signature(bin.frequency, bin.amplitude)
            .then(|| label_near(catalog, bin.frequency, EM_FIELD_ANOMALY))
    }

    fn estimate_distance(&self, _frequency: f64, strength: f64) -> f64 {
        inverse_square_distance(strength, EM_FIELD_CALIBRATION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minetrace_core::{NoiseFilter, RawReading};
    use minetrace_sensors::ScriptedSampler;

    fn poll_once(reading: RawReading) -> Vec<minetrace_core::DetectedSignal> {
        let detector =
            EmFieldDetector::with_default_bands(Arc::new(ScriptedSampler::repeating("mag", reading)));
        let filter = NoiseFilter::new(Arc::new(SignatureCatalog::load()));
        let band = detector.bands()[0].clone();
        futures::executor::block_on(detector.poll(&band, &filter)).unwrap()
    }

    #[test]
    fn test_inverse_square_distance() {
        assert_eq!(inverse_square_distance(100.0, EM_FIELD_CALIBRATION), 10.0);
        assert_eq!(inverse_square_distance(25.0, EM_FIELD_CALIBRATION), 20.0);
        // Floors strength at 1
        assert_eq!(inverse_square_distance(0.0, EM_FIELD_CALIBRATION), 100.0);
    }

    #[test]
    fn test_field_labels_known_emitter() {
        let signals = poll_once(RawReading::new(62_500.0, 40.0));
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].domain, SensorDomain::EmField);
        assert_eq!(signals[0].device_class.as_deref(), Some("antminer-vrm"));
    }

    #[test]
    fn test_field_anomaly_fallback_label() {
        let signals = poll_once(RawReading::new(400_000.0, 40.0));
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].device_class.as_deref(), Some(EM_FIELD_ANOMALY));
        assert_eq!(signals[0].estimated_distance, inverse_square_distance(40.0, EM_FIELD_CALIBRATION));
    }

    #[test]
    fn test_weak_field_is_ignored() {
        assert!(poll_once(RawReading::new(62_500.0, 5.0)).is_empty());
    }
}
