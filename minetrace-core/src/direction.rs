//! Direction tracker - bearing/distance from positioned strength samples
//!
//! Three independent estimators, each returning a zero-confidence result
//! when it lacks enough measurements:
//! - TDOA-like: strength-weighted centroid of measurement positions
//! - AOA-like: pairwise bearings nudged by the strength change
//! - RSSI gradient: weakest → strongest measurement
//!
//! Results above the acceptance threshold are fused by confidence weight.

use serde::{Deserialize, Serialize};

use crate::{
    haversine_distance, initial_bearing, DirectionEstimate, EstimatorMethod, GeoPosition,
    SignalMeasurement, DIRECTION_ACCEPTANCE_THRESHOLD,
};

/// Estimator constants
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectionConfig {
    pub tdoa_confidence: f64,
    pub aoa_confidence: f64,
    pub rssi_confidence: f64,
    /// Degrees of bearing adjustment per unit of strength change (AOA)
    pub aoa_strength_gain: f64,
    /// Strength at one meter for the log-distance model
    pub reference_power: f64,
    pub aoa_path_loss_exponent: f64,
    pub rssi_path_loss_exponent: f64,
    pub min_distance: f64,
    pub max_distance: f64,
}

impl Default for DirectionConfig {
    fn default() -> Self {
        Self {
            tdoa_confidence: 0.85,
            aoa_confidence: 0.75,
            rssi_confidence: 0.70,
            aoa_strength_gain: 0.5,
            reference_power: 100.0,
            aoa_path_loss_exponent: 2.0,
            rssi_path_loss_exponent: 2.5,
            min_distance: 1.0,
            max_distance: 1000.0,
        }
    }
}

/// Log-distance path-loss model: distance at which `strength` is observed
pub fn log_distance(strength: f64, reference_power: f64, exponent: f64) -> f64 {
    10f64.powf((reference_power - strength) / (10.0 * exponent))
}

/// Strength-weighted centroid; falls back to the plain centroid when all strengths are zero
pub fn weighted_centroid(measurements: &[SignalMeasurement]) -> Option<GeoPosition> {
    if measurements.is_empty() {
        return None;
    }

    let total: f64 = measurements.iter().map(|m| m.strength).sum();
    let uniform = 1.0 / measurements.len() as f64;

    let mut centroid = GeoPosition::default();
    for m in measurements {
        let weight = if total > 0.0 { m.strength / total } else { uniform };
        centroid.latitude += m.position.latitude * weight;
        centroid.longitude += m.position.longitude * weight;
        centroid.altitude += m.position.altitude * weight;
    }

    Some(centroid)
}

/// Multi-method direction estimator
#[derive(Debug, Clone, Default)]
pub struct DirectionTracker {
    config: DirectionConfig,
}

impl DirectionTracker {
    pub fn new(config: DirectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DirectionConfig {
        &self.config
    }

    fn clamp_distance(&self, distance: f64) -> f64 {
        distance.clamp(self.config.min_distance, self.config.max_distance)
    }

    /// Centroid-based estimate relative to `reference` (needs 3+ measurements)
    pub fn estimate_tdoa(
        &self,
        measurements: &[SignalMeasurement],
        reference: &GeoPosition,
    ) -> DirectionEstimate {
        if measurements.len() < 3 {
            return DirectionEstimate::insufficient(EstimatorMethod::Tdoa);
        }
        let Some(centroid) = weighted_centroid(measurements) else {
            return DirectionEstimate::insufficient(EstimatorMethod::Tdoa);
        };

        DirectionEstimate::new(
            initial_bearing(reference, &centroid),
            haversine_distance(reference, &centroid),
            self.config.tdoa_confidence,
            EstimatorMethod::Tdoa,
        )
    }

    /// Pairwise bearing estimate (needs 2+ measurements)
    ///
    /// Each consecutive pair contributes the bearing between the two positions
    /// plus `aoa_strength_gain × (s₂ − s₁)` degrees. The correction is an
    /// uncalibrated heuristic kept for behavioral compatibility.
    pub fn estimate_aoa(&self, measurements: &[SignalMeasurement]) -> DirectionEstimate {
        if measurements.len() < 2 {
            return DirectionEstimate::insufficient(EstimatorMethod::Aoa);
        }

        let bearings: Vec<f64> = measurements
            .windows(2)
            .map(|pair| {
                let base = initial_bearing(&pair[0].position, &pair[1].position);
                base + self.config.aoa_strength_gain * (pair[1].strength - pair[0].strength)
            })
            .collect();
        let bearing = bearings.iter().sum::<f64>() / bearings.len() as f64;

        let mean_strength =
            measurements.iter().map(|m| m.strength).sum::<f64>() / measurements.len() as f64;
        let distance = self.clamp_distance(log_distance(
            mean_strength,
            self.config.reference_power,
            self.config.aoa_path_loss_exponent,
        ));

        DirectionEstimate::new(bearing, distance, self.config.aoa_confidence, EstimatorMethod::Aoa)
    }

    /// Weakest-to-strongest gradient estimate (needs 3+ measurements)
    pub fn estimate_rssi_gradient(&self, measurements: &[SignalMeasurement]) -> DirectionEstimate {
        if measurements.len() < 3 {
            return DirectionEstimate::insufficient(EstimatorMethod::RssiGradient);
        }

        let strongest = measurements
            .iter()
            .max_by(|a, b| a.strength.total_cmp(&b.strength));
        let weakest = measurements
            .iter()
            .min_by(|a, b| a.strength.total_cmp(&b.strength));
        let (Some(strongest), Some(weakest)) = (strongest, weakest) else {
            return DirectionEstimate::insufficient(EstimatorMethod::RssiGradient);
        };

        let distance = self.clamp_distance(log_distance(
            strongest.strength,
            self.config.reference_power,
            self.config.rssi_path_loss_exponent,
        ));

        DirectionEstimate::new(
            initial_bearing(&weakest.position, &strongest.position),
            distance,
            self.config.rssi_confidence,
            EstimatorMethod::RssiGradient,
        )
    }

    /// Run all three estimators and fuse the results
    pub fn estimate(
        &self,
        measurements: &[SignalMeasurement],
        reference: &GeoPosition,
    ) -> DirectionEstimate {
        Self::fuse(&[
            self.estimate_tdoa(measurements, reference),
            self.estimate_aoa(measurements),
            self.estimate_rssi_gradient(measurements),
        ])
    }

    /// Confidence-weighted fusion of estimates above the acceptance threshold
    pub fn fuse(estimates: &[DirectionEstimate]) -> DirectionEstimate {
        let accepted: Vec<&DirectionEstimate> = estimates
            .iter()
            .filter(|e| e.confidence > DIRECTION_ACCEPTANCE_THRESHOLD)
            .collect();

        if accepted.is_empty() {
            return DirectionEstimate::insufficient(EstimatorMethod::Fused);
        }

        let weight: f64 = accepted.iter().map(|e| e.confidence).sum();
        let bearing = accepted.iter().map(|e| e.bearing * e.confidence).sum::<f64>() / weight;
        let distance = accepted.iter().map(|e| e.distance * e.confidence).sum::<f64>() / weight;
        let confidence = weight / accepted.len() as f64;

        DirectionEstimate::new(bearing, distance, confidence, EstimatorMethod::Fused)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measurement(lat: f64, lon: f64, strength: f64) -> SignalMeasurement {
        SignalMeasurement::new(
            GeoPosition::new(lat, lon, 0.0),
            strength,
            62_500.0,
            crate::SensorDomain::Rf,
        )
    }

    fn assert_invariants(estimate: &DirectionEstimate) {
        assert!((0.0..=1.0).contains(&estimate.confidence), "{:?}", estimate);
        assert!((0.0..360.0).contains(&estimate.bearing), "{:?}", estimate);
    }

    #[test]
    fn test_tdoa_needs_three_points() {
        let tracker = DirectionTracker::default();
        let reference = GeoPosition::new(33.0, 46.0, 0.0);

        let two = [measurement(33.001, 46.0, 50.0), measurement(33.0, 46.001, 50.0)];
        assert_eq!(tracker.estimate_tdoa(&two, &reference).confidence, 0.0);
        assert_eq!(tracker.estimate_tdoa(&[], &reference).confidence, 0.0);
    }

    #[test]
    fn test_equal_strength_centroid_is_unweighted() {
        let points = [
            measurement(33.0, 46.0, 40.0),
            measurement(33.003, 46.0, 40.0),
            measurement(33.0, 46.006, 40.0),
        ];

        let centroid = weighted_centroid(&points).unwrap();
        assert!((centroid.latitude - 33.001).abs() < 1e-12);
        assert!((centroid.longitude - 46.002).abs() < 1e-12);
    }

    #[test]
    fn test_zero_strength_centroid_falls_back_to_mean() {
        let points = [
            measurement(1.0, 1.0, 0.0),
            measurement(3.0, 3.0, 0.0),
            measurement(5.0, 5.0, 0.0),
        ];
        let centroid = weighted_centroid(&points).unwrap();
        assert!((centroid.latitude - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_tdoa_points_toward_strong_cluster() {
        let tracker = DirectionTracker::default();
        let reference = GeoPosition::new(33.0, 46.0, 0.0);
        let points = [
            measurement(33.001, 46.0, 90.0),
            measurement(33.0012, 46.0, 90.0),
            measurement(32.999, 46.0, 5.0),
        ];

        let estimate = tracker.estimate_tdoa(&points, &reference);
        assert_eq!(estimate.method, EstimatorMethod::Tdoa);
        assert_eq!(estimate.confidence, 0.85);
        // Mostly north of the operator
        assert!(estimate.bearing < 1.0 || estimate.bearing > 359.0);
        assert!(estimate.distance > 50.0);
    }

    #[test]
    fn test_aoa_pairwise_adjustment() {
        let tracker = DirectionTracker::default();
        // Due east, strength rising by 10 → +5 degrees
        let points = [measurement(0.0, 0.0, 40.0), measurement(0.0, 0.001, 50.0)];

        let estimate = tracker.estimate_aoa(&points);
        assert!((estimate.bearing - 95.0).abs() < 1e-6);
        assert_eq!(estimate.confidence, 0.75);
        // mean strength 45 → 10^(55/20)
        assert!((estimate.distance - 10f64.powf(55.0 / 20.0)).abs() < 1e-6);

        assert_eq!(tracker.estimate_aoa(&points[..1]).confidence, 0.0);
    }

    #[test]
    fn test_aoa_distance_is_clamped() {
        let tracker = DirectionTracker::default();
        let weak = [measurement(0.0, 0.0, 0.0), measurement(0.0, 0.0, 0.0)];
        assert_eq!(tracker.estimate_aoa(&weak).distance, 1000.0);

        let strong = [measurement(0.0, 0.0, 100.0), measurement(0.0, 0.0, 100.0)];
        assert_eq!(tracker.estimate_aoa(&strong).distance, 1.0);
    }

    #[test]
    fn test_rssi_gradient_weak_to_strong() {
        let tracker = DirectionTracker::default();
        let points = [
            measurement(0.0, 0.0, 10.0),
            measurement(0.0, 0.0005, 30.0),
            measurement(0.0, 0.001, 75.0),
        ];

        let estimate = tracker.estimate_rssi_gradient(&points);
        assert!((estimate.bearing - 90.0).abs() < 1e-6);
        assert_eq!(estimate.confidence, 0.70);
        assert!((estimate.distance - 10f64.powf(25.0 / 25.0)).abs() < 1e-9);

        assert_eq!(tracker.estimate_rssi_gradient(&points[..2]).confidence, 0.0);
    }

    #[test]
    fn test_fusion_weighted_average() {
        let fused = DirectionTracker::fuse(&[
            DirectionEstimate::new(10.0, 100.0, 0.9, EstimatorMethod::Tdoa),
            DirectionEstimate::new(20.0, 200.0, 0.7, EstimatorMethod::Aoa),
        ]);

        assert!((fused.bearing - 13.75).abs() < 1e-9);
        assert!((fused.confidence - 0.8).abs() < 1e-9);
        assert!((fused.distance - (100.0 * 0.9 + 200.0 * 0.7) / 1.6).abs() < 1e-9);
        assert_eq!(fused.method, EstimatorMethod::Fused);
    }

    #[test]
    fn test_fusion_discards_low_confidence() {
        let none = DirectionTracker::fuse(&[
            DirectionEstimate::new(10.0, 100.0, 0.5, EstimatorMethod::Tdoa),
            DirectionEstimate::new(20.0, 200.0, 0.2, EstimatorMethod::Aoa),
        ]);
        assert_eq!(none.confidence, 0.0);

        let one = DirectionTracker::fuse(&[
            DirectionEstimate::new(10.0, 100.0, 0.5, EstimatorMethod::Tdoa),
            DirectionEstimate::new(20.0, 200.0, 0.9, EstimatorMethod::Aoa),
        ]);
        assert_eq!(one.bearing, 20.0);
        assert_eq!(one.confidence, 0.9);
    }

    #[test]
    fn test_fused_bearing_is_normalized() {
        let fused = DirectionTracker::fuse(&[
            DirectionEstimate {
                bearing: 355.0,
                distance: 1.0,
                confidence: 0.9,
                method: EstimatorMethod::Aoa,
            },
            DirectionEstimate {
                bearing: 370.0,
                distance: 1.0,
                confidence: 0.9,
                method: EstimatorMethod::Aoa,
            },
        ]);
        assert!((fused.bearing - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_all_estimates_respect_invariants() {
        let tracker = DirectionTracker::default();
        let reference = GeoPosition::new(33.6, 46.4, 900.0);

        for n in 0..8usize {
            for step in 0..12 {
                let points: Vec<SignalMeasurement> = (0..n)
                    .map(|i| {
                        let angle = (i * 37 + step * 53) as f64;
                        let position = reference.offset(angle, 5.0 + (i * step) as f64);
                        let strength = ((i * 29 + step * 17) % 101) as f64;
                        SignalMeasurement::new(position, strength, 62_500.0, crate::SensorDomain::Rf)
                    })
                    .collect();

                assert_invariants(&tracker.estimate_tdoa(&points, &reference));
                assert_invariants(&tracker.estimate_aoa(&points));
                assert_invariants(&tracker.estimate_rssi_gradient(&points));
                assert_invariants(&tracker.estimate(&points, &reference));
            }
        }
    }
}
