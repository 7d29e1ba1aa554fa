//! Cross-domain correlation engine
//!
//! Each cycle buckets the electromagnetic signals that have acoustic
//! correlates by frequency, then creates or refreshes one comprehensive
//! detection per bucket and re-estimates its direction once. A bucket's
//! primary is its most recent signal and its correlates are capped to the
//! measurement window, so a cycle stays cheap as registries fill.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::VecDeque;
use thiserror::Error;
use tracing::{debug, error};
use uuid::Uuid;

use minetrace_core::{
    ComprehensiveDetection, DetectedSignal, DirectionEstimate, DirectionTracker, GeoPosition,
    SignalMeasurement, MAX_CONFIDENCE,
};

use crate::TrackerConfig;

/// Weight of the electromagnetic confidence in the combined score
pub const EM_WEIGHT: f64 = 0.6;

/// Weight of the mean acoustic confidence in the combined score
pub const ACOUSTIC_WEIGHT: f64 = 0.4;

/// Bonus when more than one acoustic signal corroborates
pub const CORROBORATION_BONUS: f64 = 1.1;

/// Errors isolated to a single correlation group
#[derive(Debug, Error)]
pub enum CorrelationError {
    #[error("Non-finite {field} in group at {frequency} Hz")]
    NonFinite { field: &'static str, frequency: f64 },
}

/// Fused confidence and distance of one group
pub fn combine(
    primary: &DetectedSignal,
    correlated: &[DetectedSignal],
) -> Result<(f64, f64), CorrelationError> {
    let signals = std::iter::once(primary).chain(correlated);
    for signal in signals.clone() {
        if !signal.confidence.is_finite() {
            return Err(CorrelationError::NonFinite {
                field: "confidence",
                frequency: primary.frequency,
            });
        }
        if !signal.estimated_distance.is_finite() {
            return Err(CorrelationError::NonFinite {
                field: "distance",
                frequency: primary.frequency,
            });
        }
    }

    let acoustic_mean =
        correlated.iter().map(|s| s.confidence).sum::<f64>() / correlated.len().max(1) as f64;
    let mut confidence = EM_WEIGHT * primary.confidence + ACOUSTIC_WEIGHT * acoustic_mean;
    if correlated.len() > 1 {
        confidence *= CORROBORATION_BONUS;
    }

    let count = 1 + correlated.len();
    let distance = signals.map(|s| s.estimated_distance).sum::<f64>() / count as f64;

    Ok((confidence.min(MAX_CONFIDENCE), distance))
}

/// What changed during one correlation cycle
#[derive(Debug, Default, Clone)]
pub struct CycleOutcome {
    /// Detections created this cycle
    pub created: Vec<ComprehensiveDetection>,
    /// Detections whose direction estimate was replaced
    pub direction_updates: Vec<(ComprehensiveDetection, DirectionEstimate)>,
    /// Highest-confidence detection that has a direction
    pub best: Option<ComprehensiveDetection>,
    /// Groups skipped because of a correlation error
    pub skipped: usize,
}

/// Owner of the comprehensive detection map
pub struct Correlator {
    detections: DashMap<Uuid, ComprehensiveDetection>,
    tracker: DirectionTracker,
    correlation_tolerance: f64,
    match_tolerance: f64,
    window: usize,
    /// Manually injected measurements, newest last
    injected: Mutex<VecDeque<SignalMeasurement>>,
}

impl Correlator {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            detections: DashMap::new(),
            tracker: DirectionTracker::new(config.direction),
            correlation_tolerance: config.correlation_tolerance_hz,
            match_tolerance: config.match_tolerance_hz,
            window: config.measurement_window.max(1),
            injected: Mutex::new(VecDeque::new()),
        }
    }

    /// Run one cycle over registry snapshots; order of the inputs does not matter
    pub fn correlate(
        &self,
        electromagnetic: &[DetectedSignal],
        acoustic: &[DetectedSignal],
        operator: &GeoPosition,
    ) -> CycleOutcome {
        let mut outcome = CycleOutcome::default();
        let electromagnetic = sorted(electromagnetic);
        let acoustic = by_frequency(acoustic);

        for bucket in self.buckets(&electromagnetic, &acoustic) {
            let correlated = self.correlates(&acoustic, bucket.primary.frequency);
            if let Err(e) = self.merge_group(&bucket, correlated, operator, &mut outcome) {
                error!("Correlation skipped a group: {}", e);
                outcome.skipped += 1;
            }
        }

        outcome.best = self.best();
        outcome
    }

    /// Group corroborated signals by frequency, keeping the latest as primary
    fn buckets<'a>(
        &self,
        electromagnetic: &'a [DetectedSignal],
        acoustic: &[DetectedSignal],
    ) -> Vec<Bucket<'a>> {
        let mut buckets: Vec<Bucket<'a>> = Vec::new();

        for primary in electromagnetic {
            if span(acoustic, primary.frequency, self.correlation_tolerance).is_empty() {
                continue;
            }

            let tolerance = self.match_tolerance;
            if let Some(bucket) = buckets
                .iter_mut()
                .find(|b| (b.key - primary.frequency).abs() <= tolerance)
            {
                bucket.primary = primary;
                continue;
            }

            let existing = self
                .detections
                .iter()
                .find(|entry| entry.matches_frequency(primary.frequency, tolerance))
                .map(|entry| (*entry.key(), entry.frequency_key));

            buckets.push(Bucket {
                key: existing.map_or(primary.frequency, |(_, key)| key),
                existing: existing.map(|(id, _)| id),
                primary,
            });
        }

        buckets
    }

    /// Most recent acoustic signals near `frequency`, at most one window
    fn correlates(&self, acoustic: &[DetectedSignal], frequency: f64) -> Vec<DetectedSignal> {
        let mut correlated = span(acoustic, frequency, self.correlation_tolerance).to_vec();
        correlated.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        let excess = correlated.len().saturating_sub(self.window);
        correlated.drain(..excess);
        correlated
    }

    fn merge_group(
        &self,
        bucket: &Bucket<'_>,
        correlated: Vec<DetectedSignal>,
        operator: &GeoPosition,
        outcome: &mut CycleOutcome,
    ) -> Result<(), CorrelationError> {
        let primary = bucket.primary;
        let (confidence, distance) = combine(primary, &correlated)?;
        let measurements = self.measurements_for(primary, &correlated, operator);
        let estimate = self.tracker.estimate(&measurements, operator);

        let mut detection = match bucket.existing.and_then(|id| self.detections.get_mut(&id)) {
            Some(mut entry) => {
                entry.refresh(primary.clone(), correlated, confidence, distance);
                entry
            }
            None => {
                let detection =
                    ComprehensiveDetection::new(primary.clone(), correlated, confidence, distance);
                debug!(
                    "New detection {} at {:.1} Hz ({:.2})",
                    detection.id, detection.frequency_key, detection.combined_confidence
                );
                outcome.created.push(detection.clone());
                self.detections.entry(detection.id).or_insert(detection)
            }
        };

        if detection.accept_direction(estimate) {
            outcome.direction_updates.push((detection.clone(), estimate));
        }
        Ok(())
    }

    /// Measurements for one group: contributors at the operator's position plus
    /// nearby injected measurements, capped to the most recent window
    fn measurements_for(
        &self,
        primary: &DetectedSignal,
        correlated: &[DetectedSignal],
        operator: &GeoPosition,
    ) -> Vec<SignalMeasurement> {
        let mut measurements: Vec<SignalMeasurement> = std::iter::once(primary)
            .chain(correlated)
            .map(|s| s.to_measurement(*operator))
            .collect();

        measurements.extend(
            self.injected
                .lock()
                .iter()
                .filter(|m| (m.frequency - primary.frequency).abs() <= self.correlation_tolerance)
                .cloned(),
        );
        measurements.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        let excess = measurements.len().saturating_sub(self.window);
        measurements.drain(..excess);
        measurements
    }

    /// Inject a positioned measurement (testing, playback)
    pub fn add_measurement(&self, measurement: SignalMeasurement) {
        let mut injected = self.injected.lock();
        if injected.len() >= self.window {
            injected.pop_front();
        }
        injected.push_back(measurement);
    }

    pub fn injected_measurements(&self) -> Vec<SignalMeasurement> {
        self.injected.lock().iter().cloned().collect()
    }

    /// Highest-confidence detection with a direction estimate
    pub fn best(&self) -> Option<ComprehensiveDetection> {
        self.detections
            .iter()
            .filter(|entry| entry.direction.is_some())
            .max_by(|a, b| {
                a.combined_confidence
                    .partial_cmp(&b.combined_confidence)
                    .unwrap_or(Ordering::Equal)
            })
            .map(|entry| entry.value().clone())
    }

    /// Direction of the best detection
    pub fn current_direction(&self) -> Option<DirectionEstimate> {
        self.best().and_then(|d| d.direction)
    }

    /// All detections, oldest first
    pub fn detections(&self) -> Vec<ComprehensiveDetection> {
        let mut detections: Vec<ComprehensiveDetection> =
            self.detections.iter().map(|e| e.value().clone()).collect();
        detections.sort_by(|a, b| a.detected_at.cmp(&b.detected_at));
        detections
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// Forget all detections and injected measurements
    pub fn clear(&self) {
        self.detections.clear();
        self.injected.lock().clear();
    }
}

/// One frequency bucket of a correlation cycle
struct Bucket<'a> {
    key: f64,
    /// Detection already tracking this bucket
    existing: Option<Uuid>,
    primary: &'a DetectedSignal,
}

fn sorted(signals: &[DetectedSignal]) -> Vec<DetectedSignal> {
    let mut signals = signals.to_vec();
    signals.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.frequency.total_cmp(&b.frequency))
    });
    signals
}

fn by_frequency(signals: &[DetectedSignal]) -> Vec<DetectedSignal> {
    let mut signals = signals.to_vec();
    signals.sort_by(|a, b| {
        a.frequency
            .total_cmp(&b.frequency)
            .then_with(|| a.timestamp.cmp(&b.timestamp))
    });
    signals
}

/// Signals within `tolerance` of `frequency`; `signals` must be frequency-sorted
fn span(signals: &[DetectedSignal], frequency: f64, tolerance: f64) -> &[DetectedSignal] {
    let start = signals.partition_point(|s| s.frequency < frequency - tolerance);
    let end = signals.partition_point(|s| s.frequency <= frequency + tolerance);
    &signals[start..end.max(start)]
}
