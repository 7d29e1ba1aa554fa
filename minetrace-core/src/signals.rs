//! Signal types shared by detectors, the correlation engine and the tracker
//!
//! Detections flow one way:
//! - Detectors turn raw readings into [`DetectedSignal`]s
//! - The correlation engine fuses them into [`ComprehensiveDetection`]s
//! - Measurements synthesized from detections feed the direction tracker

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{normalize_bearing, GeoPosition, MAX_CONFIDENCE, MAX_STRENGTH, MIN_CONFIDENCE};

/// Frequency range in Hz, inclusive on both ends
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyRange {
    pub min: f64,
    pub max: f64,
}

impl FrequencyRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, frequency: f64) -> bool {
        frequency >= self.min && frequency <= self.max
    }

    /// Overlap of two ranges, `None` when they are disjoint
    pub fn intersect(&self, other: &FrequencyRange) -> Option<FrequencyRange> {
        let min = self.min.max(other.min);
        let max = self.max.min(other.max);
        (min <= max).then_some(FrequencyRange { min, max })
    }

    pub fn width(&self) -> f64 {
        (self.max - self.min).max(0.0)
    }
}

/// Spectral domain a catalogued signature belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureDomain {
    Infrasonic,
    Acoustic,
    Ultrasonic,
    Radio,
}

impl SignatureDomain {
    pub const ALL: [SignatureDomain; 4] = [
        SignatureDomain::Infrasonic,
        SignatureDomain::Acoustic,
        SignatureDomain::Ultrasonic,
        SignatureDomain::Radio,
    ];

    /// Passband used by the noise filter's bandpass stage
    pub fn bounds(&self) -> FrequencyRange {
        match self {
            SignatureDomain::Infrasonic => FrequencyRange::new(0.1, 20.0),
            SignatureDomain::Acoustic => FrequencyRange::new(20.0, 20_000.0),
            SignatureDomain::Ultrasonic => FrequencyRange::new(20_000.0, 100_000.0),
            SignatureDomain::Radio => FrequencyRange::new(3_000.0, 6_000_000_000.0),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureDomain::Infrasonic => "infrasonic",
            SignatureDomain::Acoustic => "acoustic",
            SignatureDomain::Ultrasonic => "ultrasonic",
            SignatureDomain::Radio => "radio",
        }
    }
}

impl std::str::FromStr for SignatureDomain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "infrasonic" => Ok(SignatureDomain::Infrasonic),
            "acoustic" | "audible" => Ok(SignatureDomain::Acoustic),
            "ultrasonic" => Ok(SignatureDomain::Ultrasonic),
            "radio" | "rf" => Ok(SignatureDomain::Radio),
            other => Err(format!("unknown signature domain: {}", other)),
        }
    }
}

/// Physical sensor a detector samples from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorDomain {
    /// Radio-frequency sub-bands
    Rf,
    /// Broad electromagnetic field probe
    EmField,
    /// Conducted noise on the mains wiring
    PowerLine,
    /// Microphone / ultrasonic transducer
    Acoustic,
}

impl SensorDomain {
    pub const ALL: [SensorDomain; 4] = [
        SensorDomain::Rf,
        SensorDomain::EmField,
        SensorDomain::PowerLine,
        SensorDomain::Acoustic,
    ];

    /// Which shared registry detections from this sensor land in
    pub fn registry(&self) -> RegistryKind {
        match self {
            SensorDomain::Acoustic => RegistryKind::Acoustic,
            _ => RegistryKind::Electromagnetic,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorDomain::Rf => "rf",
            SensorDomain::EmField => "em_field",
            SensorDomain::PowerLine => "power_line",
            SensorDomain::Acoustic => "acoustic",
        }
    }
}

/// The two shared detection registries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryKind {
    Electromagnetic,
    Acoustic,
}

/// One raw reading from a sampling capability
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    /// Dominant frequency in Hz
    pub frequency: f64,
    /// Amplitude on the 0-100 sensor scale
    pub amplitude: f64,
    /// Phase in radians, when the sensor reports it
    pub phase: f64,
}

impl RawReading {
    pub fn new(frequency: f64, amplitude: f64) -> Self {
        Self {
            frequency,
            amplitude,
            phase: 0.0,
        }
    }

    pub fn with_phase(mut self, phase: f64) -> Self {
        self.phase = phase;
        self
    }
}

/// A positioned strength sample consumed by the direction tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalMeasurement {
    pub position: GeoPosition,
    /// Signal strength (0-100)
    pub strength: f64,
    pub frequency: f64,
    pub timestamp: DateTime<Utc>,
    pub domain: SensorDomain,
}

impl SignalMeasurement {
    pub fn new(position: GeoPosition, strength: f64, frequency: f64, domain: SensorDomain) -> Self {
        Self {
            position,
            strength: strength.clamp(0.0, MAX_STRENGTH),
            frequency,
            timestamp: Utc::now(),
            domain,
        }
    }
}

/// A reading that matched a known emitter signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedSignal {
    pub id: Uuid,
    pub domain: SensorDomain,
    /// Name of the band loop that produced it
    pub band: String,
    pub frequency: f64,
    pub amplitude: f64,
    /// Normalized strength (0-100)
    pub strength: f64,
    /// Confidence (0.0 - 1.0)
    pub confidence: f64,
    /// Estimated distance to the emitter in meters
    pub estimated_distance: f64,
    pub timestamp: DateTime<Utc>,
    pub bearing: Option<f64>,
    pub elevation: Option<f64>,
    /// Device class of the matched signature
    pub device_class: Option<String>,
}

impl DetectedSignal {
    pub fn builder(domain: SensorDomain, frequency: f64, amplitude: f64) -> DetectedSignalBuilder {
        DetectedSignalBuilder::new(domain, frequency, amplitude)
    }

    /// Measurement tagged with the given position
    pub fn to_measurement(&self, position: GeoPosition) -> SignalMeasurement {
        SignalMeasurement {
            position,
            strength: self.strength,
            frequency: self.frequency,
            timestamp: self.timestamp,
            domain: self.domain,
        }
    }
}

/// Builder for detected signals
pub struct DetectedSignalBuilder {
    domain: SensorDomain,
    band: String,
    frequency: f64,
    amplitude: f64,
    strength: Option<f64>,
    confidence: f64,
    estimated_distance: f64,
    timestamp: Option<DateTime<Utc>>,
    bearing: Option<f64>,
    elevation: Option<f64>,
    device_class: Option<String>,
}

impl DetectedSignalBuilder {
    pub fn new(domain: SensorDomain, frequency: f64, amplitude: f64) -> Self {
        Self {
            domain,
            band: domain.as_str().to_string(),
            frequency,
            amplitude,
            strength: None,
            confidence: 0.5,
            estimated_distance: 0.0,
            timestamp: None,
            bearing: None,
            elevation: None,
            device_class: None,
        }
    }

    pub fn band(mut self, band: &str) -> Self {
        self.band = band.to_string();
        self
    }

    pub fn strength(mut self, strength: f64) -> Self {
        self.strength = Some(strength);
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn distance(mut self, meters: f64) -> Self {
        self.estimated_distance = meters.max(0.0);
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn bearing(mut self, bearing: f64) -> Self {
        self.bearing = Some(normalize_bearing(bearing));
        self
    }

    pub fn elevation(mut self, elevation: f64) -> Self {
        self.elevation = Some(elevation);
        self
    }

    pub fn device_class(mut self, class: &str) -> Self {
        self.device_class = Some(class.to_string());
        self
    }

    pub fn build(self) -> DetectedSignal {
        // Without an explicit strength the amplitude is already on the 0-100 scale
        let strength = self.strength.unwrap_or(self.amplitude).clamp(0.0, MAX_STRENGTH);

        DetectedSignal {
            id: Uuid::new_v4(),
            domain: self.domain,
            band: self.band,
            frequency: self.frequency,
            amplitude: self.amplitude,
            strength,
            confidence: self.confidence.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE),
            estimated_distance: self.estimated_distance,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            bearing: self.bearing,
            elevation: self.elevation,
            device_class: self.device_class,
        }
    }
}

/// Which estimator produced a direction estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorMethod {
    /// Strength-weighted centroid (TDOA-like)
    Tdoa,
    /// Pairwise bearing with strength correction (AOA-like)
    Aoa,
    /// Weakest-to-strongest gradient
    RssiGradient,
    /// Confidence-weighted combination of the above
    Fused,
}

/// Bearing/distance estimate toward the emitter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectionEstimate {
    /// Degrees clockwise from true north, [0, 360)
    pub bearing: f64,
    /// Meters
    pub distance: f64,
    /// Confidence (0.0 - 1.0)
    pub confidence: f64,
    pub method: EstimatorMethod,
}

impl DirectionEstimate {
    pub fn new(bearing: f64, distance: f64, confidence: f64, method: EstimatorMethod) -> Self {
        Self {
            bearing: normalize_bearing(bearing),
            distance: distance.max(0.0),
            confidence: if confidence.is_finite() {
                confidence.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
            } else {
                MIN_CONFIDENCE
            },
            method,
        }
    }

    /// Zero-confidence result for an estimator whose preconditions were not met
    pub fn insufficient(method: EstimatorMethod) -> Self {
        Self {
            bearing: 0.0,
            distance: 0.0,
            confidence: 0.0,
            method,
        }
    }

    /// Whether this estimate may be exposed as a current direction
    pub fn is_usable(&self) -> bool {
        self.confidence > crate::DIRECTION_ACCEPTANCE_THRESHOLD
    }
}

/// Fused cross-domain record of one emitter candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComprehensiveDetection {
    pub id: Uuid,
    /// EM frequency the detection was created with; never changes afterwards
    pub frequency_key: f64,
    /// Primary electromagnetic signal
    pub primary: DetectedSignal,
    /// Corroborating acoustic signals
    pub correlated: Vec<DetectedSignal>,
    pub combined_confidence: f64,
    /// Mean of primary and corroborating distances (meters)
    pub estimated_distance: f64,
    pub direction: Option<DirectionEstimate>,
    pub detected_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub update_count: u32,
}

impl ComprehensiveDetection {
    pub fn new(
        primary: DetectedSignal,
        correlated: Vec<DetectedSignal>,
        combined_confidence: f64,
        estimated_distance: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            frequency_key: primary.frequency,
            primary,
            correlated,
            combined_confidence: combined_confidence.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE),
            estimated_distance,
            direction: None,
            detected_at: now,
            updated_at: now,
            update_count: 0,
        }
    }

    /// Whether an EM frequency belongs to this detection's bucket
    pub fn matches_frequency(&self, frequency: f64, tolerance: f64) -> bool {
        (self.frequency_key - frequency).abs() <= tolerance
    }

    /// Refresh in place; the frequency key is left untouched
    pub fn refresh(
        &mut self,
        primary: DetectedSignal,
        correlated: Vec<DetectedSignal>,
        combined_confidence: f64,
        estimated_distance: f64,
    ) {
        self.primary = primary;
        self.correlated = correlated;
        self.combined_confidence = combined_confidence.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE);
        self.estimated_distance = estimated_distance;
        self.updated_at = Utc::now();
        self.update_count += 1;
    }

    /// Store a direction estimate if it clears the acceptance threshold
    pub fn accept_direction(&mut self, estimate: DirectionEstimate) -> bool {
        if estimate.is_usable() {
            self.direction = Some(estimate);
            true
        } else {
            false
        }
    }
}
