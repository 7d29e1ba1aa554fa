//! Signature catalog of known emitter frequencies
//!
//! Holds the built-in table of mining-hardware frequency signatures,
//! partitioned by spectral domain, and a frequency → device-class index
//! used for "is this frequency known" and confidence lookups.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    FrequencyRange, RawReading, SignatureDomain, DEFAULT_CATALOG_CONFIDENCE,
    KNOWN_FREQUENCY_TOLERANCE,
};

/// Errors from loading catalog files
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid signature {device_class}: {reason}")]
    Invalid { device_class: String, reason: String },
}

/// A known emitter frequency signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencySignature {
    /// Center frequency in Hz
    pub frequency: f64,
    /// Absolute match tolerance in Hz
    pub tolerance: f64,
    /// Minimum amplitude (0-100 scale) for a reading to count
    pub min_amplitude: f64,
    /// Hardware class this signature identifies
    pub device_class: String,
    pub domain: SignatureDomain,
}

impl FrequencySignature {
    pub fn new(
        frequency: f64,
        tolerance: f64,
        min_amplitude: f64,
        device_class: &str,
        domain: SignatureDomain,
    ) -> Self {
        Self {
            frequency,
            tolerance,
            min_amplitude,
            device_class: device_class.to_string(),
            domain,
        }
    }

    /// Frequency within tolerance and amplitude above threshold
    pub fn matches(&self, frequency: f64, amplitude: f64) -> bool {
        (self.frequency - frequency).abs() <= self.tolerance && amplitude >= self.min_amplitude
    }

    fn validate(&self) -> Result<(), CatalogError> {
        let reason = if !self.frequency.is_finite() || self.frequency <= 0.0 {
            Some("frequency must be positive")
        } else if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            Some("tolerance must be non-negative")
        } else if !self.min_amplitude.is_finite() {
            Some("min_amplitude must be finite")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(CatalogError::Invalid {
                device_class: self.device_class.clone(),
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// All device classes sharing one frequency bucket
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignatureGroup {
    pub frequency: f64,
    pub device_classes: Vec<String>,
    /// Aggregate confidence: more independent device classes, higher confidence
    pub confidence: f64,
}

impl SignatureGroup {
    fn aggregate_confidence(classes: usize) -> f64 {
        (0.6 + 0.1 * classes as f64).min(0.95)
    }
}

/// Built-in signature row
struct BuiltinSignature {
    frequency: f64,
    tolerance: f64,
    min_amplitude: f64,
    device_class: &'static str,
    domain: SignatureDomain,
}

/// Default catalog of mining-hardware signatures
static BUILTIN_SIGNATURES: &[BuiltinSignature] = &[
    // Infrasonic: structural vibration from racks and pumps
    BuiltinSignature { frequency: 8.0, tolerance: 1.5, min_amplitude: 20.0, device_class: "rack-vibration", domain: SignatureDomain::Infrasonic },
    BuiltinSignature { frequency: 15.0, tolerance: 2.0, min_amplitude: 20.0, device_class: "immersion-pump", domain: SignatureDomain::Infrasonic },
    // Audible: fan blade-pass tones and chassis resonance
    BuiltinSignature { frequency: 2_000.0, tolerance: 150.0, min_amplitude: 5.0, device_class: "asic-fan-blade-pass", domain: SignatureDomain::Acoustic },
    BuiltinSignature { frequency: 4_000.0, tolerance: 200.0, min_amplitude: 5.0, device_class: "asic-fan-harmonic", domain: SignatureDomain::Acoustic },
    BuiltinSignature { frequency: 6_500.0, tolerance: 250.0, min_amplitude: 8.0, device_class: "gpu-fan", domain: SignatureDomain::Acoustic },
    BuiltinSignature { frequency: 12_000.0, tolerance: 400.0, min_amplitude: 10.0, device_class: "hashboard-chassis-resonance", domain: SignatureDomain::Acoustic },
    // Ultrasonic: magnetics whine from PSUs and voltage regulators
    BuiltinSignature { frequency: 25_000.0, tolerance: 800.0, min_amplitude: 10.0, device_class: "psu-coil-whine", domain: SignatureDomain::Ultrasonic },
    BuiltinSignature { frequency: 40_000.0, tolerance: 900.0, min_amplitude: 10.0, device_class: "vrm-inductor-whine", domain: SignatureDomain::Ultrasonic },
    BuiltinSignature { frequency: 62_500.0, tolerance: 1_000.0, min_amplitude: 10.0, device_class: "antminer-vrm", domain: SignatureDomain::Ultrasonic },
    BuiltinSignature { frequency: 62_500.0, tolerance: 1_000.0, min_amplitude: 10.0, device_class: "whatsminer-vrm", domain: SignatureDomain::Ultrasonic },
    // Radio: switching converters and network clocks
    BuiltinSignature { frequency: 62_500.0, tolerance: 1_000.0, min_amplitude: 15.0, device_class: "antminer-vrm", domain: SignatureDomain::Radio },
    BuiltinSignature { frequency: 125_000.0, tolerance: 2_000.0, min_amplitude: 15.0, device_class: "psu-pfc-switching", domain: SignatureDomain::Radio },
    BuiltinSignature { frequency: 250_000.0, tolerance: 3_000.0, min_amplitude: 15.0, device_class: "hashboard-dc-dc", domain: SignatureDomain::Radio },
    BuiltinSignature { frequency: 1_500_000.0, tolerance: 10_000.0, min_amplitude: 20.0, device_class: "asic-core-clock-harmonic", domain: SignatureDomain::Radio },
    BuiltinSignature { frequency: 25_000_000.0, tolerance: 50_000.0, min_amplitude: 20.0, device_class: "ethernet-phy-clock", domain: SignatureDomain::Radio },
];

/// Frequency window (Hz) the EM field probe treats as emitter-like
pub const FIELD_SIGNATURE_RANGE: FrequencyRange = FrequencyRange::new(50_000.0, 500_000.0);

/// Minimum field strength for a field-signature match
pub const FIELD_MIN_STRENGTH: f64 = 10.0;

/// Curated conducted-emission windows on the mains wiring
pub const POWER_SIGNATURE_RANGES: &[FrequencyRange] = &[
    // Low-frequency switching ripple
    FrequencyRange::new(3_000.0, 9_000.0),
    // SMPS conducted emissions
    FrequencyRange::new(20_000.0, 150_000.0),
];

/// Minimum amplitude for a power-line match
pub const POWER_MIN_AMPLITUDE: f64 = 15.0;

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default, rename = "signature")]
    signatures: Vec<FrequencySignature>,
}

/// Catalog of known emitter signatures
#[derive(Debug, Clone)]
pub struct SignatureCatalog {
    by_domain: HashMap<SignatureDomain, Vec<FrequencySignature>>,
    /// Rounded Hz → group
    index: BTreeMap<i64, SignatureGroup>,
    default_confidence: f64,
}

impl SignatureCatalog {
    /// Empty catalog
    pub fn new() -> Self {
        Self {
            by_domain: HashMap::new(),
            index: BTreeMap::new(),
            default_confidence: DEFAULT_CATALOG_CONFIDENCE,
        }
    }

    /// Catalog populated with the built-in signature table
    pub fn load() -> Self {
        let mut catalog = Self::new();
        catalog.extend(BUILTIN_SIGNATURES.iter().map(|row| {
            FrequencySignature::new(
                row.frequency,
                row.tolerance,
                row.min_amplitude,
                row.device_class,
                row.domain,
            )
        }));
        debug!(
            "Loaded {} built-in signatures in {} frequency groups",
            catalog.len(),
            catalog.index.len()
        );
        catalog
    }

    /// Parse `[[signature]]` entries from TOML
    pub fn from_toml_str(toml_str: &str) -> Result<Vec<FrequencySignature>, CatalogError> {
        let file: CatalogFile = toml::from_str(toml_str)?;
        for signature in &file.signatures {
            signature.validate()?;
        }
        Ok(file.signatures)
    }

    /// Merge signatures from a TOML file into this catalog
    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> Result<usize, CatalogError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let signatures = Self::from_toml_str(&content)?;
        let count = signatures.len();
        if count == 0 {
            warn!("Catalog file {} has no signatures", path.as_ref().display());
        }
        self.extend(signatures);
        Ok(count)
    }

    /// Override the confidence reported for unmatched frequencies
    pub fn with_default_confidence(mut self, confidence: f64) -> Self {
        self.default_confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Add signatures and rebuild the frequency index
    pub fn extend<I>(&mut self, signatures: I)
    where
        I: IntoIterator<Item = FrequencySignature>,
    {
        for signature in signatures {
            self.by_domain
                .entry(signature.domain)
                .or_default()
                .push(signature);
        }
        self.rebuild_index();
    }

    fn rebuild_index(&mut self) {
        self.index.clear();

        for signature in self.by_domain.values().flatten() {
            let group = self
                .index
                .entry(signature.frequency.round() as i64)
                .or_insert_with(|| SignatureGroup {
                    frequency: signature.frequency,
                    device_classes: Vec::new(),
                    confidence: 0.0,
                });
            if !group.device_classes.contains(&signature.device_class) {
                group.device_classes.push(signature.device_class.clone());
            }
        }

        for group in self.index.values_mut() {
            group.device_classes.sort();
            group.confidence = SignatureGroup::aggregate_confidence(group.device_classes.len());
        }
    }

    /// Closest indexed group within the known-frequency tolerance
    pub fn group_for(&self, frequency: f64) -> Option<&SignatureGroup> {
        if !frequency.is_finite() {
            return None;
        }
        let low = (frequency - KNOWN_FREQUENCY_TOLERANCE).floor() as i64;
        let high = (frequency + KNOWN_FREQUENCY_TOLERANCE).ceil() as i64;

        self.index
            .range(low..=high)
            .map(|(_, group)| group)
            .filter(|group| (group.frequency - frequency).abs() <= KNOWN_FREQUENCY_TOLERANCE)
            .min_by(|a, b| {
                (a.frequency - frequency)
                    .abs()
                    .total_cmp(&(b.frequency - frequency).abs())
            })
    }

    /// True if any indexed frequency lies within the fixed tolerance of `frequency`
    pub fn is_known_frequency(&self, frequency: f64) -> bool {
        self.group_for(frequency).is_some()
    }

    /// Aggregate confidence of the matching group, or the configured default
    pub fn confidence_for(&self, frequency: f64) -> f64 {
        self.group_for(frequency)
            .map(|group| group.confidence)
            .unwrap_or(self.default_confidence)
    }

    /// Device classes indexed near `frequency`
    pub fn device_classes_near(&self, frequency: f64) -> Vec<&str> {
        self.group_for(frequency)
            .map(|group| group.device_classes.iter().map(|c| c.as_str()).collect())
            .unwrap_or_default()
    }

    /// All signatures tagged with `domain`
    pub fn signatures_in_domain(&self, domain: SignatureDomain) -> &[FrequencySignature] {
        self.by_domain
            .get(&domain)
            .map(|signatures| signatures.as_slice())
            .unwrap_or(&[])
    }

    /// Best signature in `domain` matching frequency and amplitude
    pub fn match_in_domain(
        &self,
        domain: SignatureDomain,
        frequency: f64,
        amplitude: f64,
    ) -> Option<&FrequencySignature> {
        self.signatures_in_domain(domain)
            .iter()
            .filter(|signature| signature.matches(frequency, amplitude))
            .min_by(|a, b| {
                (a.frequency - frequency)
                    .abs()
                    .total_cmp(&(b.frequency - frequency).abs())
            })
    }

    /// Power-line reading inside a curated conducted-emission window
    pub fn matches_power_signature(&self, reading: &RawReading) -> bool {
        reading.amplitude >= POWER_MIN_AMPLITUDE
            && POWER_SIGNATURE_RANGES
                .iter()
                .any(|range| range.contains(reading.frequency))
    }

    /// EM field reading inside the emitter-like field window
    pub fn matches_field_signature(&self, frequency: f64, strength: f64) -> bool {
        strength >= FIELD_MIN_STRENGTH && FIELD_SIGNATURE_RANGE.contains(frequency)
    }

    /// Frequency groups in ascending order
    pub fn groups(&self) -> impl Iterator<Item = &SignatureGroup> {
        self.index.values()
    }

    pub fn default_confidence(&self) -> f64 {
        self.default_confidence
    }

    /// Total signature count across domains
    pub fn len(&self) -> usize {
        self.by_domain.values().map(|s| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SignatureCatalog {
    fn default() -> Self {
        Self::load()
    }
}
