//! Tracker configuration
//!
//! Loaded from TOML. Keys missing from the file fall back to the built-in
//! defaults at any nesting depth, so a file may override a single value.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use minetrace_core::{
    DirectionConfig, NoiseFilterConfig, SensorDomain, DEFAULT_CATALOG_CONFIDENCE,
    DEFAULT_REGISTRY_CAPACITY, KNOWN_FREQUENCY_TOLERANCE,
};
use minetrace_detectors::{DetectorConfig, DEFAULT_EVENT_CAPACITY};

/// Errors from loading or saving configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Per-domain detector settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorsConfig {
    pub rf: DetectorConfig,
    pub em_field: DetectorConfig,
    pub power_line: DetectorConfig,
    pub acoustic: DetectorConfig,
}

impl Default for DetectorsConfig {
    fn default() -> Self {
        Self {
            rf: DetectorConfig::rf_default(),
            em_field: DetectorConfig::em_field_default(),
            power_line: DetectorConfig::power_line_default(),
            acoustic: DetectorConfig::acoustic_default(),
        }
    }
}

impl DetectorsConfig {
    pub fn for_domain(&self, domain: SensorDomain) -> &DetectorConfig {
        match domain {
            SensorDomain::Rf => &self.rf,
            SensorDomain::EmField => &self.em_field,
            SensorDomain::PowerLine => &self.power_line,
            SensorDomain::Acoustic => &self.acoustic,
        }
    }
}

/// Audio guidance settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuidanceConfig {
    pub enabled: bool,
    /// Distance (meters) at or below which the success sweep plays
    pub success_distance_m: f64,
    /// Bearing change (degrees) that triggers a new directional cue
    pub directional_change_deg: f64,
}

impl Default for GuidanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            success_distance_m: 1.0,
            directional_change_deg: 45.0,
        }
    }
}

/// Tracking session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Correlation cycle cadence
    pub correlation_interval_ms: u64,
    /// Detector progress event cadence
    pub progress_interval_ms: u64,
    /// Signals kept per registry; oldest dropped first
    pub registry_capacity: usize,
    /// EM ↔ acoustic grouping tolerance (Hz)
    pub correlation_tolerance_hz: f64,
    /// Tolerance for updating an existing detection instead of creating one (Hz)
    pub match_tolerance_hz: f64,
    /// Most recent measurements fed to the direction tracker
    pub measurement_window: usize,
    /// Catalog confidence for unmatched frequencies
    pub default_confidence: f64,
    pub event_capacity: usize,
    /// Extra signatures merged into the built-in catalog
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_file: Option<PathBuf>,
    pub detectors: DetectorsConfig,
    pub guidance: GuidanceConfig,
    pub noise: NoiseFilterConfig,
    pub direction: DirectionConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            correlation_interval_ms: 500,
            progress_interval_ms: 1000,
            registry_capacity: DEFAULT_REGISTRY_CAPACITY,
            correlation_tolerance_hz: KNOWN_FREQUENCY_TOLERANCE,
            match_tolerance_hz: 100.0,
            measurement_window: 10,
            default_confidence: DEFAULT_CATALOG_CONFIDENCE,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            signature_file: None,
            detectors: DetectorsConfig::default(),
            guidance: GuidanceConfig::default(),
            noise: NoiseFilterConfig::default(),
            direction: DirectionConfig::default(),
        }
    }
}

impl TrackerConfig {
    /// Load from a TOML file, merged over the defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse a TOML document, merged over the defaults
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let overrides: toml::Value = toml::from_str(content)?;
        let mut merged = toml::Value::try_from(Self::default())?;
        merge_values(&mut merged, overrides);

        let config: Self = merged.try_into()?;
        config.validate()?;
        Ok(config)
    }

    /// Write the effective configuration, creating parent directories
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_toml_string()?)?;
        debug!("Saved config to {}", path.display());
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.correlation_interval_ms == 0 {
            return invalid("correlation_interval_ms must be positive");
        }
        if self.progress_interval_ms == 0 {
            return invalid("progress_interval_ms must be positive");
        }
        if self.registry_capacity == 0 {
            return invalid("registry_capacity must be positive");
        }
        if self.measurement_window == 0 {
            return invalid("measurement_window must be positive");
        }
        if !(self.correlation_tolerance_hz.is_finite() && self.correlation_tolerance_hz >= 0.0) {
            return invalid("correlation_tolerance_hz must be a non-negative number");
        }
        if !(self.match_tolerance_hz.is_finite() && self.match_tolerance_hz >= 0.0) {
            return invalid("match_tolerance_hz must be a non-negative number");
        }
        if !(0.0..=1.0).contains(&self.default_confidence) {
            return invalid("default_confidence must lie in [0, 1]");
        }

        for domain in SensorDomain::ALL {
            self.detectors
                .for_domain(domain)
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("{} detector: {}", domain.as_str(), e)))?;
        }
        Ok(())
    }

    pub fn correlation_interval(&self) -> Duration {
        Duration::from_millis(self.correlation_interval_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

/// Recursively overlay `overrides` onto `base`; tables merge, everything else replaces
fn merge_values(base: &mut toml::Value, overrides: toml::Value) {
    match (base, overrides) {
        (toml::Value::Table(base), toml::Value::Table(overrides)) => {
            for (key, value) in overrides {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, value) => *base = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TrackerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.correlation_interval(), Duration::from_millis(500));
        assert_eq!(config.detectors.rf.bands.len(), 3);
    }

    #[test]
    fn test_partial_file_merges_over_defaults() {
        let config = TrackerConfig::from_toml_str(
            r#"
            match_tolerance_hz = 50.0

            [detectors.acoustic]
            poll_interval_ms = 40

            [guidance]
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.match_tolerance_hz, 50.0);
        assert_eq!(config.correlation_tolerance_hz, 1000.0);
        assert_eq!(config.detectors.acoustic.poll_interval_ms, 40);
        // Untouched keys of an overridden table survive
        assert_eq!(config.detectors.acoustic.bands.len(), 3);
        assert_eq!(config.detectors.acoustic.id, "acoustic-1");
        assert!(!config.guidance.enabled);
        assert_eq!(config.guidance.success_distance_m, 1.0);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            TrackerConfig::from_toml_str("default_confidence = 1.5"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            TrackerConfig::from_toml_str("correlation_interval_ms = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            TrackerConfig::from_toml_str("registry_capacity = \"lots\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_save_then_load() {
        let dir = std::env::temp_dir().join(format!("minetrace-config-{}", std::process::id()));
        let path = dir.join("nested").join("tracker.toml");

        let mut config = TrackerConfig::default();
        config.measurement_window = 6;
        config.guidance.directional_change_deg = 30.0;
        config.save(&path).unwrap();

        let loaded = TrackerConfig::load(&path).unwrap();
        assert_eq!(loaded, config);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        assert!(matches!(
            TrackerConfig::load("/nonexistent/minetrace/tracker.toml"),
            Err(ConfigError::Io(_))
        ));
    }
}
