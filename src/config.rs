//! Configuration file handling

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::catalog::CatalogConfig;
use crate::error::ConfigError;
use crate::placement::PlacementConfig;
use crate::snapshot::SnapshotConfig;
use crate::tracking::DetectorOptions;
use crate::video::CaptureConfig;

/// Largest accepted accessory scale, relative to the image's natural size.
pub const MAX_SCALE: f32 = 4.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tracker: TrackerConfig,
    pub detector: DetectorOptions,
    pub placement: PlacementConfig,
    pub capture: CaptureConfig,
    pub catalog: CatalogConfig,
    pub snapshot: SnapshotConfig,
}

/// Where landmark packets arrive, and optionally how to start the helper
/// that produces them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub listen_address: String,
    pub port: u16,
    /// Helper program and arguments; detector options are appended as flags
    pub helper_command: Vec<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1".to_string(),
            port: 39540,
            helper_command: Vec::new(),
        }
    }
}

impl TrackerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.listen_address, self.port)
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::ReadFile(format!("{}: {}", path.as_ref().display(), e))
        })?;

        let config: Config = contents.parse()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.detector;
        for (field, value) in [
            ("detector.min_detection_confidence", d.min_detection_confidence),
            ("detector.min_tracking_confidence", d.min_tracking_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: "Confidence must be between 0.0 and 1.0".to_string(),
                });
            }
        }

        if d.max_faces == 0 {
            return Err(ConfigError::InvalidValue {
                field: "detector.max_faces".to_string(),
                message: "At least one face must be tracked".to_string(),
            });
        }

        let p = &self.placement;
        for (field, value) in [
            ("placement.earring_scale", p.earring_scale),
            ("placement.necklace_scale", p.necklace_scale),
            ("placement.bracelet_scale", p.bracelet_scale),
            ("placement.ring_scale", p.ring_scale),
        ] {
            if value.is_nan() || value <= 0.0 || value > MAX_SCALE {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!("Scale must be greater than 0 and at most {MAX_SCALE}"),
                });
            }
        }

        if self.capture.fps == 0 {
            return Err(ConfigError::InvalidValue {
                field: "capture.fps".to_string(),
                message: "Frame rate must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

impl std::str::FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_default() {
        let config: Config = "".parse().unwrap();
        assert_eq!(config, Config::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_sections() {
        let config: Config = r#"
            [placement]
            earring_scale = 0.1

            [detector]
            max_hands = 1

            [snapshot]
            share_command = "xdg-open"
        "#
        .parse()
        .unwrap();

        assert_eq!(config.placement.earring_scale, 0.1);
        assert_eq!(config.placement.necklace_scale, 0.18);
        assert_eq!(config.detector.max_hands, 1);
        assert_eq!(config.detector.min_detection_confidence, 0.6);
        assert_eq!(config.snapshot.share_command.as_deref(), Some("xdg-open"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.detector.min_tracking_confidence = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. })
                if field == "detector.min_tracking_confidence"
        ));

        let mut config = Config::default();
        config.placement.ring_scale = 0.;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_oversized_scale() {
        let config: Config = "[placement]\nring_scale = 500.0".parse().unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "placement.ring_scale"
        ));

        let mut config = Config::default();
        config.placement.earring_scale = MAX_SCALE;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!("[placement".parse::<Config>(), Err(ConfigError::Parse(_))));
    }
}
