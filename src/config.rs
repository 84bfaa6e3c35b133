use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Session settings. Every field has a default, so a config file only needs
/// the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RuntimeConfig {
    pub gravity: Vec3,
    /// Seconds simulated per frame.
    pub frame_delta: f32,
    /// Frames simulated by the headless CLI.
    pub frames: u32,
    /// `env_logger` filter used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            frame_delta: 1.0 / 60.0,
            frames: 120,
            log_filter: "info".to_string(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("invalid runtime configuration")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("failed to parse config {}", path.display()))
    }

    /// Simulated seconds covered by `frames` frames.
    pub fn duration(&self) -> f32 {
        self.frames as f32 * self.frame_delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = RuntimeConfig::from_json(r#"{"frames": 10, "gravity": [0, -1, 0]}"#).unwrap();
        assert_eq!(config.frames, 10);
        assert_eq!(config.gravity, Vec3::new(0.0, -1.0, 0.0));
        assert_eq!(config.log_filter, "info");
        assert!((config.frame_delta - 1.0 / 60.0).abs() < f32::EPSILON);
    }

    #[test]
    fn load_reports_the_offending_path() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();
        let err = RuntimeConfig::load(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse config"));
    }
}
