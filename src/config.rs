// src/config.rs

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Settings loaded from a JSON file, all optional overrides of the device
/// defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub sample_rate: Option<u32>,
    pub buffer_size: Option<u32>,
    /// Allocate two channels per track and use the right-side ports.
    pub stereo: bool,
    /// Loop capacity per track, in seconds at the configured sample rate.
    pub track_seconds: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_device: None,
            output_device: None,
            sample_rate: None,
            buffer_size: None,
            stereo: true,
            track_seconds: 60,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = serde_json::from_str(&json)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Per-track capacity in samples.
    pub fn sample_limit(&self) -> usize {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE) as usize * self.track_seconds as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_give_sixty_seconds_at_44100() {
        let config = Config::default();
        assert!(config.stereo);
        assert_eq!(config.sample_limit(), 44_100 * 60);
    }

    #[test]
    fn sample_limit_follows_the_configured_rate() {
        let config = Config {
            sample_rate: Some(48_000),
            track_seconds: 10,
            ..Config::default()
        };
        assert_eq!(config.sample_limit(), 480_000);
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let config: Config = serde_json::from_str(r#"{ "stereo": false }"#).unwrap();
        assert!(!config.stereo);
        assert_eq!(config.track_seconds, 60);
        assert_eq!(config.input_device, None);
    }
}
