//! Device configuration
//!
//! Plain data with serde derives so hosts can keep it in a JSON file next to
//! their other settings.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::port::OplMode;
use crate::{OplError, Result};

/// Native output rate of the chip (14.31818 MHz / 288)
pub const NATIVE_SAMPLE_RATE: u32 = 49716;
/// Lowest accepted output rate
pub const MIN_SAMPLE_RATE: u32 = 8_000;
/// Highest accepted output rate
pub const MAX_SAMPLE_RATE: u32 = 192_000;

/// OPL device configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OplConfig {
    /// Emulated card
    pub mode: OplMode,
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Subtract the running average from constant offsets
    pub remove_dc_bias: bool,
    /// Program the AdLib driver's power-on voices at start-up
    pub adlib_driver_defaults: bool,
    /// Frames kept between port writes and the next audio pull
    pub fifo_capacity: usize,
    /// Go idle after this many milliseconds of silent output
    pub sleep_after_ms: Option<u32>,
    /// Directory for DRO and RAD captures; `None` disables capturing
    pub capture_dir: Option<PathBuf>,
}

impl Default for OplConfig {
    fn default() -> Self {
        Self {
            mode: OplMode::Opl3,
            sample_rate: NATIVE_SAMPLE_RATE,
            remove_dc_bias: false,
            adlib_driver_defaults: true,
            fifo_capacity: 4096,
            sleep_after_ms: None,
            capture_dir: None,
        }
    }
}

impl OplConfig {
    /// Default configuration for a given card
    pub fn for_mode(mode: OplMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    /// Set the output sample rate
    pub fn sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Enable DC bias removal
    pub fn remove_dc_bias(mut self, enable: bool) -> Self {
        self.remove_dc_bias = enable;
        self
    }

    /// Enable the AdLib driver power-on voices
    pub fn adlib_driver_defaults(mut self, enable: bool) -> Self {
        self.adlib_driver_defaults = enable;
        self
    }

    /// Set the FIFO size in frames
    pub fn fifo_capacity(mut self, frames: usize) -> Self {
        self.fifo_capacity = frames;
        self
    }

    /// Go idle after `ms` of silence
    pub fn sleep_after(mut self, ms: u32) -> Self {
        self.sleep_after_ms = Some(ms);
        self
    }

    /// Arm DRO capture into `dir`
    pub fn capture_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.capture_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Check the configuration
    pub fn validate(&self) -> Result<()> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            return Err(OplError::ConfigError(format!(
                "Sample rate {} Hz outside {}..={} Hz",
                self.sample_rate, MIN_SAMPLE_RATE, MAX_SAMPLE_RATE
            )));
        }
        if self.fifo_capacity == 0 {
            return Err(OplError::ConfigError("FIFO capacity must be at least one frame".into()));
        }
        if self.sleep_after_ms == Some(0) {
            return Err(OplError::ConfigError("Sleep delay must be positive".into()));
        }
        Ok(())
    }

    /// Number of silent frames after which the device goes idle
    pub fn sleep_after_frames(&self) -> Option<u64> {
        self.sleep_after_ms
            .map(|ms| (ms as u64 * self.sample_rate as u64).div_ceil(1000))
    }

    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self> {
        let config: OplConfig = serde_json::from_str(json)
            .map_err(|e| OplError::ConfigError(format!("Invalid configuration JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize as pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| OplError::ConfigError(format!("Failed to serialize configuration: {e}")))
    }

    /// Load and validate a JSON configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = OplConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.mode, OplMode::Opl3);
        assert_eq!(config.sample_rate, 49716);
        assert!(config.adlib_driver_defaults);
    }

    #[test]
    fn test_builder() {
        let config = OplConfig::for_mode(OplMode::DualOpl2)
            .sample_rate(44100)
            .remove_dc_bias(true)
            .sleep_after(250);
        assert_eq!(config.mode, OplMode::DualOpl2);
        assert!(config.remove_dc_bias);
        assert_eq!(config.sleep_after_frames(), Some(11025));
    }

    #[test]
    fn test_rejects_bad_rate() {
        let config = OplConfig::default().sample_rate(4000);
        assert!(matches!(config.validate(), Err(OplError::ConfigError(_))));
        let config = OplConfig::default().fifo_capacity(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = OplConfig::from_json(r#"{ "mode": "Opl2", "sample_rate": 48000 }"#).unwrap();
        assert_eq!(config.mode, OplMode::Opl2);
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.fifo_capacity, 4096);
        assert!(OplConfig::from_json(r#"{ "sample_rate": 1 }"#).is_err());
    }

    #[test]
    fn test_json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("opl.json");
        let config = OplConfig::for_mode(OplMode::Esfm).capture_dir(dir.path());
        fs::write(&path, config.to_json().unwrap()).unwrap();
        assert_eq!(OplConfig::load(&path).unwrap(), config);
    }
}
