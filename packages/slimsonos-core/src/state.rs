//! Application configuration shared between the core and the server binary.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for the Slimsonos bridge.
///
/// All fields have sensible defaults; the server binary layers YAML, env
/// vars, and CLI flags on top.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// Preferred port for the HTTP server (0 = auto-allocate).
    pub preferred_port: u16,

    /// Name of the Sonos room to drive.
    pub room: String,

    /// LMS host the player client connects to.
    pub lms_server: Option<String>,

    /// Explicit Sonos device IP, skipping discovery by room name.
    pub device_ip: Option<String>,

    /// IP address to advertise in stream URLs (auto-detected if unset).
    pub advertise_ip: Option<String>,

    /// Play this one file instead of bridging the LMS pipeline.
    pub playback_file: Option<PathBuf>,

    /// Bit depth sessions are opened with.
    pub sample_bits: u16,
}

impl Config {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if !matches!(self.sample_bits, 8 | 16 | 24 | 32) {
            return Err(format!(
                "sample_bits must be one of 8, 16, 24, 32 (got {})",
                self.sample_bits
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preferred_port: 0,
            room: String::new(),
            lms_server: None,
            device_ip: None,
            advertise_ip: None,
            playback_file: None,
            sample_bits: crate::protocol_constants::DEFAULT_SAMPLE_BITS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn odd_bit_depth_is_rejected() {
        let config = Config {
            sample_bits: 12,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
