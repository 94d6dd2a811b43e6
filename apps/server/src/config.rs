//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP server to (0 = auto-allocate).
    /// Override: `SLIMSONOS_BIND_PORT`
    pub bind_port: u16,

    /// IP address to advertise in stream URLs. This should be the IP the
    /// Sonos device can reach. If not specified, auto-detection is attempted.
    /// Override: `SLIMSONOS_ADVERTISE_IP`
    pub advertise_ip: Option<IpAddr>,

    /// LMS host the player client connects to.
    /// Override: `SLIMSONOS_LMS_SERVER`
    pub lms_server: Option<String>,

    /// Name of the Sonos room to drive.
    /// Override: `SLIMSONOS_ROOM`
    pub room: String,

    /// Explicit Sonos device IP, skipping discovery by room name.
    pub device_ip: Option<IpAddr>,

    /// Play this one file instead of bridging the LMS pipeline.
    pub playback_file: Option<PathBuf>,

    /// Bit depth stream sessions are opened with.
    /// Override: `SLIMSONOS_SAMPLE_BITS`
    pub sample_bits: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_port: 49400,
            advertise_ip: None,
            lms_server: None,
            room: String::new(),
            device_ip: None,
            playback_file: None,
            sample_bits: 16,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("SLIMSONOS_BIND_PORT") {
            if let Ok(port) = val.parse() {
                self.bind_port = port;
            }
        }

        if let Ok(val) = std::env::var("SLIMSONOS_ADVERTISE_IP") {
            if let Ok(ip) = val.parse() {
                self.advertise_ip = Some(ip);
            }
        }

        if let Ok(val) = std::env::var("SLIMSONOS_LMS_SERVER") {
            if !val.is_empty() {
                self.lms_server = Some(val);
            }
        }

        if let Ok(val) = std::env::var("SLIMSONOS_ROOM") {
            if !val.is_empty() {
                self.room = val;
            }
        }

        if let Ok(val) = std::env::var("SLIMSONOS_SAMPLE_BITS") {
            if let Ok(bits) = val.parse() {
                self.sample_bits = bits;
            }
        }
    }

    /// Converts to slimsonos-core's Config type.
    pub fn to_core_config(&self) -> slimsonos_core::Config {
        slimsonos_core::Config {
            preferred_port: self.bind_port,
            room: self.room.clone(),
            lms_server: self.lms_server.clone(),
            device_ip: self.device_ip.map(|ip| ip.to_string()),
            advertise_ip: self.advertise_ip.map(|ip| ip.to_string()),
            playback_file: self.playback_file.clone(),
            sample_bits: self.sample_bits,
        }
    }
}
