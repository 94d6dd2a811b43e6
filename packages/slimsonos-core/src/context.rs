//! Network configuration context for the streaming server.
//!
//! Bundles the advertise IP and server port that the Sonos control side
//! needs for constructing stream and icon URLs. Supports explicit
//! configuration and auto-detection of the local address.

use std::net::IpAddr;
#[cfg(test)]
use std::net::Ipv4Addr;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Notify;

use crate::protocol_constants::{ICON_URI, STREAM_URI, TRACK_URI};

/// Network configuration shared across the API and control layers.
#[derive(Clone)]
pub struct NetworkContext {
    /// Server port (initially 0 if auto-assigned, set when the server binds).
    pub port: Arc<RwLock<u16>>,
    /// Notifier signaled when the port is assigned.
    pub port_notify: Arc<Notify>,
    /// IP address the Sonos device can reach us at.
    pub local_ip: Arc<RwLock<String>>,
    ip_detector: Option<Arc<dyn IpDetector>>,
}

impl NetworkContext {
    /// Creates a context with an explicitly configured advertise IP.
    #[must_use]
    pub fn explicit(bind_port: u16, advertise_ip: IpAddr) -> Self {
        Self {
            port: Arc::new(RwLock::new(bind_port)),
            port_notify: Arc::new(Notify::new()),
            local_ip: Arc::new(RwLock::new(advertise_ip.to_string())),
            ip_detector: None,
        }
    }

    /// Creates a context that detects the local IP itself.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial IP detection fails.
    pub fn auto_detect(
        preferred_port: u16,
        ip_detector: Arc<dyn IpDetector>,
    ) -> Result<Self, NetworkError> {
        let local_ip = ip_detector.detect()?;
        Ok(Self {
            port: Arc::new(RwLock::new(preferred_port)),
            port_notify: Arc::new(Notify::new()),
            local_ip: Arc::new(RwLock::new(local_ip)),
            ip_detector: Some(ip_detector),
        })
    }

    /// Creates a context for testing with a fixed loopback IP.
    #[cfg(test)]
    pub fn for_test() -> Self {
        Self::explicit(0, IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)))
    }

    /// Re-runs IP detection, if a detector is configured.
    pub fn detect_ip(&self) -> Result<String, NetworkError> {
        match &self.ip_detector {
            Some(detector) => detector.detect(),
            None => Err(NetworkError::NoDetector),
        }
    }

    #[must_use]
    pub fn get_port(&self) -> u16 {
        *self.port.read()
    }

    #[must_use]
    pub fn get_local_ip(&self) -> String {
        self.local_ip.read().clone()
    }

    /// Sets the port and notifies waiters.
    pub fn set_port(&self, port: u16) {
        *self.port.write() = port;
        self.port_notify.notify_waiters();
    }

    pub fn set_local_ip(&self, ip: String) {
        *self.local_ip.write() = ip;
    }

    /// Returns a `UrlBuilder` for the current network configuration.
    #[must_use]
    pub fn url_builder(&self) -> UrlBuilder {
        UrlBuilder::new(self.get_local_ip(), self.get_port())
    }

    /// Returns the stream URL for a given stream id.
    #[must_use]
    pub fn stream_url(&self, stream_id: u64) -> String {
        self.url_builder().stream_url(stream_id)
    }
}

/// Trait for detecting the local IP address.
pub trait IpDetector: Send + Sync {
    fn detect(&self) -> Result<String, NetworkError>;
}

/// Default IP detector using the system's network interfaces.
#[derive(Debug, Clone, Default)]
pub struct LocalIpDetector;

impl LocalIpDetector {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    #[must_use]
    pub fn arc() -> Arc<dyn IpDetector> {
        Arc::new(Self::new())
    }
}

impl IpDetector for LocalIpDetector {
    fn detect(&self) -> Result<String, NetworkError> {
        local_ip_address::local_ip()
            .map(|ip| ip.to_string())
            .map_err(|e| NetworkError::Detection(e.to_string()))
    }
}

/// Errors that can occur during network operations.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Could not detect local IP address.
    #[error("Failed to detect local IP: {0}")]
    Detection(String),

    /// No IP detector configured (using explicit mode).
    #[error("No IP detector configured (using explicit mode)")]
    NoDetector,
}

/// Builder for URLs the Sonos device will be pointed at.
pub struct UrlBuilder {
    ip: String,
    port: u16,
}

impl UrlBuilder {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }

    /// Base URL for the server (e.g., `http://192.168.1.100:49400`).
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.ip, self.port)
    }

    /// Stream URL carrying the stream id as a query parameter.
    #[must_use]
    pub fn stream_url(&self, stream_id: u64) -> String {
        format!("{}{}?stream={}", self.base_url(), STREAM_URI, stream_id)
    }

    /// Icon URL for Sonos metadata display.
    #[must_use]
    pub fn icon_url(&self) -> String {
        format!("{}{}", self.base_url(), ICON_URI)
    }

    /// URL of the single configured playback file.
    #[must_use]
    pub fn track_url(&self) -> String {
        format!("{}{}", self.base_url(), TRACK_URI)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockIpDetector {
        ip: String,
    }

    impl IpDetector for MockIpDetector {
        fn detect(&self) -> Result<String, NetworkError> {
            Ok(self.ip.clone())
        }
    }

    #[test]
    fn explicit_context_uses_provided_ip() {
        let ctx = NetworkContext::explicit(49400, IpAddr::V4(Ipv4Addr::new(192, 168, 1, 100)));
        assert_eq!(ctx.get_local_ip(), "192.168.1.100");
        assert_eq!(ctx.get_port(), 49400);
    }

    #[test]
    fn auto_detect_context_uses_detector() {
        let detector = Arc::new(MockIpDetector {
            ip: "10.0.0.5".to_string(),
        });
        let ctx = NetworkContext::auto_detect(0, detector).unwrap();
        assert_eq!(ctx.get_local_ip(), "10.0.0.5");
    }

    #[test]
    fn explicit_context_detect_ip_returns_error() {
        let ctx = NetworkContext::explicit(49400, IpAddr::V4(Ipv4Addr::new(192, 168, 1, 100)));
        assert!(matches!(ctx.detect_ip(), Err(NetworkError::NoDetector)));
    }

    #[test]
    fn url_builder_embeds_the_stream_id() {
        let builder = UrlBuilder::new("192.168.1.100", 49400);
        assert_eq!(
            builder.stream_url(7),
            "http://192.168.1.100:49400/music/squeezebox.flac?stream=7"
        );
        assert_eq!(
            builder.icon_url(),
            "http://192.168.1.100:49400/squeezebox.png"
        );
    }
}
