//! Sonos control boundary.
//!
//! The actual UPnP/SOAP client is an external collaborator; this module
//! defines the capability trait the control loop drives, plus a logging
//! no-op implementation used when no real controller is wired in.

use async_trait::async_trait;

use crate::error::SlimResult;

pub mod control;
pub mod status;

pub use control::{run_control_loop, spawn_control_loop, ControlHandle};
pub use status::{StatusSnapshot, StatusTracker};

/// Playback commands the control loop issues to the Sonos device.
#[async_trait]
pub trait SonosPlayback: Send + Sync {
    /// Commands the device to start pulling `uri`.
    ///
    /// `title` and `icon_uri` are display metadata for the controller app.
    async fn play_uri(&self, uri: &str, title: &str, icon_uri: &str) -> SlimResult<()>;

    /// Fetches the device's current transport/track/volume state.
    async fn transport_snapshot(&self) -> SlimResult<StatusSnapshot>;
}

/// No-op playback backend that only logs the commands it receives.
#[derive(Debug, Default)]
pub struct LoggingPlayback;

#[async_trait]
impl SonosPlayback for LoggingPlayback {
    async fn play_uri(&self, uri: &str, title: &str, _icon_uri: &str) -> SlimResult<()> {
        log::info!("[Sonos] play \"{title}\" from {uri}");
        Ok(())
    }

    async fn transport_snapshot(&self) -> SlimResult<StatusSnapshot> {
        Ok(StatusSnapshot::default())
    }
}
