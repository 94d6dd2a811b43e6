//! Sonos control loop.
//!
//! Watches the stream id on a 10ms cadence; whenever the sink mints a new
//! id, the device is pointed at the fresh stream URL. Transport status is
//! refreshed on a much coarser cadence or when an event notification pokes
//! the loop, and printed only when it changes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::context::NetworkContext;
use crate::player::StreamIdSource;
use crate::protocol_constants::{APP_NAME, CONTROL_POLL_INTERVAL_MS, STATUS_REFRESH_TICKS};
use crate::sonos::status::StatusTracker;
use crate::sonos::SonosPlayback;

/// Handle to the spawned control loop.
pub struct ControlHandle {
    task: JoinHandle<()>,
    /// Poking this forces an immediate status refresh (event notification).
    pub refresh: Arc<Notify>,
}

impl ControlHandle {
    pub fn stop(&self) {
        self.task.abort();
    }
}

/// Spawns [`run_control_loop`] on the current runtime.
pub fn spawn_control_loop(
    playback: Arc<dyn SonosPlayback>,
    ids: Arc<StreamIdSource>,
    network: NetworkContext,
) -> ControlHandle {
    let refresh = Arc::new(Notify::new());
    let task = tokio::spawn(run_control_loop(
        playback,
        ids,
        network,
        Arc::clone(&refresh),
    ));
    ControlHandle { task, refresh }
}

/// Drives the Sonos device until the task is aborted.
pub async fn run_control_loop(
    playback: Arc<dyn SonosPlayback>,
    ids: Arc<StreamIdSource>,
    network: NetworkContext,
    refresh: Arc<Notify>,
) {
    let mut interval = tokio::time::interval(Duration::from_millis(CONTROL_POLL_INTERVAL_MS));
    let mut tracker = StatusTracker::new();
    let mut last_id = ids.current();
    let mut ticks = 0u64;

    log::info!("[Control] loop started (stream id {last_id})");
    loop {
        tokio::select! {
            _ = interval.tick() => ticks += 1,
            _ = refresh.notified() => ticks = STATUS_REFRESH_TICKS,
        }

        let current = ids.current();
        if current != last_id && current != 0 {
            let url = network.stream_url(current);
            let icon = network.url_builder().icon_url();
            match playback.play_uri(&url, APP_NAME, &icon).await {
                Ok(()) => {
                    log::info!("[Control] directed device to stream {current}");
                    last_id = current;
                }
                Err(e) => {
                    // Retried next tick; last_id stays behind on purpose.
                    log::warn!("[Control] play_uri for stream {current} failed: {e}");
                }
            }
        }

        if ticks >= STATUS_REFRESH_TICKS {
            ticks = 0;
            match playback.transport_snapshot().await {
                Ok(snapshot) => {
                    if tracker.changed(&snapshot) {
                        snapshot.log();
                    }
                }
                Err(e) => log::debug!("[Control] status poll failed: {e}"),
            }
        }
    }
}
