//! Transport/track status snapshot with change detection.
//!
//! Status is polled on a coarse cadence; a hash over the snapshot decides
//! whether anything actually changed, so unchanged polls stay silent.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// One observation of the device's transport and track state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct StatusSnapshot {
    pub title: String,
    pub album: String,
    pub artist: String,
    pub transport_state: String,
    pub volume: u8,
    /// Position within the current track, as reported (e.g. "0:01:23").
    pub rel_time: String,
    pub duration: String,
}

impl StatusSnapshot {
    fn digest(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }

    /// Renders the snapshot on one log line.
    pub fn log(&self) {
        log::info!(
            "[Sonos] {} | {} - {} ({}) vol {} at {}/{}",
            self.transport_state,
            self.artist,
            self.title,
            self.album,
            self.volume,
            self.rel_time,
            self.duration
        );
    }
}

/// Remembers the last seen snapshot digest and reports changes.
#[derive(Debug, Default)]
pub struct StatusTracker {
    last_digest: Option<u64>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `snapshot` and returns true if it differs from the last one.
    pub fn changed(&mut self, snapshot: &StatusSnapshot) -> bool {
        let digest = snapshot.digest();
        let changed = self.last_digest != Some(digest);
        self.last_digest = Some(digest);
        changed
    }
}
