//! Single-slot session registry and request gauge.
//!
//! Only one stream is ever live. Registering a session with a new stream id
//! evicts and closes whatever was in the slot; registering the same id twice
//! is rejected so a second player cannot shadow an in-flight stream.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::stream::session::StreamSession;

#[derive(Debug, Error)]
pub enum RegisterError {
    /// A session with this stream id is already registered and live.
    #[error("stream {0} is already being served")]
    Duplicate(u64),
}

/// Holds the single active session.
#[derive(Default)]
pub struct StreamSlot {
    active: Mutex<Option<Arc<StreamSession>>>,
}

impl StreamSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `session` as the active stream.
    ///
    /// An existing session with a different id is closed and replaced in one
    /// step, so its consumer sees end of stream while the newcomer takes
    /// over. The same id is rejected.
    pub fn register(&self, session: Arc<StreamSession>) -> Result<(), RegisterError> {
        let mut active = self.active.lock();
        if let Some(old) = active.as_ref() {
            if old.stream_id() == session.stream_id() {
                return Err(RegisterError::Duplicate(session.stream_id()));
            }
            log::info!(
                "[Registry] evicting stream {} for stream {}",
                old.stream_id(),
                session.stream_id()
            );
            old.close();
        }
        *active = Some(session);
        Ok(())
    }

    /// Removes `session` if it is still the one in the slot.
    ///
    /// A consumer unwinding after eviction must not tear down its
    /// replacement, hence the identity check.
    pub fn deregister(&self, session: &Arc<StreamSession>) {
        let mut active = self.active.lock();
        if active
            .as_ref()
            .is_some_and(|cur| Arc::ptr_eq(cur, session))
        {
            *active = None;
        }
    }

    pub fn current(&self) -> Option<Arc<StreamSession>> {
        self.active.lock().clone()
    }
}

/// Counts playback requests currently inside the HTTP handler.
#[derive(Default)]
pub struct PlaybackGauge {
    inflight: AtomicUsize,
}

impl PlaybackGauge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one request and returns a guard that undoes it on drop.
    pub fn enter(self: &Arc<Self>) -> PlaybackPermit {
        let count = self.inflight.fetch_add(1, Ordering::SeqCst) + 1;
        PlaybackPermit {
            gauge: Arc::clone(self),
            count,
        }
    }

    pub fn inflight(&self) -> usize {
        self.inflight.load(Ordering::SeqCst)
    }
}

/// Drop guard for one admitted playback request.
pub struct PlaybackPermit {
    gauge: Arc<PlaybackGauge>,
    count: usize,
}

impl PlaybackPermit {
    /// In-flight request count at admission time, this permit included.
    pub fn count(&self) -> usize {
        self.count
    }
}

impl Drop for PlaybackPermit {
    fn drop(&mut self) {
        self.gauge.inflight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::StreamIdSource;
    use crate::protocol_constants::FRAME_RING_CAPACITY;
    use crate::stream::session::SessionStatus;

    fn session(ids: &Arc<StreamIdSource>, id: u64) -> Arc<StreamSession> {
        Arc::new(StreamSession::new(id, Arc::clone(ids), FRAME_RING_CAPACITY))
    }

    #[test]
    fn register_fills_empty_slot() {
        let ids = Arc::new(StreamIdSource::new());
        let slot = StreamSlot::new();
        let s = session(&ids, 1);
        slot.register(Arc::clone(&s)).unwrap();
        assert!(Arc::ptr_eq(&slot.current().unwrap(), &s));
    }

    #[test]
    fn same_id_is_rejected_and_survivor_keeps_the_slot() {
        let ids = Arc::new(StreamIdSource::new());
        let slot = StreamSlot::new();
        let first = session(&ids, 7);
        slot.register(Arc::clone(&first)).unwrap();

        let shadow = session(&ids, 7);
        assert!(matches!(
            slot.register(shadow),
            Err(RegisterError::Duplicate(7))
        ));
        assert!(Arc::ptr_eq(&slot.current().unwrap(), &first));
        assert_ne!(first.status(), SessionStatus::Closed);
    }

    #[test]
    fn new_id_evicts_and_closes_the_old_session() {
        let ids = Arc::new(StreamIdSource::new());
        let slot = StreamSlot::new();
        let old = session(&ids, 1);
        slot.register(Arc::clone(&old)).unwrap();

        let newer = session(&ids, 2);
        slot.register(Arc::clone(&newer)).unwrap();
        assert_eq!(old.status(), SessionStatus::Closed);
        assert!(Arc::ptr_eq(&slot.current().unwrap(), &newer));
    }

    #[test]
    fn deregister_only_removes_its_own_session() {
        let ids = Arc::new(StreamIdSource::new());
        let slot = StreamSlot::new();
        let old = session(&ids, 1);
        slot.register(Arc::clone(&old)).unwrap();
        let newer = session(&ids, 2);
        slot.register(Arc::clone(&newer)).unwrap();

        // The evicted consumer unwinds late; the replacement must survive.
        slot.deregister(&old);
        assert!(slot.current().is_some());
        slot.deregister(&newer);
        assert!(slot.current().is_none());
    }

    #[test]
    fn gauge_counts_permits_and_releases_on_drop() {
        let gauge = Arc::new(PlaybackGauge::new());
        let a = gauge.enter();
        let b = gauge.enter();
        assert_eq!(a.count(), 1);
        assert_eq!(b.count(), 2);
        assert_eq!(gauge.inflight(), 2);
        drop(a);
        assert_eq!(gauge.inflight(), 1);
        drop(b);
        assert_eq!(gauge.inflight(), 0);
    }
}
