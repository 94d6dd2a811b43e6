//! PCM sink and pull loop.
//!
//! The pull loop runs on its own thread. Each tick it drains up to one block
//! of frames from the player's output stage, watches for silence edges, and
//! hands accumulated audio bytes to whichever session is registered. A
//! silence-to-audio edge mints the next stream id, which is what prompts the
//! control side to point the Sonos device at a fresh stream URL. An
//! audio-to-silence edge marks the stream ended; the end-of-stream signal
//! goes to the registered session on the next flush, without touching the
//! id. Anything that can block belongs in the flush phase, which the loop
//! runs after the output-stage drain has released the output-buffer lock.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::player::output::{FrameSink, OutputStage};
use crate::protocol_constants::{
    REQUEST_TIMEOUT_MS, SINK_BLOCK_FRAMES, SINK_POLL_INTERVAL, SINK_REGISTER_WAIT_MS,
    SINK_REGISTER_WAIT_SLICE_MS,
};
use crate::error::{SlimError, SlimResult};
use crate::stream::{StreamSession, StreamSlot};

/// The process-wide stream id counter.
///
/// Owned by the sink; everything else reads it through [`current`].
/// Id 0 is reserved as "no stream yet" and never matches a live session.
///
/// [`current`]: StreamIdSource::current
#[derive(Default)]
pub struct StreamIdSource {
    id: AtomicU64,
}

impl StreamIdSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.id.load(Ordering::SeqCst)
    }

    /// Mints the next id. Only the sink (and tests) call this.
    pub(crate) fn advance(&self) -> u64 {
        self.id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Accumulates extracted PCM and forwards it to the registered session.
pub struct PcmSink {
    ids: Arc<StreamIdSource>,
    slot: Arc<StreamSlot>,
    pending: Vec<u8>,
    silent: bool,
    end_pending: bool,
}

impl PcmSink {
    pub fn new(ids: Arc<StreamIdSource>, slot: Arc<StreamSlot>) -> Self {
        Self {
            ids,
            slot,
            pending: Vec::new(),
            silent: true,
            end_pending: false,
        }
    }

    /// Signals end of stream to the registered session, if any.
    fn end_current_stream(&self) {
        if let Some(session) = self.slot.current() {
            session.write(&[], 0);
        }
    }

    /// Blocks until a session for the current stream id is registered, or
    /// the wait budget runs out.
    ///
    /// The Sonos device needs a moment between "play this URL" and its
    /// first GET, so early PCM waits here rather than being dropped.
    fn wait_for_session(&self) -> Option<Arc<StreamSession>> {
        let mut waited = 0u64;
        loop {
            if let Some(session) = self.slot.current() {
                if session.stream_id() == self.ids.current() {
                    return Some(session);
                }
            }
            if waited >= SINK_REGISTER_WAIT_MS {
                return None;
            }
            std::thread::sleep(Duration::from_millis(SINK_REGISTER_WAIT_SLICE_MS));
            waited += SINK_REGISTER_WAIT_SLICE_MS;
        }
    }
}

impl FrameSink for PcmSink {
    fn write_frames(&mut self, pcm: &[u8], frames: usize, silence: bool) -> usize {
        if silence {
            // Stage only: the caller still holds the output-buffer lock, so
            // the blocking flush and end-of-stream write wait for flush().
            if !self.silent {
                self.end_pending = true;
                self.silent = true;
            }
            return frames;
        }
        if self.silent {
            let id = self.ids.advance();
            log::info!("[Sink] audio started, new stream {id}");
            self.silent = false;
        }
        self.pending.extend_from_slice(pcm);
        frames
    }

    fn flush(&mut self) {
        if !self.pending.is_empty() {
            if let Some(session) = self.wait_for_session() {
                let accepted = session.write(&self.pending, REQUEST_TIMEOUT_MS);
                if accepted == 0 {
                    log::warn!(
                        "[Sink] stream {} rejected {} bytes",
                        session.stream_id(),
                        self.pending.len()
                    );
                }
            } else {
                log::warn!(
                    "[Sink] no consumer for stream {} after {SINK_REGISTER_WAIT_MS}ms, \
                     dropping {} bytes",
                    self.ids.current(),
                    self.pending.len()
                );
            }
            self.pending.clear();
        }
        if self.end_pending {
            log::info!("[Sink] audio ended on stream {}", self.ids.current());
            self.end_current_stream();
            self.end_pending = false;
        }
    }
}

/// Handle to the running pull loop thread.
pub struct PullLoopHandle {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl PullLoopHandle {
    /// Stops the loop and waits for the thread to exit.
    pub fn stop(mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for PullLoopHandle {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Spawns the pull loop on a dedicated thread.
pub fn spawn_pull_loop(
    output: Arc<dyn OutputStage>,
    ids: Arc<StreamIdSource>,
    slot: Arc<StreamSlot>,
) -> SlimResult<PullLoopHandle> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    let thread = std::thread::Builder::new()
        .name("pcm-pull".into())
        .spawn(move || {
            let mut sink = PcmSink::new(ids, slot);
            log::info!("[Sink] pull loop started");
            while flag.load(Ordering::SeqCst) {
                output.output_frames(SINK_BLOCK_FRAMES, &mut sink);
                sink.flush();
                std::thread::sleep(SINK_POLL_INTERVAL);
            }
            sink.flush();
            log::info!("[Sink] pull loop stopped");
        })
        .map_err(|e| SlimError::Internal(format!("pull loop thread: {e}")))?;
    Ok(PullLoopHandle {
        running,
        thread: Some(thread),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol_constants::{FRAME_RING_CAPACITY, SAMPLE_RATE};
    use crate::stream::{SessionStatus, StreamSession};

    fn audio(ms: u64) -> Vec<u8> {
        // 16-bit stereo, non-zero samples
        vec![0x11u8; (ms * SAMPLE_RATE as u64 / 1000) as usize * 4]
    }

    #[test]
    fn silence_to_audio_mints_exactly_one_stream_id() {
        let ids = Arc::new(StreamIdSource::new());
        let slot = Arc::new(StreamSlot::new());
        let mut sink = PcmSink::new(Arc::clone(&ids), Arc::clone(&slot));

        sink.write_frames(&[], 512, true);
        assert_eq!(ids.current(), 0);

        let pcm = audio(10);
        sink.write_frames(&pcm, pcm.len() / 4, false);
        assert_eq!(ids.current(), 1);

        // More audio in the same burst does not mint another id.
        sink.write_frames(&pcm, pcm.len() / 4, false);
        assert_eq!(ids.current(), 1);
    }

    #[test]
    fn audio_burst_reaches_the_session_and_silence_closes_it() {
        let ids = Arc::new(StreamIdSource::new());
        let slot = Arc::new(StreamSlot::new());
        let mut sink = PcmSink::new(Arc::clone(&ids), Arc::clone(&slot));

        // The consumer registers for the id the sink is about to mint.
        let mut session = StreamSession::new(1, Arc::clone(&ids), FRAME_RING_CAPACITY);
        session.open(16).unwrap();
        let session = Arc::new(session);
        slot.register(Arc::clone(&session)).unwrap();

        let pcm = audio(50);
        sink.write_frames(&pcm, pcm.len() / 4, false);
        sink.flush();
        assert!(session.bytes_available() > 0);
        assert_eq!(session.status(), SessionStatus::Encoding);

        sink.write_frames(&[], 512, true);
        // The end-of-stream write is deferred until the flush phase.
        assert_eq!(session.status(), SessionStatus::Encoding);
        sink.flush();
        assert_eq!(session.status(), SessionStatus::Closing);
        assert_eq!(ids.current(), 1);
    }

    #[test]
    fn silence_edge_does_not_stall_the_output_stage() {
        use crate::player::output::{OutputStage, SharedOutputBuffer};
        use std::time::Instant;

        let ids = Arc::new(StreamIdSource::new());
        let slot = Arc::new(StreamSlot::new());
        let buffer = SharedOutputBuffer::new();

        let pcm = audio(10);
        buffer.push_audio(&pcm, pcm.len() / 4);
        buffer.push_silence(512);

        // No session is registered, so a blocking flush inside the drain
        // would hang here for the full register wait. Staging must complete
        // immediately so a concurrent producer is never held off the buffer.
        let mut sink = PcmSink::new(Arc::clone(&ids), slot);
        let start = Instant::now();
        buffer.output_frames(SINK_BLOCK_FRAMES, &mut sink);
        assert!(
            start.elapsed() < Duration::from_secs(2),
            "drain blocked across the silence edge"
        );
        assert!(sink.end_pending);

        buffer.push_audio(&pcm, pcm.len() / 4);
        assert!(buffer.queued_frames() > 0);
    }

    #[test]
    fn flush_with_nothing_pending_is_inert() {
        let ids = Arc::new(StreamIdSource::new());
        let slot = Arc::new(StreamSlot::new());
        let mut sink = PcmSink::new(ids, slot);
        sink.flush();
    }

    #[test]
    fn trailing_silence_without_a_prior_burst_does_nothing() {
        let ids = Arc::new(StreamIdSource::new());
        let slot = Arc::new(StreamSlot::new());
        let mut sink = PcmSink::new(Arc::clone(&ids), slot);
        sink.write_frames(&[], 1024, true);
        sink.write_frames(&[], 1024, true);
        assert_eq!(ids.current(), 0);
    }
}
