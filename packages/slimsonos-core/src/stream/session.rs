//! Single stream session: the meeting point of the PCM producer and the
//! HTTP consumer.
//!
//! A session owns one encoder and one frame ring. The producer side calls
//! [`StreamSession::write`] with packed PCM; the consumer side calls
//! [`StreamSession::read`] to drain compressed FLAC bytes. Both sides poll
//! with a 1ms sleep inside their timeout windows, which keeps the session
//! free of wakeup bookkeeping at the cost of a bounded busy-wait.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{SlimError, SlimResult};
use crate::player::StreamIdSource;
use crate::protocol_constants::{PACING_WINDOW_MS, SESSION_POLL_MS};
use crate::stream::encoder::FlacBlockEncoder;
use crate::stream::ring::{FramePacket, FrameRing};
use crate::stream::SampleFormat;

/// Lifecycle of a session.
///
/// Transitions are one-way: `Init` to `Encoding` on open, `Encoding` to
/// `Closing` when the producer signals end of stream, `Closing` to `Closed`
/// once the consumer has drained the ring. Eviction jumps straight to
/// `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Init,
    Encoding,
    Closing,
    Closed,
}

/// Partially consumed packet held between consumer reads.
struct ReadCursor {
    packet: FramePacket,
    consumed: usize,
}

impl ReadCursor {
    fn remaining(&self) -> usize {
        self.packet.size() - self.consumed
    }
}

/// One encoded audio stream from first PCM byte to drained ring.
pub struct StreamSession {
    stream_id: u64,
    ids: Arc<StreamIdSource>,
    format: SampleFormat,
    status: Mutex<SessionStatus>,
    encoder: Mutex<Option<FlacBlockEncoder>>,
    ring: FrameRing,
    /// Total PCM bytes accepted, the basis of the pacing clock.
    total_pcm: AtomicU64,
    /// Set once, on the first consumer read that returns data.
    started_at: OnceLock<Instant>,
    cursor: Mutex<Option<ReadCursor>>,
}

impl StreamSession {
    pub fn new(stream_id: u64, ids: Arc<StreamIdSource>, ring_capacity: usize) -> Self {
        Self {
            stream_id,
            ids,
            format: SampleFormat::default(),
            status: Mutex::new(SessionStatus::Init),
            encoder: Mutex::new(None),
            ring: FrameRing::new(ring_capacity),
            total_pcm: AtomicU64::new(0),
            started_at: OnceLock::new(),
            cursor: Mutex::new(None),
        }
    }

    /// Initializes the encoder and emits the stream header into the ring.
    ///
    /// Valid only from `Init`; any failure lands the session in `Closed`.
    pub fn open(&mut self, bits_per_sample: u16) -> SlimResult<()> {
        if self.status() != SessionStatus::Init {
            return Err(SlimError::EncoderInit(format!(
                "open on a session in state {:?}",
                self.status()
            )));
        }
        match self.try_open(bits_per_sample) {
            Ok(()) => {
                *self.status.lock() = SessionStatus::Encoding;
                Ok(())
            }
            Err(e) => {
                *self.status.lock() = SessionStatus::Closed;
                Err(e)
            }
        }
    }

    fn try_open(&mut self, bits_per_sample: u16) -> SlimResult<()> {
        let format = SampleFormat::new(bits_per_sample).ok_or_else(|| {
            SlimError::EncoderInit(format!("unsupported bit depth {bits_per_sample}"))
        })?;
        let encoder = FlacBlockEncoder::new(format)
            .map_err(|e| SlimError::EncoderInit(e.to_string()))?;
        let header = encoder.header();
        let written = self.ring.write(header);
        if written != header.len() {
            return Err(SlimError::EncoderInit(format!(
                "ring rejected stream header ({written}/{} bytes)",
                header.len()
            )));
        }
        self.format = format;
        *self.encoder.lock() = Some(encoder);
        Ok(())
    }

    pub fn stream_id(&self) -> u64 {
        self.stream_id
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.lock()
    }

    /// True once a newer stream has taken over this session's identity.
    pub fn is_stale(&self) -> bool {
        self.ids.current() != self.stream_id
    }

    /// Compressed bytes ready for the consumer, counting a held partial
    /// packet.
    pub fn bytes_available(&self) -> usize {
        let held = self.cursor.lock().as_ref().map_or(0, ReadCursor::remaining);
        held + self.ring.bytes_available()
    }

    /// Milliseconds of audio the consumer has nominally played.
    ///
    /// Zero until the first read; the pacing window lets the encoder run
    /// ahead far enough to fill the ring before playback begins.
    fn played_ms(&self) -> u64 {
        self.started_at
            .get()
            .map_or(0, |t| t.elapsed().as_millis() as u64)
    }

    /// Feeds PCM to the encoder, blocking while the pacing window is full.
    ///
    /// Returns the number of bytes accepted. Zero means the caller should
    /// stop: the session is closed, stale, at end of stream, or the timeout
    /// elapsed without room in the pacing window. An empty `data` slice is
    /// the end-of-stream signal: the encoder is finalized so its staged
    /// partial block reaches the ring, and the session enters `Closing`.
    pub fn write(&self, data: &[u8], timeout_ms: u64) -> usize {
        let mut waited = 0u64;
        loop {
            if self.status() != SessionStatus::Encoding {
                return 0;
            }
            if self.is_stale() {
                log::debug!(
                    "[Session] write on stale stream {} dropped",
                    self.stream_id
                );
                return 0;
            }
            if data.is_empty() {
                if let Some(encoder) = self.encoder.lock().take() {
                    if let Err(e) = encoder.finish(&self.ring) {
                        log::warn!("[Session] finalize failed: {e}");
                    }
                }
                *self.status.lock() = SessionStatus::Closing;
                return 0;
            }

            let encoded_ms = self.format.duration_ms(self.total_pcm.load(Ordering::Relaxed));
            if encoded_ms < self.played_ms() + PACING_WINDOW_MS {
                let mut guard = self.encoder.lock();
                let Some(encoder) = guard.as_mut() else {
                    return 0;
                };
                if let Err(e) = encoder.encode(data, &self.ring) {
                    log::error!("[Session] encode failed on stream {}: {e}", self.stream_id);
                    return 0;
                }
                self.total_pcm
                    .fetch_add(data.len() as u64, Ordering::Relaxed);
                return data.len();
            }

            if waited >= timeout_ms {
                return 0;
            }
            std::thread::sleep(Duration::from_millis(SESSION_POLL_MS));
            waited += SESSION_POLL_MS;
        }
    }

    /// Drains compressed bytes into `buf`, blocking while the ring is empty.
    ///
    /// Returns the number of bytes copied. Zero means end of stream (the
    /// producer closed and the ring is drained), a stale or closed session,
    /// or an exhausted timeout. The first successful read starts the
    /// playback clock.
    pub fn read(&self, buf: &mut [u8], timeout_ms: u64) -> usize {
        let mut waited = 0u64;
        loop {
            if self.status() == SessionStatus::Closed {
                return 0;
            }
            if self.is_stale() {
                return 0;
            }
            if self.bytes_available() > 0 {
                self.started_at.get_or_init(Instant::now);
                return self.read_data(buf);
            }
            if self.status() == SessionStatus::Closing {
                // Producer is done and the ring is drained.
                self.close();
                return 0;
            }
            if waited >= timeout_ms {
                return 0;
            }
            std::thread::sleep(Duration::from_millis(SESSION_POLL_MS));
            waited += SESSION_POLL_MS;
        }
    }

    /// Copies from the held cursor and then from ring packets.
    fn read_data(&self, buf: &mut [u8]) -> usize {
        let mut cursor = self.cursor.lock();
        let mut copied = 0;
        while copied < buf.len() {
            let Some(cur) = cursor.as_mut() else {
                match self.ring.read() {
                    Some(packet) => {
                        *cursor = Some(ReadCursor { packet, consumed: 0 });
                        continue;
                    }
                    None => break,
                }
            };
            let take = cur.remaining().min(buf.len() - copied);
            buf[copied..copied + take]
                .copy_from_slice(&cur.packet.as_slice()[cur.consumed..cur.consumed + take]);
            cur.consumed += take;
            copied += take;
            if cur.remaining() == 0 {
                if let Some(done) = cursor.take() {
                    self.ring.release(done.packet);
                }
            }
        }
        copied
    }

    /// Finalizes the session. Safe to call from either side, any number of
    /// times.
    pub fn close(&self) {
        {
            let mut status = self.status.lock();
            if *status == SessionStatus::Closed {
                return;
            }
            *status = SessionStatus::Closed;
        }
        if let Some(encoder) = self.encoder.lock().take() {
            if let Err(e) = encoder.finish(&self.ring) {
                log::debug!("[Session] finalize during close failed: {e}");
            }
        }
        log::info!(
            "[Session] stream {} closed after {} PCM bytes",
            self.stream_id,
            self.total_pcm.load(Ordering::Relaxed)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol_constants::{ENCODER_BLOCK_SAMPLES, FRAME_RING_CAPACITY};

    fn open_session() -> StreamSession {
        let ids = Arc::new(StreamIdSource::new());
        ids.advance();
        let mut session = StreamSession::new(ids.current(), ids, FRAME_RING_CAPACITY);
        session.open(16).unwrap();
        session
    }

    fn silence(frames: usize) -> Vec<u8> {
        vec![0u8; frames * 4]
    }

    #[test]
    fn open_emits_header_before_any_pcm() {
        let session = open_session();
        assert_eq!(session.status(), SessionStatus::Encoding);
        let mut buf = [0u8; 4];
        assert_eq!(session.read(&mut buf, 0), 4);
        assert_eq!(&buf, b"fLaC");
    }

    #[test]
    fn open_rejects_unsupported_bit_depth() {
        let ids = Arc::new(StreamIdSource::new());
        let mut session = StreamSession::new(ids.current(), ids, FRAME_RING_CAPACITY);
        assert!(session.open(12).is_err());
        assert_eq!(session.status(), SessionStatus::Closed);
    }

    #[test]
    fn write_before_open_returns_zero() {
        let ids = Arc::new(StreamIdSource::new());
        let session = StreamSession::new(ids.current(), ids, FRAME_RING_CAPACITY);
        assert_eq!(session.write(&silence(16), 0), 0);
    }

    #[test]
    fn write_accepts_whole_slice_within_pacing_window() {
        let session = open_session();
        let data = silence(ENCODER_BLOCK_SAMPLES);
        assert_eq!(session.write(&data, 0), data.len());
    }

    #[test]
    fn pacing_rejects_writes_beyond_the_window_before_playback() {
        use crate::protocol_constants::SAMPLE_RATE;
        let session = open_session();
        // Half a second of audio per write; four of them fill the
        // pre-playback pacing window exactly.
        let chunk = silence(SAMPLE_RATE as usize / 2);
        for _ in 0..4 {
            assert_eq!(session.write(&chunk, 0), chunk.len());
        }
        assert_eq!(session.write(&chunk, 0), 0);
    }

    #[test]
    fn empty_write_finalizes_and_enters_closing() {
        let session = open_session();
        session.write(&silence(100), 0);
        assert_eq!(session.write(&[], 0), 0);
        assert_eq!(session.status(), SessionStatus::Closing);
        // The staged partial block was flushed, so more than the header is
        // waiting in the ring.
        assert!(session.ring.len() >= 2);
    }

    #[test]
    fn read_drains_then_closes_exactly_once() {
        let session = open_session();
        session.write(&silence(ENCODER_BLOCK_SAMPLES), 0);
        session.write(&[], 0);

        let mut buf = [0u8; 512];
        let mut total = 0;
        loop {
            let n = session.read(&mut buf, 0);
            if n == 0 {
                break;
            }
            total += n;
        }
        assert!(total > 0);
        assert_eq!(session.status(), SessionStatus::Closed);
        // Further reads and writes are inert.
        assert_eq!(session.read(&mut buf, 0), 0);
        assert_eq!(session.write(&silence(16), 0), 0);
    }

    #[test]
    fn stale_session_refuses_io() {
        let session = open_session();
        session.write(&silence(ENCODER_BLOCK_SAMPLES), 0);
        session.ids.advance();
        let mut buf = [0u8; 64];
        assert_eq!(session.read(&mut buf, 0), 0);
        assert_eq!(session.write(&silence(16), 0), 0);
    }

    #[test]
    fn short_reads_resume_mid_packet() {
        let session = open_session();
        session.write(&silence(ENCODER_BLOCK_SAMPLES), 0);
        let available = session.bytes_available();

        let mut small = [0u8; 3];
        let mut total = 0;
        while total < available {
            let n = session.read(&mut small, 0);
            assert!(n > 0);
            total += n;
        }
        assert_eq!(total, available);
    }

    #[test]
    fn close_is_idempotent() {
        let session = open_session();
        session.close();
        session.close();
        assert_eq!(session.status(), SessionStatus::Closed);
    }
}
