//! Fixed protocol and tuning constants.
//!
//! These values either come from external specifications (FLAC, the Sonos
//! HTTP pull model) or are deliberately fixed tuning constants of the
//! streaming pipeline. None of them is a configuration surface.

// ─────────────────────────────────────────────────────────────────────────────
// Audio Format
// ─────────────────────────────────────────────────────────────────────────────

/// Sample rate of the player's output stage (Hz).
///
/// The LMS pipeline resamples everything to 44.1kHz before it reaches the
/// PCM sink, so the encoder is fixed at CD rate.
pub const SAMPLE_RATE: u32 = 44100;

/// Channel count of the output stage (stereo, fixed).
pub const CHANNELS: u16 = 2;

/// Default bit depth handed to `StreamSession::open` when none is configured.
pub const DEFAULT_SAMPLE_BITS: u16 = 16;

// ─────────────────────────────────────────────────────────────────────────────
// Encoder
// ─────────────────────────────────────────────────────────────────────────────

/// Interleaved sample-frames fed to the block encoder per FLAC frame.
pub const ENCODER_BLOCK_SAMPLES: usize = 1024;

/// Capacity of the frame ring buffer, in packets.
pub const FRAME_RING_CAPACITY: usize = 256;

// ─────────────────────────────────────────────────────────────────────────────
// Streaming / Pacing
// ─────────────────────────────────────────────────────────────────────────────

/// Look-ahead window of the encode pacing policy (ms).
///
/// The encoder may run at most this far ahead of real-time playback. Keeps
/// a slow HTTP consumer from forcing unbounded buffering on the producer
/// side.
pub const PACING_WINDOW_MS: u64 = 2000;

/// Timeout class for blocking session reads and writes (ms).
pub const REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Ceiling on concurrently-served playback requests.
///
/// Independent of the single-active-stream rule; bounds resource usage from
/// slow or stalled HTTP clients.
pub const MAX_PLAYBACK_REQUESTS: usize = 3;

/// Bytes served per HTTP chunk from the session read loop.
pub const STREAM_CHUNK_BYTES: usize = 16384;

/// Poll granularity of the blocking session read/write loops (ms).
pub const SESSION_POLL_MS: u64 = 1;

// ─────────────────────────────────────────────────────────────────────────────
// PCM Sink
// ─────────────────────────────────────────────────────────────────────────────

/// Maximum sample-frames extracted from the output stage per pull-loop tick.
pub const SINK_BLOCK_FRAMES: usize = 4096;

/// Sleep between pull-loop ticks (effectively continuous).
pub const SINK_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(1);

/// Interval between checks for a registered session when PCM is pending (ms).
pub const SINK_REGISTER_WAIT_SLICE_MS: u64 = 100;

/// Total time the sink waits for a stream request before dropping PCM (ms).
pub const SINK_REGISTER_WAIT_MS: u64 = 10_000;

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Surface
// ─────────────────────────────────────────────────────────────────────────────

/// Path of the FLAC stream resource pulled by the Sonos device.
pub const STREAM_URI: &str = "/music/squeezebox.flac";

/// Content type of the stream resource.
pub const STREAM_CONTENT_TYPE: &str = "audio/flac";

/// Path of the static icon resource referenced in play commands.
pub const ICON_URI: &str = "/squeezebox.png";

/// Path of the optional single-file playback resource.
pub const TRACK_URI: &str = "/music/track";

// ─────────────────────────────────────────────────────────────────────────────
// Sonos Control
// ─────────────────────────────────────────────────────────────────────────────

/// Poll interval of the control loop watching for stream-id changes (ms).
pub const CONTROL_POLL_INTERVAL_MS: u64 = 10;

/// Control-loop ticks between periodic transport status refreshes.
///
/// 3000 ticks at 10ms is a 30 second cadence.
pub const STATUS_REFRESH_TICKS: u64 = 3000;

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Application name used in titles handed to the Sonos device.
pub const APP_NAME: &str = "Slimsonos";
