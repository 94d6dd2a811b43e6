//! Slimsonos core - LMS to Sonos streaming bridge.
//!
//! This crate bridges a Logitech Media Server player client with a Sonos
//! device: decoded PCM from the player's output stage is re-encoded as FLAC
//! in real time and served over HTTP for the device to pull by URL.
//!
//! # Architecture
//!
//! - [`player`]: output buffer, PCM sink, silence-edge detection, pull loop
//! - [`stream`]: encoder adapter, frame ring, session state machine, registry
//! - [`api`]: axum router serving the chunked FLAC stream
//! - [`sonos`]: playback capability trait and the control loop driving it
//! - [`context`]: network configuration and URL building
//! - [`state`]: shared configuration
//! - [`error`]: centralized error types
//!
//! Data flow: player output stage → [`player::PcmSink`] →
//! [`stream::StreamSession::write`] → FLAC encoder → frame ring →
//! [`stream::StreamSession::read`] → HTTP chunked response → Sonos device.

#![warn(clippy::all)]

pub mod api;
pub mod context;
pub mod error;
pub mod player;
pub mod protocol_constants;
pub mod sonos;
pub mod state;
pub mod stream;

// Re-export commonly used types at the crate root
pub use api::{create_router, start_server, AppState, ServerError};
pub use context::{IpDetector, LocalIpDetector, NetworkContext, NetworkError, UrlBuilder};
pub use error::{SlimError, SlimResult};
pub use player::{
    spawn_pull_loop, FrameSink, OutputStage, PcmSink, PullLoopHandle, SharedOutputBuffer,
    StreamIdSource,
};
pub use sonos::{
    run_control_loop, spawn_control_loop, ControlHandle, LoggingPlayback, SonosPlayback,
    StatusSnapshot, StatusTracker,
};
pub use state::Config;
pub use stream::{
    FrameRing, PlaybackGauge, RegisterError, SampleFormat, SessionStatus, StreamSession,
    StreamSlot,
};

/// Default icon for the Sonos controller display.
///
/// Embedded at compile time and served via the icon HTTP endpoint; the URL
/// is attached to every play command so the controller app shows something
/// instead of a broken-image placeholder.
pub static DEFAULT_ICON: &[u8] = include_bytes!("../assets/icon.png");
