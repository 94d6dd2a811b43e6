//! HTTP layer serving the FLAC stream to the Sonos device.
//!
//! Thin handlers over the stream core: the router owns no session state
//! beyond the shared registry handles in [`AppState`].

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use thiserror::Error;
use tower_http::trace::TraceLayer;

use crate::context::NetworkContext;
use crate::player::StreamIdSource;
use crate::protocol_constants::{ICON_URI, STREAM_URI, TRACK_URI};
use crate::stream::{PlaybackGauge, StreamSlot};

pub mod stream;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),

    /// No available ports in the specified range.
    #[error("No available ports in range {start}-{end}")]
    NoAvailablePort { start: u16, end: u16 },
}

/// Shared application state for the API layer.
#[derive(Clone)]
pub struct AppState {
    /// The single active session slot.
    pub slot: Arc<StreamSlot>,
    /// Read-only view of the sink's stream id counter.
    pub ids: Arc<StreamIdSource>,
    /// Admission control for concurrent playback requests.
    pub gauge: Arc<PlaybackGauge>,
    /// Network configuration (port, advertise IP).
    pub network: NetworkContext,
    /// Bit depth new sessions are opened with.
    pub sample_bits: u16,
    /// Optional static file served at the track URI.
    pub playback_file: Option<std::path::PathBuf>,
    /// Embedded icon shown by the Sonos controller.
    pub icon: Option<&'static [u8]>,
}

/// Builds the router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(STREAM_URI, get(stream::stream_flac))
        .route(TRACK_URI, get(stream::serve_track))
        .route(ICON_URI, get(stream::serve_icon))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

async fn find_available_port(
    start: u16,
    end: u16,
) -> Result<(u16, tokio::net::TcpListener), ServerError> {
    for port in start..=end {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => return Ok((port, listener)),
            Err(_) => continue,
        }
    }
    Err(ServerError::NoAvailablePort { start, end })
}

/// Starts the HTTP server on the configured or auto-discovered port.
pub async fn start_server(state: AppState, preferred_port: u16) -> Result<(), ServerError> {
    let (port, listener) = if preferred_port > 0 {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], preferred_port));
        (preferred_port, tokio::net::TcpListener::bind(&addr).await?)
    } else {
        find_available_port(49400, 49410).await?
    };

    state.network.set_port(port);
    log::info!("Server listening on http://0.0.0.0:{}", port);

    let app = create_router(state);
    axum::serve(listener, app).await?;
    Ok(())
}
