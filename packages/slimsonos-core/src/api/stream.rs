//! FLAC stream handler plus the static track and icon resources.
//!
//! The stream handler bridges the sync session core to the async response:
//! a `spawn_blocking` worker runs the blocking `read` loop and feeds chunks
//! through a small channel into the chunked response body. A failed channel
//! send means the client went away, which ends the worker and tears the
//! session down.

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{RawQuery, State};
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tokio_stream::wrappers::ReceiverStream;

use crate::api::AppState;
use crate::error::{SlimError, SlimResult};
use crate::protocol_constants::{
    FRAME_RING_CAPACITY, MAX_PLAYBACK_REQUESTS, REQUEST_TIMEOUT_MS, STREAM_CHUNK_BYTES,
    STREAM_CONTENT_TYPE,
};
use crate::stream::{PlaybackGauge, PlaybackPermit, RegisterError, StreamSession};

/// Malformed or absent ids parse to 0, which never matches a live stream.
fn parse_stream_id(query: Option<&str>) -> u64 {
    query
        .unwrap_or("")
        .split('&')
        .find_map(|pair| pair.strip_prefix("stream="))
        .unwrap_or("")
        .parse()
        .unwrap_or(0)
}

/// Admission control: at most [`MAX_PLAYBACK_REQUESTS`] requests in flight.
fn admit(gauge: &Arc<PlaybackGauge>) -> SlimResult<PlaybackPermit> {
    let permit = gauge.enter();
    if permit.count() > MAX_PLAYBACK_REQUESTS {
        return Err(SlimError::Overloaded(permit.count()));
    }
    Ok(permit)
}

fn flac_headers(builder: axum::http::response::Builder) -> axum::http::response::Builder {
    builder
        .header(header::CONTENT_TYPE, STREAM_CONTENT_TYPE)
        .header(header::CACHE_CONTROL, "no-cache, no-store")
}

pub(super) async fn stream_flac(
    State(state): State<AppState>,
    method: Method,
    RawQuery(query): RawQuery,
) -> SlimResult<Response> {
    if method == Method::HEAD {
        return flac_headers(Response::builder())
            .body(Body::empty())
            .map_err(|e| SlimError::Internal(e.to_string()));
    }

    let stream_id = parse_stream_id(query.as_deref());
    let permit = admit(&state.gauge)?;
    log::info!(
        "[Stream] New connection for stream {stream_id} ({} in flight)",
        permit.count()
    );

    let mut session = StreamSession::new(stream_id, Arc::clone(&state.ids), FRAME_RING_CAPACITY);
    session.open(state.sample_bits)?;
    let session = Arc::new(session);

    state
        .slot
        .register(Arc::clone(&session))
        .map_err(|RegisterError::Duplicate(id)| SlimError::DuplicateStream(id))?;

    let (tx, rx) = tokio::sync::mpsc::channel::<Result<Bytes, std::io::Error>>(4);
    let slot = Arc::clone(&state.slot);
    let worker = Arc::clone(&session);
    tokio::task::spawn_blocking(move || {
        let _permit = permit;
        let mut buf = vec![0u8; STREAM_CHUNK_BYTES];
        loop {
            let n = worker.read(&mut buf, REQUEST_TIMEOUT_MS);
            if n == 0 {
                break;
            }
            if tx
                .blocking_send(Ok(Bytes::copy_from_slice(&buf[..n])))
                .is_err()
            {
                log::info!(
                    "[Stream] client disconnected from stream {}",
                    worker.stream_id()
                );
                break;
            }
        }
        worker.close();
        slot.deregister(&worker);
        log::info!("[Stream] done serving stream {}", worker.stream_id());
    });

    flac_headers(Response::builder())
        .body(Body::from_stream(ReceiverStream::new(rx)))
        .map_err(|e| SlimError::Internal(e.to_string()))
}

fn track_content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("flac") => "audio/flac",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("aac" | "m4a") => "audio/aac",
        Some("ogg") => "audio/ogg",
        _ => "application/octet-stream",
    }
}

/// Serves the single configured playback file, if any.
pub(super) async fn serve_track(State(state): State<AppState>) -> Response {
    let Some(path) = state.playback_file else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match tokio::fs::read(&path).await {
        Ok(data) => (
            [(header::CONTENT_TYPE, track_content_type(&path))],
            data,
        )
            .into_response(),
        Err(e) => {
            log::warn!("[Stream] cannot read track file {}: {e}", path.display());
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// Serves the embedded controller icon.
pub(super) async fn serve_icon(State(state): State<AppState>) -> Response {
    match state.icon {
        Some(bytes) => ([(header::CONTENT_TYPE, "image/png")], bytes).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod stream_id_parsing {
        use super::*;

        #[test]
        fn numeric_ids_parse() {
            assert_eq!(parse_stream_id(Some("stream=42")), 42);
            assert_eq!(parse_stream_id(Some("foo=bar&stream=7")), 7);
        }

        #[test]
        fn missing_id_parses_to_zero() {
            assert_eq!(parse_stream_id(None), 0);
            assert_eq!(parse_stream_id(Some("")), 0);
            assert_eq!(parse_stream_id(Some("foo=bar")), 0);
        }

        #[test]
        fn malformed_id_parses_to_zero() {
            assert_eq!(parse_stream_id(Some("stream=not-a-number")), 0);
            assert_eq!(parse_stream_id(Some("stream=")), 0);
            assert_eq!(parse_stream_id(Some("stream=-3")), 0);
        }
    }

    mod admission {
        use super::*;

        #[test]
        fn fourth_request_is_rejected_and_count_recovers() {
            let gauge = Arc::new(PlaybackGauge::new());
            let a = admit(&gauge).unwrap();
            let b = admit(&gauge).unwrap();
            let c = admit(&gauge).unwrap();
            assert!(matches!(admit(&gauge), Err(SlimError::Overloaded(4))));
            // The rejected permit released its slot.
            assert_eq!(gauge.inflight(), 3);
            drop((a, b, c));
            assert_eq!(gauge.inflight(), 0);
            assert!(admit(&gauge).is_ok());
        }
    }

    mod content_types {
        use super::*;

        #[test]
        fn known_extensions_map_to_audio_types() {
            assert_eq!(track_content_type(Path::new("a.flac")), "audio/flac");
            assert_eq!(track_content_type(Path::new("a.mp3")), "audio/mpeg");
            assert_eq!(track_content_type(Path::new("a.m4a")), "audio/aac");
        }

        #[test]
        fn unknown_extension_is_octet_stream() {
            assert_eq!(
                track_content_type(Path::new("noext")),
                "application/octet-stream"
            );
        }
    }
}
