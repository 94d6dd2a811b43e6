//! Centralized error types for the Slimsonos core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses
//!
//! Flow-control conditions of the streaming pipeline (pacing timeout, stale
//! stream id, drained ring) are deliberately NOT errors: they surface as
//! zero-length returns at the [`StreamSession`](crate::stream::StreamSession)
//! boundary and never cross it as `Err`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Application-wide error type for the Slimsonos server.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum SlimError {
    /// Too many concurrently-served playback requests.
    #[error("Server overloaded: {0} playback requests in flight")]
    Overloaded(usize),

    /// A request arrived for a stream id that is already being served.
    #[error("Stream {0} is already playing")]
    DuplicateStream(u64),

    /// The block encoder could not be initialized for a new session.
    #[error("Encoder initialization failed: {0}")]
    EncoderInit(String),

    /// Client sent an invalid or malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Network-related error (IP detection, bind failures).
    #[error("Network error: {0}")]
    Network(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SlimError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Overloaded(_) => "overloaded",
            Self::DuplicateStream(_) => "duplicate_stream",
            Self::EncoderInit(_) => "encoder_init_failed",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Network(_) => "network_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Overloaded(_) | Self::DuplicateStream(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::EncoderInit(_) | Self::Network(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type SlimResult<T> = Result<T, SlimError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for SlimError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overloaded_maps_to_429() {
        let err = SlimError::Overloaded(4);
        assert_eq!(err.code(), "overloaded");
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn duplicate_stream_maps_to_429() {
        let err = SlimError::DuplicateStream(5);
        assert_eq!(err.code(), "duplicate_stream");
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn encoder_init_maps_to_500() {
        let err = SlimError::EncoderInit("bad bit depth".into());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
