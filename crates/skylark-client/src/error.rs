//! Error types for FlightSQL client operations

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by client operations.
///
/// The client performs no retries and never suppresses a failure: every
/// error is returned to the caller of the operation in progress, and any
/// partially received data is discarded.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport or TLS handshake failure while establishing a channel
    #[error("connection error: {0}")]
    Connection(String),

    /// The server rejected the query or the fetch call itself
    #[error("query error: {0}")]
    Query(#[from] tonic::Status),

    /// The result stream failed after it was opened
    #[error("stream error: {0}")]
    Stream(String),

    /// The configured deadline elapsed before the operation completed
    #[error("cancelled: deadline of {0:?} exceeded")]
    Cancelled(Duration),
}

impl ClientError {
    pub(crate) fn connection(err: impl std::fmt::Display) -> Self {
        ClientError::Connection(err.to_string())
    }

    pub(crate) fn stream(err: impl std::fmt::Display) -> Self {
        ClientError::Stream(err.to_string())
    }
}

impl From<tonic::transport::Error> for ClientError {
    fn from(err: tonic::transport::Error) -> Self {
        ClientError::Connection(err.to_string())
    }
}

impl From<arrow_flight::error::FlightError> for ClientError {
    fn from(err: arrow_flight::error::FlightError) -> Self {
        // Decode-layer failures only occur once a stream is open.
        ClientError::Stream(err.to_string())
    }
}

impl From<arrow::error::ArrowError> for ClientError {
    fn from(err: arrow::error::ArrowError) -> Self {
        ClientError::Stream(err.to_string())
    }
}
