//! Relay error types

use thiserror::Error;

/// Errors surfaced by the relay core.
///
/// Transport failures are not represented here: they arrive as `error`
/// lifecycle events and are forwarded like any other event.
#[derive(Debug, Error)]
pub enum RelayError {
    /// JSON mode is active and the server sent a malformed payload.
    /// This is a protocol violation, propagated rather than swallowed.
    #[error("malformed structured payload: {0}")]
    PayloadDecode(#[source] serde_json::Error),

    /// An outbound value could not be serialized
    #[error("failed to encode outbound payload: {0}")]
    PayloadEncode(#[source] serde_json::Error),

    /// No live transport handle is available
    #[error("transport is not connected")]
    NotConnected,

    /// Structured send requested without JSON mode or native support
    #[error("structured send requires json payload format")]
    StructuredSendUnsupported,
}
