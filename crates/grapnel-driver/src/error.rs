//! Driver error types.

use std::time::Duration;

use thiserror::Error;

/// Driver errors.
///
/// Failures keep their kind across the dispatch pipeline: an error raised
/// inside a request cycle arrives at the caller's future as the same
/// variant, never re-wrapped.
#[derive(Debug, Error)]
pub enum Error {
    /// Construction-time configuration problem.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport-level failure (dial, send, receive, close).
    #[error("transport error: {0}")]
    Transport(String),

    /// Protocol-level failure (encode, decode, framing).
    #[error("protocol error: {0}")]
    Protocol(#[from] grapnel_proto::Error),

    /// The engine answered with a terminal failure status.
    #[error("server error {code}: {message}")]
    Server { code: u16, message: String },

    /// No pooled connection became available within the configured bound.
    #[error("timed out after {0:?} waiting for a pooled connection")]
    AcquireTimeout(Duration),

    /// The client has been closed and accepts no further work.
    #[error("client is closed")]
    Closed,

    /// The request's cycle ended without producing an outcome.
    #[error("request was dropped before completing")]
    Dropped,
}
