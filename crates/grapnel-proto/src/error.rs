//! Errors raised by the wire codec.

use thiserror::Error;

/// Wire codec failures.
///
/// Serialization errors belong to the send path and deserialization
/// errors to the receive path. The frame size bound applies in both
/// directions of the length-prefixed framing.
#[derive(Debug, Error)]
pub enum Error {
    /// A request frame could not be serialized for the wire.
    #[error("frame serialization error: {0}")]
    Serialization(String),

    /// Received bytes did not decode into a response frame.
    #[error("frame deserialization error: {0}")]
    Deserialization(String),

    /// A frame exceeded the configured size bound.
    #[error("frame of {size} bytes exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// A frame that decodes cleanly but breaks a protocol rule, such as
    /// a response naming the wrong request.
    #[error("invalid frame: {0}")]
    InvalidMessage(String),
}
