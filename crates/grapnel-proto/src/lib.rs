//! Grapnel protocol types and framing.
//!
//! This crate defines the wire-level vocabulary for talking to a remote
//! graph traversal engine: the request/response message shapes, the
//! runtime value union, the opaque traversal program wrapper, and the
//! length-prefix framing used by stream transports.
//!
//! # Modules
//!
//! - [`value`] - Runtime value types carried in results and arguments
//! - [`program`] - Opaque serialized traversal programs
//! - [`message`] - Request envelopes, frames, and response status codes
//! - [`framing`] - Length-prefix framing for stream transports
//! - [`error`] - Errors raised by the wire codec
//!
//! # Serialization
//!
//! All message types derive `serde::Serialize` and `serde::Deserialize`.
//! The concrete encoding is chosen by whoever frames the messages; the
//! driver's built-in protocol uses JSON:
//!
//! ```ignore
//! use grapnel_proto::{Program, RequestEnvelope, RequestFrame};
//!
//! let envelope = RequestEnvelope::traversal(Program::from("g.V().count()"), "g");
//! let bytes = serde_json::to_vec(&RequestFrame::new(1, envelope))?;
//! ```

pub mod error;
pub mod framing;
pub mod message;
pub mod program;
pub mod value;

pub use error::Error;

// Re-export commonly used types at crate root
pub use message::{
    ops, processors, status, RequestEnvelope, RequestFrame, ResponseFrame,
    TRAVERSAL_SOURCE_ALIAS,
};
pub use program::Program;
pub use value::Value;
