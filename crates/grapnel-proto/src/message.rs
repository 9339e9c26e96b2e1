//! Request and response messages exchanged with a traversal engine.
//!
//! Requests travel as a [`RequestFrame`]: a client-assigned identifier
//! beside a [`RequestEnvelope`] naming the processor, the operation, and
//! its arguments. Responses echo the identifier and carry a status code
//! plus zero or more result values; a single request may be answered by a
//! sequence of partial frames.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Program, Value};

/// Logical name every traversal binds its source under.
///
/// Engines resolve operations against this fixed alias; the envelope maps
/// it to whatever traversal source the client was configured with.
pub const TRAVERSAL_SOURCE_ALIAS: &str = "g";

/// Processor names understood by the engine.
pub mod processors {
    /// Traversal processing: program execution and side-effect retrieval.
    pub const TRAVERSAL: &str = "traversal";
}

/// Operation names understood by the engine.
pub mod ops {
    /// Execute a serialized traversal program.
    pub const BYTECODE: &str = "bytecode";
    /// List the side-effect keys of a completed traversal.
    pub const SIDE_EFFECT_KEYS: &str = "keys";
    /// Gather one side effect of a completed traversal by key.
    pub const SIDE_EFFECT_GATHER: &str = "gather";
    /// Answer an authentication challenge.
    pub const AUTHENTICATION: &str = "authentication";
}

/// Response status codes, numbered in the engine's HTTP-flavored scheme.
pub mod status {
    /// Request completed; result values attached.
    pub const OK: u16 = 200;
    /// Request completed with no result values.
    pub const NO_CONTENT: u16 = 204;
    /// More frames follow for the same request.
    pub const PARTIAL_CONTENT: u16 = 206;
    /// Credentials were rejected.
    pub const UNAUTHORIZED: u16 = 401;
    /// The engine requires authentication before answering.
    pub const AUTHENTICATE: u16 = 407;
    /// The engine could not parse the request.
    pub const MALFORMED_REQUEST: u16 = 498;
    /// Engine-side failure while executing the request.
    pub const SERVER_ERROR: u16 = 500;
    /// The engine gave up on the request after its own timeout.
    pub const SERVER_TIMEOUT: u16 = 598;
    /// The engine failed to serialize the response.
    pub const SERIALIZATION_ERROR: u16 = 599;
}

/// An operation addressed to an engine processor.
///
/// Envelopes are built once through the constructors below and are not
/// modified after submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Engine-side processor that handles the operation.
    pub processor: String,
    /// Operation name within the processor.
    pub op: String,
    /// Operation arguments.
    pub args: BTreeMap<String, Value>,
}

impl RequestEnvelope {
    /// Create an envelope with no arguments.
    pub fn new(processor: impl Into<String>, op: impl Into<String>) -> Self {
        RequestEnvelope {
            processor: processor.into(),
            op: op.into(),
            args: BTreeMap::new(),
        }
    }

    /// Add one argument.
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// Build the execution envelope for a traversal program.
    ///
    /// Binds [`TRAVERSAL_SOURCE_ALIAS`] to `traversal_source` so the
    /// engine resolves the program against the right graph.
    pub fn traversal(program: Program, traversal_source: &str) -> Self {
        RequestEnvelope::new(processors::TRAVERSAL, ops::BYTECODE)
            .with_arg("program", Value::Bytes(program.into_bytes()))
            .with_arg("aliases", alias_map(traversal_source))
    }

    /// Build the envelope listing side-effect keys of a past traversal.
    pub fn side_effect_keys(side_effect_id: u64) -> Self {
        RequestEnvelope::new(processors::TRAVERSAL, ops::SIDE_EFFECT_KEYS)
            .with_arg("sideEffect", Value::Int64(side_effect_id as i64))
    }

    /// Build the envelope gathering one side effect of a past traversal.
    pub fn side_effect_gather(side_effect_id: u64, key: &str, traversal_source: &str) -> Self {
        RequestEnvelope::new(processors::TRAVERSAL, ops::SIDE_EFFECT_GATHER)
            .with_arg("sideEffect", Value::Int64(side_effect_id as i64))
            .with_arg("sideEffectKey", key)
            .with_arg("aliases", alias_map(traversal_source))
    }

    /// Build the reply to an authentication challenge.
    ///
    /// Addressed to the engine's default processor, which handles the
    /// handshake before the original request resumes.
    pub fn authentication(username: &str, password: &str) -> Self {
        RequestEnvelope::new("", ops::AUTHENTICATION)
            .with_arg("username", username)
            .with_arg("password", password)
    }

    /// Look up an argument by key.
    pub fn arg(&self, key: &str) -> Option<&Value> {
        self.args.get(key)
    }
}

fn alias_map(traversal_source: &str) -> Value {
    let mut aliases = BTreeMap::new();
    aliases.insert(
        TRAVERSAL_SOURCE_ALIAS.to_string(),
        Value::from(traversal_source),
    );
    Value::Map(aliases)
}

/// The unit written to the engine: a request identifier beside its
/// envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    /// Client-assigned identifier, echoed by every response frame.
    pub id: u64,
    /// The operation being submitted.
    pub envelope: RequestEnvelope,
}

impl RequestFrame {
    /// Pair an identifier with an envelope.
    pub fn new(id: u64, envelope: RequestEnvelope) -> Self {
        RequestFrame { id, envelope }
    }
}

/// One frame of an engine response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    /// Identifier of the request this frame answers.
    pub id: u64,
    /// Status code from [`status`].
    pub code: u16,
    /// Human-readable status detail, empty on success.
    pub message: String,
    /// Result values carried by this frame.
    pub values: Vec<Value>,
}

impl ResponseFrame {
    /// Terminal success frame carrying final values.
    pub fn ok(id: u64, values: Vec<Value>) -> Self {
        ResponseFrame {
            id,
            code: status::OK,
            message: String::new(),
            values,
        }
    }

    /// Terminal success frame with no values.
    pub fn no_content(id: u64) -> Self {
        ResponseFrame {
            id,
            code: status::NO_CONTENT,
            message: String::new(),
            values: Vec::new(),
        }
    }

    /// Non-terminal frame; more values follow.
    pub fn partial(id: u64, values: Vec<Value>) -> Self {
        ResponseFrame {
            id,
            code: status::PARTIAL_CONTENT,
            message: String::new(),
            values,
        }
    }

    /// Challenge frame demanding credentials.
    pub fn authenticate(id: u64) -> Self {
        ResponseFrame {
            id,
            code: status::AUTHENTICATE,
            message: String::new(),
            values: Vec::new(),
        }
    }

    /// Terminal failure frame.
    pub fn error(id: u64, code: u16, message: impl Into<String>) -> Self {
        ResponseFrame {
            id,
            code,
            message: message.into(),
            values: Vec::new(),
        }
    }

    /// True when more frames follow for the same request.
    pub fn is_partial(&self) -> bool {
        self.code == status::PARTIAL_CONTENT
    }

    /// True when the engine demands credentials before answering.
    pub fn needs_authentication(&self) -> bool {
        self.code == status::AUTHENTICATE
    }

    /// True for terminal failure codes.
    ///
    /// The authentication challenge is not a failure; the request is
    /// still live while the client answers it.
    pub fn is_error(&self) -> bool {
        self.code >= 400 && !self.needs_authentication()
    }
}
