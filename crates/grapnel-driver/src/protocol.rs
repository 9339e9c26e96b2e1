//! Protocol abstraction and the built-in JSON codec.
//!
//! A [`Protocol`] turns request frames into transport payloads and
//! payloads back into response frames. It also owns the shape of the
//! authentication reply, since that is a wire-format concern.

use grapnel_proto::{RequestEnvelope, RequestFrame, ResponseFrame};

use crate::config::Credentials;
use crate::error::Error;

/// Codec for one connection's request/response traffic.
pub trait Protocol: Send + 'static {
    /// Encode a request frame into a transport payload.
    fn encode(&mut self, frame: &RequestFrame) -> Result<Vec<u8>, Error>;

    /// Decode one transport payload into a response frame.
    fn decode(&mut self, payload: &[u8]) -> Result<ResponseFrame, Error>;

    /// Encode the reply to an authentication challenge.
    ///
    /// The reply reuses the challenged request's identifier so the engine
    /// resumes the original request once the credentials check out.
    fn encode_auth(
        &mut self,
        request_id: u64,
        credentials: &Credentials,
    ) -> Result<Vec<u8>, Error>;
}

/// The built-in codec: JSON over whatever the transport frames.
pub struct JsonProtocol;

impl JsonProtocol {
    /// Create the JSON codec.
    pub fn new() -> Self {
        JsonProtocol
    }
}

impl Default for JsonProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl Protocol for JsonProtocol {
    fn encode(&mut self, frame: &RequestFrame) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(frame).map_err(|e| {
            grapnel_proto::Error::Serialization(format!("failed to encode request: {}", e)).into()
        })
    }

    fn decode(&mut self, payload: &[u8]) -> Result<ResponseFrame, Error> {
        serde_json::from_slice(payload).map_err(|e| {
            grapnel_proto::Error::Deserialization(format!("failed to decode response: {}", e))
                .into()
        })
    }

    fn encode_auth(
        &mut self,
        request_id: u64,
        credentials: &Credentials,
    ) -> Result<Vec<u8>, Error> {
        let reply = RequestFrame::new(
            request_id,
            RequestEnvelope::authentication(&credentials.username, &credentials.password),
        );
        self.encode(&reply)
    }
}
