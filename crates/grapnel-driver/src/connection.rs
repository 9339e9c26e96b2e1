//! Connection management for the driver.

use grapnel_proto::{RequestEnvelope, RequestFrame, Value};

use crate::config::{Credentials, ProtocolFactory, TransportFactory};
use crate::error::Error;
use crate::protocol::Protocol;
use crate::transport::Transport;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Dialed and ready for a request cycle.
    Ready,
    /// Connection closed.
    Closed,
}

/// One pooled link to the engine.
///
/// A connection pairs a transport with a protocol codec and runs one
/// request cycle at a time. Exclusivity is enforced by the pool borrow,
/// not by locking here; a connection is never visible to two callers at
/// once.
pub struct Connection {
    transport: Box<dyn Transport>,
    protocol: Box<dyn Protocol>,
    credentials: Credentials,
    state: ConnectionState,
    url: String,
}

impl Connection {
    /// Dial the endpoint and assemble a ready connection.
    pub(crate) async fn open(
        url: &str,
        transport_factory: &TransportFactory,
        protocol_factory: &ProtocolFactory,
        credentials: Credentials,
    ) -> Result<Self, Error> {
        let mut transport = (**transport_factory)();
        let protocol = (**protocol_factory)();

        transport.connect(url).await?;

        Ok(Self {
            transport,
            protocol,
            credentials,
            state: ConnectionState::Ready,
            url: url.to_string(),
        })
    }

    /// Run one full request cycle on this connection.
    ///
    /// Sends the envelope under `request_id`, then reads response frames
    /// until a terminal one arrives. Partial frames accumulate their
    /// values; an authentication challenge is answered with the client
    /// credentials and reading resumes. Terminal failure statuses map to
    /// [`Error::Server`].
    pub(crate) async fn round_trip(
        &mut self,
        request_id: u64,
        envelope: &RequestEnvelope,
    ) -> Result<Vec<Value>, Error> {
        if self.state != ConnectionState::Ready {
            return Err(Error::Transport(format!(
                "cannot submit in state {:?}",
                self.state
            )));
        }

        let frame = RequestFrame::new(request_id, envelope.clone());
        let payload = self.protocol.encode(&frame)?;
        self.transport.send(&payload).await?;

        let mut values = Vec::new();
        loop {
            let raw = self.transport.recv().await?;
            let response = self.protocol.decode(&raw)?;

            // Verify the response answers this request
            if response.id != request_id {
                return Err(Error::Protocol(grapnel_proto::Error::InvalidMessage(
                    format!(
                        "response ID mismatch: expected {}, got {}",
                        request_id, response.id
                    ),
                )));
            }

            if response.needs_authentication() {
                tracing::debug!(request_id, "answering authentication challenge");
                let reply = self.protocol.encode_auth(request_id, &self.credentials)?;
                self.transport.send(&reply).await?;
                continue;
            }

            if response.is_error() {
                return Err(Error::Server {
                    code: response.code,
                    message: response.message,
                });
            }

            let partial = response.is_partial();
            values.extend(response.values);
            if !partial {
                return Ok(values);
            }
        }
    }

    /// Close the connection. Idempotent.
    pub(crate) async fn close(&mut self) -> Result<(), Error> {
        if self.state == ConnectionState::Closed {
            return Ok(());
        }
        self.state = ConnectionState::Closed;
        self.transport.close().await
    }

    /// Check if the connection is ready for requests.
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("url", &self.url)
            .field("state", &self.state)
            .finish()
    }
}
