//! Client configuration.

use std::sync::Arc;
use std::time::Duration;

use crate::error::Error;
use crate::protocol::Protocol;
use crate::transport::Transport;

/// Default engine endpoint.
pub const DEFAULT_URL: &str = "tcp://127.0.0.1:8182";

/// Default traversal source name bound under the `"g"` alias.
pub const DEFAULT_TRAVERSAL_SOURCE: &str = "g";

/// Default number of pooled connections.
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Worker tasks per detected core when sizing the dispatch pool.
pub const WORKERS_PER_CORE: usize = 5;

/// Compute the default worker-pool size.
///
/// Request cycles are I/O-bound, so the pool is sized well past the core
/// count; when parallelism cannot be detected the floor is one core's
/// worth of workers.
pub fn default_worker_count() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    cores * WORKERS_PER_CORE
}

/// Factory producing a fresh transport per connection.
pub type TransportFactory = Arc<dyn Fn() -> Box<dyn Transport> + Send + Sync>;

/// Factory producing a fresh protocol codec per connection.
pub type ProtocolFactory = Arc<dyn Fn() -> Box<dyn Protocol> + Send + Sync>;

/// Credentials passed through to the engine when it challenges.
///
/// The driver never interprets these; they are surrendered verbatim in
/// the authentication reply.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Account name.
    pub username: String,
    /// Account secret.
    pub password: String,
}

impl Credentials {
    /// Create credentials from a username/password pair.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Client configuration.
#[derive(Clone)]
pub struct ClientConfig {
    /// Engine endpoint (e.g., "tcp://127.0.0.1:8182").
    pub url: String,

    /// Traversal source every submitted program is resolved against.
    pub traversal_source: String,

    /// Number of pooled connections. Fixed for the client's lifetime.
    pub pool_size: usize,

    /// Number of dispatch workers.
    pub worker_count: usize,

    /// Credentials for the engine's authentication challenge.
    pub credentials: Credentials,

    /// Upper bound on the wait for a pooled connection.
    ///
    /// `None` (the default) waits indefinitely; admission control is the
    /// pool's job, not a deadline's.
    pub acquire_timeout: Option<Duration>,

    /// Replacement transport factory. `None` selects the built-in TCP
    /// transport when the `tcp` feature is enabled.
    pub transport_factory: Option<TransportFactory>,

    /// Replacement protocol factory. `None` selects the JSON codec.
    pub protocol_factory: Option<ProtocolFactory>,
}

impl ClientConfig {
    /// Create a configuration for the given endpoint.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            traversal_source: DEFAULT_TRAVERSAL_SOURCE.to_string(),
            pool_size: DEFAULT_POOL_SIZE,
            worker_count: default_worker_count(),
            credentials: Credentials::default(),
            acquire_timeout: None,
            transport_factory: None,
            protocol_factory: None,
        }
    }

    /// Create a configuration for connecting to localhost on the default
    /// port.
    pub fn localhost() -> Self {
        Self::new(DEFAULT_URL)
    }

    /// Set the traversal source name.
    pub fn with_traversal_source(mut self, source: impl Into<String>) -> Self {
        self.traversal_source = source.into();
        self
    }

    /// Set the number of pooled connections. Zero is treated as one.
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Set the number of dispatch workers. Zero is treated as one.
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    /// Set the credentials surrendered on an authentication challenge.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Credentials::new(username, password);
        self
    }

    /// Bound the wait for a pooled connection.
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    /// Replace the transport used for new connections.
    pub fn with_transport_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Transport> + Send + Sync + 'static,
    {
        self.transport_factory = Some(Arc::new(factory));
        self
    }

    /// Replace the protocol codec used for new connections.
    pub fn with_protocol_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Protocol> + Send + Sync + 'static,
    {
        self.protocol_factory = Some(Arc::new(factory));
        self
    }

    /// Resolve the transport factory, falling back to the built-in TCP
    /// transport.
    ///
    /// With the `tcp` feature disabled and no factory injected there is
    /// no viable transport, which is a configuration error.
    pub(crate) fn resolve_transport_factory(&self) -> Result<TransportFactory, Error> {
        if let Some(factory) = &self.transport_factory {
            return Ok(factory.clone());
        }

        #[cfg(feature = "tcp")]
        {
            let factory: TransportFactory =
                Arc::new(|| Box::new(crate::transport::TcpTransport::new()));
            Ok(factory)
        }

        #[cfg(not(feature = "tcp"))]
        {
            Err(Error::Config(
                "no transport factory configured and the built-in TCP transport is disabled"
                    .to_string(),
            ))
        }
    }

    /// Resolve the protocol factory, falling back to the JSON codec.
    pub(crate) fn resolve_protocol_factory(&self) -> ProtocolFactory {
        match &self.protocol_factory {
            Some(factory) => factory.clone(),
            None => {
                let factory: ProtocolFactory =
                    Arc::new(|| Box::new(crate::protocol::JsonProtocol::new()));
                factory
            }
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::localhost()
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("url", &self.url)
            .field("traversal_source", &self.traversal_source)
            .field("pool_size", &self.pool_size)
            .field("worker_count", &self.worker_count)
            .field("credentials", &self.credentials)
            .field("acquire_timeout", &self.acquire_timeout)
            .field("custom_transport", &self.transport_factory.is_some())
            .field("custom_protocol", &self.protocol_factory.is_some())
            .finish()
    }
}
