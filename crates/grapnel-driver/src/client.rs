//! The Grapnel client: pooled connections plus asynchronous dispatch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::oneshot;

use grapnel_proto::{Program, RequestEnvelope};

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::Error;
use crate::pool::{ConnectionPool, PooledConnection};
use crate::result_set::{ResultSet, ResultSetFuture};
use crate::worker::WorkerPool;

/// A submittable message.
///
/// Programs are wrapped in a traversal envelope bound to the configured
/// source; pre-built envelopes pass through untouched.
pub enum Submission {
    /// An opaque traversal program.
    Program(Program),
    /// A fully specified operation envelope.
    Envelope(RequestEnvelope),
}

impl From<Program> for Submission {
    fn from(program: Program) -> Self {
        Submission::Program(program)
    }
}

impl From<RequestEnvelope> for Submission {
    fn from(envelope: RequestEnvelope) -> Self {
        Submission::Envelope(envelope)
    }
}

impl From<&str> for Submission {
    fn from(text: &str) -> Self {
        Submission::Program(Program::from(text))
    }
}

impl From<String> for Submission {
    fn from(text: String) -> Self {
        Submission::Program(Program::from(text))
    }
}

/// A client for submitting traversal programs to a remote engine.
///
/// The client keeps a fixed set of pooled connections and a bounded
/// worker pool; every submission borrows one connection exclusively for
/// its whole request cycle. Clones are cheap and share the same pool and
/// workers.
///
/// # Example
///
/// ```ignore
/// use grapnel_driver::{Client, ClientConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = Client::connect(ClientConfig::localhost()).await?;
///
///     let results = client.submit("g.V().count()").await?.all().await?;
///     println!("{} values", results.len());
///
///     client.close().await;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    pool: ConnectionPool,
    workers: WorkerPool,
    next_request_id: AtomicU64,
}

impl Client {
    /// Connect to an engine, eagerly opening every pooled connection.
    ///
    /// Endpoint and configuration problems surface here rather than on
    /// the first submission. Construction fails outright when no
    /// transport is available (see `ClientConfig::transport_factory`).
    pub async fn connect(config: ClientConfig) -> Result<Self, Error> {
        let transport_factory = config.resolve_transport_factory()?;
        let protocol_factory = config.resolve_protocol_factory();

        let pool_size = config.pool_size.max(1);
        let mut connections = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            let conn = Connection::open(
                &config.url,
                &transport_factory,
                &protocol_factory,
                config.credentials.clone(),
            )
            .await?;
            connections.push(conn);
        }

        let pool = ConnectionPool::new(connections, config.acquire_timeout);
        let workers = WorkerPool::new(config.worker_count);

        tracing::info!(
            url = %config.url,
            pool_size,
            workers = workers.size(),
            "client connected"
        );

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                pool,
                workers,
                next_request_id: AtomicU64::new(1),
            }),
        })
    }

    /// Submit a message and wait for its result set.
    ///
    /// Equivalent to awaiting the future from [`Client::submit_async`];
    /// a failed cycle surfaces here as the original error.
    pub async fn submit(&self, message: impl Into<Submission>) -> Result<ResultSet, Error> {
        self.submit_async(message).await?.await
    }

    /// Submit a message without waiting for the engine.
    ///
    /// Suspends only for admission: a free pooled connection. The
    /// request cycle then runs on the worker pool while the caller holds
    /// a [`ResultSetFuture`] that resolves when the cycle settles.
    pub async fn submit_async(
        &self,
        message: impl Into<Submission>,
    ) -> Result<ResultSetFuture, Error> {
        let envelope = self.normalize(message.into());

        let pooled = self.inner.pool.acquire().await?;
        let request_id = self.next_request_id();

        let (report, receiver) = oneshot::channel();
        self.inner.workers.execute(async move {
            let outcome = run_cycle(pooled, request_id, envelope).await;
            if report.send(outcome).is_err() {
                tracing::debug!(request_id, "request future dropped before completion");
            }
        })?;

        Ok(ResultSetFuture::new(receiver))
    }

    /// Close the client: idle connections first, then the workers.
    ///
    /// Worker shutdown waits for in-flight cycles, so no accepted
    /// request is abandoned. Connections borrowed at the moment of the
    /// drain are not reached; they re-enter the pool unclosed when their
    /// cycle finishes.
    pub async fn close(&self) {
        let idle = self.inner.pool.drain_idle().await;
        let drained = idle.len();
        for mut conn in idle {
            if let Err(e) = conn.close().await {
                tracing::warn!(error = %e, "failed to close pooled connection");
            }
        }

        self.inner.workers.shutdown().await;
        tracing::info!(connections = drained, "client closed");
    }

    /// Traversal source submitted programs resolve against.
    pub fn traversal_source(&self) -> &str {
        &self.inner.config.traversal_source
    }

    /// Number of pooled connections.
    pub fn pool_capacity(&self) -> usize {
        self.inner.pool.capacity()
    }

    /// Current number of idle pooled connections.
    pub fn idle_connections(&self) -> usize {
        self.inner.pool.idle_connections()
    }

    pub(crate) fn workers(&self) -> &WorkerPool {
        &self.inner.workers
    }

    fn normalize(&self, submission: Submission) -> RequestEnvelope {
        match submission {
            Submission::Program(program) => {
                RequestEnvelope::traversal(program, self.traversal_source())
            }
            Submission::Envelope(envelope) => envelope,
        }
    }

    fn next_request_id(&self) -> u64 {
        self.inner.next_request_id.fetch_add(1, Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("url", &self.inner.config.url)
            .field("traversal_source", &self.inner.config.traversal_source)
            .field("pool", &self.inner.pool)
            .field("workers", &self.inner.workers)
            .finish()
    }
}

/// Drive one borrowed connection through a request cycle and package the
/// outcome. The borrow drops at the end of the cycle, returning the
/// connection to circulation whatever happened.
async fn run_cycle(
    mut pooled: PooledConnection,
    request_id: u64,
    envelope: RequestEnvelope,
) -> Result<ResultSet, Error> {
    let (values_tx, values_rx) = oneshot::channel();

    match pooled.round_trip(request_id, &envelope).await {
        Ok(values) => {
            let _ = values_tx.send(Ok(values));
            Ok(ResultSet::new(request_id, values_rx))
        }
        Err(e) => {
            tracing::debug!(request_id, error = %e, "request cycle failed");
            Err(e)
        }
    }
}
