//! Remote-connection adapter for traversal-shaped use.
//!
//! [`Remote`] layers traversal ergonomics on top of [`Client`]: a
//! submitted program comes back as a single-pass iterator over the
//! materialized values, paired with a handle to the traversal's
//! server-side side effects. The asynchronous form composes two stages,
//! the client's own future and then a materialization continuation that
//! runs on the worker pool rather than the caller's task.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use grapnel_proto::{Program, RequestEnvelope, Value};

use crate::client::Client;
use crate::config::ClientConfig;
use crate::error::Error;
use crate::result_set::ResultSet;

/// Adapter presenting a remote engine as a traversal executor.
pub struct Remote {
    client: Client,
}

impl Remote {
    /// Connect an adapter, building its own client from `config`.
    pub async fn connect(config: ClientConfig) -> Result<Self, Error> {
        Ok(Self {
            client: Client::connect(config).await?,
        })
    }

    /// Wrap an existing client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// The underlying client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Submit a program and wait for the complete traversal result.
    pub async fn submit(&self, program: impl Into<Program>) -> Result<TraversalResult, Error> {
        let program: Program = program.into();

        let result_set = self.client.submit(program).await?;
        let request_id = result_set.request_id();
        let values = result_set.all().await?;

        Ok(TraversalResult::new(
            values,
            SideEffects::new(request_id, self.client.clone()),
        ))
    }

    /// Submit a program, receiving a future of the traversal result.
    ///
    /// Returns as soon as the request is admitted. The materialization
    /// wait runs as a continuation on the client's worker pool, never on
    /// the caller's task; the returned future resolves once the values
    /// are in hand, or with the cycle's failure unchanged.
    pub async fn submit_async(
        &self,
        program: impl Into<Program>,
    ) -> Result<TraversalFuture, Error> {
        let program: Program = program.into();

        let inner = self.client.submit_async(program).await?;
        let client = self.client.clone();

        let (report, receiver) = oneshot::channel();
        self.client.workers().execute(async move {
            let outcome = materialize(inner.await, client).await;
            if report.send(outcome).is_err() {
                tracing::debug!("traversal future dropped before completion");
            }
        })?;

        Ok(TraversalFuture { receiver })
    }

    /// Close the adapter and its client.
    pub async fn close(&self) {
        self.client.close().await;
    }
}

impl std::fmt::Debug for Remote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Remote").field("client", &self.client).finish()
    }
}

/// Continuation body: turn a settled result set into a traversal result.
async fn materialize(
    settled: Result<ResultSet, Error>,
    client: Client,
) -> Result<TraversalResult, Error> {
    let result_set = settled?;
    let request_id = result_set.request_id();
    let values = result_set.all().await?;

    Ok(TraversalResult::new(
        values,
        SideEffects::new(request_id, client),
    ))
}

/// Future of a [`TraversalResult`].
///
/// Resolves once the traversal's values are materialized; a failed cycle
/// arrives here as the same error the blocking form would surface.
pub struct TraversalFuture {
    receiver: oneshot::Receiver<Result<TraversalResult, Error>>,
}

impl Future for TraversalFuture {
    type Output = Result<TraversalResult, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| match received {
                Ok(outcome) => outcome,
                Err(_) => Err(Error::Dropped),
            })
    }
}

/// Materialized traversal output.
///
/// Iterates each result value exactly once, in engine order; there is no
/// rewinding or re-reading. The paired [`SideEffects`] handle stays
/// usable after iteration ends.
pub struct TraversalResult {
    results: std::vec::IntoIter<Value>,
    side_effects: SideEffects,
}

impl TraversalResult {
    fn new(values: Vec<Value>, side_effects: SideEffects) -> Self {
        Self {
            results: values.into_iter(),
            side_effects,
        }
    }

    /// Handle to the traversal's server-side side effects.
    pub fn side_effects(&self) -> &SideEffects {
        &self.side_effects
    }

    /// Number of values not yet iterated.
    pub fn remaining(&self) -> usize {
        self.results.len()
    }
}

impl Iterator for TraversalResult {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        self.results.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.results.size_hint()
    }
}

impl std::fmt::Debug for TraversalResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraversalResult")
            .field("remaining", &self.results.len())
            .field("side_effects", &self.side_effects)
            .finish()
    }
}

/// Handle to a completed traversal's server-side side effects.
///
/// Nothing is fetched eagerly; each call issues a retrieval operation
/// through the owning client, borrowing a pooled connection like any
/// other submission.
#[derive(Clone)]
pub struct SideEffects {
    request_id: u64,
    client: Client,
}

impl SideEffects {
    fn new(request_id: u64, client: Client) -> Self {
        Self { request_id, client }
    }

    /// Identifier of the traversal these side effects belong to.
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// List the side-effect keys.
    pub async fn keys(&self) -> Result<Vec<String>, Error> {
        let result_set = self
            .client
            .submit(RequestEnvelope::side_effect_keys(self.request_id))
            .await?;
        let values = result_set.all().await?;

        values
            .into_iter()
            .map(|value| match value {
                Value::String(key) => Ok(key),
                other => Err(Error::Protocol(grapnel_proto::Error::InvalidMessage(
                    format!("side-effect key is not a string: {:?}", other),
                ))),
            })
            .collect()
    }

    /// Gather one side effect by key.
    pub async fn get(&self, key: &str) -> Result<Vec<Value>, Error> {
        let envelope = RequestEnvelope::side_effect_gather(
            self.request_id,
            key,
            self.client.traversal_source(),
        );
        let result_set = self.client.submit(envelope).await?;
        result_set.all().await
    }
}

impl std::fmt::Debug for SideEffects {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SideEffects")
            .field("request_id", &self.request_id)
            .finish()
    }
}
