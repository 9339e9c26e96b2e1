//! Result futures for submitted requests.
//!
//! Submission is two-staged: `submit_async` hands back a
//! [`ResultSetFuture`] as soon as the request is admitted, and the
//! [`ResultSet`] it resolves to carries a second future of the
//! materialized values. Callers choose at which stage to wait.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use grapnel_proto::Value;

use crate::error::Error;

/// Future handed back by `submit_async`.
///
/// Resolves when the request's cycle settles: to a [`ResultSet`] on
/// success, or to the cycle's failure unchanged. Dropping the future
/// does not cancel the request; the cycle runs to completion on its
/// worker either way.
pub struct ResultSetFuture {
    receiver: oneshot::Receiver<Result<ResultSet, Error>>,
}

impl ResultSetFuture {
    pub(crate) fn new(receiver: oneshot::Receiver<Result<ResultSet, Error>>) -> Self {
        Self { receiver }
    }
}

impl Future for ResultSetFuture {
    type Output = Result<ResultSet, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| match received {
                Ok(outcome) => outcome,
                // The cycle ended without reporting; nothing will ever
                // arrive for this request.
                Err(_) => Err(Error::Dropped),
            })
    }
}

/// The outcome of an accepted request.
pub struct ResultSet {
    request_id: u64,
    values: oneshot::Receiver<Result<Vec<Value>, Error>>,
}

impl ResultSet {
    pub(crate) fn new(
        request_id: u64,
        values: oneshot::Receiver<Result<Vec<Value>, Error>>,
    ) -> Self {
        Self { request_id, values }
    }

    /// Identifier the request traveled under.
    ///
    /// Doubles as the handle for retrieving the traversal's side effects
    /// after completion.
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// Await the materialized result values.
    pub async fn all(self) -> Result<Vec<Value>, Error> {
        match self.values.await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::Dropped),
        }
    }
}

impl std::fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSet")
            .field("request_id", &self.request_id)
            .finish()
    }
}
