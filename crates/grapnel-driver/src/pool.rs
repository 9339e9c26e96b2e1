//! Connection pooling for the driver.
//!
//! The pool is a bounded channel of connection handles: acquiring
//! receives from the channel, releasing sends back into it. Capacity
//! equals the connection count, so an empty channel *is* the
//! admission-control wait; no separate permit accounting exists. Exactly
//! as many connections as the pool was built with circulate for its
//! whole lifetime.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::Mutex;

use grapnel_proto::{RequestEnvelope, Value};

use crate::connection::Connection;
use crate::error::Error;

/// A borrowed connection that returns itself to the pool when dropped.
///
/// Returning is structural: success, failure, and panic unwinding all
/// end in `Drop`, so a borrow can never leak a connection out of
/// circulation. The release itself is non-blocking.
pub struct PooledConnection {
    connection: Option<Connection>,
    pool: Arc<PoolInner>,
}

impl PooledConnection {
    /// Run one request cycle on the borrowed connection.
    pub(crate) async fn round_trip(
        &mut self,
        request_id: u64,
        envelope: &RequestEnvelope,
    ) -> Result<Vec<Value>, Error> {
        match self.connection.as_mut() {
            Some(conn) => conn.round_trip(request_id, envelope).await,
            None => Err(Error::Closed),
        }
    }

    /// Check if the borrowed connection is still open.
    pub fn is_open(&self) -> bool {
        self.connection
            .as_ref()
            .map(|c| c.is_open())
            .unwrap_or(false)
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.connection.take() {
            self.pool.release(conn);
        }
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("connection", &self.connection)
            .finish()
    }
}

/// Internal pool state.
struct PoolInner {
    tx: mpsc::Sender<Connection>,
    rx: Mutex<mpsc::Receiver<Connection>>,
    capacity: usize,
    idle: AtomicUsize,
    acquire_timeout: Option<Duration>,
}

impl PoolInner {
    /// Return a connection to circulation. Non-blocking; runs in `Drop`.
    fn release(&self, connection: Connection) {
        match self.tx.try_send(connection) {
            Ok(()) => {
                self.idle.fetch_add(1, Ordering::SeqCst);
                tracing::trace!(
                    idle = self.idle.load(Ordering::SeqCst),
                    "connection returned to pool"
                );
            }
            Err(_) => {
                // Capacity matches the connection count, so the channel
                // can only refuse a connection it never owned.
                tracing::warn!("discarding connection returned to a full pool");
            }
        }
    }
}

/// A fixed-size pool of engine connections.
///
/// The pool never opens or closes connections on its own; it circulates
/// the set it was built with. A connection that failed its request cycle
/// still returns to circulation.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Build a pool circulating an already-opened set of connections.
    pub(crate) fn new(connections: Vec<Connection>, acquire_timeout: Option<Duration>) -> Self {
        let capacity = connections.len().max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let idle = connections.len();

        for conn in connections {
            // Capacity covers the whole set; a refusal cannot happen.
            if tx.try_send(conn).is_err() {
                tracing::warn!("discarding connection that exceeded pool capacity");
            }
        }

        Self {
            inner: Arc::new(PoolInner {
                tx,
                rx: Mutex::new(rx),
                capacity,
                idle: AtomicUsize::new(idle),
                acquire_timeout,
            }),
        }
    }

    /// Borrow a connection, waiting until one is available.
    ///
    /// Without a configured acquire timeout the wait is unbounded; the
    /// pool is the admission control for the whole client.
    pub async fn acquire(&self) -> Result<PooledConnection, Error> {
        let connection = match self.inner.acquire_timeout {
            Some(bound) => tokio::time::timeout(bound, self.wait_for_connection())
                .await
                .map_err(|_| Error::AcquireTimeout(bound))??,
            None => self.wait_for_connection().await?,
        };

        self.inner.idle.fetch_sub(1, Ordering::SeqCst);
        Ok(PooledConnection {
            connection: Some(connection),
            pool: self.inner.clone(),
        })
    }

    async fn wait_for_connection(&self) -> Result<Connection, Error> {
        let mut rx = self.inner.rx.lock().await;
        match rx.recv().await {
            Some(connection) => Ok(connection),
            // The sender lives inside the pool; no sender means the pool
            // itself is gone.
            None => Err(Error::Closed),
        }
    }

    /// Remove every currently idle connection from circulation.
    ///
    /// Borrowed connections are untouched; they re-enter the pool when
    /// their cycle finishes.
    pub(crate) async fn drain_idle(&self) -> Vec<Connection> {
        let mut rx = self.inner.rx.lock().await;
        let mut drained = Vec::new();
        while let Ok(conn) = rx.try_recv() {
            self.inner.idle.fetch_sub(1, Ordering::SeqCst);
            drained.push(conn);
        }
        drained
    }

    /// Number of connections the pool circulates.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Current number of idle connections.
    pub fn idle_connections(&self) -> usize {
        self.inner.idle.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("capacity", &self.inner.capacity)
            .field("idle", &self.idle_connections())
            .finish()
    }
}
