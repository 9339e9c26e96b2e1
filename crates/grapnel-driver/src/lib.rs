//! Grapnel driver - async client for remote graph traversal engines.
//!
//! The driver keeps a small, fixed pool of long-lived connections to one
//! engine endpoint and dispatches request/response cycles on a bounded
//! worker pool. Submitting returns a future immediately; admission (a
//! free pooled connection) is the only point a caller ever waits on
//! involuntarily.
//!
//! # Modules
//!
//! - [`client`] - The [`Client`]: submission APIs and lifecycle
//! - [`remote`] - Traversal-shaped adapter over the client
//! - [`pool`] - Fixed-size connection pool with scoped borrows
//! - [`worker`] - Bounded worker pool driving request cycles
//! - [`connection`] - One transport + codec pair and its request cycle
//! - [`result_set`] - Two-stage result futures
//! - [`transport`] / [`protocol`] - Pluggable I/O and codec seams
//! - [`config`] / [`error`] - Configuration and error taxonomy
//!
//! # Quick Start
//!
//! ```ignore
//! use grapnel_driver::{Client, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Four eager connections, JSON over TCP
//!     let client = Client::connect(ClientConfig::localhost()).await?;
//!
//!     // Fire-and-collect
//!     let values = client.submit("g.V().count()").await?.all().await?;
//!     println!("{} values", values.len());
//!
//!     // Or keep the future and do other work first
//!     let pending = client.submit_async("g.E().count()").await?;
//!     let result_set = pending.await?;
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod pool;
pub mod protocol;
pub mod remote;
pub mod result_set;
pub mod transport;
pub mod worker;

pub use client::{Client, Submission};
pub use config::{ClientConfig, Credentials, ProtocolFactory, TransportFactory};
pub use connection::{Connection, ConnectionState};
pub use error::Error;
pub use pool::{ConnectionPool, PooledConnection};
pub use protocol::{JsonProtocol, Protocol};
pub use remote::{Remote, SideEffects, TraversalFuture, TraversalResult};
pub use result_set::{ResultSet, ResultSetFuture};
#[cfg(feature = "tcp")]
pub use transport::TcpTransport;
pub use transport::Transport;
pub use worker::WorkerPool;

/// Re-export protocol types.
pub use grapnel_proto as proto;
