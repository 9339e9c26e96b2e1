//! Bounded worker pool for request dispatch.
//!
//! A fixed set of tasks drains one shared job queue; each job is a boxed
//! future driven to completion by whichever worker picks it up. Workers
//! cap how many request cycles run at once, independently of how many
//! connections exist, because a cycle spends most of its time waiting on
//! the engine.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::Error;

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A fixed set of worker tasks sharing one job queue.
pub struct WorkerPool {
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl WorkerPool {
    /// Spawn `size` workers on the ambient runtime. Zero is treated as
    /// one.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let (sender, receiver) = mpsc::unbounded_channel::<Job>();
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let mut handles = Vec::with_capacity(size);
        for worker_id in 0..size {
            let receiver = Arc::clone(&receiver);
            handles.push(tokio::spawn(async move {
                loop {
                    // Hold the queue lock only while waiting for a job,
                    // never while running one.
                    let job = {
                        let mut queue = receiver.lock().await;
                        queue.recv().await
                    };

                    match job {
                        Some(job) => {
                            tracing::trace!(worker_id, "worker picked up a job");
                            job.await;
                        }
                        None => {
                            tracing::debug!(worker_id, "worker shutting down");
                            break;
                        }
                    }
                }
            }));
        }

        Self {
            sender: Mutex::new(Some(sender)),
            handles: Mutex::new(handles),
            size,
        }
    }

    /// Queue a job for execution. Fails once the pool has shut down.
    pub fn execute<F>(&self, job: F) -> Result<(), Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let sender = self.sender.lock();
        match sender.as_ref() {
            Some(tx) => tx.send(Box::pin(job)).map_err(|_| Error::Closed),
            None => Err(Error::Closed),
        }
    }

    /// Close the queue and wait for every worker to exit.
    ///
    /// Jobs already queued or running complete first; nothing is
    /// aborted.
    pub async fn shutdown(&self) {
        let sender = self.sender.lock().take();
        drop(sender);

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "worker task failed during shutdown");
            }
        }
    }

    /// Number of workers.
    pub fn size(&self) -> usize {
        self.size
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size)
            .field("shutdown", &self.sender.lock().is_none())
            .finish()
    }
}
