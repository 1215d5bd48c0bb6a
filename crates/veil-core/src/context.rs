//! Resource-owning execution contexts.
//!
//! Mutations of externally-owned resources are funnelled onto one serialized
//! context per resource domain. Discovery and timers may run elsewhere, but
//! hand their work off through [`ExecutionContext::dispatch`].

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub trait ExecutionContext: Send + Sync {
    /// Queue `job`. Jobs dispatched from one thread run in dispatch order.
    fn dispatch(&self, job: Job);

    /// Short label for logs.
    fn name(&self) -> &str;
}

/// Runs every job immediately on the calling thread.
#[derive(Debug, Default, Clone)]
pub struct InlineContext;

impl ExecutionContext for InlineContext {
    fn dispatch(&self, job: Job) {
        job();
    }

    fn name(&self) -> &str {
        "inline"
    }
}

/// FIFO of jobs drained by a single tokio task.
pub struct SerialContext {
    name: String,
    tx: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    completed: Arc<AtomicU64>,
}

impl SerialContext {
    /// Spawn the worker on `runtime`.
    pub fn spawn(name: impl Into<String>, runtime: &tokio::runtime::Handle) -> Self {
        let name = name.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let completed = Arc::new(AtomicU64::new(0));
        let counter = completed.clone();
        let label = name.clone();

        let worker = runtime.spawn(async move {
            debug!(context = %label, "serial context started");
            while let Some(job) = rx.recv().await {
                job();
                counter.fetch_add(1, Ordering::Relaxed);
            }
            debug!(context = %label, "serial context drained");
        });

        Self {
            name,
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            completed,
        }
    }

    /// Jobs run to completion so far.
    pub fn completed_jobs(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Stop accepting work and wait for every queued job to run.
    pub async fn close(&self) {
        drop(self.tx.lock().take());
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                if !e.is_cancelled() {
                    warn!(context = %self.name, error = %e, "serial context worker failed");
                }
            }
        }
    }
}

impl ExecutionContext for SerialContext {
    fn dispatch(&self, job: Job) {
        let sent = match self.tx.lock().as_ref() {
            Some(tx) => tx.send(job).is_ok(),
            None => false,
        };
        if !sent {
            trace!(context = %self.name, "context closed, job dropped");
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for SerialContext {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.abort();
        }
    }
}
