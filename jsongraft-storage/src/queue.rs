//! Serial execution queue owned by a context.

use crate::{StorageError, StorageResult};
use std::thread::{self, ThreadId};
use tokio::sync::mpsc;
use tracing::debug;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// One worker thread draining jobs in submission order.
///
/// The worker exits once every sender is dropped and the queue is drained.
pub(crate) struct ContextQueue {
    sender: mpsc::UnboundedSender<Job>,
    worker: ThreadId,
}

impl ContextQueue {
    pub(crate) fn spawn(name: &str) -> StorageResult<Self> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        let queue_name = name.to_string();
        let handle = thread::Builder::new()
            .name(queue_name.clone())
            .spawn(move || {
                while let Some(job) = receiver.blocking_recv() {
                    job();
                }
                debug!("Context queue {} stopped", queue_name);
            })?;
        Ok(Self {
            sender,
            worker: handle.thread().id(),
        })
    }

    pub(crate) fn submit(&self, job: Job) -> StorageResult<()> {
        self.sender
            .send(job)
            .map_err(|_| StorageError::QueueClosed)
    }

    /// True when called from the worker thread.
    pub(crate) fn is_current(&self) -> bool {
        thread::current().id() == self.worker
    }
}
