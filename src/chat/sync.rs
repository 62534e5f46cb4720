//! Detached background persistence
//!
//! Animation progress and other best-effort writes are pushed onto a queue
//! drained by a dedicated task. Callers never wait for these writes and
//! never see their errors; failures are logged and broadcast to anyone who
//! subscribed.

use crate::api::ChatBackend;
use crate::chat::types::MessageUpdate;
use crate::metrics::record_sync_failure;

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

/// A best-effort write.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncJob {
    /// Push animation progress of one message
    UpdateMessage {
        /// Owning session
        session_id: String,
        /// Target message
        message_id: String,
        /// New reveal state
        update: MessageUpdate,
    },
    /// Remove one message
    DeleteMessage {
        /// Owning session
        session_id: String,
        /// Target message
        message_id: String,
    },
}

impl SyncJob {
    /// Short name used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncJob::UpdateMessage { .. } => "update_message",
            SyncJob::DeleteMessage { .. } => "delete_message",
        }
    }
}

/// A job that failed, as reported on the error channel.
#[derive(Debug, Clone)]
pub struct SyncFailure {
    /// The job that failed
    pub job: SyncJob,
    /// Rendered error
    pub error: String,
}

enum Envelope {
    Job(SyncJob),
    Flush(oneshot::Sender<()>),
}

/// Handle to the background sync worker
///
/// Jobs are applied in submission order. Dropping the last handle closes
/// the queue; the worker finishes the jobs already queued and exits.
pub struct SyncQueue {
    tx: mpsc::UnboundedSender<Envelope>,
    errors: broadcast::Sender<SyncFailure>,
    worker: JoinHandle<()>,
}

impl SyncQueue {
    /// Spawns the worker on the current tokio runtime.
    pub fn spawn(backend: Arc<dyn ChatBackend>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (errors, _) = broadcast::channel(64);
        let worker = tokio::spawn(run_worker(backend, rx, errors.clone()));
        Self { tx, errors, worker }
    }

    /// Queues `job` without waiting for it.
    pub fn push(&self, job: SyncJob) {
        if self.tx.send(Envelope::Job(job)).is_err() {
            tracing::warn!("Sync worker has stopped; dropping job");
        }
    }

    /// Receives every later failure.
    pub fn subscribe_errors(&self) -> broadcast::Receiver<SyncFailure> {
        self.errors.subscribe()
    }

    /// Waits until every job queued before this call has been applied.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Envelope::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// `true` while the worker task is alive.
    pub fn is_running(&self) -> bool {
        !self.worker.is_finished()
    }
}

async fn run_worker(
    backend: Arc<dyn ChatBackend>,
    mut rx: mpsc::UnboundedReceiver<Envelope>,
    errors: broadcast::Sender<SyncFailure>,
) {
    while let Some(envelope) = rx.recv().await {
        let job = match envelope {
            Envelope::Job(job) => job,
            Envelope::Flush(done) => {
                let _ = done.send(());
                continue;
            }
        };

        let result = match &job {
            SyncJob::UpdateMessage {
                session_id,
                message_id,
                update,
            } => backend.update_message(session_id, message_id, update).await,
            SyncJob::DeleteMessage {
                session_id,
                message_id,
            } => backend.delete_message(session_id, message_id).await,
        };

        if let Err(e) = result {
            tracing::warn!("Background {} failed: {:#}", job.kind(), e);
            record_sync_failure(job.kind());
            // No subscribers is fine.
            let _ = errors.send(SyncFailure {
                error: e.to_string(),
                job,
            });
        }
    }
    tracing::debug!("Sync worker stopped");
}
