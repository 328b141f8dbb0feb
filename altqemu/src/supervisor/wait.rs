//! Wait: deliver a task's exit result to any number of callers.

use super::Supervisor;
use crate::errors::{SupervisorError, SupervisorResult};
use crate::runtime::types::{ExitResult, TaskId};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

impl Supervisor {
    /// Stream that yields the task's exit result once, then ends.
    ///
    /// Ends without a value when `cancel` fires or the supervisor shuts
    /// down; the process is never affected. Yields `TaskNotFound` if the
    /// task is destroyed before its exit is observed.
    pub async fn wait(
        &self,
        id: &TaskId,
        cancel: CancellationToken,
    ) -> SupervisorResult<ReceiverStream<SupervisorResult<ExitResult>>> {
        let handle = self.handle(id)?;
        let exit_rx = handle.subscribe();
        let released = handle.released();
        let shutdown = self.inner.shutdown.clone();
        let task_id = id.clone();

        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                result = exit_of(exit_rx) => Some(
                    result.ok_or_else(|| SupervisorError::TaskNotFound(task_id.clone()))
                ),
                _ = cancel.cancelled() => None,
                _ = shutdown.cancelled() => None,
                _ = released.cancelled() => Some(Err(SupervisorError::TaskNotFound(task_id.clone()))),
            };

            match outcome {
                Some(item) => {
                    let _ = tx.send(item).await;
                }
                None => tracing::trace!(task_id = %task_id, "Wait cancelled"),
            }
        });

        Ok(ReceiverStream::new(rx))
    }
}

/// Resolve once an exit result is stored. `None` if the handle went away first.
async fn exit_of(mut rx: watch::Receiver<Option<ExitResult>>) -> Option<ExitResult> {
    rx.wait_for(Option::is_some).await.ok().and_then(|r| r.clone())
}
