//! Stats: forward resource samples from the executor.

use super::Supervisor;
use crate::errors::{SupervisorError, SupervisorResult};
use crate::runtime::types::{ResourceUsage, TaskId};
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

impl Supervisor {
    /// Resource samples every `interval` until the process exits, `cancel`
    /// fires or the supervisor shuts down. Each call starts a fresh stream.
    pub async fn stats(
        &self,
        id: &TaskId,
        interval: Duration,
        cancel: CancellationToken,
    ) -> SupervisorResult<ReceiverStream<SupervisorResult<ResourceUsage>>> {
        if interval.is_zero() {
            return Err(SupervisorError::InvalidConfig(
                "stats interval must be positive".into(),
            ));
        }

        let handle = self.handle(id)?;
        let mut samples = handle.connection().stats(interval);
        let shutdown = self.inner.shutdown.clone();
        let task_id = id.clone();

        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = shutdown.cancelled() => break,
                    next = samples.next() => next,
                };
                let Some(sample) = next else {
                    break;
                };
                let sent = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = shutdown.cancelled() => break,
                    sent = tx.send(sample) => sent,
                };
                if sent.is_err() {
                    break;
                }
            }
            tracing::trace!(task_id = %task_id, "Stats stream ended");
        });

        Ok(ReceiverStream::new(rx))
    }
}
