//! Recover: resume supervision of a task launched by an earlier supervisor.

use super::Supervisor;
use crate::errors::{SupervisorError, SupervisorResult};
use crate::executor::descriptor;
use crate::runtime::types::TaskState;
use crate::task::{PersistedTaskState, TaskHandle};
use std::sync::Arc;

impl Supervisor {
    /// Reattach to the process described by `state` and register it.
    ///
    /// A no-op if the task is already supervised. On failure the process is
    /// left alone; deciding whether the task is lost is up to the caller.
    pub async fn recover(&self, state: &PersistedTaskState) -> SupervisorResult<()> {
        let task_id = state.task_id.clone();

        if self.inner.tasks.get(&task_id)?.is_some() {
            tracing::debug!(task_id = %task_id, "Task already supervised, nothing to recover");
            return Ok(());
        }

        let recovery_failed = |reason: String| {
            tracing::error!(task_id = %task_id, reason = %reason, "Failed to recover task");
            SupervisorError::RecoveryFailed {
                task_id: task_id.clone(),
                reason,
            }
        };

        state.check().map_err(|e| recovery_failed(e.to_string()))?;

        let connection =
            descriptor::decode(&task_id, self.inner.executor.as_ref(), &state.reattach).await?;
        if connection.pid() != state.pid {
            return Err(recovery_failed(format!(
                "reattached to pid {} but task state records pid {}",
                connection.pid(),
                state.pid
            )));
        }

        let handle = Arc::new(TaskHandle::new(
            state.task_config.clone(),
            Arc::clone(&connection),
            state.started_at,
            TaskState::Unknown,
        ));
        if connection.is_alive() {
            handle.confirm_running();
        }

        // Dropping our connection only detaches from the process
        if !self.inner.tasks.insert_new(Arc::clone(&handle))? {
            tracing::debug!(task_id = %task_id, "Task recovered concurrently");
            return Ok(());
        }

        tokio::spawn(Arc::clone(&handle).run(self.inner.shutdown.clone()));

        tracing::info!(
            task_id = %task_id,
            pid = state.pid,
            state = ?handle.state(),
            "Task recovered"
        );
        Ok(())
    }
}
