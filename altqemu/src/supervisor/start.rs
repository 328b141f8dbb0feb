//! Start: validate, launch and register a new task.

use super::Supervisor;
use crate::errors::{SupervisorError, SupervisorResult};
use crate::executor::{ExecutorConnection, descriptor};
use crate::launch;
use crate::runtime::types::{TaskId, TaskState};
use crate::task::{PersistedTaskState, TaskConfig, TaskHandle};
use chrono::Utc;
use std::sync::Arc;

/// RAII guard for cleanup on launch failure.
///
/// Terminates the executor connection if dropped without being disarmed,
/// so no process or connection outlives a failed start.
struct LaunchGuard {
    task_id: TaskId,
    connection: Arc<dyn ExecutorConnection>,
    armed: bool,
}

impl LaunchGuard {
    fn new(task_id: TaskId, connection: Arc<dyn ExecutorConnection>) -> Self {
        Self {
            task_id,
            connection,
            armed: true,
        }
    }

    /// Disarm the guard (call on success).
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for LaunchGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::warn!(task_id = %self.task_id, "Task launch failed, releasing executor connection");
        self.connection.terminate();
    }
}

impl Supervisor {
    /// Launch a task and put it under supervision.
    ///
    /// Returns the state the caller must persist to recover the task later.
    pub async fn start(&self, config: TaskConfig) -> SupervisorResult<PersistedTaskState> {
        let task_id = config.id.clone();

        if self.inner.tasks.get(&task_id)?.is_some() {
            return Err(SupervisorError::AlreadyStarted(task_id));
        }

        let command = launch::build_command(&config, &self.inner.options)?;

        tracing::info!(
            task_id = %task_id,
            cmd = %command.cmd.display(),
            "Starting task"
        );

        let launch_failed = |reason: String| {
            tracing::error!(task_id = %task_id, reason = %reason, "Failed to start task");
            SupervisorError::LaunchFailed {
                task_id: task_id.clone(),
                reason,
            }
        };

        let connection = self
            .inner
            .executor
            .create()
            .await
            .map_err(|e| launch_failed(format!("failed to create executor: {}", e)))?;
        let mut guard = LaunchGuard::new(task_id.clone(), Arc::clone(&connection));

        let pid = connection
            .launch(&command)
            .await
            .map_err(|e| launch_failed(format!("failed to launch command with executor: {}", e)))?;

        let reattach = descriptor::encode(&task_id, connection.as_ref())?;
        let started_at = Utc::now();

        let handle = Arc::new(TaskHandle::new(
            config.clone(),
            Arc::clone(&connection),
            started_at,
            TaskState::Running,
        ));

        // A concurrent start for the same id may have won while we launched
        if !self.inner.tasks.insert_new(Arc::clone(&handle))? {
            return Err(SupervisorError::AlreadyStarted(task_id));
        }
        guard.disarm();

        tokio::spawn(Arc::clone(&handle).run(self.inner.shutdown.clone()));

        tracing::info!(task_id = %task_id, pid = pid, "Task started");
        Ok(PersistedTaskState::new(config, reattach, pid, started_at))
    }
}
