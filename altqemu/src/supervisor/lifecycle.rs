//! Stop, destroy, inspect, signal and list.

use super::Supervisor;
use crate::errors::{SupervisorError, SupervisorResult};
use crate::executor::signal;
use crate::runtime::types::{TaskId, TaskStatus};
use crate::task::SharedTaskHandle;
use nix::sys::signal::Signal;
use std::time::Duration;

impl Supervisor {
    /// Ask the process to exit with `signal`, killing it if it is still
    /// running after `timeout`. An empty signal name selects the executor's
    /// default.
    ///
    /// Succeeds without doing anything if the process already exited.
    pub async fn stop(&self, id: &TaskId, timeout: Duration, signal: &str) -> SupervisorResult<()> {
        let handle = self.handle(id)?;

        if has_exited(&handle) {
            tracing::debug!(task_id = %id, "Task already exited, nothing to stop");
            return Ok(());
        }

        let signal = if signal.trim().is_empty() {
            None
        } else {
            Some(resolve_signal(id, signal))
        };

        tracing::info!(
            task_id = %id,
            signal = ?signal,
            timeout_ms = timeout.as_millis() as u64,
            "Stopping task"
        );

        if let Err(e) = handle.connection().shutdown(signal, timeout).await {
            if has_exited(&handle) {
                tracing::debug!(task_id = %id, error = %e, "Shutdown failed but task already exited");
                return Ok(());
            }
            tracing::error!(task_id = %id, error = %e, "Failed to stop task");
            return Err(SupervisorError::StopFailed {
                task_id: id.clone(),
                reason: format!("executor shutdown failed: {}", e),
            });
        }
        Ok(())
    }

    /// Stop supervising a task.
    ///
    /// A running task is only destroyed with `force`, in which case it is
    /// killed. Teardown failures are logged; the task is always removed.
    pub async fn destroy(&self, id: &TaskId, force: bool) -> SupervisorResult<()> {
        let handle = self.handle(id)?;

        let running = !has_exited(&handle);
        if running && !force {
            return Err(SupervisorError::CannotDestroyRunning(id.clone()));
        }

        if running
            && let Err(e) = handle.connection().shutdown(None, Duration::ZERO).await
        {
            tracing::warn!(task_id = %id, error = %e, "Failed to kill task during destroy");
        }
        handle.connection().terminate();

        // Another destroy may have finished and a new start registered a
        // different handle under this id while the shutdown was pending.
        if !self.inner.tasks.delete_if(&handle)? {
            tracing::debug!(task_id = %id, "Task handle already replaced or removed");
        }
        handle.release();

        tracing::info!(task_id = %id, forced = running, "Task destroyed");
        Ok(())
    }

    /// Point-in-time status of a task.
    pub fn inspect(&self, id: &TaskId) -> SupervisorResult<TaskStatus> {
        Ok(self.handle(id)?.status())
    }

    /// Forward a named signal to the process.
    ///
    /// Unrecognized names send the default interrupt signal instead.
    pub async fn signal(&self, id: &TaskId, name: &str) -> SupervisorResult<()> {
        let handle = self.handle(id)?;
        let signal = resolve_signal(id, name);

        tracing::debug!(task_id = %id, signal = ?signal, "Signalling task");
        handle
            .connection()
            .signal(signal)
            .await
            .map_err(|e| SupervisorError::SignalFailed {
                task_id: id.clone(),
                reason: e.to_string(),
            })
    }

    /// Status of every supervised task.
    pub fn list(&self) -> SupervisorResult<Vec<TaskStatus>> {
        Ok(self
            .inner
            .tasks
            .list()?
            .iter()
            .map(|handle| handle.status())
            .collect())
    }
}

/// The exit was recorded, or the executor no longer sees the process.
fn has_exited(handle: &SharedTaskHandle) -> bool {
    handle.state().is_terminal() || !handle.connection().is_alive()
}

fn resolve_signal(id: &TaskId, name: &str) -> Signal {
    let (signal, known) = signal::lookup_or_default(name);
    if !known {
        tracing::warn!(
            task_id = %id,
            requested = %name,
            fallback = ?signal,
            "Unknown signal, sending default instead"
        );
    }
    signal
}
