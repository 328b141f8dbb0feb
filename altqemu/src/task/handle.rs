//! Process Handle - one supervised VM process and its observable state.

use crate::executor::ExecutorConnection;
use crate::runtime::types::{ExitResult, TaskId, TaskState, TaskStatus};
use crate::task::config::TaskConfig;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Shared reference to a TaskHandle.
pub type SharedTaskHandle = Arc<TaskHandle>;

#[derive(Debug, Clone)]
struct HandleState {
    state: TaskState,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    exit_result: Option<ExitResult>,
}

/// Handle to one supervised process.
///
/// Owns the executor connection exclusively. The only state transitions are
/// `Unknown -> Running` (recovery confirmed) and `{Unknown, Running} -> Exited`,
/// the latter performed once by whichever observer sees the exit first.
pub struct TaskHandle {
    config: TaskConfig,
    pid: u32,
    connection: Arc<dyn ExecutorConnection>,
    state: RwLock<HandleState>,
    /// Exit result fan-out. Every waiter subscribes here.
    exit_tx: watch::Sender<Option<ExitResult>>,
    /// Cancelled when the handle leaves the store.
    released: CancellationToken,
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.config.id)
            .field("pid", &self.pid)
            .field("state", &self.state.read().state)
            .finish()
    }
}

impl TaskHandle {
    pub(crate) fn new(
        config: TaskConfig,
        connection: Arc<dyn ExecutorConnection>,
        started_at: DateTime<Utc>,
        initial: TaskState,
    ) -> Self {
        let (exit_tx, _) = watch::channel(None);
        Self {
            pid: connection.pid(),
            config,
            connection,
            state: RwLock::new(HandleState {
                state: initial,
                started_at,
                completed_at: None,
                exit_result: None,
            }),
            exit_tx,
            released: CancellationToken::new(),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn id(&self) -> &TaskId {
        &self.config.id
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn state(&self) -> TaskState {
        self.state.read().state
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.state.read().started_at
    }

    pub fn exit_result(&self) -> Option<ExitResult> {
        self.state.read().exit_result.clone()
    }

    pub fn status(&self) -> TaskStatus {
        let state = self.state.read();
        TaskStatus {
            id: self.config.id.clone(),
            name: self.config.name.clone(),
            state: state.state,
            pid: self.pid,
            started_at: state.started_at,
            completed_at: state.completed_at,
            exit_result: state.exit_result.clone(),
        }
    }

    pub(crate) fn connection(&self) -> &Arc<dyn ExecutorConnection> {
        &self.connection
    }

    /// Receiver that holds the exit result once the process has exited.
    ///
    /// A receiver created after the exit sees the stored value immediately.
    pub(crate) fn subscribe(&self) -> watch::Receiver<Option<ExitResult>> {
        self.exit_tx.subscribe()
    }

    pub(crate) fn released(&self) -> CancellationToken {
        self.released.clone()
    }

    // ========================================================================
    // State management
    // ========================================================================

    /// Promote a recovered handle once the process is known to be alive.
    pub(crate) fn confirm_running(&self) -> bool {
        let mut state = self.state.write();
        if state.state != TaskState::Unknown {
            return false;
        }
        state.state = TaskState::Running;
        true
    }

    /// Record the exit. Only the first call has an effect.
    pub(crate) fn mark_exited(&self, result: ExitResult) -> bool {
        {
            let mut state = self.state.write();
            if state.state.is_terminal() {
                return false;
            }
            state.state = TaskState::Exited;
            state.completed_at = Some(Utc::now());
            state.exit_result = Some(result.clone());
        }

        tracing::info!(
            task_id = %self.config.id,
            pid = self.pid,
            exit_code = result.exit_code,
            signal = result.signal,
            err = ?result.err,
            "Task exited"
        );
        self.exit_tx.send_replace(Some(result));
        true
    }

    /// Detach the handle from the supervisor. Pending waiters stop waiting.
    pub(crate) fn release(&self) {
        self.released.cancel();
    }

    // ========================================================================
    // Exit-wait routine
    // ========================================================================

    /// Observe the process until it exits, then record the exit.
    ///
    /// Ends early, without touching the process, when the supervisor shuts
    /// down or the handle is released.
    pub(crate) async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let outcome = tokio::select! {
            outcome = self.connection.wait() => outcome,
            _ = shutdown.cancelled() => {
                tracing::debug!(task_id = %self.config.id, "Supervisor shutting down, no longer waiting on task");
                return;
            }
            _ = self.released.cancelled() => return,
        };

        let result = match outcome {
            Ok(process) => ExitResult::new(process.exit_code, process.signal),
            Err(e) => {
                tracing::warn!(task_id = %self.config.id, error = %e, "Failed to wait on task process");
                ExitResult::failed(e.to_string())
            }
        };
        self.mark_exited(result);
    }
}
