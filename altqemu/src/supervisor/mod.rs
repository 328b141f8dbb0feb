//! Lifecycle Manager - the supervisor's public entry points.
//!
//! Each operation lives in its own file:
//!
//! - `start` / `recover`: put a task under supervision
//! - `wait` / `stats`: push streams fed by background tasks
//! - `lifecycle`: stop, destroy, inspect, signal, list

mod lifecycle;
mod recover;
mod start;
mod stats;
mod wait;

use crate::errors::{SupervisorError, SupervisorResult};
use crate::executor::{Executor, ProcessExecutor};
use crate::fingerprint::{Fingerprint, fingerprint_stream};
use crate::logging::init_logging;
use crate::runtime::options::SupervisorOptions;
use crate::runtime::types::TaskId;
use crate::task::{SharedTaskHandle, TaskStore};
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

/// Shared supervisor state.
pub(crate) type SupervisorInner = Arc<SupervisorInnerImpl>;

/// **Locking Strategy**: only `tasks` is shared across operations and it
/// locks internally. Every handle synchronizes its own state.
pub(crate) struct SupervisorInnerImpl {
    pub(crate) options: SupervisorOptions,
    pub(crate) executor: Arc<dyn Executor>,
    pub(crate) tasks: TaskStore,
    /// Process-wide shutdown scope observed by every background task.
    pub(crate) shutdown: CancellationToken,
}

/// Supervises VM processes for an orchestrator.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct Supervisor {
    inner: SupervisorInner,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("options", &self.inner.options)
            .finish()
    }
}

impl Supervisor {
    /// Create a supervisor that launches VMs through `executor`.
    pub fn new(options: SupervisorOptions, executor: Arc<dyn Executor>) -> SupervisorResult<Self> {
        options.sanitize()?;
        if let Some(log_dir) = &options.log_dir {
            init_logging(log_dir)?;
        }

        tracing::debug!(
            image_paths = ?options.image_paths,
            qemu_system_bin = %options.qemu_system_bin,
            "Supervisor created"
        );

        Ok(Self {
            inner: Arc::new(SupervisorInnerImpl {
                options,
                executor,
                tasks: TaskStore::new(),
                shutdown: CancellationToken::new(),
            }),
        })
    }

    /// Create a supervisor that forks VMs as local child processes.
    pub fn with_process_executor(options: SupervisorOptions) -> SupervisorResult<Self> {
        Self::new(options, Arc::new(ProcessExecutor::new()))
    }

    pub fn options(&self) -> &SupervisorOptions {
        &self.inner.options
    }

    /// Stream of host fingerprints: one immediately, then one per
    /// configured period, until `cancel` or shutdown.
    pub fn fingerprint(&self, cancel: CancellationToken) -> ReceiverStream<Fingerprint> {
        fingerprint_stream(
            self.inner.options.qemu_system_bin.clone(),
            self.inner.options.fingerprint_period(),
            cancel,
            self.inner.shutdown.clone(),
        )
    }

    /// Stop all background observation. Supervised processes keep running
    /// and can be recovered by a new supervisor.
    pub fn shutdown(&self) {
        tracing::info!("Supervisor shutting down");
        self.inner.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    fn handle(&self, id: &TaskId) -> SupervisorResult<SharedTaskHandle> {
        self.inner
            .tasks
            .get(id)?
            .ok_or_else(|| SupervisorError::TaskNotFound(id.clone()))
    }
}
