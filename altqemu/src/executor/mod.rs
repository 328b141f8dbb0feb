//! Executor collaborator: the service that actually forks, signals and reaps
//! VM processes.
//!
//! ## Architecture
//!
//! - **Executor**: allocation operations (creates or reattaches an `ExecutorConnection`)
//! - **ExecutorConnection**: runtime operations on one process (wait, signal, stop, stats)
//!
//! This separation enables:
//! - Reattachment to processes that outlived a supervisor restart
//! - Releasing a connection that was allocated but never launched
//! - Swapping the process backend without touching lifecycle code

pub mod descriptor;
#[cfg(test)]
pub(crate) mod fake;
mod process;
pub mod signal;
mod stats;

use crate::errors::SupervisorResult;
use crate::runtime::types::ResourceUsage;
use async_trait::async_trait;
use futures::stream::BoxStream;
use nix::sys::signal::Signal;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub use descriptor::ReattachDescriptor;
pub use process::{ProcessConnection, ProcessExecutor};

/// Fully resolved command the executor runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecCommand {
    pub cmd: PathBuf,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
}

/// Exit status observed by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessState {
    pub pid: u32,
    /// `-1` when the process was terminated by a signal.
    pub exit_code: i32,
    /// `0` when the process exited on its own.
    pub signal: i32,
}

/// Trait for allocating executor connections.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Allocate a connection that has not launched anything yet.
    ///
    /// The caller owns the connection and must `terminate()` it if launch fails.
    async fn create(&self) -> SupervisorResult<Arc<dyn ExecutorConnection>>;

    /// Rebuild a connection to a process described by `descriptor`.
    async fn reattach(
        &self,
        descriptor: &ReattachDescriptor,
    ) -> SupervisorResult<Arc<dyn ExecutorConnection>>;
}

/// Runtime operations on one supervised process.
///
/// Each connection is owned by exactly one task handle.
#[async_trait]
pub trait ExecutorConnection: Send + Sync {
    /// Launch the command. Returns the process id.
    async fn launch(&self, command: &ExecCommand) -> SupervisorResult<u32>;

    /// Process id, `0` before launch.
    fn pid(&self) -> u32;

    /// Block until the process terminates.
    ///
    /// Cancel by dropping the future; cancelling never affects the process.
    async fn wait(&self) -> SupervisorResult<ProcessState>;

    /// Send `signal` (executor default when `None`) and escalate to a kill
    /// if the process has not exited within `timeout`. A zero timeout kills
    /// immediately.
    async fn shutdown(&self, signal: Option<Signal>, timeout: Duration) -> SupervisorResult<()>;

    async fn signal(&self, signal: Signal) -> SupervisorResult<()>;

    /// Resource samples every `interval` until the process exits.
    fn stats(&self, interval: Duration) -> BoxStream<'static, SupervisorResult<ResourceUsage>>;

    /// False once the process has exited (or was never launched).
    fn is_alive(&self) -> bool;

    /// Kill the process immediately, if still alive, and release the connection.
    fn terminate(&self);

    /// Serializable reference used to reattach after a supervisor restart.
    fn descriptor(&self) -> SupervisorResult<ReattachDescriptor>;
}
