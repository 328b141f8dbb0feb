//! altqemu - lifecycle supervisor for QEMU virtual machine processes.
//!
//! Launches VM processes for an orchestrator, tracks them until they exit,
//! and reattaches to processes that outlived a supervisor restart.
//!
//! ```no_run
//! # async fn demo(config: altqemu::TaskConfig) -> altqemu::SupervisorResult<()> {
//! use altqemu::{Supervisor, SupervisorOptions};
//!
//! let supervisor = Supervisor::with_process_executor(SupervisorOptions::default())?;
//! let state = supervisor.start(config).await?;
//! let blob = state.to_bytes()?;
//!
//! // After a restart
//! let restarted = Supervisor::with_process_executor(SupervisorOptions::default())?;
//! restarted
//!     .recover(&altqemu::PersistedTaskState::from_bytes(&blob)?)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod executor;
pub mod fingerprint;
pub mod launch;
pub mod logging;
pub mod runtime;
mod supervisor;
pub mod task;
mod util;

pub use errors::{SupervisorError, SupervisorResult};
pub use executor::{
    ExecCommand, Executor, ExecutorConnection, ProcessExecutor, ProcessState, ReattachDescriptor,
};
pub use fingerprint::{Fingerprint, HealthState};
pub use runtime::{
    ExitResult, ResourceBounds, ResourceUsage, SupervisorOptions, TaskId, TaskState, TaskStatus,
};
pub use supervisor::Supervisor;
pub use task::{DriverConfig, PersistedTaskState, TaskConfig, TaskResources};
