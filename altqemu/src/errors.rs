//! Error types for the supervisor.

use crate::runtime::types::TaskId;

/// Result alias used throughout the crate.
pub type SupervisorResult<T> = Result<T, SupervisorError>;

/// Every failure the supervisor reports to its caller.
///
/// Validation kinds (`AlreadyStarted`, `PathNotAllowed`, `ResourceOutOfBounds`,
/// `BinaryNotFound`, `InvalidConfig`) are raised before anything is launched.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("task with ID {0:?} already started")]
    AlreadyStarted(TaskId),

    #[error("image path {path:?} is not in the allowed paths: {reason}")]
    PathNotAllowed { path: String, reason: String },

    #[error("{resource} assignment out of bounds: {value} (allowed {min}..={max})")]
    ResourceOutOfBounds {
        resource: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("failed to resolve path to {binary:?} executable: {reason}")]
    BinaryNotFound { binary: String, reason: String },

    #[error("task {task_id}: launch failed: {reason}")]
    LaunchFailed { task_id: TaskId, reason: String },

    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    #[error("task {task_id}: recovery failed: {reason}")]
    RecoveryFailed { task_id: TaskId, reason: String },

    #[error("cannot destroy running task {0}")]
    CannotDestroyRunning(TaskId),

    #[error("task {task_id}: stop failed: {reason}")]
    StopFailed { task_id: TaskId, reason: String },

    #[error("task {task_id}: signal failed: {reason}")]
    SignalFailed { task_id: TaskId, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("executor error: {0}")]
    Executor(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for SupervisorError {
    fn from(e: serde_json::Error) -> Self {
        SupervisorError::Serialization(e.to_string())
    }
}

impl SupervisorError {
    /// True for errors that are detected before any process is launched.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SupervisorError::AlreadyStarted(_)
                | SupervisorError::PathNotAllowed { .. }
                | SupervisorError::ResourceOutOfBounds { .. }
                | SupervisorError::BinaryNotFound { .. }
                | SupervisorError::InvalidConfig(_)
        )
    }
}
