//! Supervisor-wide configuration, defaults and shared value types.

pub mod constants;
pub mod options;
pub mod types;

pub use options::{ResourceBounds, SupervisorOptions};
pub use types::{ExitResult, ResourceUsage, TaskId, TaskState, TaskStatus};
