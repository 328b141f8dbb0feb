//! Value types shared between the supervisor, handles and executors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-supplied identifier naming one supervised unit of work.
///
/// Opaque to the supervisor and stable across supervisor restarts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Observable lifecycle state of a supervised process.
///
/// `Unknown` only exists between reattachment and confirmation of a
/// recovered process. `Exited` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Unknown,
    Running,
    Exited,
}

impl TaskState {
    pub fn is_running(&self) -> bool {
        matches!(self, TaskState::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Exited)
    }
}

/// How a supervised process ended.
///
/// `err` is set when the exit could not be observed cleanly (the wait on
/// the executor failed); `exit_code` and `signal` are then meaningless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitResult {
    pub exit_code: i32,
    pub signal: i32,
    pub err: Option<String>,
}

impl ExitResult {
    pub fn new(exit_code: i32, signal: i32) -> Self {
        Self {
            exit_code,
            signal,
            err: None,
        }
    }

    pub fn failed(err: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            signal: 0,
            err: Some(err.into()),
        }
    }

    pub fn successful(&self) -> bool {
        self.exit_code == 0 && self.signal == 0 && self.err.is_none()
    }
}

/// Point-in-time view of a supervised task returned by inspect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    pub id: TaskId,
    pub name: String,
    pub state: TaskState,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub exit_result: Option<ExitResult>,
}

/// One resource-usage sample of a supervised process.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub timestamp: DateTime<Utc>,
    pub pid: u32,
    pub cpu_percent: Option<f32>,
    pub memory_bytes: Option<u64>,
}
