//! Task launch parameters and the opaque driver section.

use crate::errors::{SupervisorError, SupervisorResult};
use crate::runtime::types::TaskId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Launch parameters for one task, as handed over by the orchestrator.
///
/// Immutable for the lifetime of the task and persisted verbatim inside
/// [`PersistedTaskState`](crate::task::PersistedTaskState).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub id: TaskId,
    pub name: String,
    #[serde(default)]
    pub alloc_id: String,
    /// Allocation directory; relative image paths are resolved against it.
    pub alloc_dir: PathBuf,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
    #[serde(default)]
    pub env: HashMap<String, String>,
    pub resources: TaskResources,
    /// Driver-specific settings, decoded with [`TaskConfig::decode_driver_config`].
    #[serde(default)]
    pub driver_config: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResources {
    pub memory_mb: u64,
    pub cpu_shares: u64,
}

/// Decoded driver section of a task configuration.
///
/// Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub image_path: String,
    pub accelerator: Option<String>,
    /// Extra arguments appended to the virtualization binary's command line.
    pub args: Vec<String>,
    pub qemu_system_bin: Option<String>,
    pub vm_name: Option<String>,
    pub machine_type: Option<String>,
    pub cpu_type: Option<String>,
}

impl TaskConfig {
    pub fn decode_driver_config(&self) -> SupervisorResult<DriverConfig> {
        if self.driver_config.is_null() {
            return Ok(DriverConfig::default());
        }
        DriverConfig::deserialize(&self.driver_config).map_err(|e| {
            SupervisorError::InvalidConfig(format!(
                "task {}: failed to decode driver config: {}",
                self.id, e
            ))
        })
    }
}
