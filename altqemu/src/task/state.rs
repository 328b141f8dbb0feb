//! Persisted Task State: the blob handed back to the orchestrator after a
//! start or recover, and the only input a later recover receives.

use crate::errors::{SupervisorError, SupervisorResult};
use crate::executor::ReattachDescriptor;
use crate::runtime::constants::versions;
use crate::runtime::types::TaskId;
use crate::task::config::TaskConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedTaskState {
    pub version: u32,
    pub task_id: TaskId,
    pub reattach: ReattachDescriptor,
    pub task_config: TaskConfig,
    pub started_at: DateTime<Utc>,
    pub pid: u32,
}

impl PersistedTaskState {
    pub fn new(
        task_config: TaskConfig,
        reattach: ReattachDescriptor,
        pid: u32,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            version: versions::TASK_STATE,
            task_id: task_config.id.clone(),
            reattach,
            task_config,
            started_at,
            pid,
        }
    }

    pub fn to_bytes(&self) -> SupervisorResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> SupervisorResult<Self> {
        let state: Self = serde_json::from_slice(bytes)?;
        state.check()?;
        Ok(state)
    }

    /// Reject blobs this crate did not write or that contradict themselves.
    pub fn check(&self) -> SupervisorResult<()> {
        if self.version != versions::TASK_STATE {
            return Err(SupervisorError::Serialization(format!(
                "unsupported task state version {} (expected {})",
                self.version,
                versions::TASK_STATE
            )));
        }
        if self.task_id != self.task_config.id {
            return Err(SupervisorError::Serialization(format!(
                "task state for {} embeds the configuration of task {}",
                self.task_id, self.task_config.id
            )));
        }
        Ok(())
    }
}
