//! Reattachment descriptors.
//!
//! A descriptor is produced once when a task is launched and stored in the
//! task's persisted state. After a supervisor restart it is the only thing
//! needed to reconnect to the still-running process.
//!
//! The executor-specific payload is kept opaque to the supervisor: it is
//! serialized to JSON and wrapped in base64, tagged with the executor kind
//! that produced it.

use super::{Executor, ExecutorConnection};
use crate::errors::{SupervisorError, SupervisorResult};
use crate::runtime::constants::versions;
use crate::runtime::types::TaskId;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReattachDescriptor {
    pub version: u32,
    /// Kind of executor that can open `material`.
    pub executor: String,
    pub material: String,
}

impl ReattachDescriptor {
    /// Wrap an executor-specific payload.
    pub fn seal<T: Serialize>(executor: &str, payload: &T) -> SupervisorResult<Self> {
        let json = serde_json::to_vec(payload)?;
        Ok(Self {
            version: versions::REATTACH_DESCRIPTOR,
            executor: executor.to_string(),
            material: STANDARD.encode(json),
        })
    }

    /// Unwrap the payload, checking it was produced by `executor`.
    pub fn open<T: DeserializeOwned>(&self, executor: &str) -> SupervisorResult<T> {
        if self.version != versions::REATTACH_DESCRIPTOR {
            return Err(SupervisorError::Serialization(format!(
                "unsupported reattach descriptor version {} (expected {})",
                self.version,
                versions::REATTACH_DESCRIPTOR
            )));
        }
        if self.executor != executor {
            return Err(SupervisorError::Serialization(format!(
                "descriptor belongs to executor {:?}, not {:?}",
                self.executor, executor
            )));
        }
        let json = STANDARD
            .decode(self.material.as_bytes())
            .map_err(|e| SupervisorError::Serialization(format!("descriptor material: {}", e)))?;
        Ok(serde_json::from_slice(&json)?)
    }
}

/// Capture the descriptor of a freshly launched connection.
///
/// Any failure here means the launch cannot be made recoverable.
pub fn encode(
    task_id: &TaskId,
    connection: &dyn ExecutorConnection,
) -> SupervisorResult<ReattachDescriptor> {
    connection
        .descriptor()
        .map_err(|e| SupervisorError::LaunchFailed {
            task_id: task_id.clone(),
            reason: format!("failed to build reattach descriptor: {}", e),
        })
}

/// Reconnect to the process referenced by `descriptor`.
pub async fn decode(
    task_id: &TaskId,
    executor: &dyn Executor,
    descriptor: &ReattachDescriptor,
) -> SupervisorResult<Arc<dyn ExecutorConnection>> {
    executor
        .reattach(descriptor)
        .await
        .map_err(|e| SupervisorError::RecoveryFailed {
            task_id: task_id.clone(),
            reason: format!("failed to reattach to executor: {}", e),
        })
}
