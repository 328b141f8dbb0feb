//! Thread-safe registry of supervised tasks.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::errors::{SupervisorError, SupervisorResult};
use crate::runtime::types::TaskId;
use crate::task::handle::SharedTaskHandle;

/// Registry mapping task identifiers to their handles.
///
/// Membership is exactly the set of tasks the supervisor is tracking.
///
/// # Design
///
/// - **Shared ownership**: Cloneable via `Arc`
/// - **Concurrent access**: RwLock allows multiple readers, single writer
/// - **Atomic operations**: every call takes the lock once, so no caller
///   observes a half-applied insert or removal
#[derive(Clone, Default)]
pub struct TaskStore {
    inner: Arc<RwLock<HashMap<TaskId, SharedTaskHandle>>>,
}

impl std::fmt::Debug for TaskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskStore").finish()
    }
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> SupervisorResult<RwLockReadGuard<'_, HashMap<TaskId, SharedTaskHandle>>> {
        self.inner
            .read()
            .map_err(|e| SupervisorError::Internal(format!("task store lock poisoned: {}", e)))
    }

    fn write(&self) -> SupervisorResult<RwLockWriteGuard<'_, HashMap<TaskId, SharedTaskHandle>>> {
        self.inner
            .write()
            .map_err(|e| SupervisorError::Internal(format!("task store lock poisoned: {}", e)))
    }

    pub fn get(&self, id: &TaskId) -> SupervisorResult<Option<SharedTaskHandle>> {
        Ok(self.read()?.get(id).cloned())
    }

    /// Insert or replace. Returns the replaced handle.
    pub fn set(&self, handle: SharedTaskHandle) -> SupervisorResult<Option<SharedTaskHandle>> {
        let id = handle.id().clone();
        tracing::trace!(task_id = %id, "Setting task handle");
        Ok(self.write()?.insert(id, handle))
    }

    /// Insert only if no handle is registered under the same identifier.
    ///
    /// Returns `false`, leaving the existing handle in place, otherwise.
    pub fn insert_new(&self, handle: SharedTaskHandle) -> SupervisorResult<bool> {
        let mut tasks = self.write()?;
        if tasks.contains_key(handle.id()) {
            return Ok(false);
        }

        tracing::debug!(
            task_id = %handle.id(),
            pid = handle.pid(),
            state = ?handle.state(),
            "Registering task"
        );
        tasks.insert(handle.id().clone(), handle);
        Ok(true)
    }

    /// Remove if present. Returns the removed handle.
    pub fn delete(&self, id: &TaskId) -> SupervisorResult<Option<SharedTaskHandle>> {
        let removed = self.write()?.remove(id);
        if removed.is_some() {
            tracing::debug!(task_id = %id, "Removed task handle");
        }
        Ok(removed)
    }

    /// Remove `handle` only if it is still the one registered under its
    /// identifier. A newer handle under the same identifier is left alone.
    pub fn delete_if(&self, handle: &SharedTaskHandle) -> SupervisorResult<bool> {
        let mut tasks = self.write()?;
        match tasks.get(handle.id()) {
            Some(current) if Arc::ptr_eq(current, handle) => {
                tasks.remove(handle.id());
                tracing::debug!(task_id = %handle.id(), "Removed task handle");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn list(&self) -> SupervisorResult<Vec<SharedTaskHandle>> {
        Ok(self.read()?.values().cloned().collect())
    }

    pub fn len(&self) -> SupervisorResult<usize> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> SupervisorResult<bool> {
        Ok(self.read()?.is_empty())
    }
}
