//! Background task status registry
//!
//! Schedule APIs hand back a [`TaskId`](accord_core::TaskId); callers poll
//! the registry to observe the task's lifecycle. The registry is constructed
//! explicitly and injected into the engine — entries persist until
//! overwritten or the registry is dropped.

use accord_core::TaskId;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Lifecycle tag of one scheduled task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Queued, not yet picked up by a worker
    Started,
    /// A worker is executing the task
    Running,
    /// Execution finished with the given success flag
    Finished(bool),
}

/// Process-wide map from task ID to lifecycle tag
#[derive(Debug, Default)]
pub struct TaskStatusRegistry {
    inner: Mutex<HashMap<TaskId, TaskStatus>>,
}

impl TaskStatusRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Record or overwrite the status of a task
    pub fn set(&self, task: TaskId, status: TaskStatus) {
        self.inner.lock().insert(task, status);
    }

    /// Current status of a task, if known
    pub fn get(&self, task: TaskId) -> Option<TaskStatus> {
        self.inner.lock().get(&task).copied()
    }

    /// Number of tracked tasks
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
