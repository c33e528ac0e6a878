use std::fmt;
use std::sync::Arc;

use crate::priority::Priority;
use crate::runner::Scheduler;
use crate::types::{Args, PackageId, TaskId, TaskKey};

/// Error type for task construction and execution.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Task failed: {0}")]
    Failed(String),
    #[error("No constructor registered for task kind '{0}'")]
    UnknownKind(String),
    #[error("Invalid value for task kind '{kind}': {reason}")]
    InvalidValue { kind: String, reason: String },
    #[error("Package not found: {0}")]
    UnknownPackage(PackageId),
}

/// A unit of deferred work the scheduler can dispatch.
pub trait Task: Send + Sync {
    /// Factory tag this task was built from (`"dialog"`, `"function"`, ...).
    fn kind(&self) -> &str;

    /// Logical key used for deduplication and lookup.
    fn key(&self) -> &TaskKey;

    fn args(&self) -> &Args;

    /// Whether this task answers to `key`.
    fn contains(&self, key: &TaskKey) -> bool {
        self.key() == key
    }

    /// Readiness predicate, polled on every dispatch. Not runnable unless
    /// overridden.
    fn can_execute(&self, _scheduler: &Scheduler) -> bool {
        false
    }

    /// Perform the side effect. The scheduler does not remove the task
    /// afterwards; call [`Dispatch::finish`] for one-shot work.
    fn execute(&self, dispatch: &mut Dispatch<'_>) -> Result<(), TaskError>;
}

/// A task together with the scheduling state the scheduler keeps for it.
#[derive(Clone)]
pub struct ScheduledTask {
    pub(crate) id: TaskId,
    pub(crate) priority: Priority,
    pub(crate) task: Arc<dyn Task>,
    pub(crate) removed: bool,
}

impl ScheduledTask {
    pub(crate) fn new(id: TaskId, priority: Priority, task: Arc<dyn Task>) -> Self {
        Self {
            id,
            priority,
            task,
            removed: false,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn priority(&self) -> &Priority {
        &self.priority
    }

    pub fn task(&self) -> &Arc<dyn Task> {
        &self.task
    }

    pub fn key(&self) -> &TaskKey {
        self.task.key()
    }

    pub fn args(&self) -> &Args {
        self.task.args()
    }

    pub fn kind(&self) -> &str {
        self.task.kind()
    }

    /// Set once the task has been taken out of the scheduler.
    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Reference identity with another task handle.
    pub fn is_same_task(&self, task: &Arc<dyn Task>) -> bool {
        Arc::as_ptr(&self.task) as *const () == Arc::as_ptr(task) as *const ()
    }
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("id", &self.id)
            .field("kind", &self.task.kind())
            .field("key", self.task.key())
            .field("priority", &self.priority)
            .field("removed", &self.removed)
            .finish()
    }
}

/// The task currently inside `execute()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningTask {
    pub id: TaskId,
    pub key: TaskKey,
    pub kind: String,
}

/// Execution context handed to [`Task::execute`].
pub struct Dispatch<'a> {
    scheduler: &'a mut Scheduler,
    id: TaskId,
}

impl<'a> Dispatch<'a> {
    pub(crate) fn new(scheduler: &'a mut Scheduler, id: TaskId) -> Self {
        Self { scheduler, id }
    }

    /// Id of the executing task.
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn scheduler(&mut self) -> &mut Scheduler {
        self.scheduler
    }

    /// Remove the executing task from wherever it is held.
    pub fn finish(&mut self) {
        self.scheduler.remove_task(self.id);
    }
}
