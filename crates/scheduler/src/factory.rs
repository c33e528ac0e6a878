//! Table-driven task construction: a kind tag maps to a constructor.
//!
//! The built-in kinds are `dialog`, `function` and `package`; feature code
//! registers more with [`TaskFactory::register`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::task::{Task, TaskError};
use crate::tasks::{
    Callback, DialogPresenter, DialogTask, FunctionTask, LoggingPresenter, PackageTask, DIALOG,
    FUNCTION, PACKAGE,
};
use crate::types::{Args, PackageId};

/// The value a task is built around.
#[derive(Debug, Clone)]
pub enum ItemValue {
    Dialog(String),
    Callback(Callback),
    Package(PackageId),
}

impl ItemValue {
    pub fn variant(&self) -> &'static str {
        match self {
            ItemValue::Dialog(_) => "dialog id",
            ItemValue::Callback(_) => "callback",
            ItemValue::Package(_) => "package",
        }
    }
}

impl From<&str> for ItemValue {
    fn from(id: &str) -> Self {
        ItemValue::Dialog(id.to_string())
    }
}

impl From<Callback> for ItemValue {
    fn from(callback: Callback) -> Self {
        ItemValue::Callback(callback)
    }
}

impl From<PackageId> for ItemValue {
    fn from(id: PackageId) -> Self {
        ItemValue::Package(id)
    }
}

pub type TaskConstructor =
    Box<dyn Fn(ItemValue, Args) -> Result<Arc<dyn Task>, TaskError> + Send + Sync>;

/// Registry of task constructors keyed by kind tag.
pub struct TaskFactory {
    constructors: HashMap<String, TaskConstructor>,
}

impl TaskFactory {
    /// A factory with no kinds registered.
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// A factory with the built-in kinds; dialogs go through `presenter`.
    pub fn new(presenter: Arc<dyn DialogPresenter>) -> Self {
        let mut factory = Self::empty();

        factory.register(DIALOG, move |value, args| match value {
            ItemValue::Dialog(id) => {
                Ok(Arc::new(DialogTask::new(id, args, Arc::clone(&presenter))) as Arc<dyn Task>)
            }
            other => Err(mismatch(DIALOG, &other)),
        });
        factory.register(FUNCTION, |value, args| match value {
            ItemValue::Callback(callback) => {
                Ok(Arc::new(FunctionTask::new(callback, args)) as Arc<dyn Task>)
            }
            other => Err(mismatch(FUNCTION, &other)),
        });
        factory.register(PACKAGE, |value, args| match value {
            ItemValue::Package(id) => Ok(Arc::new(PackageTask::new(id, args)) as Arc<dyn Task>),
            other => Err(mismatch(PACKAGE, &other)),
        });

        factory
    }

    /// Register (or replace) the constructor for `kind`.
    pub fn register<F>(&mut self, kind: impl Into<String>, constructor: F)
    where
        F: Fn(ItemValue, Args) -> Result<Arc<dyn Task>, TaskError> + Send + Sync + 'static,
    {
        let kind = kind.into();
        if self.constructors.contains_key(&kind) {
            debug!(kind = %kind, "replacing task constructor");
        }
        self.constructors.insert(kind, Box::new(constructor));
    }

    pub fn build(&self, kind: &str, value: ItemValue, args: Args) -> Result<Arc<dyn Task>, TaskError> {
        let constructor = self
            .constructors
            .get(kind)
            .ok_or_else(|| TaskError::UnknownKind(kind.to_string()))?;
        constructor(value, args)
    }

    pub fn contains_kind(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl Default for TaskFactory {
    fn default() -> Self {
        Self::new(Arc::new(LoggingPresenter))
    }
}

impl fmt::Debug for TaskFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFactory")
            .field("kinds", &self.kinds())
            .finish()
    }
}

fn mismatch(kind: &str, value: &ItemValue) -> TaskError {
    TaskError::InvalidValue {
        kind: kind.to_string(),
        reason: format!("expected a {kind} value, got a {}", value.variant()),
    }
}
