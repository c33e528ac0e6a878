use std::fmt;
use std::sync::Arc;

use crate::runner::Scheduler;
use crate::task::{Dispatch, Task, TaskError};
use crate::types::{Args, CallbackId, TaskKey};

pub type CallbackFn = dyn Fn(&mut Dispatch<'_>, &Args) -> Result<(), TaskError> + Send + Sync;

/// A callback plus the handle it is matched by. Clones share the handle.
#[derive(Clone)]
pub struct Callback {
    id: CallbackId,
    f: Arc<CallbackFn>,
}

impl Callback {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut Dispatch<'_>, &Args) -> Result<(), TaskError> + Send + Sync + 'static,
    {
        Self {
            id: CallbackId::new(),
            f: Arc::new(f),
        }
    }

    pub fn id(&self) -> CallbackId {
        self.id
    }

    pub fn key(&self) -> TaskKey {
        TaskKey::Callback(self.id)
    }

    fn call(&self, dispatch: &mut Dispatch<'_>, args: &Args) -> Result<(), TaskError> {
        (self.f)(dispatch, args)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Callback").field(&self.id).finish()
    }
}

/// Invokes a callback with its args, then finishes.
pub struct FunctionTask {
    key: TaskKey,
    args: Args,
    callback: Callback,
}

impl FunctionTask {
    pub fn new(callback: Callback, args: Args) -> Self {
        Self {
            key: callback.key(),
            args,
            callback,
        }
    }
}

impl Task for FunctionTask {
    fn kind(&self) -> &str {
        super::FUNCTION
    }

    fn key(&self) -> &TaskKey {
        &self.key
    }

    fn args(&self) -> &Args {
        &self.args
    }

    fn can_execute(&self, _scheduler: &Scheduler) -> bool {
        true
    }

    fn execute(&self, dispatch: &mut Dispatch<'_>) -> Result<(), TaskError> {
        let result = self.callback.call(dispatch, &self.args);
        dispatch.finish();
        result
    }
}
