use std::sync::Arc;

use tracing::info;

use crate::runner::Scheduler;
use crate::task::{Dispatch, Task, TaskError};
use crate::types::{Args, TaskKey};

use super::DIALOG;

/// UI side of a dialog request. Layout and rendering live behind this trait.
pub trait DialogPresenter: Send + Sync {
    /// Whether everything the dialog needs has finished loading.
    fn is_loaded(&self, dialog_id: &str) -> bool;

    /// Show the dialog.
    fn present(&self, dialog_id: &str, args: &Args) -> Result<(), TaskError>;
}

/// Presenter that treats every dialog as loaded and only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingPresenter;

impl DialogPresenter for LoggingPresenter {
    fn is_loaded(&self, _dialog_id: &str) -> bool {
        true
    }

    fn present(&self, dialog_id: &str, args: &Args) -> Result<(), TaskError> {
        info!(dialog = dialog_id, args = %args, "present dialog");
        Ok(())
    }
}

/// Shows one dialog once its assets are loaded.
pub struct DialogTask {
    key: TaskKey,
    args: Args,
    presenter: Arc<dyn DialogPresenter>,
}

impl DialogTask {
    pub fn new(dialog_id: impl Into<String>, args: Args, presenter: Arc<dyn DialogPresenter>) -> Self {
        Self {
            key: TaskKey::Dialog(dialog_id.into()),
            args,
            presenter,
        }
    }

    pub fn dialog_id(&self) -> &str {
        match &self.key {
            TaskKey::Dialog(id) => id,
            _ => "",
        }
    }
}

impl Task for DialogTask {
    fn kind(&self) -> &str {
        DIALOG
    }

    fn key(&self) -> &TaskKey {
        &self.key
    }

    fn args(&self) -> &Args {
        &self.args
    }

    fn can_execute(&self, _scheduler: &Scheduler) -> bool {
        self.presenter.is_loaded(self.dialog_id())
    }

    fn execute(&self, dispatch: &mut Dispatch<'_>) -> Result<(), TaskError> {
        let shown = self.presenter.present(self.dialog_id(), &self.args);
        dispatch.finish();
        shown
    }
}
