mod dialog_task;
mod function_task;
mod package_task;

pub use dialog_task::{DialogPresenter, DialogTask, LoggingPresenter};
pub use function_task::{Callback, CallbackFn, FunctionTask};
pub use package_task::PackageTask;

/// Factory tag of [`DialogTask`].
pub const DIALOG: &str = "dialog";
/// Factory tag of [`FunctionTask`].
pub const FUNCTION: &str = "function";
/// Factory tag of [`PackageTask`].
pub const PACKAGE: &str = "package";
