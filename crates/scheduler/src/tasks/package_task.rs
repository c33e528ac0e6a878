use tracing::debug;

use crate::package::Package;
use crate::runner::Scheduler;
use crate::task::{Dispatch, Task, TaskError};
use crate::types::{Args, PackageId, TaskKey};

/// Stands in for a whole package inside the scheduler's priority order.
///
/// Runnable once every member of the package is ready. Executing it
/// retires the package and runs the ready members in dispatch order.
pub struct PackageTask {
    key: TaskKey,
    package: PackageId,
    args: Args,
}

impl PackageTask {
    pub fn new(package: PackageId, args: Args) -> Self {
        Self {
            key: TaskKey::Package(package),
            package,
            args,
        }
    }

    pub fn package(&self) -> PackageId {
        self.package
    }
}

impl Task for PackageTask {
    fn kind(&self) -> &str {
        super::PACKAGE
    }

    fn key(&self) -> &TaskKey {
        &self.key
    }

    fn args(&self) -> &Args {
        &self.args
    }

    fn can_execute(&self, scheduler: &Scheduler) -> bool {
        scheduler
            .package(self.package)
            .is_some_and(Package::is_ready_to_run)
    }

    fn execute(&self, dispatch: &mut Dispatch<'_>) -> Result<(), TaskError> {
        let members = dispatch
            .scheduler()
            .take_package(self.package)
            .map(Package::into_ready)
            .unwrap_or_default();

        debug!(package = %self.package, members = members.len(), "running package");
        for member in members {
            dispatch.scheduler().execute_entry(&member);
        }
        dispatch.finish();
        Ok(())
    }
}
