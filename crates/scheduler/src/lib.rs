//! Cooperative priority scheduler with barrier packages.
//!
//! Tasks wait in a [`Scheduler`]'s bag until they are runnable and first
//! in priority order; every mutation re-runs the dispatcher, which executes
//! at most one admitted task per step. A [`Package`] groups tasks behind a
//! single `PackageTask` and carries a stall timer that forces progress when
//! members never become ready.

pub mod clock;
pub mod factory;
pub mod metrics;
pub mod package;
pub mod priority;
pub mod runner;
pub mod task;
pub mod tasks;
pub mod types;

pub use clock::{Clock, ManualClock, StallTimer, SystemClock};
pub use factory::{ItemValue, TaskFactory};
pub use metrics::SchedulerMetrics;
pub use package::{MemberState, Package, PackageKind, Scheduled};
pub use priority::Priority;
pub use runner::Scheduler;
pub use task::{Dispatch, RunningTask, ScheduledTask, Task, TaskError};
pub use tasks::{Callback, DialogPresenter, DialogTask, FunctionTask, LoggingPresenter, PackageTask};
pub use types::{Args, CallbackId, PackageId, Rating, SchedulerConfig, TaskId, TaskKey, Tier};
