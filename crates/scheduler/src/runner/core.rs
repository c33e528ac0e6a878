use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::factory::TaskFactory;
use crate::metrics::SchedulerMetrics;
use crate::package::Package;
use crate::priority::Priority;
use crate::task::{RunningTask, ScheduledTask, Task};
use crate::tasks::PACKAGE;
use crate::types::{PackageId, SchedulerConfig, TaskId, TaskKey, Tier};

/// Cooperative priority scheduler. Owns the pending task bag, the package
/// table and the counters that used to be process globals, so independent
/// schedulers never share state.
pub struct Scheduler {
    pub(super) config: SchedulerConfig,
    pub(super) factory: TaskFactory,
    pub(super) clock: Arc<dyn Clock>,
    /// "Something else is happening" signal read by the admission gate.
    pub(super) busy: Arc<AtomicBool>,
    /// Pending tasks, re-sorted on every dispatch.
    pub(super) bag: Vec<ScheduledTask>,
    pub(super) packages: IndexMap<PackageId, Package>,
    pub(super) running: Option<RunningTask>,
    pub(super) metrics: SchedulerMetrics,
    pub(super) next_sequence: u64,
    pub(super) next_task_id: u64,
    pub(super) next_package_id: u64,
    /// Set while a task is inside `execute()`.
    pub(super) dispatching: bool,
    /// A `run()` was requested while dispatching.
    pub(super) rerun_requested: bool,
}

impl Scheduler {
    /// Create a scheduler on the system clock.
    pub fn new(config: SchedulerConfig, factory: TaskFactory) -> Self {
        Self {
            config,
            factory,
            clock: Arc::new(SystemClock),
            busy: Arc::new(AtomicBool::new(false)),
            bag: Vec::new(),
            packages: IndexMap::new(),
            running: None,
            metrics: SchedulerMetrics::default(),
            next_sequence: 0,
            next_task_id: 0,
            next_package_id: 0,
            dispatching: false,
            rerun_requested: false,
        }
    }

    /// Replace the time source (tests use a `ManualClock`).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn factory_mut(&mut self) -> &mut TaskFactory {
        &mut self.factory
    }

    pub fn metrics(&self) -> &SchedulerMetrics {
        &self.metrics
    }

    /// Update the busy flag. Clearing it re-runs the scheduler.
    pub fn set_busy(&mut self, busy: bool) {
        let was = self.busy.swap(busy, Ordering::Relaxed);
        if was && !busy {
            self.run();
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Relaxed)
    }

    /// Get an Arc to the busy flag (for UI code that toggles it directly).
    pub fn busy_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.busy)
    }

    /// Number of tasks in the bag (package members not included).
    pub fn len(&self) -> usize {
        self.bag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bag.is_empty()
    }

    /// The bag, in the order of the last dispatch sort.
    pub fn tasks(&self) -> &[ScheduledTask] {
        &self.bag
    }

    /// Look up a task by id in the bag or any package.
    pub fn task(&self, id: TaskId) -> Option<&ScheduledTask> {
        self.bag
            .iter()
            .find(|e| e.id == id)
            .or_else(|| self.packages.values().find_map(|p| p.get(id)))
    }

    pub fn current_task(&self) -> Option<&RunningTask> {
        self.running.as_ref()
    }

    /// Add `task` to the bag with `tier` and re-run.
    ///
    /// Re-adding the same `Arc` does not create a second entry; it only
    /// merges the tier into the existing one, in the bag or in the package
    /// that holds it.
    pub fn add_task(&mut self, task: Arc<dyn Task>, tier: Tier) -> TaskId {
        let member = self
            .packages
            .values()
            .find_map(|p| p.find_same_task(&task).map(|id| (p.id(), id)));

        let id = match (self.bag.iter().position(|e| e.is_same_task(&task)), member) {
            (Some(index), _) => {
                let existing = &mut self.bag[index];
                existing.priority.add_level(tier);
                existing.id
            }
            (None, Some((package, id))) => {
                if let Some(pkg) = self.packages.get_mut(&package) {
                    pkg.add_level(id, tier);
                }
                debug!(package = %package, id = %id, tier = %tier, "task already a package member");
                id
            }
            (None, None) => {
                let mut entry = self.new_entry(task);
                entry.priority.add_level(tier);
                debug!(task = %entry.key(), id = %entry.id, tier = %tier, "task added");
                let id = entry.id;
                self.bag.push(entry);
                id
            }
        };
        self.run();
        id
    }

    /// Cancel a task wherever it is held and re-run. Removing a package
    /// task also drops its package.
    pub fn remove_task(&mut self, id: TaskId) -> Option<ScheduledTask> {
        let removed = self.take_task(id);
        self.run();
        removed
    }

    /// Clear every task, package and counter (process reset hook).
    pub fn reset(&mut self) {
        info!(
            tasks = self.bag.len(),
            packages = self.packages.len(),
            "scheduler reset"
        );
        self.bag.clear();
        self.packages.clear();
        self.running = None;
        self.next_sequence = 0;
        self.next_task_id = 0;
        self.next_package_id = 0;
        self.rerun_requested = false;
    }

    /// Wrap `task` with a fresh id and sequence. No tier is applied.
    pub(crate) fn new_entry(&mut self, task: Arc<dyn Task>) -> ScheduledTask {
        let id = TaskId(self.next_task_id);
        self.next_task_id += 1;
        let priority = Priority::new(self.next_sequence);
        self.next_sequence += 1;
        ScheduledTask::new(id, priority, task)
    }

    /// Remove from the bag or a package without re-running. The returned
    /// entry is flagged removed.
    pub(crate) fn detach(&mut self, id: TaskId) -> Option<ScheduledTask> {
        let mut entry = match self.bag.iter().position(|e| e.id == id) {
            Some(index) => self.bag.remove(index),
            None => {
                let now = self.clock.now();
                let (package, entry, completed) = self
                    .packages
                    .values_mut()
                    .find_map(|p| p.remove_task(id, now).map(|(e, done)| (p.id(), e, done)))?;
                if completed {
                    info!(package = %package, "package ready to run");
                    self.metrics.packages_completed += 1;
                }
                entry
            }
        };
        entry.removed = true;
        Some(entry)
    }

    /// [`detach`](Self::detach), then drop the package a package task owns.
    pub(crate) fn take_task(&mut self, id: TaskId) -> Option<ScheduledTask> {
        let entry = self.detach(id)?;
        if let TaskKey::Package(package) = entry.key() {
            if entry.kind() == PACKAGE && self.packages.shift_remove(package).is_some() {
                debug!(package = %package, "package cancelled with its task");
            }
        }
        debug!(task = %entry.key(), id = %id, "task removed");
        Some(entry)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default(), TaskFactory::default())
    }
}
