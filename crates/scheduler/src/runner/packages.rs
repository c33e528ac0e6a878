use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::factory::ItemValue;
use crate::package::{Package, PackageKind, Scheduled};
use crate::task::{ScheduledTask, Task};
use crate::tasks::PACKAGE;
use crate::types::{Args, PackageId, TaskId, TaskKey, Tier};

use super::Scheduler;

impl Scheduler {
    /// Build a task through the factory and schedule it.
    ///
    /// With `package`, the task joins that package as a pending member.
    /// Otherwise it goes to the bag, equal-args duplicates of its key are
    /// eliminated, and the scheduler re-runs. Construction failures are
    /// logged and yield `None`.
    pub fn add_item(
        &mut self,
        kind: &str,
        value: ItemValue,
        args: Args,
        tier: Tier,
        package: Option<PackageId>,
    ) -> Option<TaskId> {
        let task = self.build_task(kind, value, args)?;

        if let Some(package) = package {
            return self.add_to_package(package, task, tier);
        }

        let mut entry = self.new_entry(task);
        entry.priority.add_level(tier);
        let id = entry.id;
        let key = entry.key().clone();
        debug!(task = %key, id = %id, tier = %tier, "item added");
        self.bag.push(entry);

        if self.config.dedupe_items {
            self.drop_duplicates(id, &key);
        }
        self.run();
        Some(id)
    }

    fn build_task(&mut self, kind: &str, value: ItemValue, args: Args) -> Option<Arc<dyn Task>> {
        match self.factory.build(kind, value, args) {
            Ok(task) => Some(task),
            Err(e) => {
                warn!(kind, error = %e, "task construction failed");
                self.metrics.construction_failures += 1;
                None
            }
        }
    }

    fn add_to_package(&mut self, package: PackageId, task: Arc<dyn Task>, tier: Tier) -> Option<TaskId> {
        if !self.packages.contains_key(&package) {
            warn!(package = %package, task = %task.key(), "package not found, item dropped");
            return None;
        }
        let entry = self.new_entry(task);
        let now = self.clock.now();
        let pkg = self.packages.get_mut(&package)?;
        match pkg.add_task(entry, tier, now) {
            Ok(id) => {
                self.run();
                Some(id)
            }
            Err(rejected) => {
                warn!(
                    package = %package,
                    kind = ?pkg.kind(),
                    task = %rejected.key(),
                    "package rejected member"
                );
                None
            }
        }
    }

    /// Register a package with the configured stall window. The package is
    /// not scheduled until its `PackageTask` is added.
    pub fn create_package(&mut self, kind: PackageKind) -> PackageId {
        let timeout = self.config.package_timeout();
        self.create_package_with_timeout(kind, timeout)
    }

    pub fn create_package_with_timeout(&mut self, kind: PackageKind, timeout: Duration) -> PackageId {
        let id = PackageId(self.next_package_id);
        self.next_package_id += 1;
        let now = self.clock.now();
        self.packages.insert(id, Package::new(id, kind, timeout, now));
        debug!(package = %id, kind = ?kind, timeout = ?timeout, "package created");
        id
    }

    /// Create a package and put its `PackageTask` in the bag.
    pub fn schedule_package(&mut self, kind: PackageKind, tier: Tier) -> Option<(PackageId, TaskId)> {
        let package = self.create_package(kind);
        let task = self.add_item(PACKAGE, ItemValue::Package(package), Args::Null, tier, None)?;
        Some((package, task))
    }

    pub fn package(&self, id: PackageId) -> Option<&Package> {
        self.packages.get(&id)
    }

    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.packages.values()
    }

    pub(crate) fn take_package(&mut self, id: PackageId) -> Option<Package> {
        self.packages.shift_remove(&id)
    }

    /// A member of a generic package became ready.
    pub fn mark_ready(&mut self, package: PackageId, id: TaskId) -> bool {
        let now = self.clock.now();
        let Some(pkg) = self.packages.get_mut(&package) else {
            return false;
        };
        let Some(member) = pkg.get(id).cloned() else {
            return false;
        };
        let outcome = pkg.on_task_scheduled(member, now);
        self.settle(package, outcome).is_some()
    }

    /// Hand a result to a keyed package: the pending member with the same
    /// key is filled in place and becomes ready. Results no member was
    /// declared for are dropped. Returns the filled slot.
    pub fn deliver_item(
        &mut self,
        package: PackageId,
        kind: &str,
        value: ItemValue,
        args: Args,
    ) -> Option<TaskId> {
        if !self.packages.contains_key(&package) {
            warn!(package = %package, "package not found, result dropped");
            return None;
        }
        let task = self.build_task(kind, value, args)?;
        let entry = self.new_entry(task);
        let now = self.clock.now();
        let outcome = self.packages.get_mut(&package)?.on_task_scheduled(entry, now);
        self.settle(package, outcome)
    }

    fn settle(&mut self, package: PackageId, outcome: Scheduled) -> Option<TaskId> {
        match outcome {
            Scheduled::Ready { slot, complete } => {
                if complete {
                    self.on_package_complete(package);
                }
                Some(slot)
            }
            Scheduled::Dropped(task) => {
                debug!(package = %package, task = %task.key(), "not a pending member, dropped");
                None
            }
        }
    }

    fn on_package_complete(&mut self, package: PackageId) {
        info!(package = %package, "package ready to run");
        self.metrics.packages_completed += 1;
        self.run();
    }

    /// Advance time-driven work: fire expired stall timers, promote members
    /// of polling packages that became runnable, then dispatch.
    pub fn tick(&mut self) {
        if self.dispatching {
            self.rerun_requested = true;
            return;
        }
        let now = self.clock.now();

        let stalled: Vec<PackageId> = self
            .packages
            .iter()
            .filter(|(_, p)| p.is_stalled(now))
            .map(|(id, _)| *id)
            .collect();
        for package in stalled {
            self.on_package_timeout(package);
        }

        self.promote_ready_members(now);
        self.run();
    }

    fn promote_ready_members(&mut self, now: Instant) {
        let mut ready: Vec<(PackageId, ScheduledTask)> = Vec::new();
        for (id, package) in &self.packages {
            if !package.polls_members() {
                continue;
            }
            for member in package.pending() {
                if member.task.can_execute(self) {
                    ready.push((*id, member.clone()));
                }
            }
        }

        for (package, member) in ready {
            let Some(pkg) = self.packages.get_mut(&package) else {
                continue;
            };
            if let Scheduled::Ready { complete: true, .. } = pkg.on_task_scheduled(member, now) {
                info!(package = %package, "package ready to run");
                self.metrics.packages_completed += 1;
            }
        }
    }

    /// Stall recovery: execute the package's owning task now, bypassing the
    /// admission gate, and make sure the package is gone afterwards.
    fn on_package_timeout(&mut self, package: PackageId) {
        let Some(pkg) = self.packages.get(&package) else {
            return;
        };
        warn!(
            package = %package,
            pending = pkg.pending_count(),
            ready = pkg.ready_count(),
            "package stalled, forcing teardown"
        );
        self.metrics.stall_timeouts += 1;

        match self.find_package_owner(package).and_then(|id| self.detach(id)) {
            Some(owner) => self.execute_entry(&owner),
            None => warn!(package = %package, "stalled package has no owning task"),
        }

        if self.packages.shift_remove(&package).is_some() {
            debug!(package = %package, "stalled package dropped");
        }
    }

    fn find_package_owner(&self, package: PackageId) -> Option<TaskId> {
        let key = TaskKey::Package(package);
        let owns = |e: &ScheduledTask| e.kind() == PACKAGE && e.key() == &key;

        self.bag.iter().find(|e| owns(*e)).map(|e| e.id).or_else(|| {
            self.packages
                .values()
                .flat_map(|p| p.members().map(|(m, _)| m))
                .find(|m| owns(*m))
                .map(|m| m.id)
        })
    }
}
