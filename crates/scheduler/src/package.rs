//! Packages: barriers that collect child tasks and surface to the
//! scheduler as a single `PackageTask`.
//!
//! Members keep a stable slot (their [`TaskId`]) in an ordered map. A
//! member moves from pending to ready in place, so slot order never
//! changes while the package fills up. Keyed packages (dialog, function)
//! pre-declare their members and fill them in by logical key as results
//! arrive.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::StallTimer;
use crate::task::{ScheduledTask, Task};
use crate::types::{PackageId, TaskId, TaskKey, Tier};

/// Membership policy of a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    /// Members join via `add_task` and become ready on their own.
    Generic,
    /// Pre-declared dialog members, filled in by dialog id.
    Dialog,
    /// Pre-declared callback members, filled in by callback handle.
    Function,
}

impl PackageKind {
    pub fn is_keyed(self) -> bool {
        !matches!(self, PackageKind::Generic)
    }

    /// Whether a member with this key may join the package.
    pub fn accepts(self, key: &TaskKey) -> bool {
        match self {
            PackageKind::Generic => true,
            PackageKind::Dialog => matches!(key, TaskKey::Dialog(_)),
            PackageKind::Function => matches!(key, TaskKey::Callback(_)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberState {
    Pending,
    Ready,
}

#[derive(Debug, Clone)]
struct Member {
    entry: ScheduledTask,
    state: MemberState,
}

/// Result of handing a task to [`Package::on_task_scheduled`].
#[derive(Debug)]
pub enum Scheduled {
    /// The member in `slot` is now ready; `complete` when that was the
    /// last pending member.
    Ready { slot: TaskId, complete: bool },
    /// Not a pending member of this package.
    Dropped(ScheduledTask),
}

#[derive(Debug)]
pub struct Package {
    id: PackageId,
    kind: PackageKind,
    members: IndexMap<TaskId, Member>,
    key_index: HashMap<TaskKey, TaskId>,
    timer: StallTimer,
}

impl Package {
    /// Create a package whose stall timer starts at `now`.
    pub fn new(id: PackageId, kind: PackageKind, timeout: Duration, now: Instant) -> Self {
        let mut timer = StallTimer::new(timeout);
        timer.start(now);
        Self {
            id,
            kind,
            members: IndexMap::new(),
            key_index: HashMap::new(),
            timer,
        }
    }

    pub fn id(&self) -> PackageId {
        self.id
    }

    pub fn kind(&self) -> PackageKind {
        self.kind
    }

    /// Insert `entry` as a pending member and apply `tier`. A stopped
    /// stall timer restarts at `now`, since the package is waiting again.
    ///
    /// Keyed packages hand the entry back when its key is of the wrong
    /// variant or already declared.
    pub fn add_task(
        &mut self,
        mut entry: ScheduledTask,
        tier: Tier,
        now: Instant,
    ) -> Result<TaskId, ScheduledTask> {
        if !self.kind.accepts(entry.key()) {
            return Err(entry);
        }
        if self.kind.is_keyed() {
            if self.key_index.contains_key(entry.key()) {
                return Err(entry);
            }
            self.key_index.insert(entry.key().clone(), entry.id);
        }

        entry.priority.add_level(tier);
        let id = entry.id;
        debug!(package = %self.id, task = %entry.key(), "member added");
        self.members.insert(
            id,
            Member {
                entry,
                state: MemberState::Pending,
            },
        );
        if !self.timer.is_running() {
            self.timer.start(now);
        }
        Ok(id)
    }

    /// A member became ready.
    ///
    /// Generic packages match `task` by id. Keyed packages match a pending
    /// member by logical key and first replace its data in place.
    pub fn on_task_scheduled(&mut self, task: ScheduledTask, now: Instant) -> Scheduled {
        let slot = if self.kind.is_keyed() {
            self.key_index.get(task.key()).copied()
        } else {
            Some(task.id)
        };
        let Some(slot) = slot.filter(|s| self.state_of(*s) == Some(MemberState::Pending)) else {
            return Scheduled::Dropped(task);
        };

        if self.kind.is_keyed() {
            self.update_task(slot, task);
        }
        if let Some(member) = self.members.get_mut(&slot) {
            member.state = MemberState::Ready;
        }
        self.timer.reset(now);

        let complete = self.is_ready_to_run();
        if complete {
            self.on_task_complete();
        }
        Scheduled::Ready { slot, complete }
    }

    /// Every member is ready: the stall timer is no longer needed.
    pub fn on_task_complete(&mut self) {
        debug!(package = %self.id, members = self.members.len(), "package complete");
        self.timer.stop();
    }

    /// Replace the task data held in `slot`, keeping its id, position and
    /// sequence. Tiers of the replacement are merged in.
    pub fn update_task(&mut self, slot: TaskId, replacement: ScheduledTask) -> bool {
        match self.members.get_mut(&slot) {
            Some(member) => {
                member.entry.task = replacement.task;
                member.entry.priority.absorb(replacement.priority.rating());
                true
            }
            None => false,
        }
    }

    /// Remove a member (cancellation). The flag is set when the removal
    /// completed the package, i.e. only ready members remain. A package
    /// left waiting gets its stall timer back.
    pub fn remove_task(&mut self, id: TaskId, now: Instant) -> Option<(ScheduledTask, bool)> {
        let member = self.members.shift_remove(&id)?;
        if self.key_index.get(member.entry.key()) == Some(&id) {
            self.key_index.remove(member.entry.key());
        }

        let mut completed = false;
        if self.is_ready_to_run() {
            if self.timer.is_running() {
                self.on_task_complete();
                completed = true;
            }
        } else if !self.timer.is_running() {
            self.timer.start(now);
        }
        Some((member.entry, completed))
    }

    /// Slot of the member holding this exact task handle.
    pub fn find_same_task(&self, task: &Arc<dyn Task>) -> Option<TaskId> {
        self.members
            .values()
            .find(|m| m.entry.is_same_task(task))
            .map(|m| m.entry.id)
    }

    /// Merge `tier` into a member's rating.
    pub fn add_level(&mut self, id: TaskId, tier: Tier) -> bool {
        match self.members.get_mut(&id) {
            Some(member) => {
                member.entry.priority.add_level(tier);
                true
            }
            None => false,
        }
    }

    /// Pending members are all gone and at least one member is ready.
    pub fn is_ready_to_run(&self) -> bool {
        self.pending_count() == 0 && self.ready_count() > 0
    }

    pub fn pending_count(&self) -> usize {
        self.count(MemberState::Pending)
    }

    pub fn ready_count(&self) -> usize {
        self.count(MemberState::Ready)
    }

    fn count(&self, state: MemberState) -> usize {
        self.members.values().filter(|m| m.state == state).count()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn pending(&self) -> impl Iterator<Item = &ScheduledTask> {
        self.with_state(MemberState::Pending)
    }

    pub fn ready(&self) -> impl Iterator<Item = &ScheduledTask> {
        self.with_state(MemberState::Ready)
    }

    fn with_state(&self, state: MemberState) -> impl Iterator<Item = &ScheduledTask> {
        self.members
            .values()
            .filter(move |m| m.state == state)
            .map(|m| &m.entry)
    }

    /// Members in slot order with their state.
    pub fn members(&self) -> impl Iterator<Item = (&ScheduledTask, MemberState)> {
        self.members.values().map(|m| (&m.entry, m.state))
    }

    pub fn state_of(&self, id: TaskId) -> Option<MemberState> {
        self.members.get(&id).map(|m| m.state)
    }

    pub fn position_of(&self, id: TaskId) -> Option<usize> {
        self.members.get_index_of(&id)
    }

    pub fn get(&self, id: TaskId) -> Option<&ScheduledTask> {
        self.members.get(&id).map(|m| &m.entry)
    }

    pub fn contains(&self, key: &TaskKey) -> bool {
        self.find_task_with(key).is_some()
    }

    pub fn find_task_with(&self, key: &TaskKey) -> Option<&ScheduledTask> {
        self.members
            .values()
            .map(|m| &m.entry)
            .find(|e| e.task.contains(key))
    }

    /// Generic packages promote members by polling their readiness;
    /// keyed packages only through delivered results.
    pub fn polls_members(&self) -> bool {
        !self.kind.is_keyed()
    }

    pub fn is_stalled(&self, now: Instant) -> bool {
        self.timer.is_expired(now)
    }

    pub fn timer(&self) -> &StallTimer {
        &self.timer
    }

    /// Consume the package, yielding its ready members in dispatch order.
    /// Pending members are discarded.
    pub fn into_ready(self) -> Vec<ScheduledTask> {
        let mut ready: Vec<ScheduledTask> = self
            .members
            .into_values()
            .filter(|m| m.state == MemberState::Ready)
            .map(|m| m.entry)
            .collect();
        ready.sort_by(|a, b| a.priority.cmp(&b.priority));
        ready
    }
}
