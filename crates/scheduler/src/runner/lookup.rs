use tracing::debug;

use crate::task::ScheduledTask;
use crate::tasks::PACKAGE;
use crate::types::{TaskId, TaskKey};

use super::Scheduler;

impl Scheduler {
    /// First bag task matching `key`, looking through package tasks into
    /// their members.
    pub fn find_task_with(&self, key: &TaskKey) -> Option<&ScheduledTask> {
        self.bag.iter().find(|e| self.entry_contains(e, key))
    }

    pub fn find_all_tasks_with(&self, key: &TaskKey) -> Vec<&ScheduledTask> {
        self.bag
            .iter()
            .filter(|e| self.entry_contains(e, key))
            .collect()
    }

    pub fn has_task_with(&self, key: &TaskKey) -> bool {
        self.find_task_with(key).is_some()
    }

    fn entry_contains(&self, entry: &ScheduledTask, key: &TaskKey) -> bool {
        if entry.task.contains(key) {
            return true;
        }
        match entry.key() {
            TaskKey::Package(id) if entry.kind() == PACKAGE => self
                .packages
                .get(id)
                .is_some_and(|p| p.members().any(|(m, _)| self.entry_contains(m, key))),
            _ => false,
        }
    }

    /// Remove every other bag task matching `key` whose args equal those
    /// of task `id`. Args compare structurally as JSON values. Tasks with
    /// the same key and different args are separate requests and stay.
    pub fn remove_duplicates_of(&mut self, id: TaskId, key: &TaskKey) -> usize {
        let removed = self.drop_duplicates(id, key);
        if removed > 0 {
            self.run();
        }
        removed
    }

    pub(super) fn drop_duplicates(&mut self, id: TaskId, key: &TaskKey) -> usize {
        let Some(args) = self.bag.iter().find(|e| e.id == id).map(|e| e.args().clone()) else {
            return 0;
        };

        let duplicates: Vec<TaskId> = self
            .bag
            .iter()
            .filter(|e| e.id != id && e.task.contains(key) && e.args() == &args)
            .map(|e| e.id)
            .collect();

        for duplicate in &duplicates {
            self.take_task(*duplicate);
        }
        if !duplicates.is_empty() {
            debug!(task = %key, kept = %id, removed = duplicates.len(), "duplicates removed");
            self.metrics.duplicates_removed += duplicates.len() as u64;
        }
        duplicates.len()
    }

    /// Remove every bag task built from factory kind `kind`.
    pub fn remove_tasks_of_kind(&mut self, kind: &str) -> usize {
        let ids: Vec<TaskId> = self
            .bag
            .iter()
            .filter(|e| e.kind() == kind)
            .map(|e| e.id)
            .collect();

        for id in &ids {
            self.take_task(*id);
        }
        if !ids.is_empty() {
            debug!(kind, removed = ids.len(), "tasks removed by kind");
            self.run();
        }
        ids.len()
    }
}
