use tracing::{debug, warn};

use crate::task::{Dispatch, RunningTask, ScheduledTask};
use crate::types::{TaskId, Tier};

use super::Scheduler;

/// Outcome of scanning the sorted bag.
enum Selection {
    Candidate(ScheduledTask),
    /// A pending blocking task stopped the scan.
    Blocked(TaskId),
    Idle,
}

impl Scheduler {
    /// Dispatch the highest-priority admissible task, if any.
    ///
    /// Safe to call at any frequency. A call made while a task is inside
    /// `execute()` is recorded and served once that execution returns, so
    /// each step executes exactly one task and the bag is never scanned
    /// re-entrantly.
    pub fn run(&mut self) {
        if self.dispatching {
            self.rerun_requested = true;
            return;
        }

        let mut chain = 0usize;
        loop {
            self.rerun_requested = false;
            let Some(candidate) = self.next_admitted() else {
                break;
            };
            self.execute_entry(&candidate);
            chain += 1;

            if !self.rerun_requested {
                break;
            }
            if chain >= self.config.max_dispatch_chain {
                warn!(chain, "dispatch chain limit reached, deferring to the next run");
                break;
            }
        }
        self.rerun_requested = false;
    }

    /// Sort, scan and apply the admission gate.
    fn next_admitted(&mut self) -> Option<ScheduledTask> {
        self.bag.sort_by(|a, b| a.priority.cmp(&b.priority));

        match self.select_candidate() {
            Selection::Candidate(candidate) => {
                if !self.is_busy() || candidate.priority.is_at_least(Tier::Immediate) {
                    Some(candidate)
                } else {
                    debug!(task = %candidate.key(), "busy, holding candidate");
                    self.metrics.gated_dispatches += 1;
                    None
                }
            }
            Selection::Blocked(id) => {
                debug!(blocker = %id, "scan stopped at pending blocking task");
                self.metrics.blocked_scans += 1;
                None
            }
            Selection::Idle => {
                self.metrics.idle_dispatches += 1;
                None
            }
        }
    }

    fn select_candidate(&self) -> Selection {
        for entry in &self.bag {
            if entry.task.can_execute(self) {
                return Selection::Candidate(entry.clone());
            }
            if entry.priority.is_at_least(Tier::Blocking) {
                return Selection::Blocked(entry.id);
            }
        }
        Selection::Idle
    }

    /// Invoke `execute()` once, with the running pointer set. A failed
    /// task is removed.
    pub(crate) fn execute_entry(&mut self, entry: &ScheduledTask) {
        let name = entry.key().to_string();
        debug!(task = %name, id = %entry.id, rating = %entry.priority.rating(), "execute");

        let previous = self.running.replace(RunningTask {
            id: entry.id,
            key: entry.key().clone(),
            kind: entry.kind().to_string(),
        });
        let was_dispatching = std::mem::replace(&mut self.dispatching, true);

        let result = entry.task.execute(&mut Dispatch::new(self, entry.id));

        self.dispatching = was_dispatching;
        self.running = previous;
        self.metrics.record_execution(&name);

        if let Err(e) = result {
            warn!(task = %name, error = %e, "task execution failed, removing");
            self.metrics.failed_executions += 1;
            if self.take_task(entry.id).is_some() {
                self.rerun_requested = true;
            }
        }
    }
}
