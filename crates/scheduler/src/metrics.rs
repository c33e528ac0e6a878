use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Scheduler counters, cheap to snapshot and serialize.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerMetrics {
    /// Total executions by task name.
    pub tasks_executed: HashMap<String, u64>,
    /// Last execution time by task name.
    pub last_run: HashMap<String, DateTime<Utc>>,
    /// Dispatch steps that found no admissible task.
    pub idle_dispatches: u64,
    /// Candidates held back by the busy flag.
    pub gated_dispatches: u64,
    /// Scans cut short by a pending blocking task.
    pub blocked_scans: u64,
    /// Executions that returned an error.
    pub failed_executions: u64,
    /// Factory calls that produced no task.
    pub construction_failures: u64,
    /// Tasks eliminated as duplicates.
    pub duplicates_removed: u64,
    /// Packages torn down by their stall timer.
    pub stall_timeouts: u64,
    /// Packages whose members all became ready.
    pub packages_completed: u64,
}

impl SchedulerMetrics {
    /// Record a task execution.
    pub fn record_execution(&mut self, task_name: &str) {
        *self.tasks_executed.entry(task_name.to_string()).or_default() += 1;
        self.last_run.insert(task_name.to_string(), Utc::now());
    }

    pub fn total_executed(&self) -> u64 {
        self.tasks_executed.values().sum()
    }

    pub fn executions_of(&self, task_name: &str) -> u64 {
        self.tasks_executed.get(task_name).copied().unwrap_or(0)
    }
}
