use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::task::Outcome;

/// Scheduler operational counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerMetrics {
    /// Work items accepted by `submit`, `submit_all` or a registered function.
    pub tasks_submitted: u64,
    /// Work items that were admitted and started.
    pub tasks_started: u64,
    /// Tasks that settled successfully.
    pub tasks_succeeded: u64,
    /// Tasks that returned an error or panicked.
    pub tasks_failed: u64,
    /// Backlogged items dropped by `clear()`.
    pub tasks_discarded: u64,
    /// Rolling mean of task run time.
    pub avg_task_duration: Duration,
    /// When the most recent task settled.
    pub last_completed: Option<DateTime<Utc>>,
}

impl SchedulerMetrics {
    /// Tasks that have settled either way.
    pub fn tasks_completed(&self) -> u64 {
        self.tasks_succeeded + self.tasks_failed
    }

    /// Record a task settling after running for `duration`.
    pub fn record_completion(&mut self, outcome: Outcome, duration: Duration) {
        match outcome {
            Outcome::Succeeded => self.tasks_succeeded += 1,
            Outcome::Failed => self.tasks_failed += 1,
        }
        self.last_completed = Some(Utc::now());

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let count = self.tasks_completed();
        self.avg_task_duration = if count == 1 {
            duration
        } else {
            let prev_nanos = self.avg_task_duration.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };
    }
}
