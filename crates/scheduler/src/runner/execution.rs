use std::time::{Duration, Instant};

use tracing::{debug, debug_span, Instrument};

use crate::task::{Outcome, TaskId, WorkItem};

use super::core::notify;
use super::Scheduler;

impl Scheduler {
    /// Spawn an admitted item. The caller has already counted it as pending.
    pub(super) fn launch(&self, item: WorkItem) {
        let id = item.id();
        let job = match item {
            WorkItem::Direct { call, .. } => call(),
            WorkItem::Registered { handle, call, .. } => {
                let entry = self.inner.functions().get(handle);
                call(entry)
            }
        };
        self.inner.metrics_mut().tasks_started += 1;
        debug!(task = %id, "Task started");

        let scheduler = self.clone();
        tokio::spawn(
            async move {
                let started = Instant::now();
                let outcome = job.await;
                scheduler.advance(id, outcome, started.elapsed());
            }
            .instrument(debug_span!("task", id = %id)),
        );
    }

    /// Bookkeeping after a task settles: release its slot, start the next
    /// backlog item if allowed, and wake drain waiters whose condition holds.
    pub(super) fn advance(&self, id: TaskId, outcome: Outcome, elapsed: Duration) {
        self.inner.metrics_mut().record_completion(outcome, elapsed);

        let (next, ready, pending, backlog) = {
            let mut state = self.inner.state();
            state.pending = state.pending.saturating_sub(1);
            let next = state.admit_from_backlog(self.inner.limit);
            let ready = state.take_ready_waiters();
            (next, ready, state.pending, state.backlog.len())
        };

        debug!(task = %id, ?outcome, ?elapsed, pending, backlog, "Task settled");
        notify(ready);
        for item in next {
            self.launch(item);
        }
    }
}
