use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::config::{ConcurrencyLimit, SchedulerConfig};
use crate::error::SchedulerError;
use crate::metrics::SchedulerMetrics;
use crate::task::{FunctionTable, TaskId, WorkItem};

/// Bounded-concurrency FIFO scheduler.
///
/// At most `concurrency_limit` submitted tasks run at once; the rest wait
/// in a backlog and are started in submission order as running tasks
/// settle. Cloning yields another handle to the same scheduler.
///
/// Tasks are spawned onto the current Tokio runtime. Work submitted
/// outside one is queued and admitted once the scheduler is next driven
/// from inside a runtime.
#[derive(Clone)]
pub struct Scheduler {
    pub(super) inner: Arc<Inner>,
}

pub(super) struct Inner {
    pub(super) limit: ConcurrencyLimit,
    state: Mutex<State>,
    /// Registered functions, looked up by handle when an item starts.
    functions: RwLock<FunctionTable>,
    metrics: RwLock<SchedulerMetrics>,
    next_task_id: AtomicU64,
}

/// Mutable admission state. Never locked across an await or while user code runs.
#[derive(Default)]
pub(super) struct State {
    /// Not-yet-started work, oldest first.
    pub(super) backlog: VecDeque<WorkItem>,
    /// Tasks admitted and not yet settled.
    pub(super) pending: usize,
    pub(super) paused: bool,
    pub(super) empty_waiters: Vec<oneshot::Sender<()>>,
    pub(super) idle_waiters: Vec<oneshot::Sender<()>>,
}

impl State {
    /// Move backlog heads into the running set while admission allows.
    pub(super) fn admit_from_backlog(&mut self, limit: ConcurrencyLimit) -> Vec<WorkItem> {
        let mut admitted = Vec::new();
        while !self.paused && limit.admits(self.pending) {
            let Some(item) = self.backlog.pop_front() else {
                break;
            };
            self.pending += 1;
            admitted.push(item);
        }
        admitted
    }

    /// Take every waiter whose condition holds right now.
    pub(super) fn take_ready_waiters(&mut self) -> Vec<oneshot::Sender<()>> {
        let mut ready = Vec::new();
        if self.backlog.is_empty() {
            ready.append(&mut self.empty_waiters);
            if self.pending == 0 {
                ready.append(&mut self.idle_waiters);
            }
        }
        ready
    }
}

/// Wake drain waiters in registration order.
pub(super) fn notify(waiters: Vec<oneshot::Sender<()>>) {
    for tx in waiters {
        let _ = tx.send(());
    }
}

impl Inner {
    pub(super) fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn functions(&self) -> RwLockReadGuard<'_, FunctionTable> {
        self.functions.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn functions_mut(&self) -> RwLockWriteGuard<'_, FunctionTable> {
        self.functions.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn metrics_mut(&self) -> RwLockWriteGuard<'_, SchedulerMetrics> {
        self.metrics.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn next_task_id(&self) -> TaskId {
        TaskId(self.next_task_id.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

impl Scheduler {
    /// Create a scheduler from `config`.
    ///
    /// Fails with [`SchedulerError::InvalidConfiguration`] when the
    /// concurrency limit is 0. `auto_start = false` creates it paused.
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let limit = config.validate()?;
        info!(limit = %limit, auto_start = config.auto_start, "Scheduler created");
        Ok(Self::from_parts(limit, !config.auto_start))
    }

    fn from_parts(limit: ConcurrencyLimit, paused: bool) -> Self {
        let state = State {
            paused,
            ..State::default()
        };
        Self {
            inner: Arc::new(Inner {
                limit,
                state: Mutex::new(state),
                functions: RwLock::new(FunctionTable::default()),
                metrics: RwLock::new(SchedulerMetrics::default()),
                next_task_id: AtomicU64::new(0),
            }),
        }
    }

    /// Auto-started scheduler running at most `limit` tasks at once.
    pub fn with_limit(limit: usize) -> Result<Self, SchedulerError> {
        Self::new(SchedulerConfig::with_limit(limit))
    }

    /// Resume admitting backlog items. No-op unless paused.
    ///
    /// Starts as many backlog heads as the concurrency limit allows.
    ///
    /// Outside a Tokio runtime the scheduler stays paused, since admitted
    /// tasks could not be spawned.
    pub fn start(&self) {
        if tokio::runtime::Handle::try_current().is_err() {
            warn!("start() called outside a Tokio runtime; scheduler stays paused");
            return;
        }
        let (admitted, ready, backlog) = {
            let mut state = self.inner.state();
            if !state.paused {
                return;
            }
            state.paused = false;
            let admitted = state.admit_from_backlog(self.inner.limit);
            let ready = state.take_ready_waiters();
            (admitted, ready, state.backlog.len())
        };

        info!(started = admitted.len(), backlog, "Scheduler resumed");
        notify(ready);
        for item in admitted {
            self.launch(item);
        }
    }

    /// Stop admitting backlog items. Running tasks are unaffected.
    pub fn pause(&self) {
        self.inner.state().paused = true;
        info!("Scheduler paused");
    }

    /// Discard every backlogged item and return how many were dropped.
    ///
    /// Running tasks are unaffected. Handles for the discarded items never
    /// resolve.
    pub fn clear(&self) -> usize {
        let (discarded, ready) = {
            let mut state = self.inner.state();
            let discarded = std::mem::take(&mut state.backlog);
            (discarded, state.take_ready_waiters())
        };

        let count = discarded.len();
        // Dropping the items drops their reply senders outside the lock.
        drop(discarded);
        self.inner.metrics_mut().tasks_discarded += count as u64;
        info!(discarded = count, "Backlog cleared");
        notify(ready);
        count
    }

    /// Number of backlogged (not yet started) items.
    pub fn backlog_size(&self) -> usize {
        self.inner.state().backlog.len()
    }

    /// Alias for [`Scheduler::backlog_size`].
    pub fn len(&self) -> usize {
        self.backlog_size()
    }

    /// True when nothing is waiting in the backlog.
    pub fn is_empty(&self) -> bool {
        self.backlog_size() == 0
    }

    /// Number of tasks currently running.
    pub fn pending_count(&self) -> usize {
        self.inner.state().pending
    }

    pub fn is_paused(&self) -> bool {
        self.inner.state().paused
    }

    pub fn concurrency_limit(&self) -> ConcurrencyLimit {
        self.inner.limit
    }

    /// Number of functions registered with [`Scheduler::register`].
    pub fn registered_functions(&self) -> usize {
        self.inner.functions().len()
    }

    /// Get a snapshot of the current scheduler metrics.
    pub fn metrics(&self) -> SchedulerMetrics {
        self.inner
            .metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for Scheduler {
    /// Unbounded, auto-started scheduler.
    fn default() -> Self {
        Self::from_parts(ConcurrencyLimit::Unbounded, false)
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state();
        f.debug_struct("Scheduler")
            .field("limit", &self.inner.limit)
            .field("pending", &state.pending)
            .field("backlog", &state.backlog.len())
            .field("paused", &state.paused)
            .finish()
    }
}
