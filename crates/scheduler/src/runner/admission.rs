use std::future::Future;
use std::sync::Arc;

use futures::future::{try_join_all, TryJoinAll};
use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::handle::{RegisteredFn, TaskHandle};
use crate::task::{Callable, FunctionHandle, Reply, WorkItem};

use super::core::notify;
use super::Scheduler;

impl Scheduler {
    /// Submit a task and return its deferred result.
    ///
    /// The task starts immediately if the scheduler is running and below
    /// its concurrency limit; otherwise it joins the tail of the backlog.
    pub fn submit<F, Fut, T, E>(&self, f: F) -> TaskHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        let id = self.inner.next_task_id();
        let (tx, rx) = oneshot::channel();
        self.dispatch(WorkItem::direct(id, f, Some(tx)));
        TaskHandle::new(id, rx)
    }

    /// Submit a task that is called with `args` once it starts.
    pub fn submit_with<A, F, Fut, T, E>(&self, f: F, args: A) -> TaskHandle<T>
    where
        A: Send + 'static,
        F: FnOnce(A) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        self.submit(move || f(args))
    }

    /// Submit a task whose result nobody observes.
    ///
    /// Ordering and the concurrency limit still apply. Failures are logged.
    pub fn submit_detached<F, Fut, T, E>(&self, f: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        let id = self.inner.next_task_id();
        self.dispatch(WorkItem::direct(id, f, None));
    }

    /// Submit every callable in order and aggregate their results.
    ///
    /// Submission happens eagerly. The returned future resolves with all
    /// values in submission order once every task succeeds, or with the
    /// first error to arrive. Tasks keep running after the aggregate fails.
    pub fn submit_all<I, F, Fut, T, E>(&self, callables: I) -> TryJoinAll<TaskHandle<T>>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        let handles: Vec<TaskHandle<T>> = callables.into_iter().map(|f| self.submit(f)).collect();
        try_join_all(handles)
    }

    /// Submit every callable in order without observing any result.
    pub fn submit_all_detached<I, F, Fut, T, E>(&self, callables: I)
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        for f in callables {
            self.submit_detached(f);
        }
    }

    /// Register `f` under a new function handle and return a submitter for it.
    ///
    /// Calls made through the returned [`RegisteredFn`] enqueue the handle
    /// and their arguments; the function is looked up when the item starts.
    pub fn register<A, F, Fut, T, E>(&self, f: F) -> RegisteredFn<A, T>
    where
        A: Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        let f = Arc::new(f);
        let callable: Callable<A, T> = Arc::new(move |args: A| {
            let f = Arc::clone(&f);
            async move { f(args).await.map_err(Into::<anyhow::Error>::into) }.boxed()
        });

        let handle = self.inner.functions_mut().insert(callable);
        debug!(handle = %handle, "Registered function");
        RegisteredFn::new(handle, self.clone())
    }

    pub(crate) fn submit_registered<A, T>(&self, handle: FunctionHandle, args: A) -> TaskHandle<T>
    where
        A: Send + 'static,
        T: Send + 'static,
    {
        let id = self.inner.next_task_id();
        let (tx, rx) = oneshot::channel();
        self.dispatch(WorkItem::registered(id, handle, args, Some(tx)));
        TaskHandle::new(id, rx)
    }

    pub(crate) fn submit_registered_detached<A, T>(&self, handle: FunctionHandle, args: A)
    where
        A: Send + 'static,
        T: Send + 'static,
    {
        let id = self.inner.next_task_id();
        let reply: Reply<T> = None;
        self.dispatch(WorkItem::registered(id, handle, args, reply));
    }

    /// Start `item` now if admission allows, otherwise append it to the backlog.
    ///
    /// Outside a Tokio runtime nothing can be spawned, so the item is only
    /// queued; the next submission or settlement inside a runtime admits it.
    pub(crate) fn dispatch(&self, item: WorkItem) {
        self.inner.metrics_mut().tasks_submitted += 1;
        let id = item.id();
        let has_runtime = Handle::try_current().is_ok();

        let (admitted, ready) = {
            let mut state = self.inner.state();
            // The backlog only holds items while admission is blocked, so
            // queueing and then admitting keeps the item in FIFO position.
            state.backlog.push_back(item);
            let admitted = if has_runtime {
                state.admit_from_backlog(self.inner.limit)
            } else {
                Vec::new()
            };
            if !admitted.iter().any(|item| item.id() == id) {
                debug!(
                    task = %id,
                    pending = state.pending,
                    backlog = state.backlog.len(),
                    "Task backlogged"
                );
            }
            (admitted, state.take_ready_waiters())
        };

        if !has_runtime {
            warn!(task = %id, "Submitted outside a Tokio runtime; task left in backlog");
        }
        notify(ready);
        for item in admitted {
            self.launch(item);
        }
    }
}
