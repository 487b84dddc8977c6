//! Futures and submitters handed back to callers.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::SchedulerError;
use crate::runner::Scheduler;
use crate::task::{FunctionHandle, TaskId};

/// Deferred result of a submitted task.
///
/// Resolves with the task's value, or with a task-level [`SchedulerError`]
/// when the callable fails or panics. If the task is discarded by
/// [`Scheduler::clear`] before it starts, the handle never resolves;
/// wrap it in `tokio::time::timeout` if that matters to the caller.
#[must_use = "a TaskHandle does nothing unless awaited; use a detached submit to ignore the result"]
pub struct TaskHandle<T> {
    id: TaskId,
    /// `None` once the item is known to have been discarded.
    rx: Option<oneshot::Receiver<Result<T, SchedulerError>>>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(id: TaskId, rx: oneshot::Receiver<Result<T, SchedulerError>>) -> Self {
        Self { id, rx: Some(rx) }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, SchedulerError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Some(rx) = self.rx.as_mut() else {
            return Poll::Pending;
        };
        match Pin::new(rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // Sender dropped without a value: the item was cleared from the backlog.
            Poll::Ready(Err(_)) => {
                self.rx = None;
                Poll::Pending
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle").field("id", &self.id).finish()
    }
}

/// Signal returned by `wait_for_empty` / `wait_for_idle`.
#[must_use = "a drain signal does nothing unless awaited"]
#[derive(Debug)]
pub struct Drained {
    rx: Option<oneshot::Receiver<()>>,
}

impl Drained {
    pub(crate) fn ready() -> Self {
        Self { rx: None }
    }

    pub(crate) fn waiting(rx: oneshot::Receiver<()>) -> Self {
        Self { rx: Some(rx) }
    }

    /// Whether the condition already held when the signal was created.
    pub fn is_ready(&self) -> bool {
        self.rx.is_none()
    }
}

impl Future for Drained {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        match self.rx.as_mut() {
            None => Poll::Ready(()),
            // A dropped sender means the scheduler is gone; nothing left to wait for.
            Some(rx) => Pin::new(rx).poll(cx).map(|_| ()),
        }
    }
}

/// Submitter bound to a function registered with [`Scheduler::register`].
///
/// Each call enqueues a work item that refers to the function by handle,
/// under the same admission rule as [`Scheduler::submit`].
pub struct RegisteredFn<A, T> {
    handle: FunctionHandle,
    scheduler: Scheduler,
    _marker: PhantomData<fn(A) -> T>,
}

impl<A, T> RegisteredFn<A, T>
where
    A: Send + 'static,
    T: Send + 'static,
{
    pub(crate) fn new(handle: FunctionHandle, scheduler: Scheduler) -> Self {
        Self {
            handle,
            scheduler,
            _marker: PhantomData,
        }
    }

    pub fn handle(&self) -> FunctionHandle {
        self.handle
    }

    /// Submit a call with `args` and return its deferred result.
    pub fn call(&self, args: A) -> TaskHandle<T> {
        self.scheduler.submit_registered(self.handle, args)
    }

    /// Submit a call with `args`, discarding its result.
    pub fn call_detached(&self, args: A) {
        self.scheduler.submit_registered_detached::<A, T>(self.handle, args)
    }
}

impl<A, T> Clone for RegisteredFn<A, T> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle,
            scheduler: self.scheduler.clone(),
            _marker: PhantomData,
        }
    }
}

impl<A, T> fmt::Debug for RegisteredFn<A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredFn")
            .field("handle", &self.handle)
            .finish()
    }
}
