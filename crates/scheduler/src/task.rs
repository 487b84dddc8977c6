//! Work items and the registered-function table.
//!
//! A [`WorkItem`] is either a callable supplied at submission time or a
//! [`FunctionHandle`] into the scheduler's [`FunctionTable`] together with
//! the arguments for that call. Registered handles are resolved to a
//! callable only when the item is admitted.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::oneshot;
use tracing::warn;

use crate::error::SchedulerError;

/// Identifier assigned to every submission, in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) u64);

impl TaskId {
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// How a task settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    Failed,
}

/// Channel a task's result is delivered on. `None` when the caller asked
/// not to observe the result.
pub(crate) type Reply<T> = Option<oneshot::Sender<Result<T, SchedulerError>>>;

/// Type-erased body of an admitted task.
pub(crate) type Job = BoxFuture<'static, Outcome>;

// ── Registered functions ────────────────────────────────────────────

/// Handle into the registered-function table. Handles start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionHandle(pub(crate) u64);

impl FunctionHandle {
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for FunctionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Callable stored for a handle, normalized to `anyhow` errors.
pub(crate) type Callable<A, T> =
    Arc<dyn Fn(A) -> BoxFuture<'static, Result<T, anyhow::Error>> + Send + Sync>;

/// Erased table entry; holds a `Callable<A, T>` for the `A`/`T` it was registered with.
pub(crate) type ErasedCallable = Arc<dyn Any + Send + Sync>;

/// Append-only mapping from handle to callable.
#[derive(Default)]
pub(crate) struct FunctionTable {
    entries: HashMap<FunctionHandle, ErasedCallable>,
}

impl FunctionTable {
    /// Store `callable` under a freshly minted handle (table size + 1).
    pub(crate) fn insert<A, T>(&mut self, callable: Callable<A, T>) -> FunctionHandle
    where
        A: 'static,
        T: 'static,
    {
        let handle = FunctionHandle(self.entries.len() as u64 + 1);
        self.entries.insert(handle, Arc::new(callable));
        handle
    }

    pub(crate) fn get(&self, handle: FunctionHandle) -> Option<ErasedCallable> {
        self.entries.get(&handle).cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

// ── Work items ──────────────────────────────────────────────────────

/// Builds the task body from a callable supplied at submission.
pub(crate) type DirectCall = Box<dyn FnOnce() -> Job + Send>;

/// Builds the task body from the table entry the handle resolved to.
pub(crate) type RegisteredCall = Box<dyn FnOnce(Option<ErasedCallable>) -> Job + Send>;

/// A unit of schedulable work. Consumed exactly once when admitted.
pub(crate) enum WorkItem {
    Direct {
        id: TaskId,
        call: DirectCall,
    },
    Registered {
        id: TaskId,
        handle: FunctionHandle,
        call: RegisteredCall,
    },
}

impl WorkItem {
    pub(crate) fn id(&self) -> TaskId {
        match self {
            Self::Direct { id, .. } | Self::Registered { id, .. } => *id,
        }
    }

    /// Item for a callable that takes no arguments.
    pub(crate) fn direct<F, Fut, T, E>(id: TaskId, f: F, reply: Reply<T>) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        let call: DirectCall = Box::new(move || {
            settle(id, async move { f().await.map_err(Into::<anyhow::Error>::into) }, reply)
        });
        Self::Direct { id, call }
    }

    /// Item for a registered handle plus the arguments of this call.
    pub(crate) fn registered<A, T>(
        id: TaskId,
        handle: FunctionHandle,
        args: A,
        reply: Reply<T>,
    ) -> Self
    where
        A: Send + 'static,
        T: Send + 'static,
    {
        let call: RegisteredCall = Box::new(move |entry| {
            let callable = entry.and_then(|e| e.downcast_ref::<Callable<A, T>>().cloned());
            match callable {
                Some(callable) => settle(id, callable(args), reply),
                None => {
                    async move { deliver(id, Err(SchedulerError::UnknownHandle(handle)), reply) }
                        .boxed()
                }
            }
        });
        Self::Registered { id, handle, call }
    }
}

/// Run `fut` to completion, catching panics, and deliver its result.
pub(crate) fn settle<T, Fut>(id: TaskId, fut: Fut, reply: Reply<T>) -> Job
where
    T: Send + 'static,
    Fut: Future<Output = Result<T, anyhow::Error>> + Send + 'static,
{
    async move {
        let result = match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(SchedulerError::TaskFailed(e)),
            Err(panic) => Err(SchedulerError::TaskPanicked(panic_message(panic.as_ref()))),
        };
        deliver(id, result, reply)
    }
    .boxed()
}

fn deliver<T>(id: TaskId, result: Result<T, SchedulerError>, reply: Reply<T>) -> Outcome {
    let outcome = if result.is_ok() {
        Outcome::Succeeded
    } else {
        Outcome::Failed
    };

    match reply {
        // The receiver may already be gone (e.g. a dropped aggregate).
        Some(tx) => {
            let _ = tx.send(result);
        }
        None => {
            if let Err(e) = result {
                warn!(task = %id, error = %e, "Detached task failed");
            }
        }
    }

    outcome
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doubler() -> Callable<u32, u32> {
        Arc::new(|x: u32| async move { Ok::<_, anyhow::Error>(x * 2) }.boxed())
    }

    #[test]
    fn handles_are_minted_from_one() {
        let mut table = FunctionTable::default();
        let first = table.insert(doubler());
        let second = table.insert(doubler());
        assert_eq!(first.get(), 1);
        assert_eq!(second.get(), 2);
        assert_eq!(table.len(), 2);
        assert!(table.get(first).is_some());
        assert!(table.get(FunctionHandle(3)).is_none());
    }

    #[test]
    fn display_formats() {
        assert_eq!(TaskId(7).to_string(), "task-7");
        assert_eq!(FunctionHandle(2).to_string(), "#2");
    }

    #[tokio::test]
    async fn settle_delivers_success() {
        let (tx, rx) = oneshot::channel();
        let outcome = settle(TaskId(1), async { Ok::<_, anyhow::Error>(5) }, Some(tx)).await;
        assert_eq!(outcome, Outcome::Succeeded);
        assert_eq!(rx.await.unwrap().unwrap(), 5);
    }

    #[tokio::test]
    async fn settle_wraps_errors_as_task_failures() {
        let (tx, rx) = oneshot::channel::<Result<u32, SchedulerError>>();
        let outcome = settle(TaskId(1), async { Err(anyhow::anyhow!("boom")) }, Some(tx)).await;
        assert_eq!(outcome, Outcome::Failed);
        let err = rx.await.unwrap().unwrap_err();
        assert!(matches!(err, SchedulerError::TaskFailed(_)));
        assert_eq!(err.task_error().unwrap().to_string(), "boom");
    }

    #[tokio::test]
    async fn settle_catches_panics() {
        let (tx, rx) = oneshot::channel::<Result<u32, SchedulerError>>();
        let explode = true;
        let fut = async move {
            if explode {
                panic!("kaboom");
            }
            Ok(0)
        };
        let outcome = settle(TaskId(1), fut, Some(tx)).await;
        assert_eq!(outcome, Outcome::Failed);
        match rx.await.unwrap() {
            Err(SchedulerError::TaskPanicked(msg)) => assert_eq!(msg, "kaboom"),
            other => panic!("expected panic error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn registered_item_with_unknown_handle_fails_only_itself() {
        let (tx, rx) = oneshot::channel::<Result<u32, SchedulerError>>();
        let item = WorkItem::registered(TaskId(1), FunctionHandle(9), 3u32, Some(tx));
        let outcome = match item {
            WorkItem::Registered { call, .. } => call(None).await,
            WorkItem::Direct { .. } => unreachable!(),
        };
        assert_eq!(outcome, Outcome::Failed);
        assert!(matches!(
            rx.await.unwrap(),
            Err(SchedulerError::UnknownHandle(FunctionHandle(9)))
        ));
    }

    #[tokio::test]
    async fn registered_item_with_mismatched_signature_is_unknown() {
        let entry: ErasedCallable = Arc::new(doubler());
        let (tx, rx) = oneshot::channel::<Result<String, SchedulerError>>();
        let item = WorkItem::registered(TaskId(1), FunctionHandle(1), 3u32, Some(tx));
        if let WorkItem::Registered { call, .. } = item {
            call(Some(entry)).await;
        }
        assert!(matches!(rx.await.unwrap(), Err(SchedulerError::UnknownHandle(_))));
    }
}
