//! Bounded-concurrency FIFO task scheduler.
//!
//! Callers submit asynchronous work; the [`Scheduler`] runs at most
//! `concurrency_limit` tasks at once and queues the rest in submission
//! order. Progress happens only when work is submitted, when the scheduler
//! is resumed, and when a running task settles.

pub mod config;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod runner;
pub mod task;

pub use config::{ConcurrencyLimit, SchedulerConfig};
pub use error::SchedulerError;
pub use handle::{Drained, RegisteredFn, TaskHandle};
pub use metrics::SchedulerMetrics;
pub use runner::Scheduler;
pub use task::{FunctionHandle, Outcome, TaskId};
