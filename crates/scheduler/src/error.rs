//! Scheduler error types.

use thiserror::Error;

use crate::task::FunctionHandle;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),

    /// The task's callable returned an error.
    #[error("task failed: {0}")]
    TaskFailed(anyhow::Error),

    /// The task's callable panicked while running.
    #[error("task panicked: {0}")]
    TaskPanicked(String),

    #[error("no registered function for handle {0}")]
    UnknownHandle(FunctionHandle),
}

impl SchedulerError {
    /// True for errors that belong to a single task rather than the scheduler.
    pub fn is_task_failure(&self) -> bool {
        matches!(
            self,
            Self::TaskFailed(_) | Self::TaskPanicked(_) | Self::UnknownHandle(_)
        )
    }

    /// The error returned by the task's callable, if that is what this is.
    pub fn task_error(&self) -> Option<&anyhow::Error> {
        match self {
            Self::TaskFailed(e) => Some(e),
            _ => None,
        }
    }
}
