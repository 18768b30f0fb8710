use {
    std::{sync::Arc, time::Duration},
    thiserror::Error,
};

#[derive(Debug, Clone, Error)]
pub enum SchedulerError {
    #[error("scheduler not started")]
    NotStarted,

    #[error("scheduler is already running")]
    AlreadyRunning,

    #[error("batch execution failed: {0:#}")]
    ExecutionFailed(Arc<anyhow::Error>),

    #[error("scheduler stopped before the request was executed")]
    SchedulerStopped,

    #[error("request was not scheduled within {0:?}")]
    Timeout(Duration),

    #[error("queue is full ({0} requests pending)")]
    QueueFull(usize),

    #[error("invalid scheduler config: {0}")]
    InvalidConfig(String),
}

impl SchedulerError {
    /// Label used for the failure counters.
    pub fn reason(&self) -> &'static str {
        match self {
            SchedulerError::NotStarted => "not_started",
            SchedulerError::AlreadyRunning => "already_running",
            SchedulerError::ExecutionFailed(_) => "execution_failed",
            SchedulerError::SchedulerStopped => "scheduler_stopped",
            SchedulerError::Timeout(_) => "timeout",
            SchedulerError::QueueFull(_) => "queue_full",
            SchedulerError::InvalidConfig(_) => "invalid_config",
        }
    }

    pub fn execution_failed(err: anyhow::Error) -> Self {
        SchedulerError::ExecutionFailed(Arc::new(err))
    }
}
