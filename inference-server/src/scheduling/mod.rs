pub mod completion;
pub mod config;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod queue;
pub mod scheduler;

pub use self::{
    completion::{Completed, CompletionResult},
    config::SchedulerConfig,
    error::SchedulerError,
    executor::{BatchExecutor, BatchOutput},
    metrics::SchedulerMetrics,
    scheduler::BatchScheduler,
};
