use {
    std::{num::NonZeroUsize, time::Duration},
    config::Config,
    crate::scheduling::error::SchedulerError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub max_batch_size: NonZeroUsize,
    pub max_wait: Duration,
    /// Upper bound on time spent waiting in the queue. Unset means no deadline.
    pub request_timeout: Option<Duration>,
    /// Admission limit for the intake queue. Unset means unbounded.
    pub max_queue_depth: Option<usize>,
}

impl SchedulerConfig {
    pub fn new(max_batch_size: usize, max_wait: Duration) -> Result<Self, SchedulerError> {
        let max_batch_size = NonZeroUsize::new(max_batch_size)
            .ok_or_else(|| SchedulerError::InvalidConfig("max_batch_size must be positive".to_owned()))?;

        Ok(Self {
            max_batch_size,
            max_wait,
            request_timeout: None,
            max_queue_depth: None,
        })
    }

    pub fn with_request_timeout(self, request_timeout: Duration) -> Self {
        Self {
            request_timeout: Some(request_timeout),
            ..self
        }
    }

    pub fn with_max_queue_depth(self, max_queue_depth: usize) -> Self {
        Self {
            max_queue_depth: Some(max_queue_depth),
            ..self
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, SchedulerError> {
        let max_batch_size = config.get_int("batching.max_batch_size").unwrap_or(8);
        let max_wait_ms = config.get_int("batching.max_wait_ms").unwrap_or(50);

        let max_batch_size = usize::try_from(max_batch_size)
            .map_err(|_| SchedulerError::InvalidConfig(format!("max_batch_size must be positive, got {}", max_batch_size)))?;
        let max_wait_ms = non_negative(max_wait_ms, "max_wait_ms")?;

        let mut scheduler_config = Self::new(max_batch_size, Duration::from_millis(max_wait_ms))?;

        if let Ok(request_timeout_ms) = config.get_int("batching.request_timeout_ms") {
            scheduler_config = scheduler_config.with_request_timeout(Duration::from_millis(non_negative(request_timeout_ms, "request_timeout_ms")?));
        }

        if let Ok(max_queue_depth) = config.get_int("batching.max_queue_depth") {
            let max_queue_depth = non_negative(max_queue_depth, "max_queue_depth")?;
            if max_queue_depth == 0 {
                return Err(SchedulerError::InvalidConfig("max_queue_depth must be positive".to_owned()));
            }
            scheduler_config = scheduler_config.with_max_queue_depth(max_queue_depth as usize);
        }

        Ok(scheduler_config)
    }
}

fn non_negative(value: i64, name: &str) -> Result<u64, SchedulerError> {
    u64::try_from(value).map_err(|_| SchedulerError::InvalidConfig(format!("{} must not be negative, got {}", name, value)))
}
