use {
    std::time::Duration,
    prometheus::{
        Registry,
        IntCounter,
        IntCounterVec,
        IntGauge,
        Histogram,
        register_int_counter_with_registry,
        register_int_counter_vec_with_registry,
        register_int_gauge_with_registry,
        register_histogram_with_registry,
    },
    crate::scheduling::error::SchedulerError,
};

#[derive(Clone)]
pub struct SchedulerMetrics {
    requests: IntCounter,
    failures: IntCounterVec,
    batches: IntCounter,
    batch_size: Histogram,
    execution_duration: Histogram,
    queue_wait: Histogram,
    queue_length: IntGauge,
}

impl SchedulerMetrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        Ok(Self {
            requests: register_int_counter_with_registry!("batch_requests_total", "requests submitted to the batch scheduler", registry)?,
            failures: register_int_counter_vec_with_registry!("batch_request_failures_total", "requests resolved with an error", &["reason"], registry)?,
            batches: register_int_counter_with_registry!("batches_total", "batches passed to the executor", registry)?,
            batch_size: register_histogram_with_registry!(
                "batch_size",
                "number of requests in a batch",
                vec![1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0],
                registry
            )?,
            execution_duration: register_histogram_with_registry!(
                "batch_execution_duration_seconds",
                "time spent executing one batch",
                vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0],
                registry
            )?,
            queue_wait: register_histogram_with_registry!(
                "batch_queue_wait_seconds",
                "time between submission and drain",
                vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0],
                registry
            )?,
            queue_length: register_int_gauge_with_registry!("batch_queue_length", "current length of the intake queue", registry)?,
        })
    }

    pub fn record_submitted(&self, depth: usize) {
        self.requests.inc();
        self.set_queue_length(depth);
    }

    pub fn record_failure(&self, err: &SchedulerError) {
        self.failures.with_label_values(&[err.reason()]).inc();
    }

    pub fn record_batch(&self, size: usize) {
        self.batches.inc();
        self.batch_size.observe(size as f64);
    }

    pub fn record_execution(&self, timing: Duration) {
        self.execution_duration.observe(timing.as_secs_f64());
    }

    pub fn record_queue_wait(&self, waited: Duration) {
        self.queue_wait.observe(waited.as_secs_f64());
    }

    pub fn set_queue_length(&self, depth: usize) {
        self.queue_length.set(depth as i64);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests.get()
    }

    pub fn batches_total(&self) -> u64 {
        self.batches.get()
    }

    pub fn failures_total(&self, reason: &str) -> u64 {
        self.failures.with_label_values(&[reason]).get()
    }

    pub fn queue_length(&self) -> i64 {
        self.queue_length.get()
    }
}
