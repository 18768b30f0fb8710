use {
    std::time::{Duration, Instant},
    tokio::time::sleep,
    config::Config,
    prometheus::{
        Registry,
        IntGauge,
        Gauge,
        IntCounterVec,
        HistogramVec,
        TextEncoder,
        exponential_buckets,
        register_gauge_with_registry,
        register_int_gauge_with_registry,
        register_int_counter_vec_with_registry,
        register_histogram_vec_with_registry,
    },
    crate::{
        models::io::InputTensor,
        scheduling::BatchScheduler,
    },
};

pub struct MetricsConfig {
    pub collect_interval: Duration,
}

impl MetricsConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            collect_interval: Duration::from_secs(config.get_int("metrics.collect_interval_secs").unwrap_or(10).max(1) as u64),
        }
    }
}

#[derive(Clone)]
pub struct ServiceMetrics {
    requests: IntCounterVec,
    request_duration: HistogramVec,
    errors: IntCounterVec,
    active_requests: IntGauge,
    model_load_time: Gauge,
    inference_duration: HistogramVec,
    request_size: HistogramVec,
    response_size: HistogramVec,
}

impl ServiceMetrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        Ok(Self {
            requests: register_int_counter_vec_with_registry!("http_requests_total", "total http requests", &["method", "endpoint", "status"], registry)?,
            request_duration: register_histogram_vec_with_registry!(
                "http_request_duration_seconds",
                "http request duration in seconds",
                &["method", "endpoint"],
                vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0],
                registry
            )?,
            errors: register_int_counter_vec_with_registry!("errors_total", "total errors", &["error_type", "endpoint"], registry)?,
            active_requests: register_int_gauge_with_registry!("active_requests", "requests currently being processed", registry)?,
            model_load_time: register_gauge_with_registry!("model_load_time_seconds", "time taken to load the model", registry)?,
            inference_duration: register_histogram_vec_with_registry!(
                "model_inference_duration_seconds",
                "model inference duration in seconds",
                &["model_name"],
                vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 3.0, 5.0, 10.0],
                registry
            )?,
            request_size: register_histogram_vec_with_registry!(
                "http_request_size_bytes",
                "http request size in bytes",
                &["method", "endpoint"],
                exponential_buckets(256.0, 4.0, 9)?,
                registry
            )?,
            response_size: register_histogram_vec_with_registry!(
                "http_response_size_bytes",
                "http response size in bytes",
                &["method", "endpoint"],
                exponential_buckets(64.0, 4.0, 7)?,
                registry
            )?,
        })
    }

    pub fn track(&self, method: &'static str, endpoint: &'static str) -> RequestTracker {
        self.active_requests.inc();

        RequestTracker {
            metrics: self.clone(),
            method,
            endpoint,
            started_at: Instant::now(),
        }
    }

    pub fn record_model_load_time(&self, load_time: Duration) {
        self.model_load_time.set(load_time.as_secs_f64());
    }

    pub fn record_inference(&self, model_name: &str, duration: Duration) {
        self.inference_duration.with_label_values(&[model_name]).observe(duration.as_secs_f64());
    }

    pub fn requests_total(&self, method: &str, endpoint: &str, status: &str) -> u64 {
        self.requests.with_label_values(&[method, endpoint, status]).get()
    }

    pub fn errors_total(&self, error_type: &str, endpoint: &str) -> u64 {
        self.errors.with_label_values(&[error_type, endpoint]).get()
    }

    pub fn request_size_sum(&self, method: &str, endpoint: &str) -> f64 {
        self.request_size.with_label_values(&[method, endpoint]).get_sample_sum()
    }

    pub fn response_size_count(&self, method: &str, endpoint: &str) -> u64 {
        self.response_size.with_label_values(&[method, endpoint]).get_sample_count()
    }

    pub fn active_requests(&self) -> i64 {
        self.active_requests.get()
    }
}

/// Records one request's duration, status and error type when finished.
pub struct RequestTracker {
    metrics: ServiceMetrics,
    method: &'static str,
    endpoint: &'static str,
    started_at: Instant,
}

impl RequestTracker {
    pub fn record_request_size(&self, bytes: usize) {
        self.metrics.request_size.with_label_values(&[self.method, self.endpoint]).observe(bytes as f64);
    }

    pub fn record_response_size(&self, bytes: usize) {
        self.metrics.response_size.with_label_values(&[self.method, self.endpoint]).observe(bytes as f64);
    }

    pub fn finish(self, status: u16, error_type: Option<&str>) {
        let metrics = &self.metrics;

        metrics.request_duration
            .with_label_values(&[self.method, self.endpoint])
            .observe(self.started_at.elapsed().as_secs_f64());
        metrics.requests
            .with_label_values(&[self.method, self.endpoint, &status.to_string()])
            .inc();

        if let Some(error_type) = error_type {
            metrics.errors.with_label_values(&[error_type, self.endpoint]).inc();
        }
    }
}

impl Drop for RequestTracker {
    fn drop(&mut self) {
        self.metrics.active_requests.dec();
    }
}

pub fn encode_metrics(registry: &Registry) -> prometheus::Result<String> {
    TextEncoder::new().encode_to_string(&registry.gather())
}

pub async fn collect_metrics(config: MetricsConfig, scheduler: &BatchScheduler<InputTensor, Vec<f32>>) {
    loop {
        sleep(config.collect_interval).await;

        scheduler.metrics().set_queue_length(scheduler.queue_depth());
    }
}
