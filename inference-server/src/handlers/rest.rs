use {
    std::{sync::Arc, time::Instant},
    serde::{Serialize, Deserialize},
    serde_json::json,
    thiserror::Error,
    tracing::{info, error, info_span, Instrument},
    axum::{
        Router,
        Extension,
        Json,
        body::Bytes,
        response::{Response, IntoResponse},
        routing::{get, post},
        http::{StatusCode, header::{CONTENT_TYPE, HeaderValue}},
    },
    chrono::Utc,
    ulid::Ulid,
    crate::{
        context::Context,
        models::{classifier::{softmax, top_k}, io::preprocess, labels::class_name},
        scheduling::SchedulerError,
        server::metrics::{encode_metrics, RequestTracker},
    },
};

pub const TOP_K: usize = 5;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Prediction {
    pub rank: usize,
    pub class_id: usize,
    pub class_name: String,
    pub confidence: f32,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct PredictResponse {
    pub success: bool,
    pub request_id: String,
    pub predictions: Vec<Prediction>,
    pub latency_ms: f64,
    pub inference_ms: f64,
    pub batch_size: usize,
    pub model: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub success: bool,
    pub request_id: String,
    pub error: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    pub scheduler_running: bool,
    pub queue_depth: usize,
    pub timestamp: f64,
}

#[derive(Debug, Error)]
enum PredictError {
    #[error("model not loaded")]
    ModelNotLoaded,

    #[error("invalid image: {0:#}")]
    InvalidImage(anyhow::Error),

    #[error(transparent)]
    Scheduling(#[from] SchedulerError),

    #[error("internal error: {0:#}")]
    Internal(anyhow::Error),
}

impl PredictError {
    fn status(&self) -> StatusCode {
        match self {
            PredictError::ModelNotLoaded => StatusCode::SERVICE_UNAVAILABLE,
            PredictError::InvalidImage(_) => StatusCode::BAD_REQUEST,
            PredictError::Scheduling(err) => match err {
                SchedulerError::NotStarted | SchedulerError::SchedulerStopped => StatusCode::SERVICE_UNAVAILABLE,
                SchedulerError::QueueFull(_) => StatusCode::TOO_MANY_REQUESTS,
                SchedulerError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            PredictError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            PredictError::ModelNotLoaded => "model_not_loaded",
            PredictError::InvalidImage(_) => "invalid_image",
            PredictError::Scheduling(err) => err.reason(),
            PredictError::Internal(_) => "internal",
        }
    }
}

pub fn rest_router(context: Arc<Context>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/predict", post(predict))
        .route("/metrics", get(metrics))
        .layer(Extension(context))
}

async fn root() -> impl IntoResponse {
    Json(json!({
        "service": "micro-batching image classification",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "health": "/health",
            "predict": "/predict (POST, image bytes)",
            "metrics": "/metrics"
        }
    }))
}

async fn health(Extension(context): Extension<Arc<Context>>) -> Json<HealthResponse> {
    let scheduler_running = context.scheduler().is_running();
    let model_loaded = context.is_model_loaded();

    Json(HealthResponse {
        status: (if scheduler_running && model_loaded { "healthy" } else { "unavailable" }).to_owned(),
        model_loaded,
        scheduler_running,
        queue_depth: context.scheduler().queue_depth(),
        timestamp: Utc::now().timestamp_millis() as f64 / 1000.0,
    })
}

async fn predict(Extension(context): Extension<Arc<Context>>, body: Bytes) -> Response {
    let request_id = Ulid::new().to_string();
    let tracker = context.metrics().track("POST", "/predict");
    tracker.record_request_size(body.len());
    let started_at = Instant::now();

    let span = info_span!("predict", request_id = %request_id);
    let result = run_prediction(&context, body).instrument(span).await;

    match result {
        Ok(prediction) => {
            let latency_ms = started_at.elapsed().as_secs_f64() * 1000.0;
            info!(
                "request {} classified as {} in {:.2}ms (batch of {})",
                request_id,
                prediction.predictions.first().map(|v| v.class_name.as_str()).unwrap_or("nothing"),
                latency_ms,
                prediction.batch_size,
            );

            let res = json_response(&tracker, StatusCode::OK, &PredictResponse {
                success: true,
                request_id,
                predictions: prediction.predictions,
                latency_ms: round2(latency_ms),
                inference_ms: round2(prediction.inference_ms),
                batch_size: prediction.batch_size,
                model: prediction.model,
            });
            tracker.finish(res.status().as_u16(), None);
            res
        },
        Err(err) => {
            let status = err.status();
            error!("request {} failed: {}", request_id, err);

            let res = json_response(&tracker, status, &ErrorResponse {
                success: false,
                request_id,
                error: err.to_string(),
            });
            tracker.finish(status.as_u16(), Some(err.error_type()));
            res
        },
    }
}

struct Classified {
    predictions: Vec<Prediction>,
    inference_ms: f64,
    batch_size: usize,
    model: String,
}

async fn run_prediction(context: &Context, body: Bytes) -> Result<Classified, PredictError> {
    let model = context.model().ok_or(PredictError::ModelNotLoaded)?;

    let input = tokio::task::spawn_blocking(move || preprocess(&body))
        .await
        .map_err(|err| PredictError::Internal(err.into()))?
        .map_err(PredictError::InvalidImage)?;

    let completed = context.scheduler().submit(input).await?;
    context.metrics().record_inference(model.name(), completed.timing);

    let probabilities = softmax(&completed.output);
    let predictions = top_k(&probabilities, TOP_K.min(model.num_classes()))
        .into_iter()
        .enumerate()
        .map(|(rank, (class_id, confidence))| Prediction {
            rank: rank + 1,
            class_id,
            class_name: class_name(class_id),
            confidence: (confidence * 10_000.0).round() / 10_000.0,
        })
        .collect();

    Ok(Classified {
        predictions,
        inference_ms: completed.timing.as_secs_f64() * 1000.0,
        batch_size: completed.batch_size,
        model: model.name().to_owned(),
    })
}

fn json_response<T: Serialize>(tracker: &RequestTracker, status: StatusCode, body: &T) -> Response {
    let bytes = match serde_json::to_vec(body) {
        Ok(v) => v,
        Err(err) => {
            error!("failed to serialize response: {:?}", err);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    tracker.record_response_size(bytes.len());

    let mut res = (status, bytes).into_response();
    res.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    res
}

async fn metrics(Extension(context): Extension<Arc<Context>>) -> Response {
    match encode_metrics(context.registry()) {
        Ok(text) => {
            let mut res = text.into_response();
            res.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; version=0.0.4"));
            res
        },
        Err(err) => {
            error!("failed to encode metrics: {:?}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        },
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
