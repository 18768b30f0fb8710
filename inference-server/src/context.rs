use {
    std::sync::Arc,
    prometheus::Registry,
    crate::{
        models::{classifier::ImageClassifier, io::InputTensor},
        scheduling::BatchScheduler,
        server::metrics::ServiceMetrics,
    },
};

pub type ClassificationScheduler = BatchScheduler<InputTensor, Vec<f32>>;

pub struct Context {
    scheduler: Arc<ClassificationScheduler>,
    model: Option<Arc<dyn ImageClassifier>>,
    metrics: ServiceMetrics,
    registry: Registry,
}

impl Context {
    pub fn new(scheduler: Arc<ClassificationScheduler>, model: Option<Arc<dyn ImageClassifier>>, metrics: ServiceMetrics, registry: Registry) -> Self {
        Self {
            scheduler,
            model,
            metrics,
            registry,
        }
    }

    pub fn scheduler(&self) -> &ClassificationScheduler {
        &self.scheduler
    }

    /// `None` until a model has been loaded.
    pub fn model(&self) -> Option<&dyn ImageClassifier> {
        self.model.as_deref()
    }

    pub fn is_model_loaded(&self) -> bool {
        self.model.is_some()
    }

    pub fn metrics(&self) -> &ServiceMetrics {
        &self.metrics
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
