use {
    std::{sync::Arc, time::Instant},
    async_trait::async_trait,
    anyhow::Context,
    crate::{
        models::{classifier::ImageClassifier, io::InputTensor},
        scheduling::{BatchExecutor, BatchOutput},
    },
};

/// Runs batches through an [`ImageClassifier`] on the blocking thread pool,
/// so that model compute does not stall the async workers.
pub struct ClassifierExecutor {
    model: Arc<dyn ImageClassifier>,
}

impl ClassifierExecutor {
    pub fn new(model: Arc<dyn ImageClassifier>) -> Self {
        Self {
            model,
        }
    }
}

#[async_trait]
impl BatchExecutor<InputTensor, Vec<f32>> for ClassifierExecutor {
    async fn execute(&self, batch: Vec<InputTensor>) -> anyhow::Result<BatchOutput<Vec<f32>>> {
        let model = self.model.clone();

        tokio::task::spawn_blocking(move || -> anyhow::Result<BatchOutput<Vec<f32>>> {
            let started_at = Instant::now();
            let logits = model.forward(&batch)?;
            Ok(BatchOutput::new(logits, started_at.elapsed()))
        })
            .await
            .context("model execution task failed")?
    }
}
