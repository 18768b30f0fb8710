use {
    std::time::Duration,
    async_trait::async_trait,
};

/// Result of one executor call: one output per input, in input order, plus
/// the time the whole batch took.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutput<O> {
    pub outputs: Vec<O>,
    pub timing: Duration,
}

impl<O> BatchOutput<O> {
    pub fn new(outputs: Vec<O>, timing: Duration) -> Self {
        Self {
            outputs,
            timing,
        }
    }
}

#[async_trait]
pub trait BatchExecutor<I, O>: Send + Sync {
    async fn execute(&self, batch: Vec<I>) -> anyhow::Result<BatchOutput<O>>;
}

#[async_trait]
impl<I: Send + 'static, O: Send + 'static> BatchExecutor<I, O> for Box<dyn BatchExecutor<I, O> + Send + Sync> {
    async fn execute(&self, batch: Vec<I>) -> anyhow::Result<BatchOutput<O>> {
        (**self).execute(batch).await
    }
}
