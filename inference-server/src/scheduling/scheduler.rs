use {
    std::{
        any::Any,
        panic::AssertUnwindSafe,
        sync::{Arc, Mutex, MutexGuard, PoisonError},
    },
    tracing::{debug, info, warn, error},
    tokio::{
        sync::{oneshot, Notify},
        task::JoinHandle,
        time::{Instant, sleep_until, timeout},
    },
    futures::FutureExt,
    anyhow::anyhow,
    crate::scheduling::{
        completion::{Completer, CompletionResult},
        config::SchedulerConfig,
        error::SchedulerError,
        executor::{BatchExecutor, BatchOutput},
        metrics::SchedulerMetrics,
        queue::{Enqueued, IntakeQueue, WorkItem},
    },
};

/// Groups independently submitted requests into batches and runs each batch
/// through a [`BatchExecutor`].
///
/// A batch fires as soon as `max_batch_size` requests are queued, or once the
/// oldest queued request has waited `max_wait`, whichever happens first.
/// Batches never overlap: batch N is resolved before batch N+1 is drained.
pub struct BatchScheduler<I, O> {
    config: SchedulerConfig,
    shared: Arc<Shared<I, O>>,
    state: Mutex<LoopState>,
}

enum LoopState {
    Stopped,
    Running(RunningLoop),
    // shutdown was signalled, the loop may still be finishing a batch
    Stopping,
}

struct Shared<I, O> {
    queue: IntakeQueue<I, O>,
    wake: Notify,
    metrics: SchedulerMetrics,
}

struct RunningLoop {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl<I: Send + 'static, O: Send + 'static> BatchScheduler<I, O> {
    pub fn new(config: SchedulerConfig, metrics: SchedulerMetrics) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: IntakeQueue::new(config.max_queue_depth),
                wake: Notify::new(),
                metrics,
            }),
            config,
            state: Mutex::new(LoopState::Stopped),
        }
    }

    pub fn start<E: BatchExecutor<I, O> + 'static>(&self, executor: E) -> Result<(), SchedulerError> {
        let mut state = self.lock_state();
        if !matches!(*state, LoopState::Stopped) {
            return Err(SchedulerError::AlreadyRunning);
        }

        let (shutdown, shutdown_rx) = oneshot::channel();
        self.shared.queue.open();
        let handle = tokio::spawn(run_loop(self.config.clone(), self.shared.clone(), Arc::new(executor), shutdown_rx));
        *state = LoopState::Running(RunningLoop { shutdown, handle });

        info!(
            "batch scheduler started with max_batch_size={}, max_wait={:?}",
            self.config.max_batch_size,
            self.config.max_wait,
        );
        Ok(())
    }

    /// Stops accepting work, fails everything still queued and waits for the
    /// loop to exit. A batch that is already executing finishes normally, and
    /// the scheduler reports running until then.
    pub async fn stop(&self) {
        let running = {
            let mut state = self.lock_state();
            match std::mem::replace(&mut *state, LoopState::Stopping) {
                LoopState::Running(v) => v,
                other => {
                    *state = other;
                    debug!("stop requested, but batch scheduler is not running");
                    return;
                }
            }
        };

        let failed = self.shared.fail_queued();
        if failed > 0 {
            warn!("failed {} queued requests because the batch scheduler is stopping", failed);
        }

        let _ = running.shutdown.send(());
        let _stopped = MarkStopped(&self.state);
        if let Err(err) = running.handle.await {
            error!("batch scheduler loop ended abnormally: {:?}", err);
        }

        info!("batch scheduler stopped");
    }

    pub async fn submit(&self, payload: I) -> CompletionResult<O> {
        let result = self.submit_and_wait(payload).await;
        if let Err(err) = &result {
            self.shared.metrics.record_failure(err);
        }
        result
    }

    async fn submit_and_wait(&self, payload: I) -> CompletionResult<O> {
        let Enqueued { id, mut handle, depth } = self.shared.queue.enqueue(payload)?;
        self.shared.metrics.record_submitted(depth);

        if depth == 1 || depth >= self.config.max_batch_size.get() {
            self.shared.wake.notify_one();
        }

        let request_timeout = match self.config.request_timeout {
            Some(v) => v,
            None => return handle.await,
        };

        match timeout(request_timeout, &mut handle).await {
            Ok(result) => result,
            Err(_) => match self.shared.queue.remove(id) {
                Some(_) => {
                    debug!("request {} expired after {:?} in queue", id, request_timeout);
                    self.shared.metrics.set_queue_length(self.shared.queue.len());
                    Err(SchedulerError::Timeout(request_timeout))
                },
                // already drained, the batch result is on its way
                None => handle.await,
            },
        }
    }

    pub fn queue_depth(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn is_running(&self) -> bool {
        !matches!(*self.lock_state(), LoopState::Stopped)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn metrics(&self) -> &SchedulerMetrics {
        &self.shared.metrics
    }

    fn lock_state(&self) -> MutexGuard<'_, LoopState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Leaves `Stopping` when `stop()` finishes or its future is dropped.
struct MarkStopped<'a>(&'a Mutex<LoopState>);

impl Drop for MarkStopped<'_> {
    fn drop(&mut self) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = LoopState::Stopped;
    }
}

impl<I, O> Shared<I, O> {
    fn fail_queued(&self) -> usize {
        let items = self.queue.close_and_drain();
        self.metrics.set_queue_length(0);

        let count = items.len();
        for item in items {
            item.completion.fail(SchedulerError::SchedulerStopped);
        }
        count
    }
}

impl<I, O> Drop for BatchScheduler<I, O> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let LoopState::Running(running) = std::mem::replace(state, LoopState::Stopped) {
            self.shared.fail_queued();
            let _ = running.shutdown.send(());
        }
    }
}

async fn run_loop<I, O>(
    config: SchedulerConfig,
    shared: Arc<Shared<I, O>>,
    executor: Arc<dyn BatchExecutor<I, O>>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let max_batch_size = config.max_batch_size.get();

    loop {
        match shared.queue.oldest_arrival() {
            None => {
                tokio::select! {
                    biased;
                    _ = &mut shutdown => break,
                    _ = shared.wake.notified() => continue,
                }
            },
            Some(_) if shared.queue.len() >= max_batch_size => {},
            Some(oldest) => {
                tokio::select! {
                    biased;
                    _ = &mut shutdown => break,
                    _ = sleep_until(oldest + config.max_wait) => {},
                    _ = shared.wake.notified() => continue,
                }
            },
        }

        let batch = shared.queue.drain_up_to(max_batch_size);
        if batch.is_empty() {
            // the items we were waiting for expired in the meantime
            continue;
        }

        shared.metrics.set_queue_length(shared.queue.len());
        execute_batch(&shared.metrics, executor.as_ref(), batch).await;
    }

    debug!("batch scheduler loop finished");
}

async fn execute_batch<I, O>(metrics: &SchedulerMetrics, executor: &dyn BatchExecutor<I, O>, batch: Vec<WorkItem<I, O>>) {
    let batch_size = batch.len();
    metrics.record_batch(batch_size);

    let drained_at = Instant::now();
    let mut payloads = Vec::with_capacity(batch_size);
    let mut completers: Vec<Completer<O>> = Vec::with_capacity(batch_size);
    for item in batch {
        metrics.record_queue_wait(drained_at - item.submitted_at);
        payloads.push(item.payload);
        completers.push(item.completion);
    }

    debug!("executing batch of {} requests", batch_size);

    let result = match AssertUnwindSafe(executor.execute(payloads)).catch_unwind().await {
        Ok(Ok(output)) if output.outputs.len() == batch_size => Ok(output),
        Ok(Ok(output)) => Err(anyhow!("executor returned {} outputs for a batch of {} inputs", output.outputs.len(), batch_size)),
        Ok(Err(err)) => Err(err),
        Err(panic) => Err(anyhow!("executor panicked: {}", panic_message(panic.as_ref()))),
    };

    match result {
        Ok(BatchOutput { outputs, timing }) => {
            metrics.record_execution(timing);

            for (completer, output) in completers.into_iter().zip(outputs) {
                if !completer.succeed(output, timing, batch_size) {
                    debug!("submitter went away before its result was ready");
                }
            }

            info!("batch of {} requests completed in {:.2}ms", batch_size, timing.as_secs_f64() * 1000.0);
        },
        Err(err) => {
            error!("batch of {} requests failed: {:?}", batch_size, err);

            let err = SchedulerError::execution_failed(err);
            for completer in completers {
                completer.fail(err.clone());
            }
        },
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}
