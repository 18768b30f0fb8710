use {
    std::{
        sync::{Arc, Mutex, atomic::{AtomicUsize, Ordering}},
        time::Duration,
    },
    async_trait::async_trait,
    anyhow::bail,
    futures::future::join_all,
    prometheus::Registry,
    tokio::time::{Instant, sleep},
    inference_server::scheduling::{
        BatchExecutor,
        BatchOutput,
        BatchScheduler,
        SchedulerConfig,
        SchedulerError,
        SchedulerMetrics,
    },
};

/// Echoes its inputs after `delay` and remembers every batch it saw.
#[derive(Clone, Default)]
struct EchoExecutor {
    delay: Duration,
    batches: Arc<Mutex<Vec<Vec<u32>>>>,
    fired_at: Arc<Mutex<Vec<Instant>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl EchoExecutor {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    fn batches(&self) -> Vec<Vec<u32>> {
        self.batches.lock().unwrap().clone()
    }

    fn batch_sizes(&self) -> Vec<usize> {
        self.batches().iter().map(|batch| batch.len()).collect()
    }
}

#[async_trait]
impl BatchExecutor<u32, u32> for EchoExecutor {
    async fn execute(&self, batch: Vec<u32>) -> anyhow::Result<BatchOutput<u32>> {
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        let started_at = Instant::now();
        self.fired_at.lock().unwrap().push(started_at);
        self.batches.lock().unwrap().push(batch.clone());

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(BatchOutput::new(batch, started_at.elapsed()))
    }
}

struct FailingExecutor;

#[async_trait]
impl BatchExecutor<u32, u32> for FailingExecutor {
    async fn execute(&self, batch: Vec<u32>) -> anyhow::Result<BatchOutput<u32>> {
        bail!("cannot run a batch of {}", batch.len())
    }
}

fn scheduler(config: SchedulerConfig) -> BatchScheduler<u32, u32> {
    BatchScheduler::new(config, SchedulerMetrics::new(&Registry::new()).unwrap())
}

fn config(max_batch_size: usize, max_wait_ms: u64) -> SchedulerConfig {
    SchedulerConfig::new(max_batch_size, Duration::from_millis(max_wait_ms)).unwrap()
}

#[tokio::test(start_paused = true)]
async fn outputs_follow_submission_order() {
    let executor = EchoExecutor::default();
    let scheduler = scheduler(config(4, 50));
    scheduler.start(executor.clone()).unwrap();

    let (a, b, c) = tokio::join!(scheduler.submit(10), scheduler.submit(20), scheduler.submit(30));

    assert_eq!(a.unwrap().output, 10);
    assert_eq!(b.unwrap().output, 20);
    assert_eq!(c.unwrap().output, 30);
    assert_eq!(executor.batches(), vec![vec![10, 20, 30]]);

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn three_items_fire_once_max_wait_elapses() {
    let executor = EchoExecutor::with_delay(Duration::from_millis(10));
    let scheduler = scheduler(config(4, 50));
    scheduler.start(executor.clone()).unwrap();

    let started_at = Instant::now();
    let results = join_all((1..=3).map(|v| scheduler.submit(v))).await;
    let finished_at = started_at.elapsed();

    let fired_at = executor.fired_at.lock().unwrap()[0] - started_at;
    assert!(fired_at >= Duration::from_millis(50), "fired after {:?}", fired_at);
    assert!(fired_at <= Duration::from_millis(52), "fired after {:?}", fired_at);
    assert!(finished_at >= Duration::from_millis(60) && finished_at <= Duration::from_millis(65), "finished after {:?}", finished_at);

    let results: Vec<_> = results.into_iter().map(|result| result.unwrap()).collect();
    assert_eq!(results.iter().map(|v| v.output).collect::<Vec<_>>(), vec![1, 2, 3]);
    for result in &results {
        assert_eq!(result.timing, results[0].timing);
        assert_eq!(result.batch_size, 3);
        assert!(result.timing >= Duration::from_millis(10) && result.timing < Duration::from_millis(12));
    }
    assert_eq!(executor.batch_sizes(), vec![3]);

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn full_batch_fires_without_waiting() {
    let executor = EchoExecutor::default();
    let scheduler = scheduler(config(4, 1_000));
    scheduler.start(executor.clone()).unwrap();

    let started_at = Instant::now();
    let results = join_all((0..4).map(|v| scheduler.submit(v))).await;

    assert!(started_at.elapsed() < Duration::from_millis(5), "waited {:?}", started_at.elapsed());
    assert!(results.iter().all(|result| result.is_ok()));
    assert_eq!(executor.batch_sizes(), vec![4]);

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn single_item_is_drained_within_max_wait() {
    let executor = EchoExecutor::default();
    let scheduler = scheduler(config(8, 25));
    scheduler.start(executor.clone()).unwrap();

    let started_at = Instant::now();
    scheduler.submit(1).await.unwrap();

    assert!(started_at.elapsed() <= Duration::from_millis(27), "waited {:?}", started_at.elapsed());

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn ten_items_make_three_batches() {
    let executor = EchoExecutor::default();
    let scheduler = scheduler(config(4, 50));
    scheduler.start(executor.clone()).unwrap();

    let results = join_all((0..10).map(|v| scheduler.submit(v))).await;

    assert_eq!(results.into_iter().map(|result| result.unwrap().output).collect::<Vec<_>>(), (0..10).collect::<Vec<_>>());
    assert_eq!(executor.batches(), vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7], vec![8, 9]]);
    assert_eq!(scheduler.metrics().batches_total(), 3);

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn batch_size_never_exceeds_limit() {
    let executor = EchoExecutor::with_delay(Duration::from_millis(3));
    let scheduler = Arc::new(scheduler(config(3, 5)));
    scheduler.start(executor.clone()).unwrap();

    let tasks: Vec<_> = (0..40u32)
        .map(|v| {
            let scheduler = scheduler.clone();
            tokio::spawn(async move {
                sleep(Duration::from_millis((v % 7) as u64)).await;
                scheduler.submit(v).await
            })
        })
        .collect();

    for (v, task) in tasks.into_iter().enumerate() {
        assert_eq!(task.await.unwrap().unwrap().output, v as u32);
    }

    assert!(executor.batch_sizes().iter().all(|size| *size >= 1 && *size <= 3));
    assert_eq!(executor.batch_sizes().iter().sum::<usize>(), 40);
    assert_eq!(executor.max_in_flight.load(Ordering::SeqCst), 1);

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn failed_batch_fails_every_item_with_the_same_error() {
    let scheduler = scheduler(config(4, 10));
    scheduler.start(FailingExecutor).unwrap();

    let results = join_all((0..3).map(|v| scheduler.submit(v))).await;

    let causes: Vec<_> = results
        .into_iter()
        .map(|result| match result {
            Err(SchedulerError::ExecutionFailed(cause)) => cause,
            other => panic!("expected execution failure, got {:?}", other),
        })
        .collect();

    assert!(causes.iter().all(|cause| Arc::ptr_eq(cause, &causes[0])));
    assert_eq!(causes[0].to_string(), "cannot run a batch of 3");
    assert_eq!(scheduler.metrics().failures_total("execution_failed"), 3);

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn failed_batch_does_not_affect_later_batches() {
    struct FailFirst {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl BatchExecutor<u32, u32> for FailFirst {
        async fn execute(&self, batch: Vec<u32>) -> anyhow::Result<BatchOutput<u32>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                bail!("first batch is poisoned");
            }
            Ok(BatchOutput::new(batch, Duration::ZERO))
        }
    }

    let scheduler = scheduler(config(2, 10));
    scheduler.start(FailFirst { calls: AtomicUsize::new(0) }).unwrap();

    let first = join_all((0..2).map(|v| scheduler.submit(v))).await;
    let second = join_all((2..4).map(|v| scheduler.submit(v))).await;

    assert!(first.iter().all(|result| result.is_err()));
    assert_eq!(second.into_iter().map(|result| result.unwrap().output).collect::<Vec<_>>(), vec![2, 3]);

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stop_finishes_running_batch_and_fails_queued_items() {
    let executor = EchoExecutor::with_delay(Duration::from_millis(100));
    let scheduler = Arc::new(scheduler(config(1, 10)));
    scheduler.start(executor.clone()).unwrap();

    let running = tokio::spawn({
        let scheduler = scheduler.clone();
        async move { scheduler.submit(1).await }
    });
    sleep(Duration::from_millis(1)).await;
    let queued = tokio::spawn({
        let scheduler = scheduler.clone();
        async move { scheduler.submit(2).await }
    });
    sleep(Duration::from_millis(1)).await;
    assert_eq!(scheduler.queue_depth(), 1);

    scheduler.stop().await;

    assert_eq!(running.await.unwrap().unwrap().output, 1);
    assert!(matches!(queued.await.unwrap(), Err(SchedulerError::SchedulerStopped)));
    assert!(matches!(scheduler.submit(3).await, Err(SchedulerError::NotStarted)));
    assert_eq!(scheduler.queue_depth(), 0);
    assert_eq!(executor.batches(), vec![vec![1]]);
}

#[tokio::test(start_paused = true)]
async fn queued_request_times_out_without_reaching_the_executor() {
    let executor = EchoExecutor::default();
    let scheduler = scheduler(config(4, 50).with_request_timeout(Duration::from_millis(20)));
    scheduler.start(executor.clone()).unwrap();

    let started_at = Instant::now();
    let result = scheduler.submit(1).await;

    assert!(matches!(result, Err(SchedulerError::Timeout(timeout)) if timeout == Duration::from_millis(20)));
    assert!(started_at.elapsed() < Duration::from_millis(25));
    assert_eq!(scheduler.queue_depth(), 0);

    sleep(Duration::from_millis(100)).await;
    assert!(executor.batches().is_empty());

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn drained_request_outlives_its_queue_timeout() {
    let executor = EchoExecutor::with_delay(Duration::from_millis(100));
    let scheduler = scheduler(config(1, 50).with_request_timeout(Duration::from_millis(20)));
    scheduler.start(executor.clone()).unwrap();

    assert_eq!(scheduler.submit(5).await.unwrap().output, 5);

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn timed_out_item_leaves_the_rest_in_order() {
    let executor = EchoExecutor::default();
    let scheduler = Arc::new(scheduler(config(4, 50).with_request_timeout(Duration::from_millis(30))));
    scheduler.start(executor.clone()).unwrap();

    // first item expires before the batch fires, the two later ones do not
    let first = tokio::spawn({
        let scheduler = scheduler.clone();
        async move { scheduler.submit(1).await }
    });
    sleep(Duration::from_millis(25)).await;
    let rest = join_all((2..4).map(|v| scheduler.submit(v))).await;

    assert!(matches!(first.await.unwrap(), Err(SchedulerError::Timeout(_))));
    assert_eq!(rest.into_iter().map(|result| result.unwrap().output).collect::<Vec<_>>(), vec![2, 3]);
    assert_eq!(executor.batches(), vec![vec![2, 3]]);

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn bounded_queue_rejects_overflow() {
    let executor = EchoExecutor::default();
    let scheduler = scheduler(config(8, 50).with_max_queue_depth(2));
    scheduler.start(executor.clone()).unwrap();

    let (a, b, c) = tokio::join!(scheduler.submit(1), scheduler.submit(2), scheduler.submit(3));

    assert_eq!(a.unwrap().output, 1);
    assert_eq!(b.unwrap().output, 2);
    assert!(matches!(c, Err(SchedulerError::QueueFull(2))));
    assert_eq!(scheduler.metrics().failures_total("queue_full"), 1);

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn unbounded_queue_grows_while_executor_is_busy() {
    let executor = EchoExecutor::with_delay(Duration::from_secs(10));
    let scheduler = Arc::new(scheduler(config(2, 5)));
    scheduler.start(executor.clone()).unwrap();

    let tasks: Vec<_> = (0..50u32)
        .map(|v| {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.submit(v).await })
        })
        .collect();
    sleep(Duration::from_millis(10)).await;

    assert_eq!(scheduler.queue_depth(), 48);
    assert_eq!(scheduler.metrics().queue_length(), 48);

    scheduler.stop().await;
    let stopped = join_all(tasks).await
        .into_iter()
        .filter(|result| matches!(result, Ok(Err(SchedulerError::SchedulerStopped))))
        .count();
    assert_eq!(stopped, 48);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submitters_each_get_their_own_output() {
    let executor = EchoExecutor::with_delay(Duration::from_millis(1));
    let scheduler = Arc::new(scheduler(config(8, 5)));
    scheduler.start(executor.clone()).unwrap();

    let tasks: Vec<_> = (0..200u32)
        .map(|v| {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { (v, scheduler.submit(v).await) })
        })
        .collect();

    for task in tasks {
        let (v, result) = task.await.unwrap();
        assert_eq!(result.unwrap().output, v);
    }

    let sizes = executor.batch_sizes();
    assert!(sizes.iter().all(|size| *size <= 8));
    assert_eq!(sizes.iter().sum::<usize>(), 200);
    assert_eq!(executor.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(scheduler.metrics().requests_total(), 200);

    scheduler.stop().await;
}
