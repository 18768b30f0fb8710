use {
    std::{
        collections::VecDeque,
        sync::{Mutex, MutexGuard, PoisonError},
    },
    tokio::time::Instant,
    crate::scheduling::{
        completion::{completion, Completer, CompletionHandle},
        error::SchedulerError,
    },
};

pub struct WorkItem<I, O> {
    pub id: u64,
    pub payload: I,
    pub submitted_at: Instant,
    pub completion: Completer<O>,
}

pub struct Enqueued<O> {
    pub id: u64,
    pub handle: CompletionHandle<O>,
    /// Queue length right after this item was appended.
    pub depth: usize,
}

/// Arrival-ordered intake for many producers and a single consumer.
///
/// All mutation happens under one mutex that is only held for the structural
/// change itself, never while a batch executes.
pub struct IntakeQueue<I, O> {
    inner: Mutex<QueueInner<I, O>>,
    max_depth: Option<usize>,
}

struct QueueInner<I, O> {
    items: VecDeque<WorkItem<I, O>>,
    accepting: bool,
    next_id: u64,
}

impl<I, O> IntakeQueue<I, O> {
    /// Queue starts closed: nothing is accepted until `open` is called.
    pub fn new(max_depth: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                items: VecDeque::new(),
                accepting: false,
                next_id: 0,
            }),
            max_depth,
        }
    }

    pub fn enqueue(&self, payload: I) -> Result<Enqueued<O>, SchedulerError> {
        let mut inner = self.lock();

        if !inner.accepting {
            return Err(SchedulerError::NotStarted);
        }

        if let Some(max_depth) = self.max_depth {
            if inner.items.len() >= max_depth {
                return Err(SchedulerError::QueueFull(inner.items.len()));
            }
        }

        let id = inner.next_id;
        inner.next_id += 1;

        let (completer, handle) = completion();
        inner.items.push_back(WorkItem {
            id,
            payload,
            submitted_at: Instant::now(),
            completion: completer,
        });

        Ok(Enqueued {
            id,
            handle,
            depth: inner.items.len(),
        })
    }

    pub fn drain_up_to(&self, n: usize) -> Vec<WorkItem<I, O>> {
        let mut inner = self.lock();
        let n = n.min(inner.items.len());
        inner.items.drain(..n).collect()
    }

    /// Takes a still-queued item out, keeping the others in arrival order.
    pub fn remove(&self, id: u64) -> Option<WorkItem<I, O>> {
        let mut inner = self.lock();
        // ids are handed out in increasing order, so the deque is sorted by id
        let index = inner.items.binary_search_by_key(&id, |item| item.id).ok()?;
        inner.items.remove(index)
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn oldest_arrival(&self) -> Option<Instant> {
        self.lock().items.front().map(|item| item.submitted_at)
    }

    pub fn is_accepting(&self) -> bool {
        self.lock().accepting
    }

    pub fn open(&self) {
        self.lock().accepting = true;
    }

    /// Stops accepting work and hands back everything still queued.
    pub fn close_and_drain(&self) -> Vec<WorkItem<I, O>> {
        let mut inner = self.lock();
        inner.accepting = false;
        inner.items.drain(..).collect()
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner<I, O>> {
        // no user code runs under this lock, so a poisoned queue is still consistent
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
