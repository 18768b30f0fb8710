use {
    std::{
        future::Future,
        pin::Pin,
        task::{Context, Poll},
        time::Duration,
    },
    tokio::sync::oneshot,
    crate::scheduling::error::SchedulerError,
};

/// Successful result of one request: its slice of the batch output plus the
/// execution time of the whole batch it was part of.
#[derive(Debug, Clone, PartialEq)]
pub struct Completed<O> {
    pub output: O,
    pub timing: Duration,
    pub batch_size: usize,
}

pub type CompletionResult<O> = Result<Completed<O>, SchedulerError>;

/// Creates a connected completer/handle pair.
pub fn completion<O>() -> (Completer<O>, CompletionHandle<O>) {
    let (sender, receiver) = oneshot::channel();
    (Completer { sender }, CompletionHandle { receiver })
}

/// Resolving side of a completion cell. Owned by the queue until the item is
/// drained, then by the scheduler loop.
///
/// `resolve` takes `self`, so a cell can only ever be resolved once:
///
/// ```compile_fail
/// use inference_server::scheduling::completion::completion;
///
/// let (completer, _handle) = completion::<u32>();
/// completer.fail(inference_server::scheduling::SchedulerError::SchedulerStopped);
/// completer.fail(inference_server::scheduling::SchedulerError::SchedulerStopped);
/// ```
#[derive(Debug)]
pub struct Completer<O> {
    sender: oneshot::Sender<CompletionResult<O>>,
}

impl<O> Completer<O> {
    /// Returns `false` when the submitter is no longer waiting for the result.
    pub fn resolve(self, result: CompletionResult<O>) -> bool {
        self.sender.send(result).is_ok()
    }

    pub fn succeed(self, output: O, timing: Duration, batch_size: usize) -> bool {
        self.resolve(Ok(Completed { output, timing, batch_size }))
    }

    pub fn fail(self, err: SchedulerError) -> bool {
        self.resolve(Err(err))
    }

    pub fn is_abandoned(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Awaiting side of a completion cell, held by the submitter.
#[derive(Debug)]
pub struct CompletionHandle<O> {
    receiver: oneshot::Receiver<CompletionResult<O>>,
}

impl<O> Future for CompletionHandle<O> {
    type Output = CompletionResult<O>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            // completer dropped without an answer: the loop went away
            .map(|result| result.unwrap_or(Err(SchedulerError::SchedulerStopped)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_with_output_and_timing() {
        let (completer, handle) = completion();

        assert!(completer.succeed("cat", Duration::from_millis(12), 3));

        let completed = handle.await.unwrap();
        assert_eq!(completed.output, "cat");
        assert_eq!(completed.timing, Duration::from_millis(12));
        assert_eq!(completed.batch_size, 3);
    }

    #[tokio::test]
    async fn dropped_completer_reports_stopped() {
        let (completer, handle) = completion::<u32>();
        drop(completer);

        assert!(matches!(handle.await, Err(SchedulerError::SchedulerStopped)));
    }

    #[test]
    fn resolving_for_departed_submitter_is_ignored() {
        let (completer, handle) = completion::<u32>();
        drop(handle);

        assert!(completer.is_abandoned());
        assert!(!completer.fail(SchedulerError::SchedulerStopped));
    }
}
