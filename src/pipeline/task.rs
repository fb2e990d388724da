use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::task::JoinHandle;

use crate::error::{ErrorKind, PipelineError, Result};

/// Completion signal of a stage running on its own task.
///
/// Resolves to the stage's result; a panicked or cancelled task resolves to
/// an error of the stage's kind instead of propagating the panic.
#[must_use = "a stage signal does nothing unless awaited"]
pub struct StageSignal<T> {
    stage: &'static str,
    kind: ErrorKind,
    handle: JoinHandle<Result<T>>,
}

impl<T: Send + 'static> StageSignal<T> {
    pub(crate) fn spawn<F>(stage: &'static str, kind: ErrorKind, work: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            stage,
            kind,
            handle: tokio::spawn(work),
        }
    }
}

impl<T> Future for StageSignal<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let stage = self.stage;
        let kind = self.kind;
        Pin::new(&mut self.handle).poll(cx).map(|joined| match joined {
            Ok(result) => result,
            Err(e) => Err(PipelineError::new(kind, format!("{} task failed: {}", stage, e))),
        })
    }
}
