//! Completion handles for background operations.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::task::JoinHandle;

use crate::error::WvaError;

/// Handle to an operation running on the Tokio runtime.
///
/// Await it for the result, or hand the result to a callback with
/// [`on_complete`](Self::on_complete). Dropping the handle detaches the
/// operation; it still runs to completion.
#[must_use = "await the handle or call on_complete to observe the result"]
#[derive(Debug)]
pub struct Pending<T> {
    handle: JoinHandle<Result<T, WvaError>>,
}

impl<T: Send + 'static> Pending<T> {
    /// Run `operation` in the background. Must be called inside a Tokio runtime.
    pub(crate) fn spawn<F>(operation: F) -> Self
    where
        F: Future<Output = Result<T, WvaError>> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(operation),
        }
    }

    /// Deliver the result to `callback` once the operation finishes.
    pub fn on_complete<C>(self, callback: C)
    where
        C: FnOnce(Result<T, WvaError>) + Send + 'static,
    {
        tokio::spawn(async move { callback(self.await) });
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel the operation. Awaiting the handle then yields [`WvaError::Interrupted`].
    pub fn abort(&self) {
        self.handle.abort();
    }
}

impl<T> Future for Pending<T> {
    type Output = Result<T, WvaError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().handle)
            .poll(cx)
            .map(|joined| match joined {
                Ok(result) => result,
                Err(e) => Err(WvaError::Interrupted(e.to_string())),
            })
    }
}
