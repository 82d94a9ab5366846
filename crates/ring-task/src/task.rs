//! `Task<T>` itself.

use crate::spawn::spawn_detached;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A boxed, `Send`, lazily-started future.
///
/// Nothing the future does runs until the `Task` is polled -- either
/// directly via `.await`, or by handing it to `detach()`. Dropping a
/// `Task` that was never polled simply drops the boxed future, which is
/// always safe: it never started running, so there's no partial state
/// to unwind.
pub struct Task<T> {
    future: Pin<Box<dyn Future<Output = T> + Send>>,
}

impl<T> Task<T> {
    /// Wrap `future` in a `Task`. Nothing runs yet.
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Self {
            future: Box::pin(future),
        }
    }
}

impl<T> Task<T>
where
    T: Send + 'static,
{
    /// Consume this task and hand it to the current thread's worker to
    /// run to completion with no caller awaiting the result. The task's
    /// output is discarded; if the caller needs the result, `.await` the
    /// task instead of detaching it.
    ///
    /// # Panics
    ///
    /// Panics if called on a thread that has no worker spawn hook
    /// installed (see `ring_task::set_spawn_hook`) -- i.e. off any
    /// worker thread.
    pub fn detach(self) {
        let mut future = self.future;
        spawn_detached(Box::pin(async move {
            let _ = future.as_mut().await;
        }));
    }

    /// Await only for completion, discarding the result. Useful for
    /// error-insensitive composition when a caller only needs to know a
    /// task has finished, not what it produced.
    pub fn when_ready(&mut self) -> WhenReady<'_, T> {
        WhenReady { task: self }
    }
}

/// The future returned by `Task::when_ready`.
pub struct WhenReady<'a, T> {
    task: &'a mut Task<T>,
}

impl<'a, T> Future for WhenReady<'a, T> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        match Pin::new(&mut *this.task).poll(cx) {
            Poll::Ready(_) => Poll::Ready(()),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> Future for Task<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let this = self.get_mut();
        this.future.as_mut().poll(cx)
    }
}
