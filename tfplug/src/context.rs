//! Request-scoped cancellation and deadlines
//!
//! Every async trait method receives a Context as its first parameter.

use crate::error::{Result, TfplugError};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Context carries cancellation signals and deadlines across async boundaries
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    deadline: Option<Instant>,
    done_tx: watch::Sender<bool>,
}

impl Context {
    pub fn new() -> Self {
        let (done_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(ContextInner {
                deadline: None,
                done_tx,
            }),
        }
    }

    /// Derive a context that is cancelled once `timeout` elapses.
    /// Must be called from within a tokio runtime.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        let deadline = match self.inner.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        };

        let (done_tx, _) = watch::channel(*self.inner.done_tx.borrow());
        let child = Self {
            inner: Arc::new(ContextInner {
                deadline: Some(deadline),
                done_tx,
            }),
        };

        let timer = child.clone();
        let mut parent = self.inner.done_tx.subscribe();
        let parent_cancelled = async move {
            let closed = parent.wait_for(|done| *done).await.is_err();
            if closed {
                // Parent dropped without cancelling; only the deadline applies
                std::future::pending::<()>().await;
            }
        };
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline.into()) => {}
                _ = parent_cancelled => {}
            }
            timer.cancel();
        });

        child
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.done_tx.borrow()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    pub fn cancel(&self) {
        self.inner.done_tx.send_replace(true);
    }

    /// Resolves once this context is cancelled
    pub async fn cancelled(&self) {
        let mut done = self.inner.done_tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait
        let _ = done.wait_for(|done| *done).await;
    }

    /// Drive `fut` to completion unless the context is cancelled first
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        if self.is_cancelled() {
            return Err(TfplugError::Cancelled);
        }
        tokio::select! {
            value = fut => Ok(value),
            _ = self.cancelled() => Err(TfplugError::Cancelled),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test]
    async fn context_timeout_cancels() {
        let ctx = Context::new().with_timeout(Duration::from_millis(50));

        assert!(!ctx.is_cancelled());

        sleep(Duration::from_millis(150)).await;

        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn context_manual_cancel() {
        let ctx = Context::new();
        assert!(!ctx.is_cancelled());

        ctx.cancel();

        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn cancelling_parent_cancels_child() {
        let parent = Context::new();
        let child = parent.clone().with_timeout(Duration::from_secs(60));

        parent.cancel();
        tokio::time::timeout(Duration::from_secs(1), child.cancelled())
            .await
            .unwrap();
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn context_deadline() {
        let ctx = Context::new();
        assert!(ctx.deadline().is_none());

        let ctx_with_timeout = ctx.with_timeout(Duration::from_secs(1));
        assert!(ctx_with_timeout.deadline().is_some());
    }

    #[tokio::test]
    async fn run_completes_before_deadline() {
        let ctx = Context::new().with_timeout(Duration::from_secs(5));
        let value = ctx.run(async { 42 }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn run_is_interrupted_by_timeout() {
        let ctx = Context::new().with_timeout(Duration::from_millis(20));
        let result = ctx.run(sleep(Duration::from_secs(5))).await;
        assert!(matches!(result, Err(TfplugError::Cancelled)));
    }

    #[test]
    fn run_on_cancelled_context_fails_fast() {
        let ctx = Context::new();
        ctx.cancel();
        let result = tokio_test::block_on(ctx.run(async { 1 }));
        assert!(matches!(result, Err(TfplugError::Cancelled)));
    }
}
