//! The backend adapter trait: one implementation per chain family.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::IndexerError;
use crate::policy::RateLimiter;
use crate::types::{Event, EventFilter};

/// Per-call context handed to every backend method.
///
/// Adapters route each blocking I/O call through [`CallContext::call`], which
/// takes a rate-limiter token first and abandons the call when the indexer is
/// cancelled.
#[derive(Debug, Clone)]
pub struct CallContext {
    cancel: CancellationToken,
    limiter: Arc<RateLimiter>,
}

impl CallContext {
    pub fn new(cancel: CancellationToken, limiter: Arc<RateLimiter>) -> Self {
        Self { cancel, limiter }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fail fast with [`IndexerError::Cancelled`] if the token has fired.
    pub fn ensure_active(&self) -> Result<(), IndexerError> {
        if self.cancel.is_cancelled() {
            Err(IndexerError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Run one rate-limited, cancellable I/O call.
    pub async fn call<T, Fut>(&self, fut: Fut) -> Result<T, IndexerError>
    where
        Fut: Future<Output = Result<T, IndexerError>>,
    {
        self.limiter.wait(&self.cancel).await?;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(IndexerError::Cancelled),
            res = fut => res,
        }
    }
}

/// A chain-specific source of heights and events.
///
/// Implementations must be read-only: calling `fetch_events` twice for the same
/// range against the same chain state yields identical results.
#[async_trait]
pub trait BackendAdapter: Send + Sync + 'static {
    /// Short backend name used in logs (e.g. `"evm"`).
    fn name(&self) -> &str;

    /// Chain-specific validation of the filter (address format, known
    /// event schemas). Called once from `Indexer::run`.
    fn validate_filter(&self, filter: &EventFilter) -> Result<(), IndexerError> {
        let _ = filter;
        Ok(())
    }

    /// Latest height the backend considers confirmed.
    async fn latest_height(&self, cx: &CallContext) -> Result<u64, IndexerError>;

    /// Every event in `[from, to]` (inclusive) matching `filter`.
    async fn fetch_events(
        &self,
        cx: &CallContext,
        from: u64,
        to: u64,
        filter: &EventFilter,
    ) -> Result<Vec<Event>, IndexerError>;
}

#[async_trait]
impl<B: BackendAdapter + ?Sized> BackendAdapter for Arc<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn validate_filter(&self, filter: &EventFilter) -> Result<(), IndexerError> {
        (**self).validate_filter(filter)
    }

    async fn latest_height(&self, cx: &CallContext) -> Result<u64, IndexerError> {
        (**self).latest_height(cx).await
    }

    async fn fetch_events(
        &self,
        cx: &CallContext,
        from: u64,
        to: u64,
        filter: &EventFilter,
    ) -> Result<Vec<Event>, IndexerError> {
        (**self).fetch_events(cx, from, to, filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::RateLimiterConfig;
    use std::time::Duration;

    fn cx(cancel: CancellationToken) -> CallContext {
        CallContext::new(
            cancel,
            Arc::new(RateLimiter::new(RateLimiterConfig::per_second(100.0))),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn call_passes_result_through() {
        let cx = cx(CancellationToken::new());
        assert_eq!(cx.call(async { Ok(7u64) }).await.unwrap(), 7);
        assert!(cx.ensure_active().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn call_abandons_blocked_io_on_cancel() {
        let cancel = CancellationToken::new();
        let cx = cx(cancel.clone());
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });
        let res: Result<(), _> = cx.call(futures::future::pending()).await;
        assert!(matches!(res, Err(IndexerError::Cancelled)));
        assert!(cx.ensure_active().is_err());
    }
}
