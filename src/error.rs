// src/error.rs
// Typed failure kinds shared across the service

use thiserror::Error;

/// Service-level error kinds. Business outcomes (no matches, follow-up
/// questions) are ordinary return values, not errors — only genuine failures
/// live here.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("product not found: {0}")]
    ProductNotFound(String),

    #[error("rate limited by upstream provider")]
    RateLimited,

    #[error("LLM call failed: {0}")]
    LlmFailure(String),

    #[error("encoder not configured")]
    MissingEncoder,

    #[error("phrase store queried before preload completed")]
    PhraseStoreNotReady,

    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("transient storage failure: {0}")]
    TransientStorage(String),

    #[error("data error: {0}")]
    Data(String),

    #[error("request cancelled")]
    Cancelled,

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ServiceError {
    /// Whether an idempotent read may be retried once (spec: transient
    /// storage errors retry with backoff; writes never do).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::TransientStorage(_) | ServiceError::Database(_) | ServiceError::Http(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Retry an idempotent read once with a short backoff when it fails
/// transiently. Writes must never go through here.
pub async fn retry_once<T, F, Fut>(operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    match operation().await {
        Err(e) if e.is_retryable() => {
            tracing::warn!("Transient read failure ({}); retrying once", e);
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            operation().await
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_retry_once_recovers() {
        let attempts = AtomicUsize::new(0);
        let result = retry_once(|| async {
            if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ServiceError::TransientStorage("blip".into()))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_once_does_not_retry_terminal_errors() {
        let attempts = AtomicUsize::new(0);
        let result: Result<i32> = retry_once(|| async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(ServiceError::InvalidQuery("bad".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
