//! Exponential-backoff retry decorator.
//!
//! Wrap it around the rate limiter, not inside it: a retried call then goes
//! back through the quota queue instead of jumping it.
//!
//! ```text
//! attempt 1 ──✗── sleep base·2¹ ── attempt 2 ──✗── sleep base·2² ── ...
//!                                        attempt max ──✗── RetriesExhausted
//! ```

use async_trait::async_trait;
use std::future::Future;

use crate::config::RetryConfig;
use crate::error::{Result, StoreError};
use crate::remote::{RecordMeta, RemoteStore};

pub struct RetryingStore<S> {
    inner: S,
    config: RetryConfig,
}

impl<S: RemoteStore> RetryingStore<S> {
    pub fn new(inner: S, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn retry<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt >= max_attempts => {
                    log::error!("{operation} gave up after {attempt} attempts: {e}");
                    return Err(StoreError::RetriesExhausted {
                        operation,
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    let delay = self.config.backoff(attempt);
                    log::warn!("{operation} attempt {attempt} failed ({e}); retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[async_trait]
impl<S: RemoteStore> RemoteStore for RetryingStore<S> {
    async fn create_key(&self) -> Result<String> {
        self.retry("create_key", || self.inner.create_key()).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.retry("delete", || self.inner.delete(key)).await
    }

    async fn set(&self, key: &str, content: &str) -> Result<()> {
        self.retry("set", || self.inner.set(key, content)).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.retry("get", || self.inner.get(key)).await
    }

    async fn get_md5(&self, key: &str) -> Result<String> {
        self.retry("get_md5", || self.inner.get_md5(key)).await
    }

    async fn get_all_keys(&self) -> Result<Vec<RecordMeta>> {
        self.retry("get_all_keys", || self.inner.get_all_keys()).await
    }

    async fn get_settings(&self) -> Result<String> {
        self.retry("get_settings", || self.inner.get_settings()).await
    }

    async fn set_settings(&self, content: &str) -> Result<()> {
        self.retry("set_settings", || self.inner.set_settings(content))
            .await
    }

    async fn set_description(&self, key: &str, text: &str) -> Result<()> {
        self.retry("set_description", || self.inner.set_description(key, text))
            .await
    }
}
