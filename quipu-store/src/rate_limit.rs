//! Quota guard in front of the remote store.
//!
//! Two limits apply to every call:
//! - at most `max_concurrent` calls in flight (fair semaphore, FIFO)
//! - call starts spaced at least `min_interval` apart
//!
//! Both queues are FIFO, so excess calls run in arrival order.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::error::{Result, StoreError};
use crate::remote::{RecordMeta, RemoteStore};

pub struct RateLimiter<S> {
    inner: S,
    permits: Semaphore,
    /// Earliest instant the next call may start.
    next_start: Mutex<Instant>,
    min_interval: Duration,
}

impl<S: RemoteStore> RateLimiter<S> {
    pub fn new(inner: S, config: &RateLimitConfig) -> Self {
        Self {
            inner,
            permits: Semaphore::new(config.max_concurrent.max(1)),
            next_start: Mutex::new(Instant::now()),
            min_interval: config.min_interval(),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Calls currently allowed to start without queueing.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Reserve the next start slot and sleep until it arrives.
    async fn pace(&self) {
        let wait_until = {
            let mut next = self.next_start.lock().await;
            let now = Instant::now();
            let start = (*next).max(now);
            *next = start + self.min_interval;
            start
        };
        tokio::time::sleep_until(wait_until).await;
    }

    async fn throttled<T, F>(&self, call: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| StoreError::Transport("rate limiter closed".into()))?;
        self.pace().await;
        call.await
    }
}

#[async_trait]
impl<S: RemoteStore> RemoteStore for RateLimiter<S> {
    async fn create_key(&self) -> Result<String> {
        self.throttled(self.inner.create_key()).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.throttled(self.inner.delete(key)).await
    }

    async fn set(&self, key: &str, content: &str) -> Result<()> {
        self.throttled(self.inner.set(key, content)).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.throttled(self.inner.get(key)).await
    }

    async fn get_md5(&self, key: &str) -> Result<String> {
        self.throttled(self.inner.get_md5(key)).await
    }

    async fn get_all_keys(&self) -> Result<Vec<RecordMeta>> {
        self.throttled(self.inner.get_all_keys()).await
    }

    async fn get_settings(&self) -> Result<String> {
        self.throttled(self.inner.get_settings()).await
    }

    async fn set_settings(&self, content: &str) -> Result<()> {
        self.throttled(self.inner.set_settings(content)).await
    }

    async fn set_description(&self, key: &str, text: &str) -> Result<()> {
        self.throttled(self.inner.set_description(key, text)).await
    }
}
