//! The record-store capability shared by every layer of the stack.
//!
//! A backend, each decorator, and the multiplexor all implement
//! [`RemoteStore`], so layers compose by construction order:
//!
//! ```text
//! Multiplexor ──► RetryingStore ──► RateLimiter ──► backend
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::Result;

/// Identity and version marker of one record, as listed by `get_all_keys`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    pub id: String,
    pub description: Option<String>,
    /// Opaque version marker; changes whenever the content changes
    pub md5_checksum: Option<String>,
    /// Cached content is known stale and will be refetched on next read.
    /// Backends always report `false`; the multiplexor fills it per chunk.
    #[serde(default)]
    pub outdated: bool,
}

impl RecordMeta {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

/// Remote key-value file store.
///
/// Every call fails with [`crate::StoreError::Unauthenticated`] while no
/// session is signed in.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn create_key(&self) -> Result<String>;

    /// Returns `false` when the key did not exist.
    async fn delete(&self, key: &str) -> Result<bool>;

    async fn set(&self, key: &str, content: &str) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn get_md5(&self, key: &str) -> Result<String>;

    /// All records, ordered by creation time.
    async fn get_all_keys(&self) -> Result<Vec<RecordMeta>>;

    async fn get_settings(&self) -> Result<String>;

    async fn set_settings(&self, content: &str) -> Result<()>;

    async fn set_description(&self, key: &str, text: &str) -> Result<()>;
}

#[async_trait]
impl<S: RemoteStore + ?Sized> RemoteStore for Arc<S> {
    async fn create_key(&self) -> Result<String> {
        (**self).create_key().await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        (**self).delete(key).await
    }

    async fn set(&self, key: &str, content: &str) -> Result<()> {
        (**self).set(key, content).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key).await
    }

    async fn get_md5(&self, key: &str) -> Result<String> {
        (**self).get_md5(key).await
    }

    async fn get_all_keys(&self) -> Result<Vec<RecordMeta>> {
        (**self).get_all_keys().await
    }

    async fn get_settings(&self) -> Result<String> {
        (**self).get_settings().await
    }

    async fn set_settings(&self, content: &str) -> Result<()> {
        (**self).set_settings(content).await
    }

    async fn set_description(&self, key: &str, text: &str) -> Result<()> {
        (**self).set_description(key, text).await
    }
}
