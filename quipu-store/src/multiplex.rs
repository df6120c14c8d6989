//! Packs many logical records into few remote records.
//!
//! ```text
//!  logical keys                        remote records
//!  "0-9f3c" "1-9f3c" ... "7-9f3c" ──►  9f3c  [8 slots]
//!  "0-a71e" "1-a71e"               ──►  a71e  [2 of 8 slots]
//! ```
//!
//! A logical key is `"<slot>-<record id>"`. Creation always appends to the
//! newest record until it is full. `create_key` and `get_all_keys` share one
//! mutex so that two creations never race onto the same trailing slot and a
//! listing is never rebuilt halfway through a creation.

use async_trait::async_trait;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::chunk::Chunk;
use crate::config::{ChunkConfig, StoreConfig};
use crate::error::{Result, StoreError};
use crate::rate_limit::RateLimiter;
use crate::remote::{RecordMeta, RemoteStore};
use crate::retry::RetryingStore;

/// Build a logical key from a slot and its record id.
pub fn logical_key(slot: usize, record_id: &str) -> String {
    format!("{slot}-{record_id}")
}

/// Split a logical key into `(slot, record id)`.
pub fn split_logical_key(key: &str) -> Result<(usize, &str)> {
    let (slot, record_id) = key
        .split_once('-')
        .ok_or_else(|| StoreError::InvalidKey(key.to_string()))?;
    let slot = slot
        .parse::<usize>()
        .map_err(|_| StoreError::InvalidKey(key.to_string()))?;
    if record_id.is_empty() {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok((slot, record_id))
}

/// The canonical stack over a backend: multiplexor, retry, rate limit.
pub type LayeredStore<S> = Multiplexor<RetryingStore<RateLimiter<S>>>;

/// Compose the full decorator chain over `backend`.
pub fn layered<S: RemoteStore + 'static>(backend: S, config: &StoreConfig) -> LayeredStore<S> {
    let limited = RateLimiter::new(backend, &config.rate_limit);
    let retrying = RetryingStore::new(limited, config.retry.clone());
    Multiplexor::new(retrying, config.chunk.clone())
}

pub struct Multiplexor<S> {
    store: Arc<S>,
    config: ChunkConfig,
    chunks: RwLock<HashMap<String, Arc<Chunk<S>>>>,
    /// Newest record of the last listing, target of the next creation
    tail: Mutex<Option<String>>,
    synced: AtomicBool,
    /// Serializes `create_key` and `get_all_keys`
    gate: Mutex<()>,
}

impl<S: RemoteStore + 'static> Multiplexor<S> {
    pub fn new(store: S, config: ChunkConfig) -> Self {
        Self {
            store: Arc::new(store),
            config,
            chunks: RwLock::new(HashMap::new()),
            tail: Mutex::new(None),
            synced: AtomicBool::new(false),
            gate: Mutex::new(()),
        }
    }

    /// The store underneath the multiplexor.
    pub fn inner(&self) -> &S {
        &self.store
    }

    pub async fn chunk_count(&self) -> usize {
        self.chunks.read().await.len()
    }

    pub async fn chunk(&self, record_id: &str) -> Option<Arc<Chunk<S>>> {
        self.chunks.read().await.get(record_id).cloned()
    }

    /// Write every pending debounced change now.
    pub async fn flush_all(&self) -> Result<()> {
        let chunks: Vec<_> = self.chunks.read().await.values().cloned().collect();
        join_all(chunks.iter().map(|chunk| chunk.flush()))
            .await
            .into_iter()
            .collect()
    }

    async fn route(&self, key: &str) -> Result<Option<(usize, Arc<Chunk<S>>)>> {
        let (slot, record_id) = split_logical_key(key)?;
        Ok(self.chunk(record_id).await.map(|chunk| (slot, chunk)))
    }

    async fn forget(&self, record_id: &str) {
        self.chunks.write().await.remove(record_id);
        let mut tail = self.tail.lock().await;
        if tail.as_deref() == Some(record_id) {
            *tail = None;
        }
    }

    /// A chunk that deleted its record during the call reads as an unknown
    /// record from then on.
    async fn absorb_removed<T: Default>(&self, chunk: &Chunk<S>, result: Result<T>) -> Result<T> {
        match result {
            Err(StoreError::ChunkRemoved { .. }) => {
                self.forget(chunk.id()).await;
                Ok(T::default())
            }
            other => other,
        }
    }

    async fn create_key_locked(&self) -> Result<String> {
        if !self.synced.load(Ordering::SeqCst) {
            return Err(StoreError::NotSynced);
        }

        let tail = self.tail.lock().await.clone();
        if let Some(record_id) = tail {
            if let Some(chunk) = self.chunk(&record_id).await {
                match chunk.create_slot().await {
                    Ok(slot) => return Ok(logical_key(slot, &record_id)),
                    Err(StoreError::ChunkFull { .. }) => {}
                    Err(StoreError::ChunkRemoved { .. }) => self.forget(&record_id).await,
                    Err(e) => return Err(e),
                }
            }
        }

        let record_id = self.store.create_key().await?;
        log::info!("created record {record_id}");
        let chunk = Chunk::created(Arc::clone(&self.store), record_id.clone(), self.config.clone());
        let slot = chunk.create_slot().await?;
        self.chunks.write().await.insert(record_id.clone(), chunk);
        *self.tail.lock().await = Some(record_id.clone());
        Ok(logical_key(slot, &record_id))
    }

    async fn get_all_keys_locked(&self) -> Result<Vec<RecordMeta>> {
        let records = self.store.get_all_keys().await?;
        let mut previous = self.chunks.read().await.clone();
        let previous_tail = self.tail.lock().await.clone();

        let mut chunks = HashMap::with_capacity(records.len());
        let mut listed = Vec::new();
        for record in &records {
            let (chunk, outdated) = match previous.remove(&record.id) {
                Some(chunk) => {
                    // Deleted by us; the listing has not caught up yet.
                    if chunk.is_removed().await {
                        continue;
                    }
                    let outdated = chunk
                        .on_metadata_update(
                            record.description.as_deref(),
                            record.md5_checksum.as_deref(),
                        )
                        .await;
                    (chunk, outdated)
                }
                None => (
                    Chunk::from_remote(Arc::clone(&self.store), record, self.config.clone()),
                    false,
                ),
            };
            for (slot, description) in chunk.live_descriptions().await {
                listed.push(RecordMeta {
                    id: logical_key(slot, &record.id),
                    description: Some(description),
                    md5_checksum: None,
                    outdated,
                });
            }
            chunks.insert(record.id.clone(), chunk);
        }

        // Listings can lag behind records created here. Chunks with unsaved
        // changes stay routable until a listing shows them.
        let mut retained = Vec::new();
        for (id, chunk) in previous {
            if chunk.is_removed().await || !chunk.has_unsaved_changes().await {
                continue;
            }
            log::debug!("record {id} not listed yet; keeping its chunk");
            chunk.resume_pending_writes().await;
            retained.push(id.clone());
            chunks.insert(id, chunk);
        }

        let tail = match previous_tail {
            Some(id) if retained.contains(&id) => Some(id),
            _ => records
                .iter()
                .rev()
                .map(|r| r.id.clone())
                .find(|id| chunks.contains_key(id)),
        };
        log::debug!(
            "listing: {} records, {} logical keys",
            chunks.len(),
            listed.len()
        );
        *self.chunks.write().await = chunks;
        *self.tail.lock().await = tail;
        self.synced.store(true, Ordering::SeqCst);
        Ok(listed)
    }
}

#[async_trait]
impl<S: RemoteStore + 'static> RemoteStore for Multiplexor<S> {
    /// Allocate a logical key. Fails with [`StoreError::NotSynced`] before
    /// the first listing.
    async fn create_key(&self) -> Result<String> {
        let _gate = self.gate.lock().await;
        self.create_key_locked().await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let Some((slot, chunk)) = self.route(key).await? else {
            return Ok(false);
        };
        let deleted = chunk.delete(slot).await?;
        if chunk.is_removed().await {
            self.forget(chunk.id()).await;
        }
        Ok(deleted)
    }

    async fn set(&self, key: &str, content: &str) -> Result<()> {
        match self.route(key).await? {
            Some((slot, chunk)) => {
                let result = chunk.set_value(slot, content).await;
                self.absorb_removed(&chunk, result).await
            }
            None => Ok(()),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self.route(key).await? {
            Some((slot, chunk)) => {
                let result = chunk.get_value(slot).await;
                self.absorb_removed(&chunk, result).await
            }
            None => Ok(None),
        }
    }

    /// Logical records have no checksum of their own; use the `outdated`
    /// flag of [`RemoteStore::get_all_keys`] instead.
    async fn get_md5(&self, _key: &str) -> Result<String> {
        Err(StoreError::Unsupported("get_md5"))
    }

    async fn get_all_keys(&self) -> Result<Vec<RecordMeta>> {
        let _gate = self.gate.lock().await;
        self.get_all_keys_locked().await
    }

    async fn get_settings(&self) -> Result<String> {
        self.store.get_settings().await
    }

    async fn set_settings(&self, content: &str) -> Result<()> {
        self.store.set_settings(content).await
    }

    async fn set_description(&self, key: &str, text: &str) -> Result<()> {
        match self.route(key).await? {
            Some((slot, chunk)) => {
                let result = chunk.set_description(slot, Some(text)).await;
                self.absorb_removed(&chunk, result).await
            }
            None => Ok(()),
        }
    }
}
