//! In-process [`RemoteStore`] backend.
//!
//! Behaves like the hosted file store the engine targets: records listed in
//! creation order, an MD5 checksum per content, descriptions stored as
//! metadata, and every call rejected while signed out. Fault injection and
//! call counters make it the workhorse of the test suites.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::remote::{RecordMeta, RemoteStore};

pub use crate::codec::md5_hex;

#[derive(Debug, Clone, Default)]
struct StoredRecord {
    id: String,
    content: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Default)]
struct Inner {
    /// Creation order
    records: Vec<StoredRecord>,
    settings: String,
    calls: HashMap<&'static str, u32>,
}

impl Inner {
    fn find_mut(&mut self, key: &str) -> Option<&mut StoredRecord> {
        self.records.iter_mut().find(|r| r.id == key)
    }
}

/// Shared in-memory record store.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    signed_in: AtomicBool,
    fail_next: AtomicU32,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty, signed-in store.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            signed_in: AtomicBool::new(true),
            fail_next: AtomicU32::new(0),
        }
    }

    pub fn set_signed_in(&self, signed_in: bool) {
        self.signed_in.store(signed_in, Ordering::SeqCst);
    }

    /// Fail the next `n` calls with a transport error.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Write content directly, bypassing auth and fault injection.
    pub fn raw_put(&self, key: &str, content: &str) {
        let mut inner = self.lock();
        match inner.find_mut(key) {
            Some(record) => record.content = Some(content.to_string()),
            None => inner.records.push(StoredRecord {
                id: key.to_string(),
                content: Some(content.to_string()),
                description: None,
            }),
        }
    }

    /// Set a description directly, bypassing auth and fault injection.
    pub fn raw_describe(&self, key: &str, description: &str) {
        if let Some(record) = self.lock().find_mut(key) {
            record.description = Some(description.to_string());
        }
    }

    pub fn raw_get(&self, key: &str) -> Option<String> {
        self.lock()
            .records
            .iter()
            .find(|r| r.id == key)
            .and_then(|r| r.content.clone())
    }

    pub fn raw_description(&self, key: &str) -> Option<String> {
        self.lock()
            .records
            .iter()
            .find(|r| r.id == key)
            .and_then(|r| r.description.clone())
    }

    /// Record ids in creation order.
    pub fn record_ids(&self) -> Vec<String> {
        self.lock().records.iter().map(|r| r.id.clone()).collect()
    }

    pub fn record_count(&self) -> usize {
        self.lock().records.len()
    }

    /// Successful and failed calls of one operation seen so far.
    pub fn calls(&self, operation: &str) -> u32 {
        self.lock().calls.get(operation).copied().unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Count the call, then apply auth and injected faults.
    fn admit(&self, operation: &'static str) -> Result<()> {
        *self.lock().calls.entry(operation).or_default() += 1;
        if !self.signed_in.load(Ordering::SeqCst) {
            return Err(StoreError::Unauthenticated);
        }
        let injected = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Transport(format!("injected failure in {operation}")));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn create_key(&self) -> Result<String> {
        self.admit("create_key")?;
        let id = Uuid::new_v4().simple().to_string();
        self.lock().records.push(StoredRecord {
            id: id.clone(),
            ..StoredRecord::default()
        });
        Ok(id)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.admit("delete")?;
        let mut inner = self.lock();
        let before = inner.records.len();
        inner.records.retain(|r| r.id != key);
        Ok(inner.records.len() != before)
    }

    async fn set(&self, key: &str, content: &str) -> Result<()> {
        self.admit("set")?;
        let mut inner = self.lock();
        let record = inner
            .find_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        record.content = Some(content.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.admit("get")?;
        Ok(self.raw_get(key))
    }

    async fn get_md5(&self, key: &str) -> Result<String> {
        self.admit("get_md5")?;
        let content = self
            .raw_get(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        Ok(md5_hex(&content))
    }

    async fn get_all_keys(&self) -> Result<Vec<RecordMeta>> {
        self.admit("get_all_keys")?;
        Ok(self
            .lock()
            .records
            .iter()
            .map(|r| RecordMeta {
                id: r.id.clone(),
                description: r.description.clone(),
                md5_checksum: r.content.as_deref().map(md5_hex),
                outdated: false,
            })
            .collect())
    }

    async fn get_settings(&self) -> Result<String> {
        self.admit("get_settings")?;
        Ok(self.lock().settings.clone())
    }

    async fn set_settings(&self, content: &str) -> Result<()> {
        self.admit("set_settings")?;
        self.lock().settings = content.to_string();
        Ok(())
    }

    async fn set_description(&self, key: &str, text: &str) -> Result<()> {
        self.admit("set_description")?;
        let mut inner = self.lock();
        let record = inner
            .find_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        record.description = Some(text.to_string());
        Ok(())
    }
}
