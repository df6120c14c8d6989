//! End-to-end tests of the full storage stack over an in-memory backend.
//!
//! Each test builds `Multiplexor<RetryingStore<RateLimiter<MemoryStore>>>`
//! and checks what actually lands in the backend.

use async_trait::async_trait;
use quipu_store::{
    codec::decode_descriptions, layered, split_logical_key, LayeredStore, MemoryStore,
    RecordMeta, RemoteStore, StoreConfig, StoreError,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::time::Duration;

fn stack(backend: &Arc<MemoryStore>) -> LayeredStore<Arc<MemoryStore>> {
    layered(Arc::clone(backend), &StoreConfig::for_testing())
}

/// Let every debounced write fire.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1500)).await;
}

#[tokio::test(start_paused = true)]
async fn test_seventeen_keys_pack_into_three_records() {
    let backend = Arc::new(MemoryStore::new());
    let mux = stack(&backend);
    mux.get_all_keys().await.unwrap();

    let mut per_record: HashMap<String, usize> = HashMap::new();
    for _ in 0..17 {
        let key = mux.create_key().await.unwrap();
        let (_, record) = split_logical_key(&key).unwrap();
        *per_record.entry(record.to_string()).or_default() += 1;
    }
    settle().await;

    let ids = backend.record_ids();
    assert_eq!(ids.len(), 3);
    let counts: Vec<usize> = ids.iter().map(|id| per_record[id]).collect();
    assert_eq!(counts, vec![8, 8, 1]);

    for (id, expected) in ids.iter().zip([8, 8, 1]) {
        let slots = decode_descriptions(backend.raw_description(id).as_deref());
        assert_eq!(slots.iter().filter(|d| d.is_some()).count(), expected);
    }
    assert_eq!(mux.get_all_keys().await.unwrap().len(), 17);
}

#[tokio::test(start_paused = true)]
async fn test_values_roundtrip_through_remote_content() {
    let backend = Arc::new(MemoryStore::new());
    let mux = stack(&backend);
    mux.get_all_keys().await.unwrap();

    let mut written = Vec::new();
    for i in 0..8 {
        let key = mux.create_key().await.unwrap();
        let value = format!(r#"{{"left":"row {i}","right":"a,b \"quoted\""}}"#);
        mux.set(&key, &value).await.unwrap();
        written.push((key, value));
    }
    settle().await;

    // A second client sees exactly what the first one wrote.
    let other = stack(&backend);
    let listed = other.get_all_keys().await.unwrap();
    assert_eq!(listed.len(), 8);
    for (key, value) in &written {
        assert_eq!(other.get(key).await.unwrap().as_deref(), Some(value.as_str()));
    }
}

#[tokio::test(start_paused = true)]
async fn test_unflushed_edit_survives_foreign_write() {
    let backend = Arc::new(MemoryStore::new());
    let mine = stack(&backend);
    let theirs = stack(&backend);
    mine.get_all_keys().await.unwrap();
    let key = mine.create_key().await.unwrap();
    mine.set(&key, "first").await.unwrap();
    settle().await;

    theirs.get_all_keys().await.unwrap();
    mine.get_all_keys().await.unwrap();

    // Local edit still inside its debounce window while the other client
    // lands a write and the next listing reports its checksum.
    mine.set(&key, "local").await.unwrap();
    theirs.set(&key, "foreign").await.unwrap();
    theirs.flush_all().await.unwrap();

    let listed = mine.get_all_keys().await.unwrap();
    assert!(!listed[0].outdated);
    assert_eq!(mine.get(&key).await.unwrap().as_deref(), Some("local"));

    // Our write lands last and is then confirmed.
    settle().await;
    let listed = mine.get_all_keys().await.unwrap();
    assert!(!listed[0].outdated);
    let record = split_logical_key(&key).unwrap().1;
    assert!(!mine.chunk(record).await.unwrap().is_dirty().await);
    assert_eq!(backend.raw_get(record).as_deref(), Some(r#"["local"]"#));
}

#[tokio::test(start_paused = true)]
async fn test_corrupt_tail_record_is_replaced_on_creation() {
    let backend = Arc::new(MemoryStore::new());
    let seed = backend.create_key().await.unwrap();
    backend.raw_put(&seed, "{{{ not json");
    backend.raw_describe(&seed, "1700000000000");

    let mux = stack(&backend);
    let listed = mux.get_all_keys().await.unwrap();
    assert_eq!(listed.len(), 1);

    let key = mux.create_key().await.unwrap();
    let (slot, record) = split_logical_key(&key).unwrap();
    assert_eq!(slot, 0);
    assert_ne!(record, seed);
    assert_eq!(backend.record_ids(), vec![record.to_string()]);

    settle().await;
    let listed = mux.get_all_keys().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, key);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_absorbed() {
    let backend = Arc::new(MemoryStore::new());
    let mux = stack(&backend);
    backend.fail_next(2);
    mux.get_all_keys().await.unwrap();
    assert_eq!(backend.calls("get_all_keys"), 3);

    backend.fail_next(5);
    let err = mux.create_key().await.unwrap_err();
    assert!(matches!(err, StoreError::RetriesExhausted { attempts: 3, .. }));
}

#[tokio::test(start_paused = true)]
async fn test_settings_pass_through_unpacked() {
    let backend = Arc::new(MemoryStore::new());
    let mux = stack(&backend);
    mux.set_settings(r#"{"theme":"dark"}"#).await.unwrap();
    assert_eq!(mux.get_settings().await.unwrap(), r#"{"theme":"dark"}"#);
    assert_eq!(backend.record_count(), 0);
}

/// Backend whose listing does not show new records until `catch_up`.
struct LaggingStore {
    inner: Arc<MemoryStore>,
    unlisted: Mutex<HashSet<String>>,
}

impl LaggingStore {
    fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            unlisted: Mutex::new(HashSet::new()),
        }
    }

    fn catch_up(&self) {
        self.unlisted.lock().unwrap().clear();
    }
}

#[async_trait]
impl RemoteStore for LaggingStore {
    async fn create_key(&self) -> quipu_store::Result<String> {
        let id = self.inner.create_key().await?;
        self.unlisted.lock().unwrap().insert(id.clone());
        Ok(id)
    }

    async fn delete(&self, key: &str) -> quipu_store::Result<bool> {
        self.inner.delete(key).await
    }

    async fn set(&self, key: &str, content: &str) -> quipu_store::Result<()> {
        self.inner.set(key, content).await
    }

    async fn get(&self, key: &str) -> quipu_store::Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn get_md5(&self, key: &str) -> quipu_store::Result<String> {
        self.inner.get_md5(key).await
    }

    async fn get_all_keys(&self) -> quipu_store::Result<Vec<RecordMeta>> {
        let records = self.inner.get_all_keys().await?;
        let unlisted = self.unlisted.lock().unwrap().clone();
        Ok(records
            .into_iter()
            .filter(|r| !unlisted.contains(&r.id))
            .collect())
    }

    async fn get_settings(&self) -> quipu_store::Result<String> {
        self.inner.get_settings().await
    }

    async fn set_settings(&self, content: &str) -> quipu_store::Result<()> {
        self.inner.set_settings(content).await
    }

    async fn set_description(&self, key: &str, text: &str) -> quipu_store::Result<()> {
        self.inner.set_description(key, text).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_record_missing_from_lagging_listing_stays_routable() {
    let backend = Arc::new(MemoryStore::new());
    let lagging = Arc::new(LaggingStore::new(Arc::clone(&backend)));
    let mux = layered(Arc::clone(&lagging), &StoreConfig::for_testing());
    mux.get_all_keys().await.unwrap();

    let key = mux.create_key().await.unwrap();
    mux.set(&key, "before").await.unwrap();
    settle().await;

    assert!(mux.get_all_keys().await.unwrap().is_empty());
    mux.set(&key, "after listing").await.unwrap();
    assert_eq!(mux.get(&key).await.unwrap().as_deref(), Some("after listing"));
    assert_eq!(mux.chunk_count().await, 1);

    // Creation keeps filling the unlisted record.
    let second = mux.create_key().await.unwrap();
    let record = split_logical_key(&key).unwrap().1;
    assert_eq!(split_logical_key(&second).unwrap().1, record);

    settle().await;
    assert_eq!(
        backend.raw_get(record).as_deref(),
        Some(r#"["after listing",""]"#)
    );

    lagging.catch_up();
    assert_eq!(mux.get_all_keys().await.unwrap().len(), 2);
    assert!(!mux.chunk(record).await.unwrap().is_dirty().await);
}

#[tokio::test(start_paused = true)]
async fn test_write_rejected_while_signed_out_lands_after_next_listing() {
    let backend = Arc::new(MemoryStore::new());
    let mux = stack(&backend);
    mux.get_all_keys().await.unwrap();
    let key = mux.create_key().await.unwrap();
    settle().await;
    mux.get_all_keys().await.unwrap();

    mux.set(&key, "edit").await.unwrap();
    backend.set_signed_in(false);
    settle().await;
    backend.set_signed_in(true);

    // Auth failures are not retried, so the write is still outstanding.
    let record = split_logical_key(&key).unwrap().1;
    assert_eq!(backend.raw_get(record), None);
    assert_eq!(backend.calls("set"), 1);

    mux.get_all_keys().await.unwrap();
    settle().await;
    assert_eq!(backend.raw_get(record).as_deref(), Some(r#"["edit"]"#));

    mux.get_all_keys().await.unwrap();
    assert!(!mux.chunk(record).await.unwrap().has_unsaved_changes().await);
}
