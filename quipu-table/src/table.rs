//! Ordered, lazily loaded, undoable view over a record store.
//!
//! ```text
//!   presentation ──on_update/add/undo/redo──► TableModel ──► RemoteStore
//!        ▲                                        │            (Multiplexor)
//!        └──────── subscriber callbacks ◄─────────┘
//!                                                 │ every sync_interval
//!                                                 └──► sync(): get_all_keys
//! ```
//!
//! Per-entry lifecycle: `Hidden → Loading → Loaded | Deleted`. Entries
//! outside the newest `visible_window` start out hidden and load on
//! [`TableModel::show`]. A fetch that fails or finds no data drops the entry
//! from memory instead of surfacing an error entry.
//!
//! Reference: Kleppmann, Chapter 5 — Replication (read-your-writes)

use futures_util::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use quipu_store::{RemoteStore, StoreError};

use crate::auth::AuthWatch;
use crate::config::TableConfig;
use crate::entries::OrderedEntries;
use crate::entry::{timestamp_description, EntryData, EntryModel, EntryText, DELETED_DESCRIPTION};
use crate::error::{Result, TableError};
use crate::history::{History, HistoryStatus};

/// Handle returned by [`TableModel::subscribe`].
pub type SubscriptionId = u64;

/// Receives visible entries (newest first), settings, and undo/redo state.
pub type Subscriber = Arc<dyn Fn(&[EntryModel], &str, HistoryStatus) + Send + Sync>;

#[derive(Default)]
struct TableState {
    entries: OrderedEntries,
    history: History,
    /// Last description sent per key, to skip redundant writes
    descriptions: HashMap<String, String>,
    /// Created here but not yet seen in a listing
    local_keys: HashSet<String>,
    settings: String,
    settings_loaded: bool,
    synced: bool,
    last_add: Option<Instant>,
}

struct Shared<S> {
    store: S,
    auth: AuthWatch,
    config: TableConfig,
    state: Mutex<TableState>,
    subscribers: Mutex<Vec<(SubscriptionId, Subscriber)>>,
    next_subscription: AtomicU64,
    /// Serializes `add_new_item`
    add_gate: Mutex<()>,
    shutdown: watch::Sender<bool>,
}

/// What `on_update` decided to do once the state lock is released.
enum Followup {
    Nothing,
    Fetch,
    Persist {
        description: Option<String>,
        value: Option<String>,
    },
}

pub struct TableModel<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for TableModel<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: RemoteStore + 'static> TableModel<S> {
    pub fn new(store: S, auth: AuthWatch, config: TableConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                store,
                auth,
                config,
                state: Mutex::new(TableState::default()),
                subscribers: Mutex::new(Vec::new()),
                next_subscription: AtomicU64::new(1),
                add_gate: Mutex::new(()),
                shutdown,
            }),
        }
    }

    pub fn store(&self) -> &S {
        &self.shared.store
    }

    pub fn is_disposed(&self) -> bool {
        *self.shared.shutdown.borrow()
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(TableError::Disposed);
        }
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────
    // Observation
    // ───────────────────────────────────────────────────────────────

    /// Register a callback. It fires immediately if a sync has completed.
    pub async fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&[EntryModel], &str, HistoryStatus) + Send + Sync + 'static,
    {
        let id = self.shared.next_subscription.fetch_add(1, Ordering::SeqCst);
        let callback: Subscriber = Arc::new(callback);
        self.shared
            .subscribers
            .lock()
            .await
            .push((id, Arc::clone(&callback)));

        let snapshot = {
            let state = self.shared.state.lock().await;
            state.synced.then(|| {
                (
                    state.entries.visible(),
                    state.settings.clone(),
                    state.history.status(),
                )
            })
        };
        if let Some((entries, settings, status)) = snapshot {
            callback(&entries, &settings, status);
        }
        id
    }

    pub async fn unsubscribe(&self, id: SubscriptionId) {
        self.shared
            .subscribers
            .lock()
            .await
            .retain(|(sid, _)| *sid != id);
    }

    /// Visible entries, newest first.
    pub async fn entries(&self) -> Vec<EntryModel> {
        self.shared.state.lock().await.entries.visible()
    }

    /// Any entry by key, including hidden and deleted ones.
    pub async fn entry(&self, key: &str) -> Option<EntryModel> {
        self.shared.state.lock().await.entries.get(key).cloned()
    }

    pub async fn settings(&self) -> String {
        self.shared.state.lock().await.settings.clone()
    }

    pub async fn history_status(&self) -> HistoryStatus {
        self.shared.state.lock().await.history.status()
    }

    async fn notify(&self) {
        if self.is_disposed() {
            return;
        }
        let (entries, settings, status) = {
            let state = self.shared.state.lock().await;
            (
                state.entries.visible(),
                state.settings.clone(),
                state.history.status(),
            )
        };
        let subscribers: Vec<Subscriber> = self
            .shared
            .subscribers
            .lock()
            .await
            .iter()
            .map(|(_, s)| Arc::clone(s))
            .collect();
        for subscriber in subscribers {
            subscriber(&entries, &settings, status);
        }
    }

    // ───────────────────────────────────────────────────────────────
    // Editing
    // ───────────────────────────────────────────────────────────────

    /// Apply an edited entry.
    ///
    /// Unknown keys are ignored. A `Loading` entry triggers a fetch instead
    /// of a write. Otherwise the changed description and/or text are
    /// persisted, and the edit is recorded unless `omit_history` is set.
    pub async fn on_update(&self, entry: EntryModel, omit_history: bool) -> Result<()> {
        self.ensure_live()?;
        let key = entry.key().to_string();
        let followup = {
            let mut state = self.shared.state.lock().await;
            let Some(old) = state.entries.get(&key).cloned() else {
                log::debug!("ignoring update for unknown entry {key}");
                return Ok(());
            };
            if entry.is_loading() {
                state.entries.insert(entry);
                Followup::Fetch
            } else if entry.is_hidden() {
                state.entries.insert(entry);
                Followup::Nothing
            } else {
                let description = entry.persisted_description().to_string();
                let description = if state.descriptions.get(&key) != Some(&description) {
                    state.descriptions.insert(key.clone(), description.clone());
                    Some(description)
                } else {
                    None
                };
                let value = match entry.data() {
                    EntryData::Loaded(text) if old.data() != entry.data() => Some(text.encode()),
                    _ => None,
                };
                if !omit_history && old.data() != entry.data() {
                    state.history.record(old, entry.clone());
                }
                state.entries.insert(entry);
                Followup::Persist { description, value }
            }
        };
        self.notify().await;

        match followup {
            Followup::Nothing => {}
            Followup::Fetch => {
                let model = self.clone();
                tokio::spawn(async move { model.fetch(key).await });
            }
            Followup::Persist { description, value } => {
                if let Some(description) = description {
                    self.shared.store.set_description(&key, &description).await?;
                }
                if let Some(value) = value {
                    self.shared.store.set(&key, &value).await?;
                }
            }
        }
        Ok(())
    }

    /// Load a hidden entry and wait for the fetch to finish.
    pub async fn show(&self, key: &str) -> Result<()> {
        self.ensure_live()?;
        {
            let mut state = self.shared.state.lock().await;
            match state.entries.get(key) {
                Some(entry) if entry.is_hidden() => {
                    let loading = entry.with_data(EntryData::Loading);
                    state.entries.insert(loading);
                }
                _ => return Ok(()),
            }
        }
        self.notify().await;
        self.fetch(key.to_string()).await;
        Ok(())
    }

    /// Create an entry, reusing the vacant slot at the top if there is one.
    ///
    /// Returns the key of the new entry.
    pub async fn add_new_item(&self) -> Result<String> {
        self.ensure_live()?;
        let _gate = self.shared.add_gate.lock().await;

        let vacant = self
            .shared
            .state
            .lock()
            .await
            .entries
            .vacant_key()
            .map(str::to_string);
        let key = match vacant {
            Some(key) => {
                log::debug!("reusing vacant entry {key}");
                key
            }
            None => {
                let key = self.shared.store.create_key().await?;
                let mut state = self.shared.state.lock().await;
                state.local_keys.insert(key.clone());
                state
                    .entries
                    .insert(EntryModel::new(key.clone(), EntryData::Deleted, ""));
                key
            }
        };

        let existing = self.shared.state.lock().await.entries.get(&key).cloned();
        let entry = match existing {
            Some(existing) => existing
                .cleared()
                .with_description(timestamp_description())
                .with_focus(true),
            None => EntryModel::blank(key.clone()).with_focus(true),
        };
        self.on_update(entry, false).await?;
        Ok(key)
    }

    /// [`Self::add_new_item`], ignoring calls closer than `add_throttle` to
    /// the previous accepted one.
    pub async fn add_new_item_throttled(&self) -> Result<Option<String>> {
        {
            let mut state = self.shared.state.lock().await;
            let now = Instant::now();
            if let Some(last) = state.last_add {
                if now.duration_since(last) < self.shared.config.add_throttle() {
                    return Ok(None);
                }
            }
            state.last_add = Some(now);
        }
        self.add_new_item().await.map(Some)
    }

    pub async fn undo(&self) -> Result<()> {
        let snapshot = self.shared.state.lock().await.history.undo();
        self.apply_snapshot(snapshot).await
    }

    pub async fn redo(&self) -> Result<()> {
        let snapshot = self.shared.state.lock().await.history.redo();
        self.apply_snapshot(snapshot).await
    }

    async fn apply_snapshot(&self, snapshot: Option<EntryModel>) -> Result<()> {
        match snapshot {
            Some(entry) => {
                let entry = entry.with_focus(true).with_collapsed(false);
                self.on_update(entry, true).await
            }
            None => Ok(()),
        }
    }

    pub async fn on_settings_update(&self, settings: String) -> Result<()> {
        self.ensure_live()?;
        {
            let mut state = self.shared.state.lock().await;
            state.settings = settings.clone();
            state.settings_loaded = true;
        }
        self.notify().await;
        self.shared.store.set_settings(&settings).await?;
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────
    // Loading
    // ───────────────────────────────────────────────────────────────

    /// Fetch one entry's text. Results for keys that were removed or edited
    /// meanwhile are discarded.
    async fn fetch(&self, key: String) {
        let Some(snapshot) = self.entry(&key).await else {
            return;
        };
        let result = self.shared.store.get(&key).await;
        if self.is_disposed() {
            return;
        }

        {
            let mut state = self.shared.state.lock().await;
            if state.entries.get(&key) != Some(&snapshot) {
                log::debug!("discarding stale fetch of {key}");
                return;
            }
            let text = match result {
                Ok(raw) => raw.as_deref().and_then(EntryText::decode),
                Err(e) => {
                    log::warn!("fetch of {key} failed: {e}");
                    None
                }
            };
            match text {
                Some(text) => {
                    state
                        .entries
                        .insert(snapshot.with_data(EntryData::Loaded(text)));
                }
                // A loaded entry keeps its text when a refresh fails.
                None if snapshot.is_loaded() => return,
                None => {
                    log::debug!("no data for {key}; dropping entry");
                    state.entries.remove(&key);
                    state.descriptions.remove(&key);
                }
            }
        }
        self.notify().await;
    }

    // ───────────────────────────────────────────────────────────────
    // Reconciliation
    // ───────────────────────────────────────────────────────────────

    async fn until_shutdown<F, T>(&self, future: F) -> Result<T>
    where
        F: std::future::Future<Output = T>,
    {
        let mut shutdown = self.shared.shutdown.subscribe();
        tokio::select! {
            value = future => Ok(value),
            _ = shutdown.wait_for(|disposed| *disposed) => Err(TableError::Disposed),
        }
    }

    async fn wait_signed_in(&self) -> Result<()> {
        let mut auth = self.shared.auth.clone();
        if self.until_shutdown(auth.wait_signed_in()).await? {
            Ok(())
        } else {
            Err(TableError::AuthUnavailable)
        }
    }

    /// Reconcile the in-memory entries with the store's listing.
    ///
    /// Waits until signed in first. A store that still rejects the session
    /// makes sync wait for the next auth state change and try again.
    pub async fn sync(&self) -> Result<()> {
        let records = loop {
            self.ensure_live()?;
            self.wait_signed_in().await?;
            match self.shared.store.get_all_keys().await {
                Ok(records) => break records,
                Err(StoreError::Unauthenticated) => {
                    log::info!("store rejected the session; waiting for auth change");
                    let mut auth = self.shared.auth.clone();
                    if self.until_shutdown(auth.next_change()).await?.is_none() {
                        return Err(TableError::AuthUnavailable);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        };

        let settings_loaded = self.shared.state.lock().await.settings_loaded;
        let settings = if settings_loaded {
            None
        } else {
            match self.shared.store.get_settings().await {
                Ok(settings) => Some(settings),
                Err(e) => {
                    log::warn!("loading settings failed: {e}");
                    None
                }
            }
        };

        let fetches = {
            let mut state = self.shared.state.lock().await;
            if let Some(settings) = settings {
                if !state.settings_loaded {
                    state.settings = settings;
                    state.settings_loaded = true;
                }
            }

            let window_start = records
                .len()
                .saturating_sub(self.shared.config.visible_window);
            let mut next = OrderedEntries::new();
            let mut fetches = Vec::new();
            for (position, record) in records.into_iter().enumerate() {
                state.local_keys.remove(&record.id);
                if let Some(existing) = state.entries.get(&record.id).cloned() {
                    if record.outdated && existing.is_loaded() {
                        fetches.push(record.id.clone());
                    }
                    next.insert(existing);
                    continue;
                }
                let description = record.description.unwrap_or_default();
                let data = if description == DELETED_DESCRIPTION {
                    EntryData::Deleted
                } else if position >= window_start {
                    fetches.push(record.id.clone());
                    EntryData::Loading
                } else {
                    EntryData::Hidden
                };
                state
                    .descriptions
                    .insert(record.id.clone(), description.clone());
                next.insert(EntryModel::new(record.id, data, description));
            }

            let pending: Vec<_> = state.local_keys.iter().cloned().collect();
            for key in pending {
                if let Some(entry) = state.entries.get(&key).cloned() {
                    next.insert(entry);
                }
            }
            state.descriptions.retain(|key, _| next.contains(key));
            log::info!(
                "sync: {} entries, {} to fetch",
                next.len(),
                fetches.len()
            );
            state.entries = next;
            state.synced = true;
            fetches
        };
        self.notify().await;

        join_all(fetches.into_iter().map(|key| self.fetch(key))).await;

        // Fetching can drop records whose content turned out to be corrupt.
        let empty = self.shared.state.lock().await.entries.is_empty();
        if empty {
            log::info!("table is empty; creating a first entry");
            self.add_new_item().await?;
        }
        Ok(())
    }

    /// Spawn the periodic sync loop. The first sync runs immediately.
    pub fn start(&self) -> JoinHandle<()> {
        let model = self.clone();
        let mut shutdown = self.shared.shutdown.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(model.shared.config.sync_interval());
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown.wait_for(|disposed| *disposed) => break,
                }
                match model.sync().await {
                    Ok(()) => {}
                    Err(TableError::Disposed) => break,
                    Err(e) => log::error!("sync failed: {e}"),
                }
            }
            log::debug!("sync loop stopped");
        })
    }

    /// Stop the sync loop and drop all subscribers. In-flight operations
    /// finish, but their results are no longer delivered.
    pub async fn dispose(&self) {
        self.shared.shutdown.send_replace(true);
        self.shared.subscribers.lock().await.clear();
    }
}
