//! One packed remote record holding up to N logical sub-records.
//!
//! ```text
//!            ┌──────────────── Chunk (remote record "9f3c…") ───────────────┐
//!  slot:     │   0        1        2        3      ...        N-1           │
//!  desc:     │  "t0"    null     "t2"    (unused)                           │
//!  value:    │  "{..}"   ""     "{..}"                                      │
//!            └──────────────────────────────────────────────────────────────┘
//!  setValue ─► values dirty ─► debounce ─► set(id, JSON(values))
//!  setDesc  ─► descs dirty  ─► debounce ─► set_description(id, join(descs))
//! ```
//!
//! A dirty half stays dirty until a listing reports server state equal to
//! the local state; until then local data wins over whatever the server
//! says. Values are fetched lazily and dropped whenever a clean chunk sees
//! a new checksum.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::codec::{
    decode_descriptions, encode_descriptions, encode_values, parse_values, values_checksum,
    ParsedValues,
};
use crate::config::ChunkConfig;
use crate::error::{Result, StoreError};
use crate::remote::{RecordMeta, RemoteStore};

/// Independently debounced halves of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Half {
    Values,
    Descriptions,
}

#[derive(Debug, Default)]
struct ChunkState {
    /// `None` until fetched, and again after invalidation
    values: Option<Vec<String>>,
    descriptions: Vec<Option<String>>,
    values_dirty: bool,
    descriptions_dirty: bool,
    /// Scheduled but not yet written
    values_pending: bool,
    descriptions_pending: bool,
    /// A debounce timer is in flight
    values_armed: bool,
    descriptions_armed: bool,
    /// Last checksum the server reported for content we agree with
    server_checksum: Option<String>,
    removed: bool,
}

impl ChunkState {
    fn dirty(&mut self, half: Half) -> &mut bool {
        match half {
            Half::Values => &mut self.values_dirty,
            Half::Descriptions => &mut self.descriptions_dirty,
        }
    }

    fn pending(&mut self, half: Half) -> &mut bool {
        match half {
            Half::Values => &mut self.values_pending,
            Half::Descriptions => &mut self.descriptions_pending,
        }
    }

    fn armed(&mut self, half: Half) -> &mut bool {
        match half {
            Half::Values => &mut self.values_armed,
            Half::Descriptions => &mut self.descriptions_armed,
        }
    }

    fn live_slots(&self) -> Vec<usize> {
        self.descriptions
            .iter()
            .enumerate()
            .filter(|(_, d)| d.is_some())
            .map(|(slot, _)| slot)
            .collect()
    }
}

pub struct Chunk<S> {
    id: String,
    store: Arc<S>,
    config: ChunkConfig,
    state: Mutex<ChunkState>,
    /// Debounce generations; a scheduled write only fires if its
    /// generation is still current when the delay elapses.
    values_generation: AtomicU64,
    descriptions_generation: AtomicU64,
}

impl<S: RemoteStore + 'static> Chunk<S> {
    /// Chunk for a record observed in a listing; values load on first use.
    pub fn from_remote(store: Arc<S>, meta: &RecordMeta, config: ChunkConfig) -> Arc<Self> {
        let state = ChunkState {
            descriptions: decode_descriptions(meta.description.as_deref()),
            server_checksum: meta.md5_checksum.clone(),
            ..ChunkState::default()
        };
        Arc::new(Self::with_state(meta.id.clone(), store, config, state))
    }

    /// Chunk for a record this client just created.
    pub fn created(store: Arc<S>, id: impl Into<String>, config: ChunkConfig) -> Arc<Self> {
        let state = ChunkState {
            values: Some(Vec::new()),
            ..ChunkState::default()
        };
        Arc::new(Self::with_state(id.into(), store, config, state))
    }

    fn with_state(id: String, store: Arc<S>, config: ChunkConfig, state: ChunkState) -> Self {
        Self {
            id,
            store,
            config,
            state: Mutex::new(state),
            values_generation: AtomicU64::new(0),
            descriptions_generation: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn is_dirty(&self) -> bool {
        let state = self.state.lock().await;
        state.values_dirty || state.descriptions_dirty
    }

    /// Dirty halves or writes that have not gone out yet.
    pub async fn has_unsaved_changes(&self) -> bool {
        let state = self.state.lock().await;
        state.values_dirty
            || state.descriptions_dirty
            || state.values_pending
            || state.descriptions_pending
    }

    pub async fn is_removed(&self) -> bool {
        self.state.lock().await.removed
    }

    /// Whether values are cached locally.
    pub async fn is_loaded(&self) -> bool {
        self.state.lock().await.values.is_some()
    }

    /// Slots with a live description, ascending.
    pub async fn list_live_slots(&self) -> Vec<usize> {
        self.state.lock().await.live_slots()
    }

    /// Live slots paired with their descriptions, ascending.
    pub async fn live_descriptions(&self) -> Vec<(usize, String)> {
        let state = self.state.lock().await;
        state
            .descriptions
            .iter()
            .enumerate()
            .filter_map(|(slot, d)| d.clone().map(|d| (slot, d)))
            .collect()
    }

    pub async fn description(&self, slot: usize) -> Option<String> {
        self.state
            .lock()
            .await
            .descriptions
            .get(slot)
            .cloned()
            .flatten()
    }

    /// Append a live slot with an empty description.
    ///
    /// Fetches values first if they are not cached. A corrupt record found
    /// here is deleted outright and the call fails with
    /// [`StoreError::ChunkRemoved`], so the caller can move on to a fresh
    /// record.
    pub async fn create_slot(self: &Arc<Self>) -> Result<usize> {
        self.ensure_values().await?;
        let slot = {
            let mut state = self.state.lock().await;
            if state.removed {
                return Err(StoreError::ChunkRemoved {
                    id: self.id.clone(),
                });
            }
            if state.descriptions.len() >= self.config.slots_per_chunk {
                return Err(StoreError::ChunkFull {
                    id: self.id.clone(),
                });
            }
            state.descriptions.push(Some(String::new()));
            let slot = state.descriptions.len() - 1;
            if let Some(values) = state.values.as_mut() {
                if values.len() <= slot {
                    values.resize(slot + 1, String::new());
                }
            }
            slot
        };
        self.mark(Half::Descriptions).await;
        Ok(slot)
    }

    /// Value of a live slot; `None` for deleted or never-created slots.
    pub async fn get_value(self: &Arc<Self>, slot: usize) -> Result<Option<String>> {
        self.ensure_values().await?;
        let state = self.state.lock().await;
        if !matches!(state.descriptions.get(slot), Some(Some(_))) {
            return Ok(None);
        }
        Ok(Some(
            state
                .values
                .as_ref()
                .and_then(|values| values.get(slot))
                .cloned()
                .unwrap_or_default(),
        ))
    }

    pub async fn set_value(self: &Arc<Self>, slot: usize, value: &str) -> Result<()> {
        self.ensure_values().await?;
        {
            let mut state = self.state.lock().await;
            if !matches!(state.descriptions.get(slot), Some(Some(_))) {
                return Err(StoreError::SlotMissing {
                    id: self.id.clone(),
                    slot,
                });
            }
            let values = state.values.get_or_insert_with(Vec::new);
            if values.len() <= slot {
                values.resize(slot + 1, String::new());
            }
            if values[slot] == value {
                return Ok(());
            }
            values[slot] = value.to_string();
        }
        self.mark(Half::Values).await;
        Ok(())
    }

    /// Set a slot's description; `None` vacates the slot.
    pub async fn set_description(self: &Arc<Self>, slot: usize, text: Option<&str>) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            if state.removed {
                return Err(StoreError::ChunkRemoved {
                    id: self.id.clone(),
                });
            }
            let current = state
                .descriptions
                .get_mut(slot)
                .ok_or_else(|| StoreError::SlotMissing {
                    id: self.id.clone(),
                    slot,
                })?;
            if current.as_deref() == text {
                return Ok(());
            }
            *current = text.map(str::to_string);
        }
        self.mark(Half::Descriptions).await;
        Ok(())
    }

    /// Delete a slot. Removing the last live slot deletes the whole record.
    ///
    /// Returns `false` if the slot was not live.
    pub async fn delete(self: &Arc<Self>, slot: usize) -> Result<bool> {
        let live = self.list_live_slots().await;
        if !live.contains(&slot) {
            return Ok(false);
        }
        if live.len() == 1 {
            self.remove_remote().await?;
        } else {
            self.set_description(slot, None).await?;
        }
        Ok(true)
    }

    /// Reconcile with one listing of the record.
    ///
    /// Returns `true` (outdated) when cached values were dropped because the
    /// server content moved on while this client had no pending edits.
    /// Writes that failed earlier are scheduled again.
    pub async fn on_metadata_update(
        self: &Arc<Self>,
        remote_description: Option<&str>,
        remote_checksum: Option<&str>,
    ) -> bool {
        let outdated = {
            let mut state = self.state.lock().await;
            if state.removed {
                return false;
            }

            let remote_descriptions = decode_descriptions(remote_description);
            if state.descriptions_dirty {
                if remote_descriptions == state.descriptions {
                    log::debug!("chunk {}: descriptions confirmed", self.id);
                    state.descriptions_dirty = false;
                }
            } else if remote_descriptions != state.descriptions {
                log::debug!("chunk {}: adopting remote descriptions", self.id);
                state.descriptions = remote_descriptions;
            }

            if state.values_dirty {
                let local = state
                    .values
                    .as_deref()
                    .and_then(|values| values_checksum(values).ok());
                if local.as_deref() == remote_checksum {
                    log::debug!("chunk {}: values confirmed", self.id);
                    state.values_dirty = false;
                    state.server_checksum = remote_checksum.map(str::to_string);
                }
                false
            } else if state.server_checksum.as_deref() != remote_checksum {
                log::debug!("chunk {}: checksum moved, dropping cached values", self.id);
                state.server_checksum = remote_checksum.map(str::to_string);
                state.values = None;
                true
            } else {
                false
            }
        };
        self.resume_pending_writes().await;
        outdated
    }

    /// Schedule halves whose last write failed and that have no timer
    /// running.
    pub async fn resume_pending_writes(self: &Arc<Self>) {
        let halves: Vec<Half> = {
            let mut state = self.state.lock().await;
            if state.removed {
                return;
            }
            [Half::Values, Half::Descriptions]
                .into_iter()
                .filter(|&half| {
                    let stalled =
                        *state.pending(half) && *state.dirty(half) && !*state.armed(half);
                    if stalled {
                        *state.armed(half) = true;
                    }
                    stalled
                })
                .collect()
        };
        for half in halves {
            log::debug!("chunk {}: rescheduling {half:?} write", self.id);
            self.schedule(half);
        }
    }

    /// Write any scheduled halves now instead of waiting for the debounce.
    pub async fn flush(&self) -> Result<()> {
        for half in [Half::Values, Half::Descriptions] {
            let pending = {
                let mut state = self.state.lock().await;
                *state.armed(half) = false;
                *state.pending(half)
            };
            // Cancels any running timer for this half.
            self.generation(half).fetch_add(1, Ordering::SeqCst);
            if pending {
                self.write(half).await?;
            }
        }
        Ok(())
    }

    fn generation(&self, half: Half) -> &AtomicU64 {
        match half {
            Half::Values => &self.values_generation,
            Half::Descriptions => &self.descriptions_generation,
        }
    }

    /// Mark a half dirty and (re)start its debounce window.
    async fn mark(self: &Arc<Self>, half: Half) {
        {
            let mut state = self.state.lock().await;
            *state.dirty(half) = true;
            *state.pending(half) = true;
            *state.armed(half) = true;
        }
        self.schedule(half);
    }

    fn schedule(self: &Arc<Self>, half: Half) {
        let generation = self.generation(half).fetch_add(1, Ordering::SeqCst) + 1;
        let chunk = Arc::clone(self);
        let delay = self.config.debounce();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if chunk.generation(half).load(Ordering::SeqCst) != generation {
                return;
            }
            *chunk.state.lock().await.armed(half) = false;
            if let Err(e) = chunk.write(half).await {
                log::error!("chunk {}: {half:?} write failed: {e}", chunk.id);
            }
        });
    }

    async fn write(&self, half: Half) -> Result<()> {
        let payload = {
            let mut state = self.state.lock().await;
            if state.removed {
                return Ok(());
            }
            let payload = match half {
                Half::Values => state.values.as_deref().map(encode_values).transpose()?,
                Half::Descriptions => Some(encode_descriptions(&state.descriptions)),
            };
            *state.pending(half) = false;
            payload
        };
        let Some(payload) = payload else {
            return Ok(());
        };
        log::debug!("chunk {}: writing {half:?} ({} bytes)", self.id, payload.len());
        let result = match half {
            Half::Values => self.store.set(&self.id, &payload).await,
            Half::Descriptions => self.store.set_description(&self.id, &payload).await,
        };
        match &result {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) => {
                log::warn!("record {} is gone; dropping its chunk", self.id);
                self.state.lock().await.removed = true;
            }
            Err(_) => *self.state.lock().await.pending(half) = true,
        }
        result
    }

    async fn remove_remote(&self) -> Result<()> {
        self.state.lock().await.removed = true;
        log::info!("deleting record {}", self.id);
        self.store.delete(&self.id).await?;
        Ok(())
    }

    /// Load values if they are not cached.
    ///
    /// Content with stray non-string items keeps its strings and is
    /// rewritten. Content with nothing to salvage deletes the record, and
    /// the call fails with [`StoreError::ChunkRemoved`].
    async fn ensure_values(self: &Arc<Self>) -> Result<()> {
        {
            let state = self.state.lock().await;
            if state.removed {
                return Err(StoreError::ChunkRemoved {
                    id: self.id.clone(),
                });
            }
            if state.values.is_some() {
                return Ok(());
            }
        }

        let raw = self.store.get(&self.id).await?;

        let mut state = self.state.lock().await;
        if state.values.is_some() {
            return Ok(());
        }
        let width = state.descriptions.len();
        match parse_values(raw.as_deref(), width) {
            ParsedValues::Valid(values) => {
                state.values = Some(values);
                Ok(())
            }
            ParsedValues::Salvaged(values) => {
                log::warn!("record {} has malformed items; rewriting it", self.id);
                state.values = Some(values);
                state.values_dirty = true;
                state.values_pending = true;
                state.values_armed = true;
                drop(state);
                self.schedule(Half::Values);
                Ok(())
            }
            ParsedValues::Corrupt(reason) => {
                log::warn!("record {} is corrupt ({reason}); deleting it", self.id);
                drop(state);
                self.remove_remote().await?;
                Err(StoreError::ChunkRemoved {
                    id: self.id.clone(),
                })
            }
        }
    }
}
