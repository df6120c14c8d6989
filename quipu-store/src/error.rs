//! Error taxonomy for the storage stack.
//!
//! Three classes matter to callers:
//! - transient transport failures, retried by [`crate::RetryingStore`]
//!   and surfaced as [`StoreError::RetriesExhausted`] once the budget is spent
//! - authentication failures, which fail fast so the table model can wait
//!   for the next auth state change
//! - logical misuse (full chunk, missing slot, unsynced multiplexor), which
//!   is a programming error and never retried

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("not authenticated")]
    Unauthenticated,

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("{operation} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        last: Box<StoreError>,
    },

    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("malformed logical key: {0}")]
    InvalidKey(String),

    #[error("no record listing yet; call get_all_keys first")]
    NotSynced,

    #[error("chunk {id} has no free slot")]
    ChunkFull { id: String },

    #[error("slot {slot} of chunk {id} was never created")]
    SlotMissing { id: String, slot: usize },

    #[error("chunk {id} was removed")]
    ChunkRemoved { id: String },

    #[error("codec error: {0}")]
    Codec(String),
}

impl StoreError {
    /// Whether a retry can reasonably change the outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Transport(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Codec(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
