//! # quipu-store — quota-saving storage stack for Quipu
//!
//! Packs many small logical records into few remote records of a hosted
//! key-value file store that has tight per-call quotas, no multi-key
//! transactions, and only poll-based consistency.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  logical keys "<slot>-<record>"
//! │ Multiplexor  │  Chunk per remote record, debounced writes,
//! │              │  checksum reconciliation on every listing
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐
//! │ RetryingStore│  base·2^attempt backoff, terminal RetriesExhausted
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐
//! │ RateLimiter  │  FIFO concurrency cap + minimum call spacing
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐
//! │ RemoteStore  │  hosted backend (or MemoryStore in tests)
//! └──────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`remote`] — the `RemoteStore` capability every layer implements
//! - [`rate_limit`] / [`retry`] — quota and failure decorators
//! - [`chunk`] — one packed record, its dirty tracking and self-healing
//! - [`codec`] — persisted layout of descriptions and values
//! - [`multiplex`] — logical key routing and record allocation
//! - [`memory`] — in-process backend

pub mod chunk;
pub mod codec;
pub mod config;
pub mod error;
pub mod memory;
pub mod multiplex;
pub mod rate_limit;
pub mod remote;
pub mod retry;

// Re-exports for convenience
pub use chunk::Chunk;
pub use config::{ChunkConfig, RateLimitConfig, RetryConfig, StoreConfig};
pub use error::{Result, StoreError};
pub use codec::md5_hex;
pub use memory::MemoryStore;
pub use multiplex::{layered, logical_key, split_logical_key, LayeredStore, Multiplexor};
pub use rate_limit::RateLimiter;
pub use remote::{RecordMeta, RemoteStore};
pub use retry::RetryingStore;
