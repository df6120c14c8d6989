//! # quipu-table — list-of-entries model over quipu-store
//!
//! Keeps an ordered list of two-field entries in sync with a
//! [`quipu_store::RemoteStore`], loading lazily and supporting undo/redo.
//!
//! ```text
//!   ┌─────────────┐   subscribe / on_update / undo / redo
//!   │ presentation│◄────────────────────────────────┐
//!   └─────────────┘                                 │
//!                                          ┌────────┴───────┐
//!   AuthController ──AuthWatch───────────► │   TableModel   │
//!                                          │ OrderedEntries │
//!                                          │ History        │
//!                                          └────────┬───────┘
//!                                                   ▼
//!                                           LayeredStore (quipu-store)
//! ```
//!
//! ## Modules
//!
//! - [`entry`] — immutable entry values and their persisted forms
//! - [`entries`] — insertion-ordered index with vacancy lookup
//! - [`history`] — linear undo/redo with per-field coalescing
//! - [`auth`] — session state channel
//! - [`table`] — the model itself and its sync loop

pub mod auth;
pub mod config;
pub mod entries;
pub mod entry;
pub mod error;
pub mod history;
pub mod table;

pub use auth::{AuthController, AuthState, AuthWatch};
pub use config::TableConfig;
pub use entries::OrderedEntries;
pub use entry::{EntryData, EntryModel, EntryText, Field, DELETED_DESCRIPTION};
pub use error::{Result, TableError};
pub use history::{History, HistoryItem, HistoryStatus};
pub use table::{Subscriber, SubscriptionId, TableModel};
