//! High-level state management with stores.
//!
//! Stores wrap a reactive cell with whole-record updates, a bounded undo
//! history, an action log, derived selectors and optional persistence
//! through a durable key-value adapter.

mod config;
mod ledger;
mod persistence;
mod store;

pub use config::StoreConfig;
pub use ledger::{ActionRecord, ACTION_LOG_LIMIT};
pub use persistence::{FileStorage, KeyValueStorage, MemoryStorage};
pub use store::{Store, StoreBuilder, StoreSnapshot, StoreState, DEVTOOLS_TARGET};
