//! Application-wide composition of the stores.

mod app_store;
mod devtools;

pub use app_store::{AppState, AppStore, GlobalSnapshot, PartialGlobalSnapshot, StateSlot};
pub use devtools::DevTools;
