use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;

/// Maximum number of actions kept in a store's log.
pub const ACTION_LOG_LIMIT: usize = 100;

/// One entry of a store's action log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    /// Namespaced as `<store>/<action>`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

impl ActionRecord {
    pub fn new(store: &str, action: &str, payload: Option<Value>) -> Self {
        Self {
            kind: format!("{store}/{action}"),
            payload,
            timestamp: Utc::now(),
            source: store.to_string(),
        }
    }

    /// The action label without the store prefix.
    pub fn action(&self) -> &str {
        self.kind
            .split_once('/')
            .map_or(self.kind.as_str(), |(_, action)| action)
    }
}

/// History and action log of a store, both most-recent-first.
#[derive(Debug, Clone)]
pub(crate) struct Ledger<T> {
    history: VecDeque<T>,
    actions: VecDeque<ActionRecord>,
}

impl<T: Clone> Ledger<T> {
    pub(crate) fn new() -> Self {
        Self {
            history: VecDeque::new(),
            actions: VecDeque::new(),
        }
    }

    pub(crate) fn push_history(&mut self, previous: T, limit: usize) {
        if limit == 0 {
            return;
        }
        self.history.push_front(previous);
        self.history.truncate(limit);
    }

    pub(crate) fn pop_history(&mut self) -> Option<T> {
        self.history.pop_front()
    }

    pub(crate) fn record(&mut self, action: ActionRecord) {
        self.actions.push_front(action);
        self.actions.truncate(ACTION_LOG_LIMIT);
    }

    pub(crate) fn history(&self) -> Vec<T> {
        self.history.iter().cloned().collect()
    }

    pub(crate) fn history_len(&self) -> usize {
        self.history.len()
    }

    pub(crate) fn actions(&self) -> Vec<ActionRecord> {
        self.actions.iter().cloned().collect()
    }

    pub(crate) fn last_action(&self) -> Option<&ActionRecord> {
        self.actions.front()
    }
}
