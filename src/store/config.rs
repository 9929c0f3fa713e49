use serde::{Deserialize, Serialize};

/// Per-store behavior, fixed when the store is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// Emit every action to the devtools tracing target.
    pub enable_dev_tools: bool,
    /// Load from and write through to the durable adapter.
    pub enable_persistence: bool,
    /// Adapter key; empty means `<storename>-store`.
    pub persistence_key: String,
    pub enable_history: bool,
    pub max_history_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enable_dev_tools: false,
            enable_persistence: false,
            persistence_key: String::new(),
            enable_history: true,
            max_history_size: 50,
        }
    }
}

impl StoreConfig {
    pub fn with_persistence(mut self, key: impl Into<String>) -> Self {
        self.enable_persistence = true;
        self.persistence_key = key.into();
        self
    }

    pub fn with_history(mut self, max_size: usize) -> Self {
        self.enable_history = true;
        self.max_history_size = max_size;
        self
    }

    pub fn without_history(mut self) -> Self {
        self.enable_history = false;
        self.max_history_size = 0;
        self
    }

    pub fn with_dev_tools(mut self, enabled: bool) -> Self {
        self.enable_dev_tools = enabled;
        self
    }

    /// Number of previous states kept; zero when history is off.
    pub(crate) fn history_limit(&self) -> usize {
        if self.enable_history {
            self.max_history_size
        } else {
            0
        }
    }

    pub(crate) fn resolved_key(&self, store_name: &str) -> String {
        if self.persistence_key.is_empty() {
            format!("{}-store", store_name.to_lowercase())
        } else {
            self.persistence_key.clone()
        }
    }
}
