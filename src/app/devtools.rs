use super::app_store::{AppStore, PartialGlobalSnapshot};
use crate::error::Result;
use crate::store::DEVTOOLS_TARGET;
use crate::ui::NotificationKind;
use serde::Deserialize;
use serde_json::Value;

/// Inspector over an [`AppStore`] for debugging sessions.
///
/// Everything crosses the boundary as JSON so a console or a remote tool
/// can drive it without the crate's types.
pub struct DevTools<'a> {
    app: &'a AppStore,
}

impl<'a> DevTools<'a> {
    pub fn new(app: &'a AppStore) -> Self {
        Self { app }
    }

    pub fn global_state(&self) -> Result<Value> {
        Ok(serde_json::to_value(self.app.state())?)
    }

    /// Every store's state, history and actions.
    pub fn snapshot(&self) -> Result<Value> {
        Ok(serde_json::to_value(self.app.global_snapshot())?)
    }

    /// Load the `state` of each store present under `auth` / `ui`.
    pub fn load_snapshot(&self, snapshot: &Value) -> Result<()> {
        let partial = PartialGlobalSnapshot::deserialize(snapshot)?;
        self.app.load_global_snapshot(partial);
        Ok(())
    }

    pub fn reset_all(&self) {
        self.app.reset_all_stores();
    }

    pub fn auth_state(&self) -> Result<Value> {
        Ok(serde_json::to_value(self.app.auth().state())?)
    }

    pub fn ui_state(&self) -> Result<Value> {
        Ok(serde_json::to_value(self.app.ui().state())?)
    }

    /// Show a notification; unknown kinds fall back to info.
    pub fn show_notification(&self, kind: &str, title: &str, message: &str) -> String {
        let ui = self.app.ui();
        match kind.parse().unwrap_or(NotificationKind::Info) {
            NotificationKind::Success => ui.show_success(title, message, None),
            NotificationKind::Error => ui.show_error(title, message, None),
            NotificationKind::Warning => ui.show_warning(title, message, None),
            NotificationKind::Info => ui.show_info(title, message, None),
        }
    }

    pub fn announce(&self) {
        tracing::info!(
            target: DEVTOOLS_TARGET,
            stores = "auth, ui",
            "store devtools attached"
        );
    }
}
