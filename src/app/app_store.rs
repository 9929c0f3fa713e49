use crate::auth::{AuthState, AuthStore, User};
use crate::signal::Effect;
use crate::store::StoreSnapshot;
use crate::ui::{Theme, UiState, UiStore};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppState {
    pub auth: AuthState,
    pub ui: UiState,
}

/// Snapshots of every store, taken together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalSnapshot {
    pub auth: StoreSnapshot<AuthState>,
    pub ui: StoreSnapshot<UiState>,
    /// Milliseconds since the epoch.
    pub timestamp: i64,
}

/// The part of a store snapshot that can be loaded back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSlot<T> {
    pub state: T,
}

/// A global snapshot where any store may be left out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialGlobalSnapshot {
    #[serde(default)]
    pub auth: Option<StateSlot<AuthState>>,
    #[serde(default)]
    pub ui: Option<StateSlot<UiState>>,
}

/// Composes the auth and UI stores.
///
/// While alive it turns new auth errors into error notifications and greets
/// the user when a session becomes authenticated.
pub struct AppStore {
    auth: AuthStore,
    ui: UiStore,
    _effects: Vec<Effect>,
}

impl AppStore {
    pub fn new(auth: AuthStore, ui: UiStore) -> Self {
        let effects = vec![auth_error_effect(&auth, &ui), welcome_effect(&auth, &ui)];
        Self {
            auth,
            ui,
            _effects: effects,
        }
    }

    pub fn auth(&self) -> &AuthStore {
        &self.auth
    }

    pub fn ui(&self) -> &UiStore {
        &self.ui
    }

    pub fn state(&self) -> AppState {
        AppState {
            auth: self.auth.state(),
            ui: self.ui.state(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth.is_authenticated()
    }

    pub fn current_user(&self) -> Option<User> {
        self.auth.current_user()
    }

    /// Whether either store reports work in progress.
    pub fn is_loading(&self) -> bool {
        self.auth.is_loading() || self.ui.is_loading()
    }

    pub fn has_notifications(&self) -> bool {
        self.ui.has_notifications()
    }

    pub fn theme(&self) -> Theme {
        self.ui.theme()
    }

    /// Surface the pending auth error as a notification, then clear it.
    pub fn show_notification_for_auth_error(&self) {
        if let Some(error) = self.auth.error() {
            self.ui.show_error("Authentication Error", &error, None);
            self.auth.clear_auth_error();
        }
    }

    pub fn global_snapshot(&self) -> GlobalSnapshot {
        GlobalSnapshot {
            auth: self.auth.snapshot(),
            ui: self.ui.snapshot(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn load_global_snapshot(&self, snapshot: PartialGlobalSnapshot) {
        if let Some(auth) = snapshot.auth {
            self.auth.load_snapshot(auth.state);
        }
        if let Some(ui) = snapshot.ui {
            self.ui.load_snapshot(ui.state);
        }
    }

    pub fn reset_all_stores(&self) {
        self.auth.reset();
        self.ui.reset();
    }
}

fn auth_error_effect(auth: &AuthStore, ui: &UiStore) -> Effect {
    let last_seen: Mutex<Option<String>> = Mutex::new(None);
    let runtime = auth.store().runtime();
    let auth = auth.clone();
    let ui = ui.clone();

    Effect::new_in(runtime, move || {
        let error = auth.error();
        let fresh = {
            let mut last_seen = last_seen.lock();
            if *last_seen == error {
                None
            } else {
                *last_seen = error.clone();
                error
            }
        };
        if let Some(message) = fresh {
            auth.store().runtime().untracked(|| {
                ui.show_error("Authentication Failed", &message, None);
            });
        }
    })
}

fn welcome_effect(auth: &AuthStore, ui: &UiStore) -> Effect {
    let was_signed_in = AtomicBool::new(false);
    let runtime = auth.store().runtime();
    let auth = auth.clone();
    let ui = ui.clone();

    Effect::new_in(runtime, move || {
        let user = auth.current_user();
        let signed_in = auth.is_authenticated() && user.is_some();
        let entered = signed_in && !was_signed_in.swap(signed_in, Ordering::SeqCst);
        if !signed_in {
            was_signed_in.store(false, Ordering::SeqCst);
        }

        if let (true, Some(user)) = (entered, user) {
            let message = format!("Hello {}, you have successfully logged in.", user.username);
            auth.store().runtime().untracked(|| {
                ui.show_success("Welcome!", &message, None);
            });
        }
    })
}
