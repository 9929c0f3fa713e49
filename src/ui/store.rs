use super::state::{NewNotification, Notification, NotificationKind, Theme, UiState};
use crate::runtime::ReactiveRuntime;
use crate::signal::Memo;
use crate::store::{KeyValueStorage, Store, StoreConfig, StoreSnapshot};
use chrono::Utc;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

pub const UI_STORE_NAME: &str = "UI";
pub const UI_PERSISTENCE_KEY: &str = "ui-store";

pub const DEFAULT_NOTIFICATION_DURATION: Duration = Duration::from_millis(5000);
pub const ERROR_NOTIFICATION_DURATION: Duration = Duration::from_millis(8000);

struct UiInner {
    store: Store<UiState>,
    theme: Memo<Theme>,
    sidebar_open: Memo<bool>,
    notifications: Memo<Vec<Notification>>,
    is_offline: Memo<bool>,
    has_notifications: Memo<bool>,
    is_loading: Memo<bool>,
}

/// Theme, sidebar, connectivity and the notification queue.
///
/// Notifications with a lifetime are removed by a timer task on the
/// ambient tokio runtime.
#[derive(Clone)]
pub struct UiStore {
    inner: Arc<UiInner>,
}

#[derive(Default)]
pub struct UiStoreBuilder {
    storage: Option<Arc<dyn KeyValueStorage>>,
    runtime: Option<Arc<ReactiveRuntime>>,
}

impl UiStoreBuilder {
    /// Durable adapter for the `ui-store` key.
    pub fn storage(mut self, storage: Arc<dyn KeyValueStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn runtime(mut self, runtime: Arc<ReactiveRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> UiStore {
        let mut store = Store::builder(UI_STORE_NAME, UiState::default())
            .config(UiStore::store_config())
            .maybe_storage(self.storage);
        if let Some(runtime) = self.runtime {
            store = store.runtime(runtime);
        }
        let store = store.build();

        let notifications = store.select(|s| s.notifications.clone());
        let has_notifications = Memo::new_in(store.runtime(), {
            let notifications = notifications.clone();
            move || notifications.with(|queue| !queue.is_empty())
        });

        UiStore {
            inner: Arc::new(UiInner {
                theme: store.select(|s| s.theme),
                sidebar_open: store.select(|s| s.sidebar_open),
                is_offline: store.select(|s| s.is_offline),
                is_loading: store.select(|s| s.loading.values().any(|loading| *loading)),
                notifications,
                has_notifications,
                store,
            }),
        }
    }
}

impl UiStore {
    pub fn builder() -> UiStoreBuilder {
        UiStoreBuilder::default()
    }

    /// In-memory store in the current runtime.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn store_config() -> StoreConfig {
        StoreConfig::default()
            .with_persistence(UI_PERSISTENCE_KEY)
            .with_dev_tools(true)
            .without_history()
    }

    pub fn set_theme(&self, theme: Theme) {
        self.inner.store.patch_state_as("SET_THEME", |s| s.theme = theme);
    }

    /// Switch between light and dark; `auto` becomes light.
    pub fn toggle_theme(&self) {
        let next = match self.theme() {
            Theme::Light => Theme::Dark,
            Theme::Dark | Theme::Auto => Theme::Light,
        };
        self.set_theme(next);
    }

    pub fn toggle_sidebar(&self) {
        self.inner
            .store
            .patch_state_as("TOGGLE_SIDEBAR", |s| s.sidebar_open = !s.sidebar_open);
    }

    pub fn set_sidebar_open(&self, open: bool) {
        self.inner
            .store
            .patch_state_as("SET_SIDEBAR_OPEN", |s| s.sidebar_open = open);
    }

    /// Queue a notification and return its id.
    ///
    /// Unless sticky, it is removed once its duration (default 5s) elapses.
    pub fn add_notification(&self, notification: NewNotification) -> String {
        let id = format!("notification_{}", Uuid::new_v4().simple());
        let lifetime = (!notification.sticky)
            .then(|| notification.duration.unwrap_or(DEFAULT_NOTIFICATION_DURATION));

        let entry = Notification {
            id: id.clone(),
            kind: notification.kind,
            title: notification.title,
            message: notification.message,
            timestamp: Utc::now().timestamp_millis(),
            duration: lifetime.map(|d| d.as_millis() as u64),
        };
        self.inner
            .store
            .patch_state_as("ADD_NOTIFICATION", |s| s.notifications.push(entry));

        if let Some(lifetime) = lifetime {
            self.schedule_removal(id.clone(), lifetime);
        }
        id
    }

    fn schedule_removal(&self, id: String, after: Duration) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(%id, "no async runtime, notification will not expire");
            return;
        };
        let inner: Weak<UiInner> = Arc::downgrade(&self.inner);
        handle.spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(inner) = inner.upgrade() {
                UiStore { inner }.remove_notification(&id);
            }
        });
    }

    /// Drop a notification; unknown ids are ignored.
    pub fn remove_notification(&self, id: &str) {
        if !self.inner.store.read(|s| s.notifications.iter().any(|n| n.id == id)) {
            return;
        }
        self.inner
            .store
            .patch_state_as("REMOVE_NOTIFICATION", |s| s.notifications.retain(|n| n.id != id));
    }

    pub fn clear_all_notifications(&self) {
        self.inner
            .store
            .patch_state_as("CLEAR_ALL_NOTIFICATIONS", |s| s.notifications.clear());
    }

    pub fn set_loading_state(&self, key: &str, loading: bool) {
        self.inner.store.patch_state_as(
            &format!("SET_LOADING_{}", key.to_uppercase()),
            |s| {
                s.loading.insert(key.to_string(), loading);
            },
        );
    }

    pub fn clear_loading_state(&self, key: &str) {
        self.inner.store.patch_state_as(
            &format!("CLEAR_LOADING_{}", key.to_uppercase()),
            |s| {
                s.loading.remove(key);
            },
        );
    }

    fn show(&self, kind: NotificationKind, title: &str, message: &str, duration: Option<Duration>) -> String {
        let mut notification = NewNotification::new(kind, title, message);
        notification.duration = duration;
        self.add_notification(notification)
    }

    pub fn show_success(&self, title: &str, message: &str, duration: Option<Duration>) -> String {
        self.show(NotificationKind::Success, title, message, duration)
    }

    /// Error notifications stay for 8s unless told otherwise.
    pub fn show_error(&self, title: &str, message: &str, duration: Option<Duration>) -> String {
        let duration = duration.unwrap_or(ERROR_NOTIFICATION_DURATION);
        self.show(NotificationKind::Error, title, message, Some(duration))
    }

    pub fn show_warning(&self, title: &str, message: &str, duration: Option<Duration>) -> String {
        self.show(NotificationKind::Warning, title, message, duration)
    }

    pub fn show_info(&self, title: &str, message: &str, duration: Option<Duration>) -> String {
        self.show(NotificationKind::Info, title, message, duration)
    }

    /// Record a connectivity change reported by the host.
    ///
    /// Going offline raises a warning notification.
    pub fn set_online(&self, online: bool) {
        let was_offline = self.is_offline();
        if online {
            self.inner
                .store
                .patch_state_as("NETWORK_ONLINE", |s| s.is_offline = false);
            return;
        }
        self.inner
            .store
            .patch_state_as("NETWORK_OFFLINE", |s| s.is_offline = true);
        if !was_offline {
            self.show_warning("Network", "You are currently offline", None);
        }
    }

    /// Follow the host's connectivity channel (`true` = online).
    ///
    /// Must be called from within a tokio runtime.
    pub fn watch_connectivity(&self, mut online: watch::Receiver<bool>) -> JoinHandle<()> {
        let initially_online = *online.borrow_and_update();
        self.inner
            .store
            .patch_state_as("INITIAL_NETWORK_STATE", |s| s.is_offline = !initially_online);

        let ui = self.clone();
        tokio::spawn(async move {
            while online.changed().await.is_ok() {
                let now_online = *online.borrow_and_update();
                ui.set_online(now_online);
            }
        })
    }

    pub fn reset(&self) {
        self.inner.store.reset_state_as("RESET_UI_STORE");
    }

    pub fn theme(&self) -> Theme {
        self.inner.theme.get()
    }

    pub fn sidebar_open(&self) -> bool {
        self.inner.sidebar_open.get()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.inner.notifications.get()
    }

    pub fn has_notifications(&self) -> bool {
        self.inner.has_notifications.get()
    }

    /// Notifications still within their lifetime.
    pub fn unread_notifications(&self) -> Vec<Notification> {
        let now = Utc::now().timestamp_millis();
        self.inner
            .notifications
            .with(|queue| queue.iter().filter(|n| n.is_live_at(now)).cloned().collect())
    }

    pub fn is_offline(&self) -> bool {
        self.inner.is_offline.get()
    }

    /// Whether any keyed operation is loading.
    pub fn is_loading(&self) -> bool {
        self.inner.is_loading.get()
    }

    pub fn state(&self) -> UiState {
        self.inner.store.get()
    }

    pub fn store(&self) -> &Store<UiState> {
        &self.inner.store
    }

    pub fn snapshot(&self) -> StoreSnapshot<UiState> {
        self.inner.store.snapshot()
    }

    pub fn load_snapshot(&self, state: UiState) {
        self.inner.store.load_snapshot(state);
    }
}

impl Default for UiStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStorage;

    fn ui() -> UiStore {
        UiStore::builder().runtime(ReactiveRuntime::new()).build()
    }

    #[test]
    fn theme_and_sidebar_toggles() {
        let ui = ui();
        ui.toggle_theme();
        assert_eq!(ui.theme(), Theme::Dark);
        ui.set_theme(Theme::Auto);
        ui.toggle_theme();
        assert_eq!(ui.theme(), Theme::Light);

        ui.toggle_sidebar();
        assert!(ui.sidebar_open());
        ui.set_sidebar_open(false);
        assert!(!ui.sidebar_open());
    }

    #[test]
    fn loading_flags_are_keyed() {
        let ui = ui();
        ui.set_loading_state("users", true);
        assert!(ui.is_loading());
        assert_eq!(ui.store().last_action().unwrap().action(), "SET_LOADING_USERS");
        ui.clear_loading_state("users");
        assert!(!ui.is_loading());
        assert!(ui.state().loading.is_empty());
    }

    #[test]
    fn no_history_is_kept() {
        let ui = ui();
        ui.toggle_sidebar();
        assert!(ui.store().history().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn notifications_expire_after_their_duration() {
        let ui = ui();
        let short = ui.show_info("Hi", "short", Some(Duration::from_millis(50)));
        let sticky = ui.add_notification(NewNotification::new(NotificationKind::Info, "Pinned", "stays").sticky());
        let error = ui.show_error("Oops", "longer", None);

        assert_eq!(ui.notifications().len(), 3);
        let stored_error = ui.notifications().into_iter().find(|n| n.id == error).unwrap();
        assert_eq!(stored_error.duration, Some(8000));

        tokio::time::sleep(Duration::from_millis(60)).await;
        let ids: Vec<String> = ui.notifications().into_iter().map(|n| n.id).collect();
        assert!(!ids.contains(&short));
        assert!(ids.contains(&sticky));

        tokio::time::sleep(Duration::from_millis(8000)).await;
        let ids: Vec<String> = ui.notifications().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![sticky.clone()]);

        ui.remove_notification(&sticky);
        assert!(!ui.has_notifications());
    }

    #[test]
    fn default_duration_is_five_seconds() {
        let ui = ui();
        ui.show_success("Saved", "ok", None);
        assert_eq!(ui.notifications()[0].duration, Some(5000));
        assert!(ui.notifications()[0].id.starts_with("notification_"));
    }

    #[test]
    fn going_offline_warns_once() {
        let ui = ui();
        ui.set_online(false);
        ui.set_online(false);
        assert!(ui.is_offline());
        let warnings = ui
            .notifications()
            .into_iter()
            .filter(|n| n.kind == NotificationKind::Warning)
            .count();
        assert_eq!(warnings, 1);

        ui.set_online(true);
        assert!(!ui.is_offline());
    }

    #[tokio::test]
    async fn connectivity_channel_drives_offline_flag() {
        let ui = ui();
        let (tx, rx) = watch::channel(true);
        let task = ui.watch_connectivity(rx);
        assert!(!ui.is_offline());

        tx.send(false).unwrap();
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert!(ui.is_offline());

        drop(tx);
        task.await.unwrap();
    }

    #[test]
    fn persisted_under_ui_store_key() {
        let storage = Arc::new(MemoryStorage::new());
        let ui = UiStore::builder()
            .storage(storage.clone())
            .runtime(ReactiveRuntime::new())
            .build();
        ui.set_theme(Theme::Dark);
        assert!(storage.contains(UI_PERSISTENCE_KEY));

        let restored = UiStore::builder()
            .storage(storage)
            .runtime(ReactiveRuntime::new())
            .build();
        assert_eq!(restored.theme(), Theme::Dark);
    }
}
