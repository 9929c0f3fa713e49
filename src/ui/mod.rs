//! UI store: theme, sidebar, connectivity and notifications.

mod state;
mod store;

pub use state::{NewNotification, Notification, NotificationKind, Theme, UiState};
pub use store::{
    UiStore, UiStoreBuilder, DEFAULT_NOTIFICATION_DURATION, ERROR_NOTIFICATION_DURATION,
    UI_PERSISTENCE_KEY, UI_STORE_NAME,
};
