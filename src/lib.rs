//! # Tincan Session
//!
//! Reactive stores and an authentication session core.
//!
//! ## Signals (Low-level primitives)
//!
//! Fine-grained reactive primitives the stores are built on:
//! - `Signal<T>` - Reactive values that notify dependents when changed
//! - `Memo<T>` - Computed values that automatically track dependencies
//! - `Effect` - Side effects that run when dependencies change
//!
//! ## Stores
//!
//! - `Store<T>` - Whole-record state container with undo history, an
//!   action log, selectors and write-through persistence
//! - `AuthStore` - Login, logout and single-flight token refresh
//! - `UiStore` - Theme, sidebar, connectivity and expiring notifications
//! - `AppStore` - Both of the above, with cross-store effects
//!
//! ## Around the session
//!
//! - `AuthInterceptor` - Bearer tokens on outbound requests and one retry
//!   after a refresh on 401
//! - `auth_guard` / `login_guard` - Route decisions from session state
//!
//! ```no_run
//! use std::sync::Arc;
//! use tincan_session::{AuthStore, Credentials, Environment, HttpAuthApi};
//!
//! # async fn run() {
//! let env = Environment::development();
//! let auth = AuthStore::builder(Arc::new(HttpAuthApi::new(&env)))
//!     .environment(env)
//!     .build();
//!
//! if auth.login(&Credentials::new("alice", "secret")).await {
//!     println!("signed in as {}", auth.user_name());
//! }
//! # }
//! ```

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod guard;
pub mod http;
pub mod navigation;
pub mod runtime;
pub mod signal;
pub mod store;
pub mod ui;

// Re-export main types for convenience
pub use app::{AppStore, DevTools};
pub use auth::{AuthApi, AuthState, AuthStore, Credentials, HttpAuthApi, TokenPair, User};
pub use config::Environment;
pub use error::{Error, Result};
pub use guard::{auth_guard, login_guard, GuardDecision};
pub use http::{AuthInterceptor, Handler, HttpRequest, HttpResponse, Intercepted};
pub use navigation::Navigator;
pub use signal::{create_effect, create_memo, create_signal, Effect, Memo, Signal};
pub use store::{Store, StoreConfig, StoreState};
pub use ui::{NotificationKind, Theme, UiStore};
