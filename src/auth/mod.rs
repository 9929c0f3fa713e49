//! Authentication session.
//!
//! [`AuthStore`] specializes the generic store with session state, reads
//! user and expiry claims from access tokens, and drives login, logout and
//! single-flight token refresh against an [`AuthApi`].

mod api;
mod state;
mod store;
pub mod token;

pub use api::{AuthApi, HttpAuthApi};
pub use state::{AuthState, Credentials, TokenPair, User, UserPreferences, UserUpdate};
pub use store::{
    AuthStore, AuthStoreBuilder, AUTH_PERSISTENCE_KEY, AUTH_STORE_NAME, INVALID_TOKEN_MESSAGE,
    LOGIN_FAILED_MESSAGE,
};
