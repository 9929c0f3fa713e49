use super::api::AuthApi;
use super::state::{AuthState, Credentials, User, UserUpdate};
use super::token;
use crate::config::Environment;
use crate::navigation::{Navigator, NoopNavigator, LOGIN_ROUTE};
use crate::runtime::ReactiveRuntime;
use crate::signal::Memo;
use crate::store::{KeyValueStorage, Store, StoreConfig, StoreSnapshot};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub const AUTH_STORE_NAME: &str = "AUTH";
pub const AUTH_PERSISTENCE_KEY: &str = "auth-store";
const AUTH_HISTORY_SIZE: usize = 10;

pub const INVALID_TOKEN_MESSAGE: &str = "Invalid token received from server";
pub const LOGIN_FAILED_MESSAGE: &str = "Login failed. Please check your credentials.";

type RefreshFuture = Shared<BoxFuture<'static, bool>>;

struct Selectors {
    is_authenticated: Memo<bool>,
    current_user: Memo<Option<User>>,
    access_token: Memo<Option<String>>,
    refresh_token: Memo<Option<String>>,
    is_loading: Memo<bool>,
    error: Memo<Option<String>>,
    user_name: Memo<String>,
    is_logged_in: Memo<bool>,
    has_valid_token: Memo<bool>,
}

impl Selectors {
    fn new(store: &Store<AuthState>) -> Self {
        let runtime = store.runtime();
        let is_authenticated = store.select(|s| s.is_authenticated);
        let current_user = store.select(|s| s.current_user.clone());
        let access_token = store.select(|s| s.access_token.clone());

        let user_name = Memo::new_in(Arc::clone(&runtime), {
            let current_user = current_user.clone();
            move || {
                current_user.with(|user| user.as_ref().map(|u| u.username.clone()).unwrap_or_default())
            }
        });
        let is_logged_in = Memo::new_in(Arc::clone(&runtime), {
            let is_authenticated = is_authenticated.clone();
            let current_user = current_user.clone();
            move || is_authenticated.get() && current_user.with(Option::is_some)
        });
        let has_valid_token = Memo::new_in(runtime, {
            let access_token = access_token.clone();
            move || access_token.with(Option::is_some)
        });

        Self {
            refresh_token: store.select(|s| s.refresh_token.clone()),
            is_loading: store.select(|s| s.is_loading),
            error: store.select(|s| s.error.clone()),
            is_authenticated,
            current_user,
            access_token,
            user_name,
            is_logged_in,
            has_valid_token,
        }
    }
}

struct AuthInner {
    store: Store<AuthState>,
    api: Arc<dyn AuthApi>,
    navigator: Arc<dyn Navigator>,
    logging: bool,
    refresh_in_flight: Mutex<Option<RefreshFuture>>,
    selectors: Selectors,
}

/// The authentication session: tokens, the current user, and the
/// login/logout/refresh operations that move between them.
///
/// Cloning is cheap and every clone shares the same session. Token refresh
/// is single-flight: concurrent callers await one shared request.
#[derive(Clone)]
pub struct AuthStore {
    inner: Arc<AuthInner>,
}

/// Builder for an [`AuthStore`].
pub struct AuthStoreBuilder {
    api: Arc<dyn AuthApi>,
    environment: Environment,
    storage: Option<Arc<dyn KeyValueStorage>>,
    navigator: Arc<dyn Navigator>,
    runtime: Option<Arc<ReactiveRuntime>>,
}

impl AuthStoreBuilder {
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Durable adapter for the `auth-store` key.
    pub fn storage(mut self, storage: Arc<dyn KeyValueStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    pub fn runtime(mut self, runtime: Arc<ReactiveRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Build the store and restore any persisted session.
    ///
    /// A persisted token that is still valid is restored immediately. An
    /// expired one starts a background refresh when a tokio runtime is
    /// available; [`AuthStore::restore_session`] awaits the same refresh.
    pub fn build(self) -> AuthStore {
        let mut store = Store::builder(AUTH_STORE_NAME, AuthState::default())
            .config(AuthStore::store_config(&self.environment))
            .maybe_storage(self.storage);
        if let Some(runtime) = self.runtime {
            store = store.runtime(runtime);
        }
        let store = store.build();

        let auth = AuthStore {
            inner: Arc::new(AuthInner {
                selectors: Selectors::new(&store),
                store,
                api: self.api,
                navigator: self.navigator,
                logging: self.environment.features.logging,
                refresh_in_flight: Mutex::new(None),
            }),
        };
        auth.check_persisted_session();
        auth
    }
}

impl AuthStore {
    pub fn builder(api: Arc<dyn AuthApi>) -> AuthStoreBuilder {
        AuthStoreBuilder {
            api,
            environment: Environment::default(),
            storage: None,
            navigator: Arc::new(NoopNavigator),
            runtime: None,
        }
    }

    /// Store configuration derived from the environment's feature flags.
    pub fn store_config(environment: &Environment) -> StoreConfig {
        StoreConfig {
            enable_dev_tools: environment.features.dev_tools,
            enable_persistence: environment.features.persistence,
            persistence_key: AUTH_PERSISTENCE_KEY.to_string(),
            enable_history: environment.features.dev_tools,
            max_history_size: AUTH_HISTORY_SIZE,
        }
    }

    fn check_persisted_session(&self) {
        let state = self.inner.store.read(AuthState::clone);

        if state.is_loading || (state.is_authenticated && state.current_user.is_none()) {
            self.inner.store.patch_state_as("NORMALIZE_SESSION", |s| {
                s.is_loading = false;
                s.is_authenticated = s.is_authenticated && s.current_user.is_some();
            });
        }

        let Some(access) = state.access_token else {
            return;
        };

        if token::is_token_expired(&access) {
            tracing::debug!("persisted access token is expired, refreshing");
            if self.spawn_restore().is_none() {
                tracing::debug!("no async runtime; call restore_session to refresh");
            }
            return;
        }

        match state
            .current_user
            .or_else(|| token::user_from_token(&access).ok())
        {
            Some(user) => self.inner.store.patch_state_as("RESTORE_SESSION", |s| {
                s.is_authenticated = true;
                s.current_user = Some(user);
            }),
            None => tracing::warn!("persisted access token names no user, session not restored"),
        }
    }

    /// Finish restoring a persisted session.
    ///
    /// Refreshes an expired persisted token (sharing any refresh already in
    /// flight) and reports whether a session is active afterwards.
    pub async fn restore_session(&self) -> bool {
        let Some(access) = self.access_token() else {
            return false;
        };
        if !token::is_token_expired(&access) {
            return self.is_authenticated();
        }

        let refreshed = self.refresh_access_token().await;
        if !refreshed && self.inner.logging {
            tracing::warn!("unable to refresh persisted session, logged out");
        }
        refreshed
    }

    /// Run [`AuthStore::restore_session`] in the background.
    ///
    /// Returns `None` outside a tokio runtime.
    pub fn spawn_restore(&self) -> Option<JoinHandle<bool>> {
        let handle = tokio::runtime::Handle::try_current().ok()?;
        let store = self.clone();
        Some(handle.spawn(async move { store.restore_session().await }))
    }

    /// Log in with `credentials`.
    ///
    /// Resolves `false` on any failure, with the reason in [`AuthStore::error`].
    pub async fn login(&self, credentials: &Credentials) -> bool {
        let store = &self.inner.store;
        store.set_loading(true, Some("LOGIN"));
        store.clear_error();

        let tokens = match self.inner.api.login(credentials).await {
            Ok(tokens) => tokens,
            Err(error) => {
                let message = error.detail().unwrap_or(LOGIN_FAILED_MESSAGE).to_string();
                store.patch_state_as("LOGIN_FAILURE", |s| {
                    s.is_loading = false;
                    s.error = Some(message);
                });
                if self.inner.logging {
                    tracing::warn!(%error, username = %credentials.username, "login failed");
                }
                return false;
            }
        };

        match token::user_from_token(&tokens.access) {
            Ok(user) => {
                let username = user.username.clone();
                store.patch_state_as("LOGIN_SUCCESS", |s| {
                    s.is_authenticated = true;
                    s.current_user = Some(user);
                    s.access_token = Some(tokens.access);
                    s.refresh_token = Some(tokens.refresh);
                    s.is_loading = false;
                    s.error = None;
                });
                if self.inner.logging {
                    tracing::info!(%username, "login successful");
                }
                true
            }
            Err(error) => {
                store.patch_state_as("LOGIN_FAILURE", |s| {
                    s.is_loading = false;
                    s.error = Some(INVALID_TOKEN_MESSAGE.to_string());
                });
                tracing::warn!(%error, "login returned an unreadable access token");
                false
            }
        }
    }

    /// End the session and send the user to the login page.
    pub fn logout(&self) {
        self.inner.store.patch_state_as("LOGOUT", AuthState::sign_out);
        if self.inner.logging {
            tracing::info!("user logged out");
        }
        self.inner.navigator.navigate(LOGIN_ROUTE);
    }

    /// Exchange the held refresh token for a new token pair.
    ///
    /// Without a refresh token this logs out and resolves `false`. Callers
    /// arriving while a refresh is in flight share its outcome instead of
    /// issuing another request.
    pub async fn refresh_access_token(&self) -> bool {
        enum Step {
            Join(RefreshFuture),
            NoRefreshToken,
        }

        let step = {
            let mut slot = self.inner.refresh_in_flight.lock();
            match slot.as_ref().cloned() {
                Some(in_flight) => Step::Join(in_flight),
                None => match self.refresh_token() {
                    None => Step::NoRefreshToken,
                    Some(refresh_token) => {
                        let store = self.clone();
                        let refresh = async move {
                            let refreshed = store.perform_refresh(refresh_token).await;
                            store.inner.refresh_in_flight.lock().take();
                            refreshed
                        }
                        .boxed()
                        .shared();
                        *slot = Some(refresh.clone());
                        Step::Join(refresh)
                    }
                },
            }
        };

        match step {
            Step::Join(refresh) => refresh.await,
            Step::NoRefreshToken => {
                self.logout();
                false
            }
        }
    }

    async fn perform_refresh(&self, refresh_token: String) -> bool {
        let store = &self.inner.store;
        store.set_loading(true, Some("REFRESH_TOKEN"));

        match self.inner.api.refresh(&refresh_token).await {
            Ok(tokens) => {
                let user = token::user_from_token(&tokens.access).ok();
                store.patch_state_as("REFRESH_TOKEN_SUCCESS", |s| {
                    if let Some(user) = user {
                        s.current_user = Some(user);
                    }
                    s.is_authenticated = s.current_user.is_some();
                    s.access_token = Some(tokens.access);
                    s.refresh_token = Some(tokens.refresh);
                    s.is_loading = false;
                    s.error = None;
                });
                if self.inner.logging {
                    tracing::info!("token refreshed");
                }
                true
            }
            Err(error) => {
                tracing::warn!(%error, "token refresh failed");
                self.logout();
                false
            }
        }
    }

    /// Make sure the session is usable, refreshing an expired token.
    pub async fn refresh_session(&self) -> bool {
        let Some(access) = self.access_token() else {
            self.logout();
            return false;
        };
        if !token::is_token_expired(&access) {
            return true;
        }
        self.refresh_access_token().await
    }

    pub fn update_user(&self, update: UserUpdate) {
        if self.current_user().is_none() {
            return;
        }
        self.inner.store.patch_state_as("UPDATE_USER", |s| {
            if let Some(user) = s.current_user.as_mut() {
                update.apply(user);
            }
        });
    }

    pub fn clear_auth_error(&self) {
        self.inner.store.clear_error();
    }

    /// Coarse check: any authenticated user holding a token passes.
    // TODO: read per-permission claims once the token endpoint issues them.
    pub fn has_permission(&self, _permission: &str) -> bool {
        self.is_authenticated() && self.current_user().is_some() && self.has_valid_token()
    }

    pub fn reset(&self) {
        self.inner.store.reset_state_as("RESET_AUTH_STORE");
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.selectors.is_authenticated.get()
    }

    pub fn current_user(&self) -> Option<User> {
        self.inner.selectors.current_user.get()
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.selectors.access_token.get()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.inner.selectors.refresh_token.get()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.selectors.is_loading.get()
    }

    pub fn error(&self) -> Option<String> {
        self.inner.selectors.error.get()
    }

    /// Current username, empty when signed out.
    pub fn user_name(&self) -> String {
        self.inner.selectors.user_name.get()
    }

    pub fn is_logged_in(&self) -> bool {
        self.inner.selectors.is_logged_in.get()
    }

    /// Whether an access token is held. Does not check expiry.
    pub fn has_valid_token(&self) -> bool {
        self.inner.selectors.has_valid_token.get()
    }

    pub fn state(&self) -> AuthState {
        self.inner.store.get()
    }

    /// The underlying store, for history, actions and subscriptions.
    pub fn store(&self) -> &Store<AuthState> {
        &self.inner.store
    }

    pub fn snapshot(&self) -> StoreSnapshot<AuthState> {
        self.inner.store.snapshot()
    }

    pub fn load_snapshot(&self, state: AuthState) {
        self.inner.store.load_snapshot(state);
    }

    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.inner.navigator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::state::TokenPair;
    use crate::error::ApiError;
    use crate::navigation::HistoryNavigator;
    use crate::store::MemoryStorage;
    use async_trait::async_trait;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use serde_json::json;

    fn jwt(sub: &str, ttl: i64) -> String {
        let exp = chrono::Utc::now().timestamp() + ttl;
        let payload = URL_SAFE_NO_PAD.encode(json!({ "sub": sub, "exp": exp }).to_string());
        format!("e30.{payload}.sig")
    }

    struct FixedApi(Result<TokenPair, u16>);

    #[async_trait]
    impl AuthApi for FixedApi {
        async fn login(&self, _: &Credentials) -> Result<TokenPair, ApiError> {
            self.respond()
        }

        async fn refresh(&self, _: &str) -> Result<TokenPair, ApiError> {
            self.respond()
        }
    }

    impl FixedApi {
        fn respond(&self) -> Result<TokenPair, ApiError> {
            self.0.clone().map_err(|code| ApiError::Rejected {
                status: reqwest::StatusCode::from_u16(code).unwrap(),
                detail: None,
            })
        }
    }

    fn store_with(api: FixedApi) -> (AuthStore, Arc<HistoryNavigator>) {
        let navigator = Arc::new(HistoryNavigator::new());
        let store = AuthStore::builder(Arc::new(api))
            .environment(Environment::production())
            .navigator(navigator.clone())
            .runtime(ReactiveRuntime::new())
            .build();
        (store, navigator)
    }

    #[tokio::test]
    async fn login_with_unreadable_token_fails() {
        let (store, _) = store_with(FixedApi(Ok(TokenPair {
            access: "garbage".into(),
            refresh: "r".into(),
        })));

        assert!(!store.login(&Credentials::new("a", "b")).await);
        assert_eq!(store.error().as_deref(), Some(INVALID_TOKEN_MESSAGE));
        assert!(!store.is_authenticated());
        assert!(!store.is_loading());
        assert_eq!(store.access_token(), None);
    }

    #[tokio::test]
    async fn login_failure_without_detail_uses_fallback() {
        let (store, _) = store_with(FixedApi(Err(500)));
        assert!(!store.login(&Credentials::new("a", "b")).await);
        assert_eq!(store.error().as_deref(), Some(LOGIN_FAILED_MESSAGE));
    }

    #[tokio::test]
    async fn refresh_without_token_logs_out() {
        let (store, navigator) = store_with(FixedApi(Err(500)));
        assert!(!store.refresh_access_token().await);
        assert_eq!(navigator.current().as_deref(), Some(LOGIN_ROUTE));
        assert_eq!(store.store().last_action().unwrap().action(), "LOGOUT");
    }

    #[tokio::test]
    async fn refresh_session_with_valid_token_skips_network() {
        let (store, _) = store_with(FixedApi(Err(500)));
        store.load_snapshot(AuthState {
            is_authenticated: true,
            current_user: Some(User::new("ada")),
            access_token: Some(jwt("ada", 600)),
            refresh_token: Some("r".into()),
            ..Default::default()
        });
        assert!(store.refresh_session().await);
        assert!(store.is_authenticated());
    }

    #[tokio::test]
    async fn failed_refresh_logs_out() {
        let (store, navigator) = store_with(FixedApi(Err(401)));
        store.load_snapshot(AuthState {
            is_authenticated: true,
            current_user: Some(User::new("ada")),
            access_token: Some(jwt("ada", -60)),
            refresh_token: Some("stale".into()),
            ..Default::default()
        });

        assert!(!store.refresh_session().await);
        assert_eq!(store.state(), AuthState::default());
        assert_eq!(navigator.visited(), vec![LOGIN_ROUTE.to_string()]);
    }

    #[test]
    fn valid_persisted_token_restores_without_network() {
        let persisted = serde_json::to_string(&AuthState {
            is_authenticated: false,
            current_user: None,
            access_token: Some(jwt("ada", 600)),
            refresh_token: Some("r".into()),
            is_loading: true,
            error: None,
        })
        .unwrap();
        let storage = Arc::new(MemoryStorage::new().with_entry(AUTH_PERSISTENCE_KEY, persisted));

        let store = AuthStore::builder(Arc::new(FixedApi(Err(500))))
            .storage(storage)
            .runtime(ReactiveRuntime::new())
            .build();

        assert!(store.is_authenticated());
        assert!(!store.is_loading());
        assert_eq!(store.user_name(), "ada");
        assert_eq!(store.store().last_action().unwrap().action(), "RESTORE_SESSION");
    }

    #[test]
    fn update_user_requires_a_user() {
        let (store, _) = store_with(FixedApi(Err(500)));
        store.update_user(UserUpdate {
            email: Some("x@example.com".into()),
            ..Default::default()
        });
        assert_eq!(store.current_user(), None);
        assert!(store.store().actions().is_empty());
    }
}
