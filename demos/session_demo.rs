//! Walk through a session: login, an authenticated request that needs a
//! token refresh, notifications and logout.
//!
//! Run with `RUST_LOG=tincan_session=debug` to see every store transition.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use reqwest::StatusCode;
use serde_json::json;
use std::sync::Arc;
use tincan_session::auth::{AuthApi, Credentials, TokenPair};
use tincan_session::error::{ApiError, HttpError};
use tincan_session::http::{AuthInterceptor, Handler, HttpRequest, HttpResponse, Intercepted};
use tincan_session::navigation::HistoryNavigator;
use tincan_session::store::MemoryStorage;
use tincan_session::{auth_guard, login_guard, AppStore, AuthStore, DevTools, Environment, UiStore};
use tracing_subscriber::EnvFilter;

fn token(username: &str, ttl: i64) -> String {
    let exp = chrono::Utc::now().timestamp() + ttl;
    let payload = URL_SAFE_NO_PAD.encode(json!({ "username": username, "exp": exp }).to_string());
    format!("e30.{payload}.demo")
}

/// Hands out a token that is already expired on login, and a fresh one on
/// refresh.
struct DemoAuthApi;

#[async_trait]
impl AuthApi for DemoAuthApi {
    async fn login(&self, credentials: &Credentials) -> Result<TokenPair, ApiError> {
        if credentials.password != "demo" {
            return Err(ApiError::Rejected {
                status: StatusCode::BAD_REQUEST,
                detail: Some("No active account found with the given credentials".into()),
            });
        }
        Ok(TokenPair {
            access: token(&credentials.username, -1),
            refresh: "refresh-1".into(),
        })
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenPair, ApiError> {
        Ok(TokenPair {
            access: token("demo", 3600),
            refresh: "refresh-2".into(),
        })
    }
}

/// Accepts only unexpired bearer tokens.
struct DemoBackend;

#[async_trait]
impl Handler for DemoBackend {
    async fn handle(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        match request.bearer_token() {
            Some(bearer) if !tincan_session::auth::token::is_token_expired(bearer) => Ok(
                HttpResponse::new(StatusCode::OK, br#"{"projects":["alpha","beta"]}"#.to_vec()),
            ),
            _ => Err(HttpError::Status {
                status: StatusCode::UNAUTHORIZED,
                body: r#"{"detail":"Given token not valid for any token type"}"#.into(),
            }),
        }
    }
}

#[tokio::main]
async fn main() -> tincan_session::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Session Demo ===\n");

    let env = Environment::development();
    let storage = Arc::new(MemoryStorage::new());
    let navigator = Arc::new(HistoryNavigator::new());

    let auth = AuthStore::builder(Arc::new(DemoAuthApi))
        .environment(env.clone())
        .storage(storage.clone())
        .navigator(navigator.clone())
        .build();
    let ui = UiStore::builder().storage(storage.clone()).build();
    let app = AppStore::new(auth.clone(), ui);
    let devtools = DevTools::new(&app);
    devtools.announce();

    println!("1. Logging in with a wrong password");
    let ok = auth.login(&Credentials::new("demo", "wrong")).await;
    println!("   success: {ok}, error: {:?}", auth.error());
    app.show_notification_for_auth_error();

    println!("\n2. Logging in properly");
    let ok = auth.login(&Credentials::new("demo", "demo")).await;
    println!("   success: {ok}, user: {}", auth.user_name());
    println!("   login page allowed: {}", login_guard(&auth).allows());

    println!("\n3. Fetching projects with an expired token");
    let client = Intercepted::new(AuthInterceptor::new(auth.clone(), &env), DemoBackend);
    let response = client
        .handle(HttpRequest::get(env.api_url("/api/projects/")))
        .await?;
    println!("   {} {}", response.status, response.text());
    println!("   refresh token now: {:?}", auth.refresh_token());

    println!("\n4. Dashboard guard");
    println!("   decision: {:?}", auth_guard(&auth).await);

    println!("\n5. Notifications");
    for notification in app.ui().notifications() {
        println!("   [{}] {}: {}", notification.kind, notification.title, notification.message);
    }

    println!("\n6. Global snapshot");
    let snapshot = devtools.snapshot()?;
    println!(
        "   auth actions logged: {}",
        snapshot["auth"]["actions"].as_array().map_or(0, Vec::len)
    );

    println!("\n7. Logging out");
    auth.logout();
    println!("   authenticated: {}", auth.is_authenticated());
    println!("   navigated to: {:?}", navigator.visited());

    println!("\n✓ Demo complete!");
    Ok(())
}
