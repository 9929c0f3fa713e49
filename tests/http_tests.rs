//! The reqwest-backed HTTP paths against a one-shot local server

mod support;

use reqwest::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use support::{direct_client, serve_once};
use tincan_session::auth::{AuthApi, Credentials, HttpAuthApi};
use tincan_session::error::{ApiError, HttpError};
use tincan_session::http::{Handler, HttpRequest, ReqwestHandler};
use tincan_session::runtime::ReactiveRuntime;
use tincan_session::store::MemoryStorage;
use tincan_session::{AuthStore, Environment};

fn environment(base: &str) -> Environment {
    let mut env = Environment::development();
    env.api_url = base.to_string();
    env
}

#[tokio::test]
async fn unauthorized_response_becomes_a_status_error() {
    let (base, request) = serve_once(
        "401 Unauthorized",
        r#"{"detail":"Given token not valid for any token type"}"#,
    )
    .await;
    let handler = ReqwestHandler::new(direct_client());

    let error = handler
        .handle(HttpRequest::get(format!("{base}/api/items/")).with_bearer("abc").unwrap())
        .await
        .unwrap_err();

    assert!(error.is_unauthorized());
    match error {
        HttpError::Status { body, .. } => assert!(body.contains("Given token not valid")),
        other => panic!("unexpected error: {other:?}"),
    }
    let request = request.await.unwrap().to_ascii_lowercase();
    assert!(request.starts_with("get /api/items/ "));
    assert!(request.contains("authorization: bearer abc"));
}

#[tokio::test]
async fn success_response_is_returned_with_its_body() {
    let (base, _request) = serve_once("200 OK", r#"{"items":[1,2]}"#).await;
    let handler = ReqwestHandler::new(direct_client());

    let response = handler
        .handle(HttpRequest::get(format!("{base}/api/items/")))
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::OK);
    let body: Value = response.json().unwrap();
    assert_eq!(body["items"][1], 2);
}

#[tokio::test]
async fn server_errors_are_status_errors_too() {
    let (base, _request) = serve_once("503 Service Unavailable", "{}").await;
    let handler = ReqwestHandler::new(direct_client());

    let error = handler
        .handle(HttpRequest::get(format!("{base}/api/items/")))
        .await
        .unwrap_err();

    assert_eq!(error.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
    assert!(!error.is_unauthorized());
}

#[tokio::test]
async fn login_rejection_carries_the_server_detail() {
    let (base, request) = serve_once(
        "400 Bad Request",
        r#"{"detail":"No active account found with the given credentials"}"#,
    )
    .await;
    let api = HttpAuthApi::with_client(direct_client(), &environment(&base));

    let error = api
        .login(&Credentials::new("test", "wrong"))
        .await
        .unwrap_err();

    match &error {
        ApiError::Rejected { status, .. } => assert_eq!(*status, StatusCode::BAD_REQUEST),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(
        error.detail(),
        Some("No active account found with the given credentials")
    );
    let request = request.await.unwrap();
    assert!(request.to_ascii_lowercase().starts_with("post /api/token/ "));
    assert!(request.contains(r#""username":"test""#));
}

#[tokio::test]
async fn refresh_falls_back_to_the_message_field() {
    let (base, request) = serve_once("401 Unauthorized", r#"{"message":"Token is blacklisted"}"#).await;
    let api = HttpAuthApi::with_client(direct_client(), &environment(&base));

    let error = api.refresh("r1").await.unwrap_err();

    assert_eq!(error.detail(), Some("Token is blacklisted"));
    let request = request.await.unwrap();
    assert!(request.contains(r#"{"refresh":"r1"}"#));
}

#[tokio::test]
async fn token_pair_is_decoded() {
    let (base, _request) = serve_once("200 OK", r#"{"access":"a.b.c","refresh":"r2"}"#).await;
    let api = HttpAuthApi::with_client(direct_client(), &environment(&base));

    let pair = api.refresh("r1").await.unwrap();

    assert_eq!(pair.access, "a.b.c");
    assert_eq!(pair.refresh, "r2");
}

#[tokio::test]
async fn failed_login_over_http_shows_the_server_message() {
    let (base, _request) = serve_once(
        "400 Bad Request",
        r#"{"detail":"No active account found with the given credentials"}"#,
    )
    .await;
    let env = environment(&base);
    let auth = AuthStore::builder(Arc::new(HttpAuthApi::with_client(direct_client(), &env)))
        .environment(env)
        .storage(Arc::new(MemoryStorage::new()))
        .runtime(ReactiveRuntime::new())
        .build();

    assert!(!auth.login(&Credentials::new("test", "wrong")).await);
    assert_eq!(
        auth.error().as_deref(),
        Some("No active account found with the given credentials")
    );
    assert!(!auth.is_authenticated());
}
