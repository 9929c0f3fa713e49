//! Stubs shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tincan_session::auth::{AuthApi, Credentials, TokenPair};
use tincan_session::error::{ApiError, HttpError};
use tincan_session::http::{Handler, HttpRequest, HttpResponse};

/// An unsigned token carrying `claims`.
pub fn jwt(claims: Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.signature")
}

/// A token for `sub` expiring `ttl` seconds from now.
pub fn token_for(sub: &str, ttl: i64) -> String {
    jwt(json!({ "sub": sub, "exp": chrono::Utc::now().timestamp() + ttl }))
}

pub type Reply = Result<TokenPair, (u16, Option<String>)>;

/// Token endpoints with canned replies that count their calls.
///
/// Each call yields once before answering so concurrent callers overlap.
pub struct StubApi {
    login: Mutex<Reply>,
    refresh: Mutex<Reply>,
    pub login_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
}

impl StubApi {
    pub fn new(login: Reply, refresh: Reply) -> Arc<Self> {
        Arc::new(Self {
            login: Mutex::new(login),
            refresh: Mutex::new(refresh),
            login_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
        })
    }

    pub fn tokens(access: String, refresh: &str) -> Reply {
        Ok(TokenPair {
            access,
            refresh: refresh.to_string(),
        })
    }

    pub fn refreshes(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    fn answer(reply: &Mutex<Reply>) -> Result<TokenPair, ApiError> {
        reply
            .lock()
            .clone()
            .map_err(|(code, detail)| ApiError::Rejected {
                status: StatusCode::from_u16(code).expect("valid status"),
                detail,
            })
    }
}

#[async_trait]
impl AuthApi for StubApi {
    async fn login(&self, _credentials: &Credentials) -> Result<TokenPair, ApiError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        Self::answer(&self.login)
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenPair, ApiError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        Self::answer(&self.refresh)
    }
}

/// A protected backend that only accepts one bearer token.
pub struct ProtectedBackend {
    accepted: String,
    pub seen: Mutex<Vec<Option<String>>>,
}

impl ProtectedBackend {
    pub fn accepting(token: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            accepted: token.into(),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().len()
    }
}

#[async_trait]
impl Handler for ProtectedBackend {
    async fn handle(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let token = request.bearer_token().map(str::to_string);
        self.seen.lock().push(token.clone());
        tokio::task::yield_now().await;

        if token.as_deref() == Some(self.accepted.as_str()) {
            Ok(HttpResponse::new(StatusCode::OK, br#"{"items":[]}"#.to_vec()))
        } else {
            Err(HttpError::Status {
                status: StatusCode::UNAUTHORIZED,
                body: r#"{"detail":"token expired"}"#.into(),
            })
        }
    }
}

/// Answer one HTTP request on a local port with `status` and a JSON `body`.
///
/// Returns the base URL to call and a handle resolving to the raw request.
pub async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut request = Vec::new();
        let mut chunk = [0u8; 1024];
        while !request_complete(&request) {
            let read = socket.read(&mut chunk).await.expect("read");
            if read == 0 {
                break;
            }
            request.extend_from_slice(&chunk[..read]);
        }

        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.expect("write");
        let _ = socket.shutdown().await;
        String::from_utf8_lossy(&request).into_owned()
    });

    (format!("http://{addr}"), handle)
}

fn request_complete(request: &[u8]) -> bool {
    let text = String::from_utf8_lossy(request);
    let Some((head, body)) = text.split_once("\r\n\r\n") else {
        return false;
    };
    let length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    body.len() >= length
}

/// A client that never goes through a proxy, for talking to [`serve_once`].
pub fn direct_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("client")
}
