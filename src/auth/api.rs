use super::state::{Credentials, TokenPair};
use crate::config::Environment;
use crate::error::ApiError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The token endpoints the session store talks to.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Exchange credentials for a token pair.
    async fn login(&self, credentials: &Credentials) -> Result<TokenPair, ApiError>;

    /// Exchange a refresh token for a new token pair.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ApiError>;
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

/// Error body shapes the token endpoints are known to return.
#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<String>,
    message: Option<String>,
}

/// The server's explanation in an error body, `detail` before `message`.
fn rejection_detail(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|body| body.detail.or(body.message))
}

/// [`AuthApi`] over HTTP with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpAuthApi {
    client: reqwest::Client,
    login_url: String,
    refresh_url: String,
}

impl HttpAuthApi {
    pub fn new(env: &Environment) -> Self {
        Self::with_client(reqwest::Client::new(), env)
    }

    pub fn with_client(client: reqwest::Client, env: &Environment) -> Self {
        Self {
            client,
            login_url: env.login_url(),
            refresh_url: env.refresh_url(),
        }
    }

    async fn post_for_tokens<B: Serialize + Sync>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<TokenPair, ApiError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<TokenPair>()
                .await
                .map_err(|e| ApiError::Decode(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        let detail = rejection_detail(&body);
        tracing::debug!(%url, %status, "token endpoint rejected request");
        Err(ApiError::Rejected { status, detail })
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(&self, credentials: &Credentials) -> Result<TokenPair, ApiError> {
        self.post_for_tokens(&self.login_url, credentials).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ApiError> {
        self.post_for_tokens(
            &self.refresh_url,
            &RefreshRequest {
                refresh: refresh_token,
            },
        )
        .await
    }
}
