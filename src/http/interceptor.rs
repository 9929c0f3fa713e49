use super::client::{Handler, HttpRequest, HttpResponse};
use crate::auth::AuthStore;
use crate::config::Environment;
use crate::error::HttpError;
use async_trait::async_trait;

/// Attaches the session's bearer token to outbound requests and recovers
/// from a 401 with one refresh and one retry.
///
/// When the session's token changed while the request was in flight, the
/// retry uses the newer token without refreshing again.
///
/// Requests to the token endpoints pass through untouched so that they never
/// carry a stale token or start a refresh of their own.
#[derive(Clone)]
pub struct AuthInterceptor {
    session: AuthStore,
    skip_paths: Vec<String>,
}

impl AuthInterceptor {
    /// Skips the environment's login and refresh endpoints.
    pub fn new(session: AuthStore, env: &Environment) -> Self {
        Self {
            session,
            skip_paths: vec![
                env.api_endpoints.auth.login.clone(),
                env.api_endpoints.auth.refresh.clone(),
            ],
        }
    }

    pub fn with_skip_path(mut self, path: impl Into<String>) -> Self {
        self.skip_paths.push(path.into());
        self
    }

    pub fn skip_paths(&self) -> &[String] {
        &self.skip_paths
    }

    pub fn session(&self) -> &AuthStore {
        &self.session
    }

    fn should_skip(&self, url: &str) -> bool {
        self.skip_paths
            .iter()
            .any(|path| !path.is_empty() && url.contains(path.as_str()))
    }

    /// Send `request` through `next`.
    pub async fn intercept<H>(&self, request: HttpRequest, next: &H) -> Result<HttpResponse, HttpError>
    where
        H: Handler + ?Sized,
    {
        if self.should_skip(&request.url) {
            return next.handle(request).await;
        }
        let Some(token) = self.session.access_token() else {
            return next.handle(request).await;
        };

        match next.handle(request.clone().with_bearer(&token)?).await {
            Err(error) if error.is_unauthorized() => {
                self.retry_after_refresh(request, &token, error, next).await
            }
            outcome => outcome,
        }
    }

    async fn retry_after_refresh<H>(
        &self,
        request: HttpRequest,
        attached: &str,
        unauthorized: HttpError,
        next: &H,
    ) -> Result<HttpResponse, HttpError>
    where
        H: Handler + ?Sized,
    {
        if let Some(current) = self.session.access_token().filter(|current| current != attached) {
            tracing::debug!(url = %request.url, "token replaced while in flight, retrying");
            return next.handle(request.with_bearer(&current)?).await;
        }

        tracing::debug!(url = %request.url, "request unauthorized, refreshing session");

        if !self.session.refresh_access_token().await {
            if self.session.access_token().is_some() {
                self.session.logout();
            }
            return Err(unauthorized);
        }
        let Some(token) = self.session.access_token() else {
            return Err(unauthorized);
        };

        // A second 401 is returned as is.
        next.handle(request.with_bearer(&token)?).await
    }
}

/// A [`Handler`] that runs every request through an [`AuthInterceptor`].
pub struct Intercepted<H> {
    interceptor: AuthInterceptor,
    inner: H,
}

impl<H: Handler> Intercepted<H> {
    pub fn new(interceptor: AuthInterceptor, inner: H) -> Self {
        Self { interceptor, inner }
    }

    pub fn interceptor(&self) -> &AuthInterceptor {
        &self.interceptor
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }
}

#[async_trait]
impl<H: Handler> Handler for Intercepted<H> {
    async fn handle(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        self.interceptor.intercept(request, &self.inner).await
    }
}
