use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::auth::TokenStore;
use crate::error::{AppError, AppResult};

use super::endpoints;
use super::models::{self, RefreshRequest};
use super::refresh::{RefreshCoordinator, RefreshState, RefreshTurn};

/// Invoked when a rejected request could not be rescued by a refresh. May
/// run once per failed request, so it must tolerate repeated calls.
pub type SessionExpiredHook = Arc<dyn Fn() + Send + Sync>;

/// A backend call described independently of any in-flight HTTP request so
/// the identical request can be rebuilt for a retry.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Debug, Clone, Copy)]
enum RefreshCause<'a> {
    /// The pre-send freshness check found the stored token stale.
    Stale,
    /// The backend answered 401 to a request sent with this token.
    Rejected(Option<&'a str>),
    /// Explicitly requested by the user.
    Forced,
}

/// HTTP client that attaches the stored bearer token to every request and
/// refreshes it, at most once concurrently, when it goes stale or is
/// rejected.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    tokens: TokenStore,
    refresh: Arc<RefreshCoordinator>,
    on_session_expired: SessionExpiredHook,
}

impl ApiClient {
    pub fn new(base_url: Url, timeout: Duration, tokens: TokenStore) -> AppResult<Self> {
        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url,
            tokens,
            refresh: Arc::new(RefreshCoordinator::new()),
            on_session_expired: Arc::new(|| warn!("session expired; stored credentials cleared")),
        })
    }

    pub fn with_session_expired_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_session_expired = Arc::new(hook);
        self
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn refresh_state(&self) -> RefreshState {
        self.refresh.state()
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> AppResult<T> {
        self.request_json(&ApiRequest::get(path)).await
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> AppResult<T> {
        let request = ApiRequest::post(path, serde_json::to_value(body)?);
        self.request_json(&request).await
    }

    /// Sends `request` and decodes a JSON body; an empty body decodes as `null`.
    pub async fn request_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> AppResult<T> {
        let response = self.send(request).await?;
        let body = response.bytes().await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::from_value(Value::Null)?);
        }

        Ok(serde_json::from_slice(&body)?)
    }

    /// Sends `request` with the current credentials.
    ///
    /// A stale token is refreshed before sending. A 401 triggers one refresh
    /// and a single resubmission; if that refresh fails the original 401 is
    /// returned and the session-expired hook runs. Every other failure is
    /// returned as is.
    pub async fn send(&self, request: &ApiRequest) -> AppResult<Response> {
        let token = self.token_for_send().await;
        let response = self.dispatch(request, token.as_deref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return self.check_status(request, response).await;
        }

        let rejected = error_from_response(response).await;
        debug!(method = %request.method, path = %request.path, "request rejected with 401, refreshing");

        let Some(fresh) = self.refresh(RefreshCause::Rejected(token.as_deref())).await else {
            warn!(method = %request.method, path = %request.path, "could not recover from 401");
            (self.on_session_expired)();
            return Err(rejected);
        };

        let retried = self.dispatch(request, Some(&fresh)).await?;
        self.check_status(request, retried).await
    }

    /// Refreshes regardless of the stored expiry.
    pub async fn refresh_now(&self) -> AppResult<String> {
        self.refresh(RefreshCause::Forced).await.ok_or_else(|| {
            AppError::Auth("token refresh failed; stored credentials were cleared".to_string())
        })
    }

    /// POSTs to a credential endpoint outside the authenticated pipeline and
    /// returns the raw success body.
    pub async fn post_unauthenticated<B: Serialize>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> AppResult<Vec<u8>> {
        let url = self.endpoint_url(endpoint)?;
        let response = self.http.post(url).json(body).send().await?;
        let status = response.status();
        let payload = response.bytes().await?;

        if !status.is_success() {
            return Err(map_api_error(status, &String::from_utf8_lossy(&payload)));
        }

        Ok(payload.to_vec())
    }

    async fn token_for_send(&self) -> Option<String> {
        if self.tokens.is_expired() {
            debug!("stored access token is stale, refreshing before send");
            return self.refresh(RefreshCause::Stale).await;
        }

        self.tokens.access_token()
    }

    async fn refresh(&self, cause: RefreshCause<'_>) -> Option<String> {
        let lease = match self.refresh.acquire() {
            RefreshTurn::Leader(lease) => lease,
            RefreshTurn::Waiter(outcome) => {
                debug!("waiting on in-flight token refresh");
                return outcome.await.ok().flatten();
            }
        };

        // Another task may have finished a refresh between our freshness
        // check and taking the lease.
        if let Some(current) = self.reusable_token(cause) {
            debug!("stored token already refreshed, skipping refresh call");
            lease.settle(Some(current.clone()));
            return Some(current);
        }

        let outcome = match self.request_refresh().await {
            Ok(access_token) => Some(access_token),
            Err(err) => {
                warn!(error = %err, "token refresh failed, clearing stored credentials");
                if let Err(err) = self.tokens.clear() {
                    warn!(error = %err, "failed to clear stored credentials");
                }
                None
            }
        };

        lease.settle(outcome.clone());
        outcome
    }

    fn reusable_token(&self, cause: RefreshCause<'_>) -> Option<String> {
        let current = self.tokens.access_token()?;
        if self.tokens.is_expired() {
            return None;
        }

        match cause {
            RefreshCause::Stale => Some(current),
            RefreshCause::Rejected(sent) if sent != Some(current.as_str()) => Some(current),
            RefreshCause::Rejected(_) | RefreshCause::Forced => None,
        }
    }

    /// Calls the refresh endpoint directly; this request never goes through
    /// [`ApiClient::send`].
    async fn request_refresh(&self) -> AppResult<String> {
        let refresh_token = self
            .tokens
            .refresh_token()
            .ok_or_else(|| AppError::Auth("no refresh token stored".to_string()))?;

        let body = self
            .post_unauthenticated(
                endpoints::refresh_endpoint(),
                &RefreshRequest {
                    refresh_token: &refresh_token,
                },
            )
            .await?;
        let grant = models::decode_refresh(&body)?;

        self.tokens.save(
            &grant.access_token,
            grant.refresh_token.as_deref(),
            grant.expires_in,
        )?;
        debug!(rotated = grant.refresh_token.is_some(), "access token refreshed");

        Ok(grant.access_token)
    }

    async fn dispatch(&self, request: &ApiRequest, token: Option<&str>) -> AppResult<Response> {
        let url = self.endpoint_url(&request.path)?;
        let mut builder = self.http.request(request.method.clone(), url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        builder.send().await.map_err(|err| {
            warn!(method = %request.method, path = %request.path, error = %err, "request failed");
            AppError::Http(err)
        })
    }

    async fn check_status(&self, request: &ApiRequest, response: Response) -> AppResult<Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let err = error_from_response(response).await;
        warn!(method = %request.method, path = %request.path, error = %err, "request failed");
        Err(err)
    }

    fn endpoint_url(&self, endpoint: &str) -> AppResult<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = endpoint.trim_start_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("refresh_state", &self.refresh.state())
            .finish_non_exhaustive()
    }
}

async fn error_from_response(response: Response) -> AppError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    map_api_error(status, &body)
}

fn map_api_error(status: StatusCode, body: &str) -> AppError {
    let message = models::error_message(body).unwrap_or_else(|| {
        let body = body.trim();
        if body.is_empty() {
            "no error details in response body".to_string()
        } else {
            body.to_string()
        }
    });

    if status == StatusCode::UNAUTHORIZED {
        return AppError::Unauthorized(message);
    }

    AppError::Api { status, message }
}
