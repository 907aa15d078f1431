use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, Request, Response, StatusCode, Url};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{CredentialStore, SessionEvents, TerminationReason, TokenRefresher};
use crate::config::Config;
use crate::error::{ApiError, RefreshError, Result};

/// Retries allowed per logical request after an authorization failure
pub const MAX_AUTH_RETRIES: u32 = 1;

/// Attempt number of a logical request, starting at 1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt(u32);

impl Attempt {
    pub const FIRST: Attempt = Attempt(1);

    pub fn number(self) -> u32 {
        self.0
    }

    pub fn is_retry(self) -> bool {
        self.0 > 1
    }

    /// Whether an authorization failure on this attempt may be retried
    pub fn can_retry(self) -> bool {
        self.0 <= MAX_AUTH_RETRIES
    }

    pub fn next(self) -> Attempt {
        Attempt(self.0 + 1)
    }
}

/// Immutable description of an outbound request
///
/// The same descriptor is replayed verbatim when a request is retried.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Attach an opaque JSON body
    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Build one concrete attempt of this request against `url`
    fn build(&self, client: &Client, url: &Url) -> Result<Request> {
        let mut builder = client
            .request(self.method.clone(), url.clone())
            .headers(self.headers.clone());

        if !self.query.is_empty() {
            builder = builder.query(&self.query);
        }

        if let Some(ref body) = self.body {
            builder = builder.json(body);
        }

        builder
            .build()
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))
    }
}

/// Join a request path onto a service base URL
///
/// Absolute `http(s)://` paths bypass the base URL.
pub fn resolve_url(base_url: &str, path: &str) -> Result<Url> {
    let joined = if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else if path.is_empty() {
        base_url.to_string()
    } else {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    };

    Url::parse(&joined).map_err(|e| ApiError::InvalidRequest(format!("{}: {}", joined, e)))
}

/// Attach `Authorization: Bearer <token>` when a token is present
pub fn authenticate(request: &mut Request, access_token: Option<&str>) {
    let Some(token) = access_token else {
        return;
    };

    match HeaderValue::from_str(&format!("Bearer {}", token)) {
        Ok(mut value) => {
            value.set_sensitive(true);
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        Err(_) => {
            tracing::warn!("Access token is not a valid header value, sending unauthenticated");
        }
    }
}

/// HTTP client that authenticates every request and recovers from an
/// expired access token by refreshing it and replaying the request once
pub struct AuthHttpClient {
    /// Shared HTTP client with connection pooling
    client: Client,

    /// Shared credential store
    store: Arc<CredentialStore>,

    /// Token renewal
    refresher: Arc<TokenRefresher>,

    /// Session termination broadcast
    events: SessionEvents,
}

impl AuthHttpClient {
    pub fn new(
        client: Client,
        store: Arc<CredentialStore>,
        refresher: Arc<TokenRefresher>,
        events: SessionEvents,
    ) -> Self {
        Self {
            client,
            store,
            refresher,
            events,
        }
    }

    /// Create a client with pooling and timeouts from configuration
    pub fn from_config(
        config: &Config,
        store: Arc<CredentialStore>,
        events: SessionEvents,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(config.http_max_connections)
            .connect_timeout(Duration::from_secs(config.http_connect_timeout))
            .timeout(Duration::from_secs(config.http_request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        let refresher = Arc::new(TokenRefresher::new(
            client.clone(),
            config.refresh_url(),
            store.clone(),
            config.refresh_mode,
        ));

        Ok(Self::new(client, store, refresher, events))
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn refresher(&self) -> &Arc<TokenRefresher> {
        &self.refresher
    }

    pub fn events(&self) -> &SessionEvents {
        &self.events
    }

    /// Send `request` relative to `base_url`
    ///
    /// Handles:
    /// - 2xx: returned unchanged
    /// - 401 on the first attempt: refreshes the token and replays once
    /// - 401 on the replay: `ApiError::Unauthorized`
    /// - anything else: `ApiError::Status`, never retried
    pub async fn send(&self, base_url: &str, request: &ApiRequest) -> Result<Response> {
        let url = resolve_url(base_url, request.path())?;
        let request_id = uuid::Uuid::new_v4().to_string()[..8].to_string();
        let method = request.method().clone();

        let mut attempt = Attempt::FIRST;
        let mut token = self.store.access_token().await;

        loop {
            let mut req = request.build(&self.client, &url)?;
            authenticate(&mut req, token.as_deref());

            tracing::debug!(
                request_id = %request_id,
                method = %method,
                url = %url,
                attempt = attempt.number(),
                authenticated = token.is_some(),
                "Sending HTTP request"
            );

            let response = self.client.execute(req).await.map_err(|e| {
                let err = ApiError::from_transport(&e);
                tracing::warn!(
                    request_id = %request_id,
                    url = %url,
                    error = %err,
                    "HTTP request error"
                );
                err
            })?;

            let status = response.status();

            if status.is_success() {
                tracing::debug!(request_id = %request_id, status = %status, "Request successful");
                return Ok(response);
            }

            let error_text = response.text().await.unwrap_or_default();

            if status != StatusCode::UNAUTHORIZED {
                tracing::warn!(
                    request_id = %request_id,
                    status = status.as_u16(),
                    url = %url,
                    "HTTP request failed with error response"
                );
                return Err(ApiError::Status {
                    status: status.as_u16(),
                    message: error_text,
                });
            }

            let auth_error = ApiError::Unauthorized {
                status: status.as_u16(),
                message: error_text,
            };

            if !attempt.can_retry() {
                tracing::warn!(
                    request_id = %request_id,
                    attempt = attempt.number(),
                    "Still unauthorized after token refresh"
                );
                return Err(auth_error);
            }

            tracing::warn!(
                request_id = %request_id,
                "Received 401, refreshing token and retrying..."
            );

            match self.refresher.refresh_after_rejection(token.as_deref()).await {
                Ok(new_token) => {
                    token = Some(new_token);
                    attempt = attempt.next();
                }
                Err(e) => {
                    tracing::error!(request_id = %request_id, error = %e, "Token refresh failed");
                    self.terminate_session(e).await;
                    return Err(auth_error);
                }
            }
        }
    }

    /// End the session on explicit logout
    pub async fn logout(&self) {
        self.store.clear().await;
        self.events.terminated(TerminationReason::LoggedOut);
    }

    async fn terminate_session(&self, cause: RefreshError) {
        self.store.clear().await;
        self.events.terminated(TerminationReason::RefreshFailed(cause));
    }
}
