// Service clients
// One configured client per backend, all sharing the authenticated HTTP client

use reqwest::Response;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{ApiError, Result};
use crate::http_client::{ApiRequest, AuthHttpClient};

/// Backend services of the nutrition platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    Auth,
    User,
    Meals,
    Food,
    Plans,
    Ai,
    Admin,
    Chat,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 8] = [
        ServiceKind::Auth,
        ServiceKind::User,
        ServiceKind::Meals,
        ServiceKind::Food,
        ServiceKind::Plans,
        ServiceKind::Ai,
        ServiceKind::Admin,
        ServiceKind::Chat,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ServiceKind::Auth => "auth",
            ServiceKind::User => "user",
            ServiceKind::Meals => "meals",
            ServiceKind::Food => "food",
            ServiceKind::Plans => "plans",
            ServiceKind::Ai => "ai",
            ServiceKind::Admin => "admin",
            ServiceKind::Chat => "chat",
        }
    }

    /// Path prefix under the shared API base URL
    pub fn default_path(self) -> &'static str {
        match self {
            ServiceKind::Auth => "/auth",
            ServiceKind::User => "/users",
            ServiceKind::Meals => "/meals",
            ServiceKind::Food => "/foods",
            ServiceKind::Plans => "/plans",
            ServiceKind::Ai => "/ai",
            ServiceKind::Admin => "/admin",
            ServiceKind::Chat => "/chat",
        }
    }

    /// Environment variable overriding this service's base URL
    pub fn env_var(self) -> &'static str {
        match self {
            ServiceKind::Auth => "AUTH_SERVICE_URL",
            ServiceKind::User => "USER_SERVICE_URL",
            ServiceKind::Meals => "MEAL_SERVICE_URL",
            ServiceKind::Food => "FOOD_SERVICE_URL",
            ServiceKind::Plans => "PLAN_SERVICE_URL",
            ServiceKind::Ai => "AI_SERVICE_URL",
            ServiceKind::Admin => "ADMIN_SERVICE_URL",
            ServiceKind::Chat => "CHAT_SERVICE_URL",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ServiceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        ServiceKind::ALL
            .into_iter()
            .find(|kind| {
                kind.name() == lower || kind.default_path().trim_start_matches('/') == lower
            })
            .ok_or_else(|| format!("unknown service: {}", s))
    }
}

/// Client bound to one backend base URL
#[derive(Clone)]
pub struct ServiceClient {
    kind: ServiceKind,
    base_url: String,
    http: Arc<AuthHttpClient>,
}

impl ServiceClient {
    pub fn new(kind: ServiceKind, base_url: impl Into<String>, http: Arc<AuthHttpClient>) -> Self {
        Self {
            kind,
            base_url: base_url.into(),
            http,
        }
    }

    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a request through the authenticating client
    pub async fn request(&self, request: &ApiRequest) -> Result<Response> {
        self.http.send(&self.base_url, request).await
    }

    pub async fn get(&self, path: &str) -> Result<Response> {
        self.request(&ApiRequest::get(path)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Response> {
        self.request(&ApiRequest::delete(path)).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Response> {
        self.request(&ApiRequest::post(path).with_json(body)).await
    }

    pub async fn put(&self, path: &str, body: Value) -> Result<Response> {
        self.request(&ApiRequest::put(path).with_json(body)).await
    }

    pub async fn patch(&self, path: &str, body: Value) -> Result<Response> {
        self.request(&ApiRequest::patch(path).with_json(body)).await
    }

    /// GET and decode a JSON response
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        decode_json(self.get(path).await?).await
    }

    /// POST a serializable body and decode a JSON response
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body =
            serde_json::to_value(body).map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        decode_json(self.post(path, body).await?).await
    }

    /// PUT a serializable body and decode a JSON response
    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body =
            serde_json::to_value(body).map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        decode_json(self.put(path, body).await?).await
    }
}

async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| ApiError::from_transport(&e))?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
}

/// Every service client of the application, sharing one credential store
pub struct ServiceRegistry {
    http: Arc<AuthHttpClient>,
    clients: Vec<ServiceClient>,
}

impl ServiceRegistry {
    pub fn from_config(config: &Config, http: Arc<AuthHttpClient>) -> Self {
        let clients = ServiceKind::ALL
            .into_iter()
            .map(|kind| ServiceClient::new(kind, config.service_url(kind), http.clone()))
            .collect();

        Self { http, clients }
    }

    pub fn client(&self, kind: ServiceKind) -> &ServiceClient {
        &self.clients[kind.index()]
    }

    pub fn auth(&self) -> &ServiceClient {
        self.client(ServiceKind::Auth)
    }

    pub fn users(&self) -> &ServiceClient {
        self.client(ServiceKind::User)
    }

    pub fn meals(&self) -> &ServiceClient {
        self.client(ServiceKind::Meals)
    }

    pub fn foods(&self) -> &ServiceClient {
        self.client(ServiceKind::Food)
    }

    pub fn plans(&self) -> &ServiceClient {
        self.client(ServiceKind::Plans)
    }

    pub fn ai(&self) -> &ServiceClient {
        self.client(ServiceKind::Ai)
    }

    pub fn admin(&self) -> &ServiceClient {
        self.client(ServiceKind::Admin)
    }

    pub fn chat(&self) -> &ServiceClient {
        self.client(ServiceKind::Chat)
    }

    pub fn http(&self) -> &Arc<AuthHttpClient> {
        &self.http
    }

    /// Populate the credential store after a successful sign-in
    pub async fn login(&self, access_token: String, refresh_token: Option<String>) {
        self.http.store().set_tokens(access_token, refresh_token).await;
        tracing::info!("Session established");
    }

    pub async fn logout(&self) {
        self.http.logout().await;
    }
}
