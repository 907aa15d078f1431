// Nutrition API client - Library root

pub mod auth;
pub mod config;
pub mod error;
pub mod http_client;
pub mod service;

pub use auth::{CredentialStore, RefreshMode, SessionEvent, SessionEvents, TokenRefresher};
pub use error::{ApiError, RefreshError};
pub use http_client::{ApiRequest, AuthHttpClient};
pub use service::{ServiceClient, ServiceKind, ServiceRegistry};
