// Token refresh logic

use reqwest::header::HeaderValue;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::store::CredentialStore;
use super::types::{RefreshRequest, RefreshResponse};
use crate::error::RefreshError;

/// How concurrent authorization failures share refresh calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshMode {
    /// Refreshes are serialized; requests that fail with a token someone
    /// else already replaced reuse the replacement
    #[default]
    Coalesced,

    /// Every failed request performs its own refresh call, last write wins
    Independent,
}

/// Exchanges the stored refresh token for a new access token
pub struct TokenRefresher {
    /// HTTP client for refresh requests (no auth interceptors)
    client: Client,

    /// Token exchange endpoint
    refresh_url: String,

    /// Shared credential store
    store: Arc<CredentialStore>,

    mode: RefreshMode,

    /// Held for the duration of a refresh in coalesced mode
    refresh_lock: Mutex<()>,
}

impl TokenRefresher {
    pub fn new(
        client: Client,
        refresh_url: impl Into<String>,
        store: Arc<CredentialStore>,
        mode: RefreshMode,
    ) -> Self {
        Self {
            client,
            refresh_url: refresh_url.into(),
            store,
            mode,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn mode(&self) -> RefreshMode {
        self.mode
    }

    pub fn refresh_url(&self) -> &str {
        &self.refresh_url
    }

    /// Renew the access token after a request presenting `stale` was rejected
    ///
    /// In coalesced mode a token that already differs from `stale` is returned
    /// without a network call.
    pub async fn refresh_after_rejection(
        &self,
        stale: Option<&str>,
    ) -> Result<String, RefreshError> {
        match self.mode {
            RefreshMode::Independent => self.refresh().await,
            RefreshMode::Coalesced => {
                let _guard = self.refresh_lock.lock().await;

                if let Some(current) = self.store.access_token().await {
                    if Some(current.as_str()) != stale {
                        tracing::debug!("Access token already renewed by a concurrent request");
                        return Ok(current);
                    }
                }

                self.refresh().await
            }
        }
    }

    /// Perform exactly one token exchange call
    pub async fn refresh(&self) -> Result<String, RefreshError> {
        let refresh_token = self
            .store
            .refresh_token()
            .await
            .ok_or(RefreshError::NoRefreshToken)?;

        tracing::info!(url = %self.refresh_url, "Refreshing access token...");

        let response = self
            .client
            .post(&self.refresh_url)
            .json(&RefreshRequest {
                refresh_token: &refresh_token,
            })
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(
                    error_kind = crate::error::transport_error_kind(&e),
                    error = %e,
                    "Refresh request error"
                );
                RefreshError::Network(e.to_string())
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            tracing::warn!(status = status.as_u16(), "Refresh token rejected");
            return Err(RefreshError::Rejected {
                status: status.as_u16(),
            });
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!(
                status = status.as_u16(),
                body = %error_text,
                "Token refresh failed"
            );
            return Err(RefreshError::Failed {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let data: RefreshResponse = response
            .json()
            .await
            .map_err(|e| RefreshError::InvalidResponse(e.to_string()))?;

        if data.access_token.is_empty() {
            return Err(RefreshError::InvalidResponse(
                "response does not contain access_token".to_string(),
            ));
        }

        // Must be sendable as `Authorization: Bearer <token>`
        if !is_bearer_safe(&data.access_token) {
            return Err(RefreshError::InvalidResponse(
                "access_token is not a valid header value".to_string(),
            ));
        }

        self.store.set_access_token(data.access_token.clone()).await;

        if let Some(rotated) = data.refresh_token.filter(|t| !t.is_empty()) {
            tracing::debug!("Refresh token rotated");
            self.store.set_refresh_token(rotated).await;
        }

        tracing::info!(
            "Access token refreshed (token: {}...)",
            token_preview(&data.access_token)
        );

        Ok(data.access_token)
    }
}

/// First characters of a token, safe to log
pub fn token_preview(token: &str) -> String {
    token.chars().take(8).collect()
}

fn is_bearer_safe(token: &str) -> bool {
    token.is_ascii() && HeaderValue::from_str(&format!("Bearer {}", token)).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_refresh_token() {
        let store = Arc::new(CredentialStore::with_tokens(Some("T1".to_string()), None));
        let refresher = TokenRefresher::new(
            Client::new(),
            "http://127.0.0.1:9/refresh",
            store.clone(),
            RefreshMode::Independent,
        );

        assert_eq!(refresher.refresh().await, Err(RefreshError::NoRefreshToken));
        assert_eq!(store.access_token().await.as_deref(), Some("T1"));
    }

    #[tokio::test]
    async fn test_coalesced_reuses_renewed_token() {
        let store = Arc::new(CredentialStore::with_tokens(
            Some("T2".to_string()),
            Some("R1".to_string()),
        ));
        // Unroutable endpoint: any network call would fail
        let refresher = TokenRefresher::new(
            Client::new(),
            "http://127.0.0.1:9/refresh",
            store,
            RefreshMode::Coalesced,
        );

        let token = refresher.refresh_after_rejection(Some("T1")).await.unwrap();
        assert_eq!(token, "T2");
    }

    #[test]
    fn test_token_preview_counts_characters() {
        assert_eq!(token_preview("aéééééééééé"), "aééééééé");
        assert_eq!(token_preview("short"), "short");
        assert_eq!(token_preview(""), "");
    }

    #[test]
    fn test_bearer_safe_tokens() {
        assert!(is_bearer_safe("eyJhbGciOiJIUzI1NiJ9.e30.sig-_+/="));
        assert!(!is_bearer_safe("aéééé"));
        assert!(!is_bearer_safe("bad\ntoken"));
    }

    #[test]
    fn test_default_mode_is_coalesced() {
        assert_eq!(RefreshMode::default(), RefreshMode::Coalesced);
    }
}
