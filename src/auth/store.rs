use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::storage::{
    KeyValueStore, ACCESS_TOKEN_KEY, PERSISTED_SESSION_KEY, REFRESH_TOKEN_KEY, SESSION_KEYS,
};
use super::types::Credentials;

/// Credential store
/// Single authoritative token pair shared by every service client
///
/// Writes are mirrored into an optional durable [`KeyValueStore`]. Mirror
/// failures are logged and never fail the in-memory update.
pub struct CredentialStore {
    /// Current token pair
    credentials: RwLock<Credentials>,

    /// Time of the last successful access token update
    last_refreshed: RwLock<Option<DateTime<Utc>>>,

    /// Durable mirror (session file, browser-like storage)
    mirror: Option<Arc<dyn KeyValueStore>>,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore {
    /// Create an empty, memory-only store
    pub fn new() -> Self {
        Self {
            credentials: RwLock::new(Credentials::default()),
            last_refreshed: RwLock::new(None),
            mirror: None,
        }
    }

    /// Create an empty store mirrored into `mirror`
    pub fn with_mirror(mirror: Arc<dyn KeyValueStore>) -> Self {
        Self {
            mirror: Some(mirror),
            ..Self::new()
        }
    }

    /// Create a store holding the given tokens (not mirrored)
    pub fn with_tokens(access_token: Option<String>, refresh_token: Option<String>) -> Self {
        Self {
            credentials: RwLock::new(Credentials {
                access_token,
                refresh_token,
            }),
            ..Self::new()
        }
    }

    /// Restore the session persisted in `mirror`
    ///
    /// Individual token keys win over the aggregated session entry.
    pub fn restore(mirror: Arc<dyn KeyValueStore>) -> Result<Self> {
        let aggregated: Credentials = match mirror.get(PERSISTED_SESSION_KEY)? {
            Some(raw) => serde_json::from_str(&raw)
                .context("Failed to parse persisted session entry")?,
            None => Credentials::default(),
        };

        let credentials = Credentials {
            access_token: mirror.get(ACCESS_TOKEN_KEY)?.or(aggregated.access_token),
            refresh_token: mirror.get(REFRESH_TOKEN_KEY)?.or(aggregated.refresh_token),
        };

        if credentials.is_empty() {
            tracing::debug!("No persisted session found");
        } else {
            tracing::info!(
                has_access_token = credentials.access_token.is_some(),
                has_refresh_token = credentials.refresh_token.is_some(),
                "Restored persisted session"
            );
        }

        Ok(Self {
            credentials: RwLock::new(credentials),
            last_refreshed: RwLock::new(None),
            mirror: Some(mirror),
        })
    }

    pub async fn access_token(&self) -> Option<String> {
        self.credentials.read().await.access_token.clone()
    }

    pub async fn refresh_token(&self) -> Option<String> {
        self.credentials.read().await.refresh_token.clone()
    }

    /// Snapshot of the current token pair
    pub async fn credentials(&self) -> Credentials {
        self.credentials.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.credentials.read().await.access_token.is_some()
    }

    pub async fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        *self.last_refreshed.read().await
    }

    /// Replace the whole token pair (login path)
    pub async fn set_tokens(&self, access_token: String, refresh_token: Option<String>) {
        let mut creds = self.credentials.write().await;
        creds.access_token = Some(access_token);
        creds.refresh_token = refresh_token;
        let snapshot = creds.clone();
        *self.last_refreshed.write().await = Some(Utc::now());

        self.mirror_write(move |mirror| {
            if let Some(ref token) = snapshot.access_token {
                mirror.set(ACCESS_TOKEN_KEY, token)?;
            }
            match snapshot.refresh_token {
                Some(ref token) => mirror.set(REFRESH_TOKEN_KEY, token)?,
                None => mirror.remove(REFRESH_TOKEN_KEY)?,
            }
            let aggregated = serde_json::to_string(&snapshot)?;
            mirror.set(PERSISTED_SESSION_KEY, &aggregated)
        })
        .await;
    }

    /// Overwrite the access token in place
    pub async fn set_access_token(&self, token: String) {
        let mut creds = self.credentials.write().await;
        creds.access_token = Some(token.clone());
        *self.last_refreshed.write().await = Some(Utc::now());

        self.mirror_write(move |mirror| mirror.set(ACCESS_TOKEN_KEY, &token))
            .await;
    }

    /// Overwrite the refresh token in place (rotation)
    pub async fn set_refresh_token(&self, token: String) {
        let mut creds = self.credentials.write().await;
        creds.refresh_token = Some(token.clone());

        self.mirror_write(move |mirror| mirror.set(REFRESH_TOKEN_KEY, &token))
            .await;
    }

    /// Erase both tokens and every mirrored session key
    ///
    /// Returns true if any token was held before the call.
    pub async fn clear(&self) -> bool {
        let mut creds = self.credentials.write().await;
        let had_tokens = !creds.is_empty();
        *creds = Credentials::default();
        *self.last_refreshed.write().await = None;

        self.mirror_write(|mirror| {
            for key in SESSION_KEYS {
                mirror.remove(key)?;
            }
            Ok(())
        })
        .await;
        drop(creds);

        if had_tokens {
            tracing::info!("Credentials cleared");
        }
        had_tokens
    }

    /// Run a mirror update on the blocking pool
    ///
    /// Callers hold the credentials write guard, so mirror writes land in the
    /// same order as the in-memory updates.
    async fn mirror_write<F>(&self, f: F)
    where
        F: FnOnce(&dyn KeyValueStore) -> Result<()> + Send + 'static,
    {
        let Some(mirror) = self.mirror.clone() else {
            return;
        };

        match tokio::task::spawn_blocking(move || f(mirror.as_ref())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Failed to update durable session mirror");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Durable session mirror task failed");
            }
        }
    }
}
