use anyhow::{Context, Result};
use reqwest::Method;
use std::sync::Arc;

use nutrition_api_client::auth::{
    token_preview, CredentialStore, FileStore, KeyValueStore, SessionEvent, SessionEvents,
};
use nutrition_api_client::config::{Command, Config};
use nutrition_api_client::http_client::{ApiRequest, AuthHttpClient};
use nutrition_api_client::service::ServiceRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    let (config, command) = Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(
        base_url = %config.api_base_url,
        refresh_mode = ?config.refresh_mode,
        session_file = %config.session_file.display(),
        "Configuration loaded"
    );

    let mirror: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(config.session_file.clone()));
    let store = Arc::new(CredentialStore::restore(mirror)?);

    let events = SessionEvents::new(config.login_url.clone());
    let mut session_rx = events.subscribe();

    let http = Arc::new(AuthHttpClient::from_config(&config, store.clone(), events)?);
    let registry = ServiceRegistry::from_config(&config, http);

    match command {
        Command::Login {
            access_token,
            refresh_token,
        } => {
            registry.login(access_token, refresh_token).await;
            println!("Session stored in {}", config.session_file.display());
        }

        Command::Logout => {
            registry.logout().await;
            println!("Logged out");
        }

        Command::Status => {
            let creds = store.credentials().await;
            println!(
                "  Access token:  {}",
                creds
                    .access_token
                    .as_deref()
                    .map(preview)
                    .unwrap_or_else(|| "-".to_string())
            );
            println!(
                "  Refresh token: {}",
                creds
                    .refresh_token
                    .as_deref()
                    .map(preview)
                    .unwrap_or_else(|| "-".to_string())
            );
        }

        Command::Request {
            service,
            method,
            path,
            data,
            query,
        } => {
            let method: Method = method
                .to_uppercase()
                .parse()
                .with_context(|| format!("Invalid HTTP method: {}", method))?;

            let mut request = ApiRequest::new(method, path);
            for (key, value) in query {
                request = request.with_query(key, value);
            }
            if let Some(data) = data {
                let body: serde_json::Value =
                    serde_json::from_str(&data).context("Request body is not valid JSON")?;
                request = request.with_json(body);
            }

            match registry.client(service).request(&request).await {
                Ok(response) => {
                    let status = response.status();
                    let body = response
                        .text()
                        .await
                        .context("Failed to read response body")?;
                    eprintln!("{}", status);
                    match serde_json::from_str::<serde_json::Value>(&body) {
                        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
                        Err(_) => println!("{}", body),
                    }
                }
                Err(e) => {
                    if let Ok(SessionEvent::Terminated { login_url, .. }) = session_rx.try_recv() {
                        eprintln!("Session ended, sign in again at {}", login_url);
                    }
                    return Err(e).context(format!("{} request failed", service));
                }
            }
        }
    }

    Ok(())
}

/// Token prefix safe to display
fn preview(token: &str) -> String {
    format!("{}...", token_preview(token))
}
