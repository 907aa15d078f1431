use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Url;
use std::path::PathBuf;

use crate::auth::RefreshMode;
use crate::service::ServiceKind;

/// Nutrition API client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Shared base URL of the backend services
    #[arg(short = 'u', long, env = "API_BASE_URL", default_value = "http://localhost:8000")]
    pub base_url: String,

    /// Token exchange path under the auth service
    #[arg(long, env = "REFRESH_PATH", default_value = "/refresh")]
    pub refresh_path: String,

    /// Refresh behaviour for concurrent 401s (coalesced, independent)
    #[arg(long, env = "REFRESH_MODE", default_value = "coalesced")]
    pub refresh_mode: String,

    /// Login entry point reported when the session ends
    #[arg(long, env = "LOGIN_URL", default_value = "/login")]
    pub login_url: String,

    /// Session file mirroring the stored tokens
    #[arg(
        short = 's',
        long,
        env = "SESSION_FILE",
        default_value = "~/.nutrition-client/session.json"
    )]
    pub session_file: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub http_timeout: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Store a token pair obtained from sign-in
    Login {
        #[arg(long, env = "ACCESS_TOKEN")]
        access_token: String,

        #[arg(long, env = "REFRESH_TOKEN")]
        refresh_token: Option<String>,
    },

    /// Clear the stored session
    Logout,

    /// Show which tokens are stored
    Status,

    /// Send an authenticated request to a service
    Request {
        /// Target service (auth, user, meals, food, plans, ai, admin, chat)
        service: ServiceKind,

        /// HTTP method
        method: String,

        /// Path relative to the service base URL
        path: String,

        /// JSON request body
        #[arg(short, long)]
        data: Option<String>,

        /// Query parameter as key=value (repeatable)
        #[arg(short, long = "query", value_parser = parse_key_value)]
        query: Vec<(String, String)>,
    },
}

#[derive(Clone, Debug)]
pub struct Config {
    // Service endpoints, indexed by ServiceKind
    pub api_base_url: String,
    pub service_urls: [String; 8],

    // Token renewal
    pub refresh_path: String,
    pub refresh_mode: RefreshMode,
    pub login_url: String,

    // Session persistence
    pub session_file: PathBuf,

    // HTTP client
    pub http_max_connections: usize,
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,

    pub log_level: String,
}

impl Config {
    /// Defaults for every service under one base URL, no environment lookups
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let api_base_url = base_url.into();
        let service_urls =
            ServiceKind::ALL.map(|kind| resolve_service_url(&api_base_url, kind, None));

        Self {
            api_base_url,
            service_urls,
            refresh_path: "/refresh".to_string(),
            refresh_mode: RefreshMode::default(),
            login_url: "/login".to_string(),
            session_file: expand_tilde("~/.nutrition-client/session.json"),
            http_max_connections: 20,
            http_connect_timeout: 10,
            http_request_timeout: 30,
            log_level: "info".to_string(),
        }
    }

    /// Build configuration with priority: CLI > ENV > defaults
    pub fn from_args(args: &CliArgs) -> Result<Self> {
        let api_base_url = args.base_url.clone();

        let service_urls = ServiceKind::ALL.map(|kind| {
            let override_url = std::env::var(kind.env_var()).ok().filter(|s| !s.is_empty());
            resolve_service_url(&api_base_url, kind, override_url)
        });

        let config = Config {
            api_base_url,
            service_urls,

            refresh_path: args.refresh_path.clone(),
            refresh_mode: parse_refresh_mode(&args.refresh_mode)?,
            login_url: args.login_url.clone(),

            session_file: expand_tilde(&args.session_file),

            http_max_connections: std::env::var("HTTP_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(20),

            http_connect_timeout: std::env::var("HTTP_CONNECT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),

            http_request_timeout: args.http_timeout,

            log_level: args.log_level.clone(),
        };

        Ok(config)
    }

    /// Load configuration from `.env`, environment and command line
    pub fn load() -> Result<(Self, Command)> {
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();
        let config = Self::from_args(&args)?;
        Ok((config, args.command))
    }

    pub fn service_url(&self, kind: ServiceKind) -> &str {
        &self.service_urls[kind.index()]
    }

    /// Token exchange endpoint on the auth service
    pub fn refresh_url(&self) -> String {
        format!(
            "{}/{}",
            self.service_url(ServiceKind::Auth).trim_end_matches('/'),
            self.refresh_path.trim_start_matches('/')
        )
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        for kind in ServiceKind::ALL {
            let url = self.service_url(kind);
            Url::parse(url)
                .with_context(|| format!("Invalid base URL for {} service: {}", kind, url))?;
        }

        if self.refresh_path.trim().is_empty() {
            anyhow::bail!("REFRESH_PATH cannot be empty");
        }

        Ok(())
    }
}

/// Base URL of one service: explicit override, else base URL plus the service prefix
fn resolve_service_url(base_url: &str, kind: ServiceKind, override_url: Option<String>) -> String {
    override_url.unwrap_or_else(|| {
        format!("{}{}", base_url.trim_end_matches('/'), kind.default_path())
    })
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Parse refresh mode from string
fn parse_refresh_mode(s: &str) -> Result<RefreshMode> {
    match s.to_lowercase().as_str() {
        "coalesced" => Ok(RefreshMode::Coalesced),
        "independent" => Ok(RefreshMode::Independent),
        other => anyhow::bail!(
            "Invalid REFRESH_MODE '{}': expected 'coalesced' or 'independent'",
            other
        ),
    }
}

/// Parse a `key=value` query argument
fn parse_key_value(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got: {}", s))?;
    if key.is_empty() {
        return Err(format!("empty query key in: {}", s));
    }
    Ok((key.to_string(), value.to_string()))
}
