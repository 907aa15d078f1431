// Error handling module
// Defines the errors surfaced to callers of the service clients

use thiserror::Error;

/// Errors returned by an authenticated API request
#[derive(Error, Debug)]
pub enum ApiError {
    /// The server rejected the presented credentials and recovery was not possible
    #[error("Authentication failed: {status} - {message}")]
    Unauthorized { status: u16, message: String },

    /// Any other non-success response, passed through untouched
    #[error("API error: {status} - {message}")]
    Status { status: u16, message: String },

    /// Transport-level failure (connect, timeout, body)
    #[error("Network error ({kind}): {message}")]
    Network { kind: &'static str, message: String },

    /// The request could not be built (bad path, bad header)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Response body did not match the expected shape
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// HTTP status carried by the error, if it came from a response
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { status, .. } | ApiError::Status { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// True for authorization failures (401)
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }

    /// Build a network error from a reqwest transport failure
    pub(crate) fn from_transport(err: &reqwest::Error) -> Self {
        ApiError::Network {
            kind: transport_error_kind(err),
            message: err.to_string(),
        }
    }
}

/// Failures of the refresh-token exchange
///
/// Every variant is unrecoverable from the point of view of a request:
/// the session is terminated when any of them is returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RefreshError {
    /// No refresh token is held by the credential store
    #[error("No refresh token available")]
    NoRefreshToken,

    /// The refresh endpoint rejected the refresh token
    #[error("Refresh token rejected: {status}")]
    Rejected { status: u16 },

    /// The refresh endpoint answered with some other error status
    #[error("Token refresh failed: {status} - {message}")]
    Failed { status: u16, message: String },

    /// The refresh call never produced a response
    #[error("Token refresh request failed: {0}")]
    Network(String),

    /// The refresh response could not be used
    #[error("Invalid refresh response: {0}")]
    InvalidResponse(String),
}

/// Categorize a reqwest error for logging
pub(crate) fn transport_error_kind(err: &reqwest::Error) -> &'static str {
    if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connection_failed"
    } else if err.is_request() {
        "request_error"
    } else if err.is_body() {
        "body_error"
    } else if err.is_decode() {
        "decode_error"
    } else {
        "unknown"
    }
}

/// Result type alias for API operations
pub type Result<T> = std::result::Result<T, ApiError>;
