// Authentication types

use serde::{Deserialize, Serialize};

/// Current token pair held by the credential store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl Credentials {
    /// True when neither token is present
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

/// Token exchange request body
#[derive(Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

/// Token exchange response body
///
/// Servers that rotate refresh tokens return the new one alongside the access token.
#[derive(Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_request_shape() {
        let body = serde_json::to_value(RefreshRequest {
            refresh_token: "r1",
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({ "refresh_token": "r1" }));
    }

    #[test]
    fn test_refresh_response_without_rotation() {
        let data: RefreshResponse =
            serde_json::from_str(r#"{"access_token":"T2"}"#).unwrap();
        assert_eq!(data.access_token, "T2");
        assert!(data.refresh_token.is_none());
    }

    #[test]
    fn test_credentials_is_empty() {
        assert!(Credentials::default().is_empty());
        let creds = Credentials {
            access_token: None,
            refresh_token: Some("r".to_string()),
        };
        assert!(!creds.is_empty());
    }
}
