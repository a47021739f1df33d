// Authentication types

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::utils::https_url;

/// OAuth2 token as cached between sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub token_type: String,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Unix timestamp (seconds)
    pub expires_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl Token {
    /// A token is usable when it has a type and an access token
    pub fn is_valid(&self) -> bool {
        !self.token_type.is_empty() && !self.access_token.is_empty()
    }

    /// Tokens from the client credentials flow carry no refresh token
    pub fn is_unattended(&self) -> bool {
        self.refresh_token.is_none()
    }

    /// Seconds until expiry (negative once expired)
    pub fn expires_in(&self) -> i64 {
        self.expires_at - Utc::now().timestamp()
    }
}

/// AAD token endpoint response
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// AAD returns these as strings or numbers
    pub expires_in: Option<serde_json::Value>,
    pub expires_on: Option<serde_json::Value>,
    pub resource: Option<String>,
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Convert into a cacheable token with an absolute expiry
    pub fn into_token(self) -> Token {
        let now = Utc::now().timestamp();
        let expires_at = match (
            self.expires_in.as_ref().and_then(number_value),
            self.expires_on.as_ref().and_then(number_value),
        ) {
            (Some(expires_in), _) => now + expires_in,
            (None, Some(expires_on)) => expires_on,
            (None, None) => now + 3600,
        };

        Token {
            token_type: self.token_type,
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            resource: self.resource,
            scope: self.scope,
        }
    }
}

/// AAD token endpoint error body
#[derive(Debug, Deserialize)]
pub struct TokenErrorResponse {
    pub error: Option<String>,
    pub error_description: Option<String>,
}

fn number_value(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Authentication section of the configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AadSettings {
    pub endpoint: String,
    pub client_id: String,
    pub tenant: String,
    pub redirect_uri: String,
    pub root: String,
    pub auth_uri: String,
    pub token_uri: String,
    pub resource: String,
    pub unattended_account: String,
    pub unattended_key: String,
}

impl AadSettings {
    pub fn from_map(map: &BTreeMap<String, String>) -> Self {
        let get = |key: &str| map.get(key).cloned().unwrap_or_default();
        Self {
            endpoint: get("endpoint"),
            client_id: get("client_id"),
            tenant: get("tenant"),
            redirect_uri: get("redirect_uri"),
            root: get("root"),
            auth_uri: get("auth_uri"),
            token_uri: get("token_uri"),
            resource: get("resource"),
            unattended_account: get("unattended_account"),
            unattended_key: get("unattended_key"),
        }
    }

    /// Token endpoint for a tenant
    pub fn token_url(&self, tenant: &str) -> String {
        https_url(&self.root, &[tenant, &self.token_uri])
    }

    /// Authorization endpoint for the configured tenant
    pub fn authorize_url(&self) -> String {
        https_url(&self.root, &[&self.tenant, &self.auth_uri])
    }

    /// Resource the token is requested for
    pub fn resource_url(&self) -> String {
        https_url(&self.resource, &[])
    }

    /// Split `ClientID=abc;TenantID=xyz` into client id and tenant
    pub fn unattended_identity(&self) -> Option<(String, String)> {
        let mut parts = self.unattended_account.split(';');
        let client = parts.next()?.split_once('=')?.1.trim();
        let tenant = parts.next()?.split_once('=')?.1.trim();
        if client.is_empty() || tenant.is_empty() {
            return None;
        }
        Some((client.to_string(), tenant.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> AadSettings {
        AadSettings {
            endpoint: "test.com".to_string(),
            client_id: "abc".to_string(),
            tenant: "common".to_string(),
            redirect_uri: "redirect".to_string(),
            root: "login.windows.net/".to_string(),
            auth_uri: "/oauth2/authorize".to_string(),
            token_uri: "/oauth2/token".to_string(),
            resource: "https://batchapps.core.windows.net/".to_string(),
            unattended_account: "ClientID=client;TenantID=tenant".to_string(),
            unattended_key: "secret".to_string(),
        }
    }

    #[test]
    fn test_token_validity() {
        let mut token = Token {
            token_type: "Bearer".to_string(),
            access_token: "abc".to_string(),
            refresh_token: None,
            expires_at: Utc::now().timestamp() + 600,
            resource: None,
            scope: None,
        };
        assert!(token.is_valid());
        assert!(token.is_unattended());
        assert!(token.expires_in() > 500);

        token.access_token.clear();
        assert!(!token.is_valid());
    }

    #[test]
    fn test_token_response_string_expiry() {
        let response: TokenResponse = serde_json::from_str(
            r#"{"token_type":"Bearer","access_token":"a","refresh_token":"r","expires_in":"3599"}"#,
        )
        .unwrap();
        let token = response.into_token();
        assert_eq!(token.refresh_token.as_deref(), Some("r"));
        assert!((3590..=3599).contains(&token.expires_in()));
    }

    #[test]
    fn test_token_response_expires_on() {
        let response: TokenResponse = serde_json::from_str(
            r#"{"token_type":"Bearer","access_token":"a","expires_on":1700000000}"#,
        )
        .unwrap();
        assert_eq!(response.into_token().expires_at, 1_700_000_000);
    }

    #[test]
    fn test_aad_urls() {
        let aad = settings();
        assert_eq!(
            aad.token_url("common"),
            "https://login.windows.net/common/oauth2/token"
        );
        assert_eq!(
            aad.authorize_url(),
            "https://login.windows.net/common/oauth2/authorize"
        );
        assert_eq!(aad.resource_url(), "https://batchapps.core.windows.net/");
    }

    #[test]
    fn test_unattended_identity() {
        let mut aad = settings();
        assert_eq!(
            aad.unattended_identity(),
            Some(("client".to_string(), "tenant".to_string()))
        );

        aad.unattended_account = "client".to_string();
        assert_eq!(aad.unattended_identity(), None);
    }
}
