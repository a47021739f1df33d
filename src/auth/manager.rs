use chrono::Utc;
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::credentials::Credentials;
use super::oauth::oauth_client;
use super::refresh;
use crate::error::{BatchAppsError, Result};

/// Default refresh threshold in seconds
pub const DEFAULT_REFRESH_THRESHOLD: u64 = 300;

/// Authentication manager
/// Manages token lifecycle with automatic refresh and thread-safe access
pub struct AuthManager {
    /// Current credentials
    credentials: Arc<RwLock<Credentials>>,

    /// HTTP client for refresh requests
    client: Client,

    /// Token endpoint override (the configured AAD endpoint otherwise)
    token_url: Option<String>,

    /// Token refresh threshold in seconds (default: 300 = 5 minutes)
    refresh_threshold: i64,
}

impl AuthManager {
    /// Create a new AuthManager for testing (no token store required)
    /// Available in test builds and integration tests
    #[cfg(any(test, feature = "test-utils"))]
    pub fn new_for_testing(access_token: String, refresh_threshold: u64) -> Result<Self> {
        use super::store::TokenStore;
        use super::types::{AadSettings, Token};

        let token = Token {
            token_type: "Bearer".to_string(),
            access_token,
            refresh_token: Some("test-refresh-token".to_string()),
            expires_at: Utc::now().timestamp() + 3600,
            resource: None,
            scope: None,
        };
        let credentials = Credentials::from_parts(
            "test-client-id",
            AadSettings::default(),
            token,
            TokenStore::disabled(),
        )?;
        Self::new(credentials, refresh_threshold)
    }

    /// Create a new AuthManager for a signed-in session
    pub fn new(credentials: Credentials, refresh_threshold: u64) -> Result<Self> {
        Ok(Self {
            credentials: Arc::new(RwLock::new(credentials)),
            client: oauth_client()?,
            token_url: None,
            refresh_threshold: refresh_threshold as i64,
        })
    }

    /// Send refresh requests to a different token endpoint
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = Some(url.into());
        self
    }

    /// Check if token is expiring soon (within threshold)
    async fn is_token_expiring_soon(&self) -> bool {
        let creds = self.credentials.read().await;
        creds.token().expires_at <= Utc::now().timestamp() + self.refresh_threshold
    }

    /// Check if token is actually expired (not just expiring soon)
    async fn is_token_expired(&self) -> bool {
        let creds = self.credentials.read().await;
        Utc::now().timestamp() >= creds.token().expires_at
    }

    /// Refresh the access token
    ///
    /// Tokens with a refresh token use the refresh grant; unattended
    /// sessions request a new token with the client credentials.
    async fn refresh_token(&self) -> Result<()> {
        tracing::debug!("Refreshing access token...");

        // Hold the write lock so only one refresh runs at a time
        let mut creds = self.credentials.write().await;
        let settings = creds.settings().clone();
        let resource = settings.resource_url();

        let new_token = match creds.token().refresh_token.clone() {
            Some(refresh) => {
                let url = self
                    .token_url
                    .clone()
                    .unwrap_or_else(|| settings.token_url(&settings.tenant));
                let mut token = refresh::refresh_token(
                    &self.client,
                    &url,
                    creds.client_id(),
                    &refresh,
                    &resource,
                )
                .await?;
                if token.refresh_token.is_none() {
                    token.refresh_token = Some(refresh);
                }
                token
            }
            None => {
                let (client_id, tenant) = settings.unattended_identity().ok_or_else(|| {
                    BatchAppsError::SessionExpired(
                        "Token is no longer able to be refreshed, please log in.".to_string(),
                    )
                })?;
                let url = self
                    .token_url
                    .clone()
                    .unwrap_or_else(|| settings.token_url(&tenant));
                refresh::client_credentials(
                    &self.client,
                    &url,
                    &client_id,
                    &settings.unattended_key,
                    &resource,
                )
                .await?
            }
        };

        creds.store_auth(new_token);
        Ok(())
    }

    /// Get a valid access token, refreshing if necessary
    /// Thread-safe method that ensures only one refresh occurs at a time
    pub async fn get_access_token(&self) -> Result<String> {
        // Check if refresh is needed
        if self.is_token_expiring_soon().await {
            // Attempt refresh
            if let Err(e) = self.refresh_token().await {
                tracing::error!("Token refresh failed: {}", e);

                // Graceful degradation: if token isn't actually expired yet, use it
                if !self.is_token_expired().await {
                    tracing::warn!(
                        "Using existing token despite refresh failure (not yet expired)"
                    );
                    let creds = self.credentials.read().await;
                    return Ok(creds.token().access_token.clone());
                }

                return Err(match e {
                    BatchAppsError::SessionExpired(_) => e,
                    other => BatchAppsError::SessionExpired(format!(
                        "Token expired and could not be refreshed: {}",
                        other
                    )),
                });
            }
        }

        // Return current token
        let creds = self.credentials.read().await;
        Ok(creds.token().access_token.clone())
    }

    /// Refresh regardless of expiry, used after the service rejects a token
    pub async fn force_refresh(&self) -> Result<String> {
        self.refresh_token().await?;
        let creds = self.credentials.read().await;
        Ok(creds.token().access_token.clone())
    }

    /// Get the client id of the session
    pub async fn client_id(&self) -> String {
        let creds = self.credentials.read().await;
        creds.client_id().to_string()
    }

    /// Remove the stored token of this session
    pub async fn clear_auth(&self) -> Result<bool> {
        let creds = self.credentials.read().await;
        creds.clear_auth()
    }
}
