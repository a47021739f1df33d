// Credential loading and persistence

use super::store::TokenStore;
use super::types::{AadSettings, Token};
use crate::config::Configuration;
use crate::error::{BatchAppsError, Result};

/// An authenticated client session: the token plus the settings needed to refresh it
#[derive(Debug, Clone)]
pub struct Credentials {
    client_id: String,
    settings: AadSettings,
    token: Token,
    store: TokenStore,
}

impl Credentials {
    /// Create credentials for a client
    ///
    /// Without a token the one stored by a previous session is used. The
    /// token is validated and written back to the store.
    pub fn new(config: &Configuration, client_id: &str, token: Option<Token>) -> Result<Self> {
        let store = open_store(config);

        let (token, unattended) = match token {
            Some(token) => {
                let unattended = token.is_unattended();
                (token, unattended)
            }
            None => {
                tracing::debug!("No token supplied, attempting to retrieve previous session.");
                let stored = store.load(client_id)?.ok_or_else(|| {
                    BatchAppsError::Auth(
                        "Unable to find stored credentials. Please log in.".to_string(),
                    )
                })?;
                tracing::debug!("Existing token successfully retrieved for client: {}", client_id);
                let unattended = stored.is_unattended();
                (stored, unattended)
            }
        };

        let settings = AadSettings::from_map(&config.auth_settings(unattended)?);
        Self::from_parts(client_id, settings, token, store)
    }

    /// Assemble credentials from already loaded parts
    pub fn from_parts(
        client_id: &str,
        settings: AadSettings,
        token: Token,
        store: TokenStore,
    ) -> Result<Self> {
        if !token.is_valid() {
            return Err(BatchAppsError::Auth("Invalid token.".to_string()));
        }

        let creds = Self {
            client_id: client_id.to_string(),
            settings,
            token,
            store,
        };
        creds.persist();
        tracing::debug!("Token expires in: {}", creds.token.expires_in());
        Ok(creds)
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn settings(&self) -> &AadSettings {
        &self.settings
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    /// Replace the token and persist it
    pub fn store_auth(&mut self, token: Token) {
        self.token = token;
        self.persist();
    }

    fn persist(&self) {
        if let Err(e) = self.store.store(&self.client_id, &self.token) {
            tracing::warn!("Failed to store token for {}: {:#}", self.client_id, e);
        }
    }

    /// Remove the stored token; the current session stays usable
    pub fn clear_auth(&self) -> Result<bool> {
        self.store.clear(&self.client_id).map_err(|e| {
            BatchAppsError::Io(std::io::Error::other(format!(
                "Unable to clear stored credentials: {:#}",
                e
            )))
        })
    }
}

/// Token store in the configuration's data directory
pub fn open_store(config: &Configuration) -> TokenStore {
    if !config.can_write() {
        return TokenStore::disabled();
    }
    match TokenStore::open(config.data_dir()) {
        Ok(store) => store,
        Err(e) => {
            tracing::warn!("Token cache unavailable, session will not be stored: {:#}", e);
            TokenStore::disabled()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AadUpdate, ConfigOptions};
    use chrono::Utc;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> Configuration {
        let mut cfg = Configuration::new(ConfigOptions {
            data_path: Some(dir.path().to_path_buf()),
            ..Default::default()
        })
        .unwrap();
        cfg.aad_config(
            AadUpdate {
                endpoint: Some("test.com".to_string()),
                client_id: Some("abc".to_string()),
                redirect: Some("redirect".to_string()),
                account: Some("ClientID=abc;TenantID=xyz".to_string()),
                key: Some("secret".to_string()),
                ..Default::default()
            },
            false,
            true,
        )
        .unwrap();
        cfg
    }

    fn token(refresh: Option<&str>) -> Token {
        Token {
            token_type: "Bearer".to_string(),
            access_token: "access".to_string(),
            refresh_token: refresh.map(str::to_string),
            expires_at: Utc::now().timestamp() + 3600,
            resource: None,
            scope: None,
        }
    }

    #[test]
    fn test_no_stored_token() {
        let dir = TempDir::new().unwrap();
        let err = Credentials::new(&config(&dir), "abc", None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Authentication failed: Unable to find stored credentials. Please log in."
        );
    }

    #[test]
    fn test_token_stored_and_reloaded() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);

        let creds = Credentials::new(&cfg, "abc", Some(token(Some("refresh")))).unwrap();
        assert_eq!(creds.settings().client_id, "abc");

        let reloaded = Credentials::new(&cfg, "abc", None).unwrap();
        assert_eq!(reloaded.token(), creds.token());

        assert!(reloaded.clear_auth().unwrap());
        assert!(Credentials::new(&cfg, "abc", None).is_err());
    }

    #[test]
    fn test_invalid_token_rejected() {
        let dir = TempDir::new().unwrap();
        let mut bad = token(None);
        bad.token_type.clear();
        let err = Credentials::new(&config(&dir), "abc", Some(bad)).unwrap_err();
        assert_eq!(err.to_string(), "Authentication failed: Invalid token.");
    }

    #[test]
    fn test_store_auth_persists() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let mut creds = Credentials::new(&cfg, "abc", Some(token(None))).unwrap();

        let mut updated = token(None);
        updated.access_token = "updated".to_string();
        creds.store_auth(updated);

        let reloaded = Credentials::new(&cfg, "abc", None).unwrap();
        assert_eq!(reloaded.token().access_token, "updated");
    }
}
