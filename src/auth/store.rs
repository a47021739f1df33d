// Token cache in a SQLite database

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::types::Token;

const KEY_PREFIX: &str = "AzureBatchApps";

/// SQLite backed token cache keyed by client id
///
/// A store without a path keeps nothing between sessions.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: Option<PathBuf>,
}

impl TokenStore {
    /// Open (and create if required) the cache in the data directory
    pub fn open(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join("credentials.sqlite3");
        let conn = rusqlite::Connection::open(&path)
            .with_context(|| format!("Failed to open SQLite database: {}", path.display()))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS auth_kv (key TEXT PRIMARY KEY, value TEXT)",
            [],
        )
        .context("Failed to create auth_kv table")?;
        Ok(Self { path: Some(path) })
    }

    /// Store that never persists anything
    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn is_persistent(&self) -> bool {
        self.path.is_some()
    }

    fn key(client_id: &str) -> String {
        format!("{}:{}", KEY_PREFIX, client_id)
    }

    fn connection(&self) -> Result<Option<rusqlite::Connection>> {
        match self.path {
            Some(ref path) => rusqlite::Connection::open(path)
                .map(Some)
                .with_context(|| format!("Failed to open SQLite database: {}", path.display())),
            None => Ok(None),
        }
    }

    /// Load the token stored for a client
    pub fn load(&self, client_id: &str) -> Result<Option<Token>> {
        let Some(conn) = self.connection()? else {
            return Ok(None);
        };

        tracing::debug!("Retrieving stored token for client: {}", client_id);
        let json: Option<String> = match conn.query_row(
            "SELECT value FROM auth_kv WHERE key = ?",
            [Self::key(client_id)],
            |row| row.get(0),
        ) {
            Ok(value) => Some(value),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(e).context("Failed to load token data from SQLite"),
        };

        json.map(|j| serde_json::from_str(&j).context("Failed to parse token data from SQLite"))
            .transpose()
    }

    /// Store (or replace) the token for a client
    pub fn store(&self, client_id: &str, token: &Token) -> Result<()> {
        let Some(conn) = self.connection()? else {
            return Ok(());
        };

        tracing::debug!("Storing updated token for client: {}", client_id);
        let json = serde_json::to_string(token).context("Failed to serialize token")?;
        conn.execute(
            "INSERT OR REPLACE INTO auth_kv (key, value) VALUES (?1, ?2)",
            [Self::key(client_id), json],
        )
        .context("Failed to store token in SQLite")?;
        Ok(())
    }

    /// Remove the token for a client, returning whether one existed
    pub fn clear(&self, client_id: &str) -> Result<bool> {
        let Some(conn) = self.connection()? else {
            return Ok(false);
        };

        let removed = conn
            .execute("DELETE FROM auth_kv WHERE key = ?", [Self::key(client_id)])
            .context("Unable to clear stored credentials")?;
        Ok(removed > 0)
    }
}
