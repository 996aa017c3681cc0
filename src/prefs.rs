use std::path::Path;

use anyhow::{Context, Result};
use log::debug;
use rusqlite::{Connection, OptionalExtension, params};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS preferences (
    key        TEXT PRIMARY KEY,
    value      TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);
";

pub const SESSION_ID: &str = "news_session_id";
pub const USER_ID: &str = "user_id";
pub const ACCESS_TOKEN: &str = "access_token";

/// Small key-value store for state that outlives a single run.
pub struct Prefs {
    conn: Connection,
}

impl Prefs {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open preferences at {}", path.display()))?;
        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize preferences schema")?;
        Ok(Prefs { conn })
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM preferences WHERE key = ?",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO preferences (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM preferences WHERE key = ?", [key])?;
        Ok(())
    }

    /// News session id, created on first use and stable afterwards.
    pub fn session_id(&self) -> Result<String> {
        if let Some(existing) = self.get(SESSION_ID)? {
            return Ok(existing);
        }
        let fresh = uuid::Uuid::new_v4().to_string();
        self.set(SESSION_ID, &fresh)?;
        debug!("Created news session {fresh}");
        Ok(fresh)
    }
}
