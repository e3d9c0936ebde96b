//! Key-value sync state: credentials, baselines, debounce stamps

use crate::catalog::CatalogStore;
use crate::{ts_from_sql, ts_to_sql, StoreError};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

/// Well-known `sync_state` keys
pub mod keys {
    pub const BASE_URL: &str = "server.base_url";
    pub const TOKEN: &str = "server.token";
    pub const USERNAME: &str = "server.username";
    pub const DEVICE_ID: &str = "server.device_id";
    pub const DEVICE_CLIENT_VERSION: &str = "server.device_client_version";
    pub const LAST_LIBRARY_SYNC: &str = "sync.last_library_sync";
    pub const LAST_FAVORITES_SYNC: &str = "sync.last_favorites_sync";
    pub const LAST_FAVORITES_CHECK: &str = "sync.last_favorites_check";
}

impl CatalogStore {
    pub fn state_get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM sync_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn state_set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn().execute(
            r#"INSERT INTO sync_state (key, value) VALUES (?1, ?2)
               ON CONFLICT(key) DO UPDATE SET value = excluded.value"#,
            params![key, value],
        )?;
        Ok(())
    }

    pub fn state_delete(&self, key: &str) -> Result<(), StoreError> {
        self.conn()
            .execute("DELETE FROM sync_state WHERE key = ?1", params![key])?;
        Ok(())
    }

    pub fn state_timestamp(&self, key: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self.state_get(key)?.and_then(|s| ts_from_sql(&s)))
    }

    pub fn state_set_timestamp(
        &self,
        key: &str,
        value: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.state_set(key, &ts_to_sql(&value))
    }
}
