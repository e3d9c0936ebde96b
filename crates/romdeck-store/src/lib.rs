//! Durable game catalog store for Romdeck
//!
//! SQLite-backed persistence for platforms, games, discs, extra files,
//! collections, the orphaned-file retry index, and key-value sync state.

mod catalog;
mod collections;
mod entity;
mod state;

pub use catalog::CatalogStore;
pub use entity::{CollectionRow, GameDiscRow, GameFileRow, GameRow, GameSource, PlatformRow};
pub use state::keys;

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub(crate) fn ts_to_sql(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

pub(crate) fn ts_from_sql(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
