//! Remote library reconciliation engine for Romdeck
//!
//! Reconciles the local catalog against a remote library server: platform
//! sync, paged ROM sync with filtering and deduplication, multi-disc
//! consolidation, orphan cleanup, two-way collection/favorites sync, and a
//! session-scoped achievement-progression cache.

mod achievements;
mod collections;
mod filter;
mod library;
mod merge;
mod progress;

pub use achievements::AchievementCache;
pub use collections::CollectionSyncEngine;
pub use filter::SyncFilter;
pub use library::{LibraryReconciler, MultiDiscGroup, SYNC_PAGE_SIZE};
pub use merge::aggregate_game_data;
pub use progress::{SyncProgress, SyncReport};

use async_trait::async_trait;
use romdeck_remote::{RemoteError, RemoteFirmware};
use romdeck_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Not connected to server")]
    NotConnected,

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Sync task failed: {0}")]
    Task(String),

    #[error("{0}")]
    Failed(String),
}

/// Local filesystem operations the reconciler depends on.
///
/// Injected so tests can run without touching a disk; failures to remove a
/// file are demoted to the durable orphan index by the caller.
pub trait FileOps: Send + Sync {
    fn exists(&self, path: &str) -> bool;
    fn remove(&self, path: &str) -> std::io::Result<()>;
}

/// Real filesystem implementation
#[derive(Debug, Default)]
pub struct DiskFileOps;

impl FileOps for DiskFileOps {
    fn exists(&self, path: &str) -> bool {
        std::path::Path::new(path).exists()
    }

    fn remove(&self, path: &str) -> std::io::Result<()> {
        std::fs::remove_file(path)
    }
}

/// Delegated side effects of a sync pass: artwork caching, firmware lists,
/// and the post-sync hook. All default to no-ops.
#[async_trait]
pub trait SyncHooks: Send + Sync {
    fn queue_platform_logo(&self, _platform_id: i64, _url: &str) {}

    fn queue_cover(&self, _rom_id: i64, _title: &str, _url: &str) {}

    fn queue_background(&self, _rom_id: i64, _title: &str, _url: &str) {}

    /// Cached artwork for this game is stale (title changed)
    fn invalidate_game_art(&self, _rom_id: i64) {}

    /// The platform reported a firmware list
    async fn platform_firmware(
        &self,
        _platform_id: i64,
        _platform_slug: &str,
        _firmware: &[RemoteFirmware],
    ) {
    }

    /// Runs after a completed sync pass (e.g. rebuild virtual collections)
    async fn after_sync(&self) {}
}

/// Hook implementation that does nothing
#[derive(Debug, Default)]
pub struct NoHooks;

#[async_trait]
impl SyncHooks for NoHooks {}
