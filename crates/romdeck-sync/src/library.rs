//! Catalog reconciliation against the remote library
//!
//! Drives platform sync and paged ROM sync, resolves dedup keys,
//! consolidates multi-disc siblings, and cleans up orphans, duplicates,
//! and legacy platforms. At most one full-or-partial pass runs at a time;
//! a second caller is told "already in progress" instead of queuing, and a
//! started pass always runs to completion.

use crate::filter::SyncFilter;
use crate::merge::aggregate_game_data;
use crate::progress::{SyncProgress, SyncReport};
use crate::{FileOps, SyncError, SyncHooks};
use chrono::{Datelike, TimeZone, Utc};
use romdeck_config::{platform_def, SyncFilterConfig};
use romdeck_remote::{ApiProvider, CatalogApi, RemotePlatform, RemoteRom};
use romdeck_store::{
    keys, CatalogStore, GameDiscRow, GameFileRow, GameRow, GameSource, PlatformRow, StoreError,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Fixed page size for the offset-based ROM listing
pub const SYNC_PAGE_SIZE: u32 = 100;

/// A sibling-based multi-disc title recorded during the per-platform pass
/// and consolidated after all platforms settle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiDiscGroup {
    pub primary_romm_id: i64,
    pub sibling_romm_ids: Vec<i64>,
    pub platform_slug: String,
}

impl MultiDiscGroup {
    /// Primary first, then siblings; consolidation order matters for the
    /// survivor tie-break
    fn all_romm_ids(&self) -> Vec<i64> {
        let mut ids = Vec::with_capacity(1 + self.sibling_romm_ids.len());
        ids.push(self.primary_romm_id);
        ids.extend(&self.sibling_romm_ids);
        ids
    }
}

/// Accumulator returned from one per-platform sync step
#[derive(Debug, Default)]
struct PlatformSyncOutcome {
    added: usize,
    updated: usize,
    seen_ids: HashSet<i64>,
    multi_disc_groups: Vec<MultiDiscGroup>,
    error: Option<String>,
}

pub struct LibraryReconciler {
    inner: Arc<ReconcilerInner>,
}

struct ReconcilerInner {
    api: Arc<dyn ApiProvider>,
    store: Arc<CatalogStore>,
    hooks: Arc<dyn SyncHooks>,
    files: Arc<dyn FileOps>,
    filters: Mutex<SyncFilterConfig>,
    progress_tx: watch::Sender<SyncProgress>,
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl LibraryReconciler {
    pub fn new(
        api: Arc<dyn ApiProvider>,
        store: Arc<CatalogStore>,
        hooks: Arc<dyn SyncHooks>,
        files: Arc<dyn FileOps>,
        filters: SyncFilterConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ReconcilerInner {
                api,
                store,
                hooks,
                files,
                filters: Mutex::new(filters),
                progress_tx: watch::Sender::new(SyncProgress::default()),
                gate: Arc::new(tokio::sync::Mutex::new(())),
            }),
        }
    }

    pub fn set_filters(&self, filters: SyncFilterConfig) {
        *self.inner.filters.lock().expect("filters mutex poisoned") = filters;
    }

    /// Observe sync progress; values are coalesced, not queued
    pub fn progress(&self) -> watch::Receiver<SyncProgress> {
        self.inner.progress_tx.subscribe()
    }

    /// Full-library pass. Rejects reentrancy without blocking and runs on
    /// its own task so caller cancellation cannot leave the catalog
    /// half-reconciled.
    pub async fn sync_library(&self) -> Result<SyncReport, SyncError> {
        let Ok(guard) = Arc::clone(&self.inner.gate).try_lock_owned() else {
            return Ok(SyncReport::already_running());
        };

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let _guard = guard;
            inner.run_library_sync().await
        });
        task.await.map_err(|err| SyncError::Task(err.to_string()))?
    }

    /// Single-platform pass, under the same mutex as [`Self::sync_library`]
    pub async fn sync_platform(&self, platform_id: i64) -> Result<SyncReport, SyncError> {
        let Ok(guard) = Arc::clone(&self.inner.gate).try_lock_owned() else {
            return Ok(SyncReport::already_running());
        };

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let _guard = guard;
            inner.run_platform_sync(platform_id).await
        });
        task.await.map_err(|err| SyncError::Task(err.to_string()))?
    }

    /// Refresh platform metadata only, no ROM paging. Returns the number of
    /// platforms seen.
    pub async fn sync_platforms_only(&self) -> Result<usize, SyncError> {
        let inner = &self.inner;
        let api = inner.api.api().ok_or(SyncError::NotConnected)?;
        let platforms = api.platforms().await?;
        for platform in &platforms {
            inner.sync_platform_metadata(api.as_ref(), platform).await?;
        }
        Ok(platforms.len())
    }
}

impl ReconcilerInner {
    fn filters(&self) -> SyncFilterConfig {
        self.filters.lock().expect("filters mutex poisoned").clone()
    }

    fn publish(&self, progress: SyncProgress) {
        self.progress_tx.send_replace(progress);
    }

    fn update_progress(&self, update: impl FnOnce(&mut SyncProgress)) {
        let mut current = self.progress_tx.borrow().clone();
        update(&mut current);
        self.progress_tx.send_replace(current);
    }

    async fn run_library_sync(&self) -> Result<SyncReport, SyncError> {
        let Some(api) = self.api.api() else {
            return Err(SyncError::NotConnected);
        };

        let filters = self.filters();
        let mut report = SyncReport::default();
        let mut seen_romm_ids: HashSet<i64> = HashSet::new();
        let mut groups: Vec<MultiDiscGroup> = Vec::new();

        self.publish(SyncProgress {
            is_syncing: true,
            ..Default::default()
        });

        let result = self
            .library_sync_body(
                api.as_ref(),
                &filters,
                &mut report,
                &mut seen_romm_ids,
                &mut groups,
            )
            .await;
        if let Err(err) = result {
            report.errors.push(err.to_string());
        }

        self.publish(SyncProgress::default());
        Ok(report)
    }

    async fn library_sync_body(
        &self,
        api: &dyn CatalogApi,
        filters: &SyncFilterConfig,
        report: &mut SyncReport,
        seen_romm_ids: &mut HashSet<i64>,
        groups: &mut Vec<MultiDiscGroup>,
    ) -> Result<(), SyncError> {
        let platforms = match api.platforms().await {
            Ok(platforms) => platforms,
            Err(err) => {
                report.errors.push(platforms_fetch_error(&err));
                return Ok(());
            }
        };
        if platforms.is_empty() {
            report
                .errors
                .push("No platforms returned from server".to_string());
            return Ok(());
        }

        for platform in &platforms {
            self.sync_platform_metadata(api, platform).await?;
        }

        // Absent local row or first sight counts as enabled
        let mut enabled: Vec<&RemotePlatform> = Vec::new();
        for platform in &platforms {
            let local = self.store.platform_by_id(platform.id)?;
            if local.map(|row| row.sync_enabled).unwrap_or(true) {
                enabled.push(platform);
            }
        }

        self.update_progress(|p| p.platforms_total = enabled.len());

        for (index, platform) in enabled.iter().enumerate() {
            self.update_progress(|p| {
                p.current_platform = Some(platform.normalized_name().to_string());
                p.platforms_done = index;
            });

            let outcome = self.sync_platform_roms(api, platform, filters).await;
            report.games_added += outcome.added;
            report.games_updated += outcome.updated;
            seen_romm_ids.extend(outcome.seen_ids.iter().copied());
            groups.extend(outcome.multi_disc_groups);
            if let Some(error) = outcome.error {
                report.errors.push(error);
            }

            report.platforms_synced += 1;
        }

        self.consolidate_multi_disc_games(api, groups).await;

        report.games_deleted += self.cleanup_invalid_extension_games()?;
        report.games_deleted += self.cleanup_duplicate_games()?;
        self.cleanup_legacy_platforms(&platforms)?;

        for platform in &platforms {
            let count = self.store.count_games_by_platform(platform.id)?;
            self.store.update_platform_game_count(platform.id, count)?;
        }

        if filters.delete_orphans {
            report.games_deleted += self.delete_orphaned_games(seen_romm_ids)?;
        }

        self.store
            .state_set_timestamp(keys::LAST_LIBRARY_SYNC, Utc::now())?;

        self.hooks.after_sync().await;

        Ok(())
    }

    async fn run_platform_sync(&self, platform_id: i64) -> Result<SyncReport, SyncError> {
        let Some(api) = self.api.api() else {
            return Err(SyncError::NotConnected);
        };

        if self.store.platform_by_id(platform_id)?.is_none() {
            return Ok(SyncReport::failed("Platform not found locally"));
        }

        let filters = self.filters();

        self.publish(SyncProgress {
            is_syncing: true,
            platforms_total: 1,
            ..Default::default()
        });

        let result = self
            .platform_sync_body(api.as_ref(), platform_id, &filters)
            .await;
        self.publish(SyncProgress::default());

        match result {
            Ok(report) => Ok(report),
            Err(err) => Ok(SyncReport::failed(err.to_string())),
        }
    }

    async fn platform_sync_body(
        &self,
        api: &dyn CatalogApi,
        platform_id: i64,
        filters: &SyncFilterConfig,
    ) -> Result<SyncReport, SyncError> {
        let platform = match api.platform(platform_id).await {
            Ok(platform) => platform,
            Err(err) => {
                return Ok(SyncReport::failed(format!(
                    "Failed to fetch platform: {err}"
                )));
            }
        };

        self.sync_platform_metadata(api, &platform).await?;
        self.update_progress(|p| {
            p.current_platform = Some(platform.normalized_name().to_string());
        });

        let outcome = self.sync_platform_roms(api, &platform, filters).await;

        self.consolidate_multi_disc_games(api, &outcome.multi_disc_groups)
            .await;

        let mut games_deleted = 0;
        if filters.delete_orphans {
            games_deleted =
                self.delete_orphaned_games_for_platform(platform.id, &outcome.seen_ids)?;
        }

        let count = self.store.count_games_by_platform(platform.id)?;
        self.store.update_platform_game_count(platform.id, count)?;

        self.hooks.after_sync().await;

        Ok(SyncReport {
            platforms_synced: 1,
            games_added: outcome.added,
            games_updated: outcome.updated,
            games_deleted,
            errors: outcome.error.into_iter().collect(),
        })
    }

    /// Upsert one platform row. Remote wins for name/slug/count/logo;
    /// locally-owned toggles survive from the existing row.
    async fn sync_platform_metadata(
        &self,
        api: &dyn CatalogApi,
        remote: &RemotePlatform,
    ) -> Result<(), StoreError> {
        let existing = self.store.platform_by_id(remote.id)?;
        let def = platform_def(&remote.slug);

        let logo_url = remote.url_logo.as_deref().map(|url| api.media_url(url));
        let name = remote.normalized_name().to_string();

        let row = PlatformRow {
            id: remote.id,
            slug: remote.slug.clone(),
            fs_slug: remote.fs_slug.clone(),
            short_name: def.map(|d| d.short_name.to_string()).unwrap_or_else(|| name.clone()),
            name,
            rom_extensions: def
                .map(|d| d.extensions.join(","))
                .unwrap_or_default(),
            game_count: remote.rom_count,
            is_visible: existing.as_ref().map(|e| e.is_visible).unwrap_or(true),
            logo_path: logo_url
                .clone()
                .or_else(|| existing.as_ref().and_then(|e| e.logo_path.clone())),
            sort_order: def
                .map(|d| d.sort_order)
                .or(existing.as_ref().map(|e| e.sort_order))
                .unwrap_or(999),
            sync_enabled: existing.as_ref().map(|e| e.sync_enabled).unwrap_or(true),
            custom_rom_path: existing.as_ref().and_then(|e| e.custom_rom_path.clone()),
            last_scanned: existing.as_ref().and_then(|e| e.last_scanned),
        };

        self.store.upsert_platform(&row)?;

        if let Some(url) = &logo_url
            && url.starts_with("http")
        {
            self.hooks.queue_platform_logo(remote.id, url);
        }

        if let Some(firmware) = remote.firmware.as_deref()
            && !firmware.is_empty()
        {
            self.hooks
                .platform_firmware(remote.id, &remote.slug, firmware)
                .await;
        }

        Ok(())
    }

    /// Page through one platform's ROM listing, admitting entries through
    /// the filter, resolving dedup keys, and recording multi-disc groups.
    async fn sync_platform_roms(
        &self,
        api: &dyn CatalogApi,
        platform: &RemotePlatform,
        filters: &SyncFilterConfig,
    ) -> PlatformSyncOutcome {
        let mut out = PlatformSyncOutcome::default();
        let filter = SyncFilter::new(filters);

        let mut seen_dedup_keys: HashMap<String, i64> = HashMap::new();
        let mut roms_with_ra: HashSet<i64> = HashSet::new();
        let mut processed_disc_ids: HashSet<i64> = HashSet::new();
        let mut skip_individual_discs: HashSet<i64> = HashSet::new();

        let mut offset = 0u32;
        let mut total_fetched = 0usize;

        loop {
            let page = match api.roms_page(platform.id, SYNC_PAGE_SIZE, offset).await {
                Ok(page) => page,
                Err(err) => {
                    out.error = Some(format!(
                        "Failed to fetch ROMs for {}: {err}",
                        platform.normalized_name()
                    ));
                    return out;
                }
            };
            if page.items.is_empty() {
                break;
            }

            total_fetched += page.items.len();
            self.update_progress(|p| {
                p.games_total = page.total.max(0) as usize;
                p.games_done = total_fetched;
            });

            for rom in &page.items {
                if !filter.should_sync(rom) {
                    continue;
                }

                if skip_individual_discs.contains(&rom.id) {
                    tracing::debug!(
                        "skipping individual disc {} - folder-based version preferred",
                        rom.name
                    );
                    continue;
                }

                if rom.is_folder_multi_disc() {
                    let sibling_ids: Vec<i64> =
                        rom.disc_siblings().iter().map(|s| s.id).collect();
                    if !sibling_ids.is_empty() {
                        skip_individual_discs.extend(sibling_ids.iter().copied());
                        tracing::info!(
                            "{} is folder-based multi-disc, marking {} disc siblings to skip",
                            rom.name,
                            sibling_ids.len()
                        );
                        // Folder-based representation wins over loose discs
                        for sibling_id in &sibling_ids {
                            if let Ok(Some(existing)) = self.store.game_by_romm_id(*sibling_id) {
                                tracing::info!(
                                    "deleting redundant individual disc game: {}",
                                    existing.title
                                );
                                if let Err(err) = self.store.delete_game(existing.id) {
                                    tracing::warn!(
                                        "failed to delete disc game {}: {err}",
                                        existing.id
                                    );
                                }
                            }
                        }
                    }
                }

                let has_ra = rom.ra_id.is_some() || rom.achievement_count() > 0;

                if let Some(key) = dedup_key(rom) {
                    if let Some(&winner) = seen_dedup_keys.get(&key) {
                        // Achievement-richness breaks the tie: a later entry
                        // with RA linkage replaces an earlier one without it
                        let winner_has_ra = roms_with_ra.contains(&winner);
                        if !winner_has_ra && has_ra {
                            out.seen_ids.remove(&winner);
                            roms_with_ra.remove(&winner);
                            seen_dedup_keys.insert(key, rom.id);
                            out.seen_ids.insert(rom.id);
                            roms_with_ra.insert(rom.id);
                            match self.sync_rom(api, rom, platform).await {
                                Ok(_) => out.updated += 1,
                                Err(err) => tracing::warn!(
                                    "failed to sync ROM {} ({}): {err}",
                                    rom.id,
                                    rom.name
                                ),
                            }
                        }
                        continue;
                    }
                    seen_dedup_keys.insert(key, rom.id);
                }

                out.seen_ids.insert(rom.id);
                if has_ra {
                    roms_with_ra.insert(rom.id);
                }

                match self.sync_rom(api, rom, platform).await {
                    Ok(is_new) => {
                        if is_new {
                            out.added += 1;
                        } else {
                            out.updated += 1;
                        }

                        if rom.is_sibling_multi_disc() && !processed_disc_ids.contains(&rom.id) {
                            let sibling_ids: Vec<i64> =
                                rom.disc_siblings().iter().map(|s| s.id).collect();

                            processed_disc_ids.insert(rom.id);
                            processed_disc_ids.extend(sibling_ids.iter().copied());
                            // Siblings belong to this title; keep the orphan
                            // sweep away from them
                            out.seen_ids.extend(sibling_ids.iter().copied());

                            out.multi_disc_groups.push(MultiDiscGroup {
                                primary_romm_id: rom.id,
                                sibling_romm_ids: sibling_ids,
                                platform_slug: platform.slug.clone(),
                            });
                        }
                    }
                    Err(err) => {
                        tracing::warn!("failed to sync ROM {} ({}): {err}", rom.id, rom.name);
                    }
                }
            }

            if total_fetched >= page.total.max(0) as usize {
                break;
            }
            offset += SYNC_PAGE_SIZE;
        }

        out
    }

    /// Upsert one remote entry into the local catalog, folding in any
    /// migration set that resolves to the same external-database id.
    async fn sync_rom(
        &self,
        api: &dyn CatalogApi,
        rom: &RemoteRom,
        platform: &RemotePlatform,
    ) -> Result<bool, SyncError> {
        let existing = self.store.game_by_romm_id(rom.id)?;

        let migration_sources: Vec<GameRow> = match (&existing, rom.igdb_id) {
            (None, Some(igdb_id)) => self
                .store
                .games_by_igdb_and_platform(igdb_id, platform.id)?
                .into_iter()
                .filter(|g| g.romm_id.is_some() && g.romm_id != Some(rom.id))
                .collect(),
            _ => Vec::new(),
        };

        if !migration_sources.is_empty() {
            tracing::info!(
                "detected re-identified title {}: {} old entries -> new remote id {}",
                rom.name,
                migration_sources.len(),
                rom.id
            );
        }

        // A recorded local path only survives while the file is still there
        let validated_existing = existing.clone().map(|mut game| {
            if let Some(path) = game.local_path.clone()
                && !self.files.exists(&path)
            {
                tracing::warn!("local file vanished, clearing path for {}: {path}", rom.name);
                game.local_path = None;
            }
            game
        });

        let local_data = validated_existing.or_else(|| {
            aggregate_game_data(&migration_sources, |path| {
                let ok = self.files.exists(path);
                if !ok {
                    tracing::warn!("migrated local path no longer exists: {path}");
                }
                ok
            })
        });

        let screenshot_urls: Vec<String> = rom
            .merged_screenshots
            .iter()
            .map(|path| api.media_url(path))
            .collect();

        let content_changed = existing
            .as_ref()
            .is_some_and(|e| e.title != rom.name);
        if content_changed {
            self.hooks.invalidate_game_art(rom.id);
        }

        let background_url = screenshot_urls
            .get(1)
            .or_else(|| screenshot_urls.first())
            .cloned();
        let keep_background = !content_changed
            && existing
                .as_ref()
                .and_then(|e| e.background_path.as_deref())
                .is_some_and(|p| p.starts_with('/'));
        let background_path = if keep_background {
            existing.as_ref().and_then(|e| e.background_path.clone())
        } else if let Some(url) = background_url {
            self.hooks.queue_background(rom.id, &rom.name, &url);
            Some(url)
        } else {
            None
        };

        let cover_url = rom
            .path_cover_large
            .as_deref()
            .map(|path| api.media_url(path))
            .or_else(|| rom.url_cover.clone());
        let keep_cover = !content_changed
            && existing
                .as_ref()
                .and_then(|e| e.cover_path.as_deref())
                .is_some_and(|p| p.starts_with('/'));
        let cover_path = if keep_cover {
            existing.as_ref().and_then(|e| e.cover_path.clone())
        } else if let Some(url) = cover_url {
            self.hooks.queue_cover(rom.id, &rom.name, &url);
            Some(url)
        } else {
            None
        };

        let sibling_multi = rom.is_sibling_multi_disc();

        // No longer multi-disc in any form: drop stale disc rows
        if let Some(e) = &existing
            && e.is_multi_disc
            && !sibling_multi
            && !rom.is_folder_multi_disc()
        {
            self.store.delete_discs_for_game(e.id)?;
        }

        let local = local_data.as_ref();
        let user = rom.rom_user.as_ref();

        let local_path = local.and_then(|l| l.local_path.clone());
        let source = if local_path.is_some() {
            GameSource::Synced
        } else {
            GameSource::Remote
        };

        let is_multi_disc = if rom.is_folder_multi_disc() {
            local.is_some_and(|l| l.is_multi_disc && l.local_path.is_some())
        } else if sibling_multi {
            local.is_some_and(|l| l.is_multi_disc)
        } else {
            false
        };

        let file_size_bytes = rom
            .files
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter(|f| f.category.is_none() && !f.file_name.starts_with('.'))
            .max_by_key(|f| f.file_size_bytes)
            .map(|f| f.file_size_bytes)
            .or_else(|| (rom.fs_size_bytes > 0).then_some(rom.fs_size_bytes));

        let mut game = GameRow {
            id: existing.as_ref().map(|e| e.id).unwrap_or(0),
            platform_id: platform.id,
            platform_slug: platform.slug.clone(),
            title: rom.name.clone(),
            sort_title: create_sort_title(&rom.name),
            local_path,
            romm_id: Some(rom.id),
            romm_file_name: rom.fs_name.clone(),
            igdb_id: rom.igdb_id,
            ra_id: rom.ra_id,
            source,
            cover_path,
            background_path,
            screenshot_paths: (!screenshot_urls.is_empty()).then(|| screenshot_urls.join(",")),
            description: rom.summary.clone(),
            release_year: rom
                .first_release_date_millis()
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                .map(|dt| dt.year()),
            genre: rom.genres().and_then(|g| g.first().cloned()),
            developer: rom.companies().and_then(|c| c.first().cloned()),
            // Unlinked entries report a placeholder community rating
            rating: rom
                .metadatum
                .as_ref()
                .and_then(|m| m.average_rating)
                .filter(|r| rom.igdb_id.is_some() && *r < 98.0),
            regions: rom.regions.as_ref().map(|r| r.join(",")),
            languages: rom.languages.as_ref().map(|l| l.join(",")),
            game_modes: rom
                .metadatum
                .as_ref()
                .and_then(|m| m.game_modes.as_ref())
                .map(|m| m.join(",")),
            franchises: rom
                .metadatum
                .as_ref()
                .and_then(|m| m.franchises.as_ref())
                .map(|f| f.join(",")),
            user_rating: user
                .map(|u| u.rating)
                .or_else(|| local.map(|l| l.user_rating))
                .unwrap_or(0),
            user_difficulty: user
                .map(|u| u.difficulty)
                .or_else(|| local.map(|l| l.user_difficulty))
                .unwrap_or(0),
            completion: user
                .map(|u| u.completion)
                .or_else(|| local.map(|l| l.completion))
                .unwrap_or(0),
            status: user
                .and_then(|u| u.status.clone())
                .or_else(|| local.and_then(|l| l.status.clone())),
            backlogged: user
                .map(|u| u.backlogged)
                .or_else(|| local.map(|l| l.backlogged))
                .unwrap_or(false),
            now_playing: user
                .map(|u| u.now_playing)
                .or_else(|| local.map(|l| l.now_playing))
                .unwrap_or(false),
            is_favorite: local.map(|l| l.is_favorite).unwrap_or(false),
            is_hidden: local.map(|l| l.is_hidden).unwrap_or(false),
            is_multi_disc,
            play_count: local.map(|l| l.play_count).unwrap_or(0),
            play_time_minutes: local.map(|l| l.play_time_minutes).unwrap_or(0),
            last_played: local.and_then(|l| l.last_played),
            added_at: local.map(|l| l.added_at).unwrap_or_else(Utc::now),
            achievement_count: rom
                .ra_metadata
                .as_ref()
                .and_then(|m| m.achievements.as_ref())
                .map(|a| a.len() as i32)
                .or_else(|| local.map(|l| l.achievement_count))
                .unwrap_or(0),
            file_size_bytes,
        };

        let is_new = existing.is_none();
        if is_new {
            game.id = self.store.insert_game(&game)?;
        } else {
            self.store.update_game(&game)?;
        }

        if !migration_sources.is_empty() {
            for source in &migration_sources {
                self.store.delete_game(source.id)?;
            }
            tracing::info!(
                "deleted {} old entries after re-identification",
                migration_sources.len()
            );
        }

        self.sync_game_files(game.id, rom)?;

        Ok(is_new)
    }

    /// Replace the update/DLC child rows for a game with the remote's
    /// current file list
    fn sync_game_files(&self, game_id: i64, rom: &RemoteRom) -> Result<(), StoreError> {
        let Some(all_files) = rom.files.as_deref() else {
            return Ok(());
        };

        let files: Vec<_> = all_files
            .iter()
            .filter(|f| {
                matches!(f.category.as_deref(), Some("update") | Some("dlc"))
                    && !f.file_name.starts_with('.')
            })
            .collect();

        if files.is_empty() {
            return self.store.delete_files_for_game(game_id);
        }

        let keep: Vec<i64> = files.iter().map(|f| f.id).collect();
        self.store.delete_invalid_files(game_id, &keep)?;

        let mut rows = Vec::with_capacity(files.len());
        for file in files {
            let existing = self.store.game_file_by_remote_id(file.id)?;
            rows.push(GameFileRow {
                id: existing.as_ref().map(|e| e.id).unwrap_or(0),
                game_id,
                romm_file_id: file.id,
                rom_id: file.rom_id,
                file_name: file.file_name.clone(),
                file_path: file.full_path.clone(),
                category: file
                    .category
                    .clone()
                    .unwrap_or_else(|| "update".to_string()),
                file_size: file.file_size_bytes,
                local_path: existing.as_ref().and_then(|e| e.local_path.clone()),
                downloaded_at: existing.as_ref().and_then(|e| e.downloaded_at),
            });
        }
        self.store.upsert_files(&rows)
    }

    async fn consolidate_multi_disc_games(&self, api: &dyn CatalogApi, groups: &[MultiDiscGroup]) {
        for group in groups {
            if let Err(err) = self.consolidate_group(api, group).await {
                tracing::warn!(
                    "consolidation failed for primary {}: {err}",
                    group.primary_romm_id
                );
            }
        }
    }

    /// Merge every game row of a disc group into one survivor and rebuild
    /// its disc child rows
    async fn consolidate_group(
        &self,
        api: &dyn CatalogApi,
        group: &MultiDiscGroup,
    ) -> Result<(), SyncError> {
        let all_romm_ids = group.all_romm_ids();

        let mut existing_games: Vec<GameRow> = Vec::new();
        let mut seen_game_ids: HashSet<i64> = HashSet::new();
        for romm_id in &all_romm_ids {
            if let Some(game) = self.store.game_by_romm_id(*romm_id)?
                && seen_game_ids.insert(game.id)
            {
                existing_games.push(game);
            }
        }

        if existing_games.is_empty() {
            return Ok(());
        }

        // Survivor tie-break: an already-consolidated row wins, else the
        // row earliest in the group's id ordering, else the first found
        let primary = existing_games
            .iter()
            .find(|g| g.is_multi_disc)
            .or_else(|| {
                existing_games.iter().min_by_key(|g| {
                    g.romm_id
                        .and_then(|id| all_romm_ids.iter().position(|&x| x == id))
                        .unwrap_or(usize::MAX)
                })
            })
            .unwrap_or(&existing_games[0])
            .clone();

        let redundant: Vec<GameRow> = existing_games
            .iter()
            .filter(|g| g.id != primary.id)
            .cloned()
            .collect();

        if primary.is_multi_disc && redundant.is_empty() {
            self.store.delete_invalid_discs(primary.id, &all_romm_ids)?;
            return Ok(());
        }

        let mut survivor = primary.clone();
        survivor.is_favorite = existing_games.iter().any(|g| g.is_favorite);
        survivor.play_count = existing_games.iter().map(|g| g.play_count).sum();
        survivor.play_time_minutes = existing_games.iter().map(|g| g.play_time_minutes).sum();
        survivor.last_played = existing_games
            .iter()
            .filter_map(|g| g.last_played)
            .max()
            .or(primary.last_played);
        survivor.user_rating = existing_games
            .iter()
            .map(|g| g.user_rating)
            .max()
            .unwrap_or(0);
        survivor.user_difficulty = existing_games
            .iter()
            .map(|g| g.user_difficulty)
            .max()
            .unwrap_or(0);
        survivor.completion = existing_games
            .iter()
            .map(|g| g.completion)
            .max()
            .unwrap_or(0);
        survivor.backlogged = existing_games.iter().any(|g| g.backlogged);
        survivor.now_playing = existing_games.iter().any(|g| g.now_playing);
        survivor.added_at = existing_games
            .iter()
            .map(|g| g.added_at)
            .min()
            .unwrap_or(primary.added_at);
        survivor.is_multi_disc = true;

        self.store.update_game(&survivor)?;

        let local_paths_by_romm_id: HashMap<i64, String> = existing_games
            .iter()
            .filter_map(|g| match (&g.romm_id, &g.local_path) {
                (Some(romm_id), Some(path)) => Some((*romm_id, path.clone())),
                _ => None,
            })
            .collect();

        let existing_discs = self.store.discs_for_game(primary.id)?;
        let existing_disc_romm_ids: HashSet<i64> =
            existing_discs.iter().map(|d| d.romm_id).collect();

        let mut discs_to_insert: Vec<GameDiscRow> = Vec::new();

        for romm_id in &all_romm_ids {
            if existing_disc_romm_ids.contains(romm_id) {
                continue;
            }

            let known_disc = self.store.disc_by_romm_id(*romm_id)?;
            let local_path = local_paths_by_romm_id
                .get(romm_id)
                .cloned()
                .or_else(|| known_disc.as_ref().and_then(|d| d.local_path.clone()));

            let rom_data = match api.rom(*romm_id).await {
                Ok(rom) => Some(rom),
                Err(err) => {
                    tracing::warn!("failed to fetch disc data for {romm_id}: {err}");
                    None
                }
            };

            if rom_data.is_none() && known_disc.is_none() {
                tracing::warn!("skipping disc {romm_id} - no data available");
                continue;
            }

            let fallback_number = (discs_to_insert.len() + existing_discs.len() + 1) as i32;
            discs_to_insert.push(GameDiscRow {
                id: known_disc.as_ref().map(|d| d.id).unwrap_or(0),
                game_id: primary.id,
                romm_id: *romm_id,
                disc_number: rom_data
                    .as_ref()
                    .and_then(|r| r.disc_number())
                    .or_else(|| known_disc.as_ref().map(|d| d.disc_number))
                    .unwrap_or(fallback_number),
                file_name: rom_data
                    .as_ref()
                    .and_then(|r| r.fs_name.clone())
                    .or_else(|| known_disc.as_ref().map(|d| d.file_name.clone()))
                    .unwrap_or_else(|| "Disc".to_string()),
                local_path,
                file_size: rom_data
                    .as_ref()
                    .map(|r| r.fs_size_bytes)
                    .filter(|size| *size > 0)
                    .or_else(|| known_disc.as_ref().map(|d| d.file_size))
                    .unwrap_or(0),
            });
        }

        if !discs_to_insert.is_empty() {
            self.store.upsert_discs(&discs_to_insert)?;
        }

        self.store.delete_invalid_discs(primary.id, &all_romm_ids)?;

        for game in &redundant {
            self.store.delete_game(game.id)?;
        }

        Ok(())
    }

    /// Delete downloaded games whose file extension drifted outside the
    /// platform's whitelist since the initial sync
    fn cleanup_invalid_extension_games(&self) -> Result<usize, StoreError> {
        let mut deleted = 0;
        let games = self.remote_sourced_games()?;
        let mut platforms: HashMap<i64, Option<PlatformRow>> = HashMap::new();

        for game in &games {
            let Some(local_path) = &game.local_path else {
                continue;
            };
            let extension = local_path
                .rsplit_once('.')
                .map(|(_, ext)| ext.to_lowercase())
                .unwrap_or_default();
            if extension.is_empty() {
                continue;
            }

            let platform = platforms
                .entry(game.platform_id)
                .or_insert_with(|| self.store.platform_by_id(game.platform_id).ok().flatten());
            let Some(platform) = platform else {
                continue;
            };
            let whitelist = platform.extensions();
            if whitelist.is_empty() {
                continue;
            }

            if !whitelist.contains(&extension) {
                self.safe_delete_file(local_path);
                self.store.delete_game(game.id)?;
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Delete duplicate rows sharing a platform+igdb id, then duplicates
    /// sharing a platform+lowercased title. Keep order: has achievements,
    /// has a local file, lowest id.
    fn cleanup_duplicate_games(&self) -> Result<usize, StoreError> {
        let mut deleted = 0;
        let games = self.remote_sourced_games()?;
        let mut deleted_ids: HashSet<i64> = HashSet::new();

        let mut by_igdb: HashMap<(i64, i64), Vec<&GameRow>> = HashMap::new();
        for game in games.iter().filter(|g| g.igdb_id.is_some()) {
            by_igdb
                .entry((game.platform_id, game.igdb_id.unwrap_or(0)))
                .or_default()
                .push(game);
        }

        for duplicates in by_igdb.values_mut() {
            deleted += self.delete_duplicate_losers(duplicates, &mut deleted_ids)?;
        }

        let mut by_title: HashMap<(i64, String), Vec<&GameRow>> = HashMap::new();
        for game in games.iter().filter(|g| !deleted_ids.contains(&g.id)) {
            by_title
                .entry((game.platform_id, game.title.to_lowercase()))
                .or_default()
                .push(game);
        }

        for duplicates in by_title.values_mut() {
            deleted += self.delete_duplicate_losers(duplicates, &mut deleted_ids)?;
        }

        Ok(deleted)
    }

    fn delete_duplicate_losers(
        &self,
        duplicates: &mut Vec<&GameRow>,
        deleted_ids: &mut HashSet<i64>,
    ) -> Result<usize, StoreError> {
        if duplicates.len() <= 1 {
            return Ok(0);
        }

        duplicates.sort_by_key(|g| {
            (
                std::cmp::Reverse(g.achievement_count > 0),
                std::cmp::Reverse(g.local_path.is_some()),
                g.id,
            )
        });

        let mut deleted = 0;
        for game in duplicates.iter().skip(1) {
            if let Some(path) = &game.local_path {
                self.safe_delete_file(path);
            }
            self.store.delete_game(game.id)?;
            deleted_ids.insert(game.id);
            deleted += 1;
        }
        Ok(deleted)
    }

    /// Merge local platforms whose id has no remote counterpart into the
    /// remote platform matching their slug (and fs slug when recorded)
    fn cleanup_legacy_platforms(&self, remote: &[RemotePlatform]) -> Result<(), StoreError> {
        let remote_ids: HashSet<i64> = remote.iter().map(|p| p.id).collect();
        let by_key: HashMap<(String, Option<String>), i64> = remote
            .iter()
            .map(|p| ((p.slug.clone(), p.fs_slug.clone()), p.id))
            .collect();
        let mut by_slug: HashMap<&str, i64> = HashMap::new();
        for platform in remote {
            by_slug.entry(&platform.slug).or_insert(platform.id);
        }

        for local in self.store.all_platforms()? {
            if remote_ids.contains(&local.id) {
                continue;
            }

            let matching = by_key
                .get(&(local.slug.clone(), local.fs_slug.clone()))
                .copied()
                .or_else(|| {
                    if local.fs_slug.is_none() {
                        by_slug.get(local.slug.as_str()).copied()
                    } else {
                        None
                    }
                });

            if let Some(remote_id) = matching {
                self.store.migrate_platform_games(local.id, remote_id)?;
                self.store.delete_platform(local.id)?;
                tracing::info!("Migrated legacy platform {} -> {remote_id}", local.id);
            }
        }
        Ok(())
    }

    /// Delete remote-sourced games not seen this pass. Platforms with sync
    /// disabled are frozen, never purged.
    fn delete_orphaned_games(&self, seen_romm_ids: &HashSet<i64>) -> Result<usize, StoreError> {
        let disabled: HashSet<i64> = self
            .store
            .all_platforms()?
            .into_iter()
            .filter(|p| !p.sync_enabled)
            .map(|p| p.id)
            .collect();

        let mut deleted = 0;
        for game in self.store.games_by_source(GameSource::Remote)? {
            if disabled.contains(&game.platform_id) {
                continue;
            }
            let Some(romm_id) = game.romm_id else { continue };
            if !seen_romm_ids.contains(&romm_id) {
                self.store.delete_game(game.id)?;
                deleted += 1;
            }
        }

        for game in self.store.games_by_source(GameSource::Synced)? {
            if disabled.contains(&game.platform_id) {
                continue;
            }
            let Some(romm_id) = game.romm_id else { continue };
            if !seen_romm_ids.contains(&romm_id) {
                if let Some(path) = &game.local_path {
                    self.safe_delete_file(path);
                }
                self.store.delete_game(game.id)?;
                deleted += 1;
            }
        }

        Ok(deleted)
    }

    fn delete_orphaned_games_for_platform(
        &self,
        platform_id: i64,
        seen_romm_ids: &HashSet<i64>,
    ) -> Result<usize, StoreError> {
        let mut deleted = 0;

        for game in self.store.games_by_source(GameSource::Remote)? {
            if game.platform_id != platform_id {
                continue;
            }
            let Some(romm_id) = game.romm_id else { continue };
            if !seen_romm_ids.contains(&romm_id) {
                self.store.delete_game(game.id)?;
                deleted += 1;
            }
        }

        for game in self.store.games_by_source(GameSource::Synced)? {
            if game.platform_id != platform_id {
                continue;
            }
            let Some(romm_id) = game.romm_id else { continue };
            if !seen_romm_ids.contains(&romm_id) {
                if let Some(path) = &game.local_path {
                    self.safe_delete_file(path);
                }
                self.store.delete_game(game.id)?;
                deleted += 1;
            }
        }

        Ok(deleted)
    }

    fn remote_sourced_games(&self) -> Result<Vec<GameRow>, StoreError> {
        let mut games = self.store.games_by_source(GameSource::Remote)?;
        games.extend(self.store.games_by_source(GameSource::Synced)?);
        Ok(games)
    }

    /// Best-effort delete; a file that cannot be removed lands in the
    /// durable orphan index for later retry
    fn safe_delete_file(&self, path: &str) {
        if !self.files.exists(path) {
            return;
        }
        if let Err(err) = self.files.remove(path) {
            tracing::warn!("failed to delete {path}, adding to orphan index: {err}");
            if let Err(err) = self.store.record_orphaned_file(path) {
                tracing::warn!("failed to record orphaned file {path}: {err}");
            }
        }
    }
}

/// Dedup key for recognizing the same title across differently-id'd remote
/// entries: canonical metadata provider first, then the secondary provider,
/// then the achievements provider. No id means no deduplication.
fn dedup_key(rom: &RemoteRom) -> Option<String> {
    rom.igdb_id
        .map(|id| format!("igdb:{id}"))
        .or_else(|| rom.moby_id.map(|id| format!("moby:{id}")))
        .or_else(|| rom.ra_id.map(|id| format!("ra:{id}")))
}

fn platforms_fetch_error(err: &romdeck_remote::RemoteError) -> String {
    if err.is_auth() {
        "Authentication failed - token may be invalid or missing permissions".to_string()
    } else {
        format!("Failed to fetch platforms: {err}")
    }
}

/// Sort key for a title: leading article stripped, lowercased
pub fn create_sort_title(title: &str) -> String {
    let lower = title.to_lowercase();
    let stripped = if lower.starts_with("the ") {
        &title[4..]
    } else if lower.starts_with("an ") {
        &title[3..]
    } else if lower.starts_with("a ") {
        &title[2..]
    } else {
        title
    };
    stripped.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use romdeck_remote::RemoteError;

    #[test]
    fn test_create_sort_title() {
        assert_eq!(create_sort_title("The Legend of Zelda"), "legend of zelda");
        assert_eq!(create_sort_title("A Bug's Life"), "bug's life");
        assert_eq!(create_sort_title("An American Tail"), "american tail");
        assert_eq!(create_sort_title("Metroid Prime"), "metroid prime");
        assert_eq!(create_sort_title("Theme Hospital"), "theme hospital");
    }

    #[test]
    fn test_dedup_key_preference_order() {
        let mut rom = RemoteRom {
            igdb_id: Some(427),
            moby_id: Some(12),
            ra_id: Some(9),
            ..Default::default()
        };
        assert_eq!(dedup_key(&rom).as_deref(), Some("igdb:427"));

        rom.igdb_id = None;
        assert_eq!(dedup_key(&rom).as_deref(), Some("moby:12"));

        rom.moby_id = None;
        assert_eq!(dedup_key(&rom).as_deref(), Some("ra:9"));

        rom.ra_id = None;
        assert!(dedup_key(&rom).is_none());
    }

    #[test]
    fn test_platforms_fetch_error_auth_message() {
        let msg = platforms_fetch_error(&RemoteError::Auth { code: 401 });
        assert!(msg.contains("token may be invalid"));

        let msg = platforms_fetch_error(&RemoteError::Status { code: 500 });
        assert!(msg.contains("Failed to fetch platforms"));
    }

    #[test]
    fn test_multi_disc_group_id_ordering() {
        let group = MultiDiscGroup {
            primary_romm_id: 10,
            sibling_romm_ids: vec![11, 12],
            platform_slug: "psx".to_string(),
        };
        assert_eq!(group.all_romm_ids(), vec![10, 11, 12]);
    }
}
