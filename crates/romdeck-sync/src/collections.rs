//! Two-way favorites and collection sync
//!
//! Favorites live in a single remote collection flagged `is_favorite`.
//! The first-ever sync unions local and remote; afterwards the remote set
//! is authoritative. Named collections push local-only ones up, pull the
//! remote list down, and reconcile membership by delta. Local writes
//! always land; a failing remote push is surfaced, never undone.

use crate::SyncError;
use chrono::{DateTime, Duration, Utc};
use romdeck_remote::{ApiProvider, CatalogApi, CollectionCreate, RemoteCollection};
use romdeck_store::{keys, CatalogStore, CollectionRow};
use std::collections::HashSet;
use std::sync::Arc;

const FAVORITES_CHECK_DEBOUNCE_SECONDS: i64 = 30;
const FAVORITES_COLLECTION_NAME: &str = "Favorites";

#[derive(Clone)]
pub struct CollectionSyncEngine {
    api: Arc<dyn ApiProvider>,
    store: Arc<CatalogStore>,
}

impl CollectionSyncEngine {
    pub fn new(api: Arc<dyn ApiProvider>, store: Arc<CatalogStore>) -> Self {
        Self { api, store }
    }

    fn api(&self) -> Result<Arc<dyn CatalogApi>, SyncError> {
        self.api.api().ok_or(SyncError::NotConnected)
    }

    fn parse_timestamp(timestamp: Option<&str>) -> Option<DateTime<Utc>> {
        let timestamp = timestamp?.trim();
        if timestamp.is_empty() {
            return None;
        }
        match DateTime::parse_from_rfc3339(timestamp) {
            Ok(parsed) => Some(parsed.with_timezone(&Utc)),
            Err(err) => {
                tracing::warn!("failed to parse collection timestamp '{timestamp}': {err}");
                None
            }
        }
    }

    /// The remote favorites collection, lazily created when absent
    async fn get_or_create_favorites(
        &self,
        api: &dyn CatalogApi,
    ) -> Option<RemoteCollection> {
        match api.collections(Some(true)).await {
            Ok(collections) => {
                if let Some(existing) = collections.into_iter().find(|c| c.is_favorite) {
                    return Some(existing);
                }
                let create = CollectionCreate {
                    name: FAVORITES_COLLECTION_NAME.to_string(),
                    description: None,
                };
                match api.create_collection(true, &create).await {
                    Ok(created) => Some(created),
                    Err(err) => {
                        tracing::info!("failed to create favorites collection: {err}");
                        None
                    }
                }
            }
            Err(err) => {
                tracing::info!("failed to fetch favorites collection: {err}");
                None
            }
        }
    }

    async fn push_favorites(
        &self,
        api: &dyn CatalogApi,
        collection_id: i64,
        romm_ids: &[i64],
    ) -> Option<RemoteCollection> {
        match api.update_collection_roms(collection_id, romm_ids).await {
            Ok(updated) => Some(updated),
            Err(err) => {
                tracing::info!("failed to push favorites: {err}");
                None
            }
        }
    }

    /// Sync the favorites flag set. On the first-ever sync local and remote
    /// are unioned and the union is pushed; afterwards remote wins.
    pub async fn sync_favorites(&self) -> Result<(), SyncError> {
        let api = self.api()?;

        let collection = self
            .get_or_create_favorites(api.as_ref())
            .await
            .ok_or_else(|| SyncError::Failed("Failed to get favorites collection".to_string()))?;

        let remote_ids: HashSet<i64> = collection.rom_ids.iter().copied().collect();
        let local_ids: HashSet<i64> = self.store.favorite_romm_ids()?.into_iter().collect();
        let is_first_sync = self
            .store
            .state_timestamp(keys::LAST_FAVORITES_SYNC)?
            .is_none();

        if is_first_sync {
            let merged: Vec<i64> = remote_ids.union(&local_ids).copied().collect();
            tracing::info!(
                "first favorites sync: merging {} remote + {} local = {} total",
                remote_ids.len(),
                local_ids.len(),
                merged.len()
            );

            let result = self
                .push_favorites(api.as_ref(), collection.id, &merged)
                .await
                .ok_or_else(|| {
                    SyncError::Failed("Failed to update favorites collection".to_string())
                })?;

            if !merged.is_empty() {
                self.store.set_favorites_by_romm_ids(&merged)?;
            }
            if let Some(updated_at) = Self::parse_timestamp(result.updated_at.as_deref()) {
                self.store
                    .state_set_timestamp(keys::LAST_FAVORITES_SYNC, updated_at)?;
            }
            self.store
                .state_set_timestamp(keys::LAST_FAVORITES_CHECK, Utc::now())?;
            return Ok(());
        }

        // Remote is authoritative after the baseline exists
        let remote_list: Vec<i64> = remote_ids.iter().copied().collect();
        if !remote_list.is_empty() {
            self.store.set_favorites_by_romm_ids(&remote_list)?;
        }
        self.store.clear_favorites_not_in(&remote_list)?;

        if let Some(updated_at) = Self::parse_timestamp(collection.updated_at.as_deref()) {
            self.store
                .state_set_timestamp(keys::LAST_FAVORITES_SYNC, updated_at)?;
        }
        self.store
            .state_set_timestamp(keys::LAST_FAVORITES_CHECK, Utc::now())?;

        Ok(())
    }

    /// Flip the local flag immediately and push the change out-of-band;
    /// the caller never waits on the network.
    pub async fn toggle_favorite_with_sync(
        &self,
        game_id: i64,
        romm_id: i64,
        is_favorite: bool,
    ) -> Result<(), SyncError> {
        self.store.set_favorite(game_id, is_favorite)?;

        let this = self.clone();
        tokio::spawn(async move {
            if !this.push_favorite(romm_id, is_favorite).await {
                tracing::warn!(
                    "favorite push failed for remote id {romm_id} (favorite={is_favorite})"
                );
            }
        });

        Ok(())
    }

    /// Push a single favorite change by rewriting the remote membership set
    pub async fn push_favorite(&self, romm_id: i64, is_favorite: bool) -> bool {
        let Ok(api) = self.api() else {
            return false;
        };
        let Some(collection) = self.get_or_create_favorites(api.as_ref()).await else {
            return false;
        };

        let mut ids: HashSet<i64> = collection.rom_ids.iter().copied().collect();
        if is_favorite {
            ids.insert(romm_id);
        } else {
            ids.remove(&romm_id);
        }
        let ids: Vec<i64> = ids.into_iter().collect();

        match self.push_favorites(api.as_ref(), collection.id, &ids).await {
            Some(result) => {
                if let Some(updated_at) = Self::parse_timestamp(result.updated_at.as_deref()) {
                    let _ = self
                        .store
                        .state_set_timestamp(keys::LAST_FAVORITES_SYNC, updated_at);
                }
                true
            }
            None => false,
        }
    }

    /// Debounced favorites refresh: skips entirely when checked within the
    /// last 30 seconds, and no-ops when the remote collection is not newer
    /// than the local baseline.
    pub async fn refresh_favorites_if_needed(&self) -> Result<(), SyncError> {
        let api = self.api()?;

        if let Some(last_check) = self.store.state_timestamp(keys::LAST_FAVORITES_CHECK)? {
            let elapsed = Utc::now() - last_check;
            if elapsed < Duration::seconds(FAVORITES_CHECK_DEBOUNCE_SECONDS) {
                return Ok(());
            }
        }

        let collection = self
            .get_or_create_favorites(api.as_ref())
            .await
            .ok_or_else(|| SyncError::Failed("Failed to get favorites collection".to_string()))?;

        let remote_updated_at = Self::parse_timestamp(collection.updated_at.as_deref());
        let last_sync = self.store.state_timestamp(keys::LAST_FAVORITES_SYNC)?;

        self.store
            .state_set_timestamp(keys::LAST_FAVORITES_CHECK, Utc::now())?;

        let (Some(last_sync), Some(remote_updated_at)) = (last_sync, remote_updated_at) else {
            tracing::info!("no favorites baseline to compare, running full sync");
            return self.sync_favorites().await;
        };

        if remote_updated_at <= last_sync {
            return Ok(());
        }

        tracing::info!("remote favorites are newer, applying changes");
        let remote_ids = collection.rom_ids;

        if !remote_ids.is_empty() {
            self.store.set_favorites_by_romm_ids(&remote_ids)?;
        }
        self.store.clear_favorites_not_in(&remote_ids)?;

        self.store
            .state_set_timestamp(keys::LAST_FAVORITES_SYNC, remote_updated_at)?;
        Ok(())
    }

    /// Two-way named-collection sync: push local-only user collections,
    /// pull the remote list, reconcile membership by delta, and drop local
    /// rows whose remote counterpart vanished.
    pub async fn sync_collections(&self) -> Result<(), SyncError> {
        let api = self.api()?;

        let local_collections = self.store.all_collections()?;
        tracing::info!("syncing {} local collections", local_collections.len());

        for local in &local_collections {
            if local.romm_id.is_none()
                && local.is_user_created
                && !local.name.eq_ignore_ascii_case(FAVORITES_COLLECTION_NAME)
            {
                self.push_local_collection(api.as_ref(), local).await;
            }
        }

        let remote_collections = match api.collections(Some(false)).await {
            Ok(collections) => collections,
            Err(err) => {
                return Err(SyncError::Failed(format!(
                    "Failed to fetch collections: {err}"
                )));
            }
        };
        tracing::info!("received {} remote collections", remote_collections.len());

        let updated_local = self.store.all_collections()?;
        let remote_ids: HashSet<i64> = remote_collections.iter().map(|c| c.id).collect();

        for remote in &remote_collections {
            let existing = updated_local
                .iter()
                .find(|c| c.romm_id == Some(remote.id));

            if let Some(existing) = existing {
                let mut row = existing.clone();
                row.name = remote.name.clone();
                row.description = remote.description.clone();
                row.updated_at = Utc::now();
                self.store.update_collection(&row)?;
            } else {
                self.store.insert_collection(&CollectionRow {
                    id: 0,
                    romm_id: Some(remote.id),
                    name: remote.name.clone(),
                    description: remote.description.clone(),
                    is_user_created: false,
                    updated_at: Utc::now(),
                })?;
            }

            let Some(collection) = self.store.collection_by_romm_id(remote.id)? else {
                continue;
            };
            self.sync_collection_games(collection.id, &remote.rom_ids)?;
        }

        // Remote-side deletion propagates
        for local in &updated_local {
            if let Some(romm_id) = local.romm_id
                && !remote_ids.contains(&romm_id)
            {
                self.store.delete_collection(local.id)?;
            }
        }

        Ok(())
    }

    async fn push_local_collection(&self, api: &dyn CatalogApi, local: &CollectionRow) {
        let create = CollectionCreate {
            name: local.name.clone(),
            description: local.description.clone(),
        };
        match api.create_collection(false, &create).await {
            Ok(remote) => {
                let mut row = local.clone();
                row.romm_id = Some(remote.id);
                if let Err(err) = self.store.update_collection(&row) {
                    tracing::warn!("failed to link collection '{}': {err}", local.name);
                    return;
                }

                match self.store.romm_ids_in_collection(local.id) {
                    Ok(romm_ids) if !romm_ids.is_empty() => {
                        if let Err(err) =
                            api.update_collection_roms(remote.id, &romm_ids).await
                        {
                            tracing::warn!(
                                "failed to push membership for '{}': {err}",
                                local.name
                            );
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::warn!("failed to read membership for '{}': {err}", local.name)
                    }
                }
                tracing::info!("pushed local collection '{}' to remote", local.name);
            }
            Err(err) => {
                tracing::warn!("failed to push local collection '{}': {err}", local.name);
            }
        }
    }

    /// Apply only the membership deltas between the local join rows and the
    /// remote id list
    fn sync_collection_games(
        &self,
        collection_id: i64,
        remote_rom_ids: &[i64],
    ) -> Result<(), SyncError> {
        let local_ids: HashSet<i64> = self
            .store
            .game_ids_in_collection(collection_id)?
            .into_iter()
            .collect();
        let remote_game_ids: HashSet<i64> = self
            .store
            .game_ids_for_romm_ids(remote_rom_ids)?
            .into_iter()
            .collect();

        for game_id in remote_game_ids.difference(&local_ids) {
            self.store.add_game_to_collection(collection_id, *game_id)?;
        }
        for game_id in local_ids.difference(&remote_game_ids) {
            self.store
                .remove_game_from_collection(collection_id, *game_id)?;
        }
        Ok(())
    }

    /// Create a collection locally and best-effort mirror it remotely
    pub async fn create_collection_with_sync(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<i64, SyncError> {
        let local_id = self.store.insert_collection(&CollectionRow {
            id: 0,
            romm_id: None,
            name: name.to_string(),
            description: description.map(str::to_string),
            is_user_created: true,
            updated_at: Utc::now(),
        })?;

        let Ok(api) = self.api() else {
            return Ok(local_id);
        };

        let create = CollectionCreate {
            name: name.to_string(),
            description: description.map(str::to_string),
        };
        match api.create_collection(false, &create).await {
            Ok(remote) => {
                if let Some(mut row) = self.store.collection_by_id(local_id)? {
                    row.romm_id = Some(remote.id);
                    self.store.update_collection(&row)?;
                }
            }
            Err(err) => {
                tracing::info!("remote collection create failed: {err}");
            }
        }
        Ok(local_id)
    }

    /// Rename/update a collection locally and best-effort push its
    /// membership remotely
    pub async fn update_collection_with_sync(
        &self,
        collection_id: i64,
        name: &str,
        description: Option<&str>,
    ) -> Result<(), SyncError> {
        let collection = self
            .store
            .collection_by_id(collection_id)?
            .ok_or_else(|| SyncError::Failed("Collection not found".to_string()))?;

        let mut row = collection.clone();
        row.name = name.to_string();
        row.description = description.map(str::to_string);
        row.updated_at = Utc::now();
        self.store.update_collection(&row)?;

        self.push_membership(collection.romm_id, collection_id).await;
        Ok(())
    }

    /// Delete a collection locally and best-effort delete it remotely
    pub async fn delete_collection_with_sync(&self, collection_id: i64) -> Result<(), SyncError> {
        let collection = self
            .store
            .collection_by_id(collection_id)?
            .ok_or_else(|| SyncError::Failed("Collection not found".to_string()))?;

        self.store.delete_collection(collection_id)?;

        let (Ok(api), Some(romm_id)) = (self.api(), collection.romm_id) else {
            return Ok(());
        };
        if let Err(err) = api.delete_collection(romm_id).await {
            tracing::info!("remote collection delete failed: {err}");
        }
        Ok(())
    }

    pub async fn add_game_to_collection_with_sync(
        &self,
        game_id: i64,
        collection_id: i64,
    ) -> Result<(), SyncError> {
        self.store.add_game_to_collection(collection_id, game_id)?;

        let romm_id = self
            .store
            .collection_by_id(collection_id)?
            .and_then(|c| c.romm_id);
        self.push_membership(romm_id, collection_id).await;
        Ok(())
    }

    pub async fn remove_game_from_collection_with_sync(
        &self,
        game_id: i64,
        collection_id: i64,
    ) -> Result<(), SyncError> {
        self.store
            .remove_game_from_collection(collection_id, game_id)?;

        let romm_id = self
            .store
            .collection_by_id(collection_id)?
            .and_then(|c| c.romm_id);
        self.push_membership(romm_id, collection_id).await;
        Ok(())
    }

    async fn push_membership(&self, romm_id: Option<i64>, collection_id: i64) {
        let (Ok(api), Some(romm_id)) = (self.api(), romm_id) else {
            return;
        };
        match self.store.romm_ids_in_collection(collection_id) {
            Ok(romm_ids) => {
                if let Err(err) = api.update_collection_roms(romm_id, &romm_ids).await {
                    tracing::info!("remote membership push failed: {err}");
                }
            }
            Err(err) => tracing::warn!("failed to read collection membership: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CollectionSyncEngine;
    use chrono::{DateTime, Utc};

    #[test]
    fn test_parse_timestamp() {
        let parsed = CollectionSyncEngine::parse_timestamp(Some("2024-06-01T12:00:00+02:00"));
        let expected: DateTime<Utc> = DateTime::parse_from_rfc3339("2024-06-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(parsed, Some(expected));

        assert_eq!(CollectionSyncEngine::parse_timestamp(None), None);
        assert_eq!(CollectionSyncEngine::parse_timestamp(Some("")), None);
        assert_eq!(CollectionSyncEngine::parse_timestamp(Some("yesterday")), None);
    }
}
