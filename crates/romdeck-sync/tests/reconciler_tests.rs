//! Reconciliation behavior against a scripted in-memory server

use async_trait::async_trait;
use chrono::Utc;
use romdeck_config::SyncFilterConfig;
use romdeck_remote::{
    ApiProvider, CatalogApi, CollectionCreate, EarnedAchievement, RemoteCollection, RemoteError,
    RemotePlatform, RemoteRaAchievement, RemoteRaGameProgression, RemoteRaMetadata,
    RemoteRaProgression, RemoteRom, RemoteRomPage, RemoteSibling, RemoteUser, UserPropsUpdate,
};
use romdeck_store::{keys, CatalogStore, GameDiscRow, GameRow, GameSource};
use romdeck_sync::{
    AchievementCache, CollectionSyncEngine, FileOps, LibraryReconciler, NoHooks, SyncError,
    SyncReport,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ---- scripted server ----

#[derive(Default)]
struct FakeApi {
    platforms: Vec<RemotePlatform>,
    roms_by_platform: HashMap<i64, Vec<RemoteRom>>,
    fail_rom_fetch: HashSet<i64>,
    platforms_delay_ms: u64,
    user: Option<RemoteUser>,
    remote_collections: Mutex<Vec<RemoteCollection>>,
    pushed_memberships: Mutex<HashMap<i64, Vec<i64>>>,
    next_collection_id: AtomicI64,
    collections_calls: AtomicUsize,
}

impl FakeApi {
    fn pushed(&self, collection_id: i64) -> Option<Vec<i64>> {
        self.pushed_memberships
            .lock()
            .unwrap()
            .get(&collection_id)
            .cloned()
    }
}

#[async_trait]
impl CatalogApi for FakeApi {
    fn media_url(&self, path: &str) -> String {
        path.to_string()
    }

    async fn platforms(&self) -> Result<Vec<RemotePlatform>, RemoteError> {
        if self.platforms_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.platforms_delay_ms)).await;
        }
        Ok(self.platforms.clone())
    }

    async fn platform(&self, platform_id: i64) -> Result<RemotePlatform, RemoteError> {
        self.platforms
            .iter()
            .find(|p| p.id == platform_id)
            .cloned()
            .ok_or(RemoteError::Status { code: 404 })
    }

    async fn roms_page(
        &self,
        platform_id: i64,
        limit: u32,
        offset: u32,
    ) -> Result<RemoteRomPage, RemoteError> {
        let roms = self
            .roms_by_platform
            .get(&platform_id)
            .cloned()
            .unwrap_or_default();
        let total = roms.len() as i64;
        let items = roms
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok(RemoteRomPage {
            items,
            total,
            ..Default::default()
        })
    }

    async fn rom(&self, rom_id: i64) -> Result<RemoteRom, RemoteError> {
        if self.fail_rom_fetch.contains(&rom_id) {
            return Err(RemoteError::Status { code: 500 });
        }
        self.roms_by_platform
            .values()
            .flatten()
            .find(|r| r.id == rom_id)
            .cloned()
            .ok_or(RemoteError::Status { code: 404 })
    }

    async fn current_user(&self) -> Result<RemoteUser, RemoteError> {
        self.user.clone().ok_or(RemoteError::Status { code: 401 })
    }

    async fn refresh_ra_progression(&self, _user_id: i64) -> Result<(), RemoteError> {
        Ok(())
    }

    async fn update_rom_user_props(
        &self,
        _rom_id: i64,
        _props: &UserPropsUpdate,
    ) -> Result<(), RemoteError> {
        Ok(())
    }

    async fn collections(
        &self,
        is_favorite: Option<bool>,
    ) -> Result<Vec<RemoteCollection>, RemoteError> {
        self.collections_calls.fetch_add(1, Ordering::SeqCst);
        let collections = self.remote_collections.lock().unwrap();
        Ok(collections
            .iter()
            .filter(|c| is_favorite.is_none_or(|flag| c.is_favorite == flag))
            .cloned()
            .collect())
    }

    async fn create_collection(
        &self,
        is_favorite: bool,
        collection: &CollectionCreate,
    ) -> Result<RemoteCollection, RemoteError> {
        let id = 1000 + self.next_collection_id.fetch_add(1, Ordering::SeqCst);
        let created = RemoteCollection {
            id,
            name: collection.name.clone(),
            description: collection.description.clone(),
            rom_ids: Vec::new(),
            is_favorite,
            updated_at: Some("2024-06-01T00:00:00Z".to_string()),
        };
        self.remote_collections.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn update_collection_roms(
        &self,
        collection_id: i64,
        rom_ids: &[i64],
    ) -> Result<RemoteCollection, RemoteError> {
        self.pushed_memberships
            .lock()
            .unwrap()
            .insert(collection_id, rom_ids.to_vec());

        let mut collections = self.remote_collections.lock().unwrap();
        let collection = collections
            .iter_mut()
            .find(|c| c.id == collection_id)
            .ok_or(RemoteError::Status { code: 404 })?;
        collection.rom_ids = rom_ids.to_vec();
        collection.updated_at = Some("2024-06-01T01:00:00Z".to_string());
        Ok(collection.clone())
    }

    async fn delete_collection(&self, collection_id: i64) -> Result<(), RemoteError> {
        self.remote_collections
            .lock()
            .unwrap()
            .retain(|c| c.id != collection_id);
        Ok(())
    }
}

struct FakeProvider(Arc<FakeApi>);

impl ApiProvider for FakeProvider {
    fn api(&self) -> Option<Arc<dyn CatalogApi>> {
        Some(Arc::clone(&self.0) as Arc<dyn CatalogApi>)
    }
}

struct NoApi;

impl ApiProvider for NoApi {
    fn api(&self) -> Option<Arc<dyn CatalogApi>> {
        None
    }
}

#[derive(Default)]
struct FakeFs {
    files: Mutex<HashSet<String>>,
}

impl FileOps for FakeFs {
    fn exists(&self, path: &str) -> bool {
        self.files.lock().unwrap().contains(path)
    }

    fn remove(&self, path: &str) -> std::io::Result<()> {
        self.files.lock().unwrap().remove(path);
        Ok(())
    }
}

// ---- fixtures ----

fn platform(id: i64, slug: &str, rom_count: i64) -> RemotePlatform {
    RemotePlatform {
        id,
        slug: slug.to_string(),
        name: slug.to_uppercase(),
        fs_slug: Some(slug.to_string()),
        rom_count,
        ..Default::default()
    }
}

fn rom(id: i64, platform_id: i64, slug: &str, name: &str) -> RemoteRom {
    RemoteRom {
        id,
        platform_id,
        platform_slug: slug.to_string(),
        name: name.to_string(),
        ..Default::default()
    }
}

fn with_ra(mut entry: RemoteRom, ra_id: i64) -> RemoteRom {
    entry.ra_id = Some(ra_id);
    entry.ra_metadata = Some(RemoteRaMetadata {
        achievements: Some(vec![RemoteRaAchievement {
            ra_id: Some(ra_id),
            badge_id: Some("badge-1".to_string()),
            title: Some("First Step".to_string()),
        }]),
    });
    entry
}

fn sibling(id: i64, name: &str) -> RemoteSibling {
    RemoteSibling {
        id,
        name: Some(name.to_string()),
        fs_name: Some(format!("{}.bin", name.to_lowercase())),
    }
}

struct Harness {
    api: Arc<FakeApi>,
    store: Arc<CatalogStore>,
    fs: Arc<FakeFs>,
    reconciler: Arc<LibraryReconciler>,
}

fn harness(api: FakeApi, filters: SyncFilterConfig) -> Harness {
    let api = Arc::new(api);
    let store = Arc::new(CatalogStore::in_memory().unwrap());
    let fs = Arc::new(FakeFs::default());
    let reconciler = Arc::new(LibraryReconciler::new(
        Arc::new(FakeProvider(Arc::clone(&api))),
        Arc::clone(&store),
        Arc::new(NoHooks),
        Arc::clone(&fs) as Arc<dyn FileOps>,
        filters,
    ));
    Harness {
        api,
        store,
        fs,
        reconciler,
    }
}

fn seed_game(store: &CatalogStore, platform_id: i64, slug: &str, romm_id: i64, title: &str) -> i64 {
    let mut game = GameRow::new(platform_id, slug, title);
    game.romm_id = Some(romm_id);
    store.insert_game(&game).unwrap()
}

// ---- library sync ----

#[tokio::test]
async fn full_sync_populates_catalog() {
    let mut api = FakeApi::default();
    api.platforms = vec![platform(1, "psx", 2)];
    api.roms_by_platform.insert(
        1,
        vec![
            rom(10, 1, "psx", "Vagrant Story"),
            rom(11, 1, "psx", "Wipeout 3"),
        ],
    );

    let h = harness(api, SyncFilterConfig::default());
    let report = h.reconciler.sync_library().await.unwrap();

    assert!(report.is_clean(), "errors: {:?}", report.errors);
    assert_eq!(report.platforms_synced, 1);
    assert_eq!(report.games_added, 2);
    assert_eq!(report.games_updated, 0);

    let game = h.store.game_by_romm_id(10).unwrap().unwrap();
    assert_eq!(game.title, "Vagrant Story");
    assert_eq!(game.source, GameSource::Remote);
    assert_eq!(game.sort_title, "vagrant story");

    let platform_row = h.store.platform_by_id(1).unwrap().unwrap();
    assert_eq!(platform_row.game_count, 2);
    assert!(h
        .store
        .state_timestamp(keys::LAST_LIBRARY_SYNC)
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn second_sync_produces_zero_net_deltas() {
    let mut api = FakeApi::default();
    api.platforms = vec![platform(1, "psx", 2)];
    api.roms_by_platform.insert(
        1,
        vec![
            rom(10, 1, "psx", "Vagrant Story"),
            rom(11, 1, "psx", "Wipeout 3"),
        ],
    );

    let mut filters = SyncFilterConfig::default();
    filters.delete_orphans = true;

    let h = harness(api, filters);
    h.reconciler.sync_library().await.unwrap();
    let ids_after_first: Vec<i64> = h
        .store
        .all_games()
        .unwrap()
        .iter()
        .map(|g| g.id)
        .collect();

    let second = h.reconciler.sync_library().await.unwrap();
    assert!(second.is_clean());
    assert_eq!(second.games_added, 0);
    assert_eq!(second.games_deleted, 0);
    assert_eq!(second.games_updated, 2);

    let ids_after_second: Vec<i64> = h
        .store
        .all_games()
        .unwrap()
        .iter()
        .map(|g| g.id)
        .collect();
    assert_eq!(ids_after_first, ids_after_second);
}

#[tokio::test]
async fn dedup_keeps_achievement_rich_entry() {
    let mut api = FakeApi::default();
    api.platforms = vec![platform(1, "psx", 2)];
    let mut plain = rom(10, 1, "psx", "Vagrant Story (Europe)");
    plain.igdb_id = Some(427);
    let mut rich = with_ra(rom(20, 1, "psx", "Vagrant Story (USA)"), 9);
    rich.igdb_id = Some(427);
    api.roms_by_platform.insert(1, vec![plain, rich]);

    let h = harness(api, SyncFilterConfig::default());
    let report = h.reconciler.sync_library().await.unwrap();
    assert!(report.is_clean(), "errors: {:?}", report.errors);

    let games = h.store.all_games().unwrap();
    assert_eq!(games.len(), 1);
    assert_eq!(games[0].romm_id, Some(20));
    assert_eq!(games[0].title, "Vagrant Story (USA)");
    assert!(games[0].achievement_count > 0);
}

#[tokio::test]
async fn migration_carries_user_data_to_new_remote_id() {
    let mut api = FakeApi::default();
    api.platforms = vec![platform(1, "psx", 1)];
    let mut renumbered = rom(200, 1, "psx", "Vagrant Story");
    renumbered.igdb_id = Some(427);
    api.roms_by_platform.insert(1, vec![renumbered]);

    let h = harness(api, SyncFilterConfig::default());

    let mut old = GameRow::new(1, "psx", "Vagrant Story");
    old.romm_id = Some(100);
    old.igdb_id = Some(427);
    old.user_rating = 7;
    old.play_count = 3;
    h.store.insert_game(&old).unwrap();

    let report = h.reconciler.sync_library().await.unwrap();
    assert!(report.is_clean(), "errors: {:?}", report.errors);

    assert!(h.store.game_by_romm_id(100).unwrap().is_none());
    let migrated = h.store.game_by_romm_id(200).unwrap().unwrap();
    assert_eq!(migrated.user_rating, 7);
    assert_eq!(migrated.play_count, 3);
    assert_eq!(h.store.all_games().unwrap().len(), 1);
}

#[tokio::test]
async fn sibling_multi_disc_consolidates_to_one_game() {
    let mut api = FakeApi::default();
    api.platforms = vec![platform(1, "psx", 3)];

    let names = [
        "Final Fantasy VIII (Disc 1)",
        "Final Fantasy VIII (Disc 2)",
        "Final Fantasy VIII (Disc 3)",
    ];
    let ids = [10i64, 11, 12];
    let mut roms = Vec::new();
    for (index, id) in ids.iter().enumerate() {
        let mut entry = rom(*id, 1, "psx", names[index]);
        entry.fs_name = Some(format!("ff8_disc{}.bin", index + 1));
        entry.siblings = Some(
            ids.iter()
                .enumerate()
                .filter(|(i, _)| *i != index)
                .map(|(i, other)| sibling(*other, names[i]))
                .collect(),
        );
        roms.push(entry);
    }
    api.roms_by_platform.insert(1, roms);
    // Non-primary disc data is unavailable this pass
    api.fail_rom_fetch = HashSet::from([11, 12]);

    let h = harness(api, SyncFilterConfig::default());

    // Discs 2 and 3 were known from an earlier pass
    let placeholder = seed_game(&h.store, 1, "psx", 999, "placeholder");
    h.store
        .upsert_discs(&[
            GameDiscRow {
                id: 0,
                game_id: placeholder,
                romm_id: 11,
                disc_number: 2,
                file_name: "ff8_disc2.bin".to_string(),
                local_path: None,
                file_size: 0,
            },
            GameDiscRow {
                id: 0,
                game_id: placeholder,
                romm_id: 12,
                disc_number: 3,
                file_name: "ff8_disc3.bin".to_string(),
                local_path: None,
                file_size: 0,
            },
        ])
        .unwrap();

    let report = h.reconciler.sync_library().await.unwrap();
    assert!(report.is_clean(), "errors: {:?}", report.errors);

    let survivors: Vec<GameRow> = h
        .store
        .all_games()
        .unwrap()
        .into_iter()
        .filter(|g| g.title.starts_with("Final Fantasy"))
        .collect();
    assert_eq!(survivors.len(), 1);
    let survivor = &survivors[0];
    assert!(survivor.is_multi_disc);
    assert_eq!(survivor.romm_id, Some(10));

    let discs = h.store.discs_for_game(survivor.id).unwrap();
    assert_eq!(discs.len(), 3);
    let mut disc_romm_ids: Vec<i64> = discs.iter().map(|d| d.romm_id).collect();
    disc_romm_ids.sort_unstable();
    assert_eq!(disc_romm_ids, vec![10, 11, 12]);
}

#[tokio::test]
async fn unknown_disc_without_local_record_is_omitted() {
    let mut api = FakeApi::default();
    api.platforms = vec![platform(1, "psx", 1)];

    let mut primary = rom(10, 1, "psx", "Riven (Disc 1)");
    primary.fs_name = Some("riven_disc1.bin".to_string());
    primary.siblings = Some(vec![sibling(11, "Riven (Disc 2)")]);
    api.roms_by_platform.insert(1, vec![primary]);
    api.fail_rom_fetch = HashSet::from([11]);

    let h = harness(api, SyncFilterConfig::default());
    h.reconciler.sync_library().await.unwrap();

    let survivor = h.store.game_by_romm_id(10).unwrap().unwrap();
    let discs = h.store.discs_for_game(survivor.id).unwrap();
    // Disc 1 fetches fine; disc 2 has no data and no prior record
    assert_eq!(discs.len(), 1);
    assert_eq!(discs[0].romm_id, 10);
}

#[tokio::test]
async fn folder_multi_disc_wins_over_loose_discs() {
    let mut api = FakeApi::default();
    api.platforms = vec![platform(1, "psx", 3)];

    let mut folder = rom(20, 1, "psx", "Metal Gear Solid");
    folder.multi = true;
    folder.siblings = Some(vec![
        sibling(21, "Metal Gear Solid (Disc 1)"),
        sibling(22, "Metal Gear Solid (Disc 2)"),
    ]);
    let mut disc1 = rom(21, 1, "psx", "Metal Gear Solid (Disc 1)");
    disc1.fs_name = Some("mgs_disc1.bin".to_string());
    let mut disc2 = rom(22, 1, "psx", "Metal Gear Solid (Disc 2)");
    disc2.fs_name = Some("mgs_disc2.bin".to_string());
    api.roms_by_platform.insert(1, vec![folder, disc1, disc2]);

    let h = harness(api, SyncFilterConfig::default());
    // A loose disc synced in an earlier pass
    seed_game(&h.store, 1, "psx", 21, "Metal Gear Solid (Disc 1)");

    let report = h.reconciler.sync_library().await.unwrap();
    assert!(report.is_clean(), "errors: {:?}", report.errors);

    assert!(h.store.game_by_romm_id(20).unwrap().is_some());
    assert!(h.store.game_by_romm_id(21).unwrap().is_none());
    assert!(h.store.game_by_romm_id(22).unwrap().is_none());
}

#[tokio::test]
async fn orphan_sweep_skips_disabled_platforms() {
    let mut api = FakeApi::default();
    api.platforms = vec![platform(1, "psx", 0), platform(2, "gba", 0)];
    api.roms_by_platform.insert(1, Vec::new());
    api.roms_by_platform.insert(2, Vec::new());

    let mut filters = SyncFilterConfig::default();
    filters.delete_orphans = true;
    let h = harness(api, filters);

    // Seed platform rows so the frozen flag survives the metadata upsert
    h.reconciler.sync_platforms_only().await.unwrap();
    let mut frozen = h.store.platform_by_id(2).unwrap().unwrap();
    frozen.sync_enabled = false;
    h.store.upsert_platform(&frozen).unwrap();

    seed_game(&h.store, 1, "psx", 100, "Stale PSX Game");
    seed_game(&h.store, 2, "gba", 200, "Frozen GBA Game");

    let report = h.reconciler.sync_library().await.unwrap();
    assert!(report.is_clean(), "errors: {:?}", report.errors);

    assert!(h.store.game_by_romm_id(100).unwrap().is_none());
    assert!(
        h.store.game_by_romm_id(200).unwrap().is_some(),
        "disabled platforms are frozen, not purged"
    );
    assert_eq!(report.games_deleted, 1);
}

#[tokio::test]
async fn orphaned_synced_game_file_is_deleted() {
    let mut api = FakeApi::default();
    api.platforms = vec![platform(1, "psx", 0)];
    api.roms_by_platform.insert(1, Vec::new());

    let mut filters = SyncFilterConfig::default();
    filters.delete_orphans = true;
    let h = harness(api, filters);

    let mut downloaded = GameRow::new(1, "psx", "Gone Game");
    downloaded.romm_id = Some(300);
    downloaded.local_path = Some("/roms/psx/gone.chd".to_string());
    downloaded.source = GameSource::Synced;
    h.store.insert_game(&downloaded).unwrap();
    h.fs.files
        .lock()
        .unwrap()
        .insert("/roms/psx/gone.chd".to_string());

    h.reconciler.sync_library().await.unwrap();

    assert!(h.store.game_by_romm_id(300).unwrap().is_none());
    assert!(!h.fs.exists("/roms/psx/gone.chd"));
}

#[tokio::test]
async fn concurrent_sync_is_rejected_immediately() {
    let mut api = FakeApi::default();
    api.platforms = vec![platform(1, "psx", 0)];
    api.roms_by_platform.insert(1, Vec::new());
    api.platforms_delay_ms = 300;

    let h = harness(api, SyncFilterConfig::default());

    let first = {
        let reconciler = Arc::clone(&h.reconciler);
        tokio::spawn(async move { reconciler.sync_library().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = h.reconciler.sync_library().await.unwrap();
    assert_eq!(second, SyncReport::already_running());

    let first = first.await.unwrap().unwrap();
    assert!(first.is_clean(), "errors: {:?}", first.errors);
}

#[tokio::test]
async fn sync_without_connection_is_a_hard_error() {
    let store = Arc::new(CatalogStore::in_memory().unwrap());
    let reconciler = Arc::new(LibraryReconciler::new(
        Arc::new(NoApi),
        store,
        Arc::new(NoHooks),
        Arc::new(FakeFs::default()) as Arc<dyn FileOps>,
        SyncFilterConfig::default(),
    ));

    assert!(matches!(
        reconciler.sync_library().await,
        Err(SyncError::NotConnected)
    ));
}

#[tokio::test]
async fn legacy_platform_games_are_repointed() {
    let mut api = FakeApi::default();
    api.platforms = vec![platform(7, "psx", 0)];
    api.roms_by_platform.insert(7, Vec::new());

    let h = harness(api, SyncFilterConfig::default());

    // A platform row from before the server renumbered its ids
    let mut legacy = platform_row_for_tests(99, "psx");
    legacy.fs_slug = Some("psx".to_string());
    h.store.upsert_platform(&legacy).unwrap();
    seed_game(&h.store, 99, "psx", 500, "Old Row Game");

    h.reconciler.sync_library().await.unwrap();

    assert!(h.store.platform_by_id(99).unwrap().is_none());
    let migrated = h.store.game_by_romm_id(500).unwrap();
    // delete_orphans is off, so the row persists under the new platform id
    assert_eq!(migrated.unwrap().platform_id, 7);
}

fn platform_row_for_tests(id: i64, slug: &str) -> romdeck_store::PlatformRow {
    romdeck_store::PlatformRow {
        id,
        slug: slug.to_string(),
        fs_slug: None,
        name: slug.to_uppercase(),
        short_name: slug.to_uppercase(),
        rom_extensions: String::new(),
        game_count: 0,
        is_visible: true,
        logo_path: None,
        sort_order: 999,
        sync_enabled: true,
        custom_rom_path: None,
        last_scanned: None,
    }
}

#[tokio::test]
async fn sync_platforms_only_skips_rom_paging() {
    let mut api = FakeApi::default();
    api.platforms = vec![platform(1, "psx", 5)];
    api.roms_by_platform
        .insert(1, vec![rom(10, 1, "psx", "Vagrant Story")]);

    let h = harness(api, SyncFilterConfig::default());
    let count = h.reconciler.sync_platforms_only().await.unwrap();

    assert_eq!(count, 1);
    assert!(h.store.platform_by_id(1).unwrap().is_some());
    assert!(h.store.all_games().unwrap().is_empty());
}

// ---- favorites and collections ----

fn collection_engine(h: &Harness) -> Arc<CollectionSyncEngine> {
    Arc::new(CollectionSyncEngine::new(
        Arc::new(FakeProvider(Arc::clone(&h.api))),
        Arc::clone(&h.store),
    ))
}

fn seed_remote_favorites(api: &FakeApi, id: i64, rom_ids: Vec<i64>) {
    api.remote_collections
        .lock()
        .unwrap()
        .push(RemoteCollection {
            id,
            name: "Favorites".to_string(),
            description: None,
            rom_ids,
            is_favorite: true,
            updated_at: Some("2024-06-01T00:00:00Z".to_string()),
        });
}

#[tokio::test]
async fn favorites_first_sync_unions_local_and_remote() {
    let api = FakeApi::default();
    seed_remote_favorites(&api, 7, vec![2, 3]);

    let h = harness(api, SyncFilterConfig::default());
    let engine = collection_engine(&h);

    let a = seed_game(&h.store, 1, "psx", 1, "A");
    seed_game(&h.store, 1, "psx", 2, "B");
    seed_game(&h.store, 1, "psx", 3, "C");
    h.store.set_favorite(a, true).unwrap();
    h.store
        .set_favorites_by_romm_ids(&[2])
        .unwrap();

    engine.sync_favorites().await.unwrap();

    let mut pushed = h.api.pushed(7).expect("favorites pushed to remote");
    pushed.sort_unstable();
    assert_eq!(pushed, vec![1, 2, 3]);

    let mut local: Vec<i64> = h.store.favorite_romm_ids().unwrap();
    local.sort_unstable();
    assert_eq!(local, vec![1, 2, 3]);

    assert!(h
        .store
        .state_timestamp(keys::LAST_FAVORITES_SYNC)
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn favorites_steady_state_remote_is_authoritative() {
    let api = FakeApi::default();
    seed_remote_favorites(&api, 7, vec![2]);

    let h = harness(api, SyncFilterConfig::default());
    let engine = collection_engine(&h);

    seed_game(&h.store, 1, "psx", 1, "A");
    seed_game(&h.store, 1, "psx", 2, "B");
    h.store.set_favorites_by_romm_ids(&[1, 2]).unwrap();
    // Prior baseline exists, so this is not a first sync
    h.store
        .state_set_timestamp(
            keys::LAST_FAVORITES_SYNC,
            Utc::now() - chrono::Duration::days(1),
        )
        .unwrap();

    engine.sync_favorites().await.unwrap();

    assert_eq!(h.store.favorite_romm_ids().unwrap(), vec![2]);
    assert!(h.api.pushed(7).is_none(), "steady state never pushes");
}

#[tokio::test]
async fn favorites_refresh_debounces_within_window() {
    let api = FakeApi::default();
    seed_remote_favorites(&api, 7, vec![1]);

    let h = harness(api, SyncFilterConfig::default());
    let engine = collection_engine(&h);

    h.store
        .state_set_timestamp(keys::LAST_FAVORITES_CHECK, Utc::now())
        .unwrap();

    engine.refresh_favorites_if_needed().await.unwrap();
    assert_eq!(
        h.api.collections_calls.load(Ordering::SeqCst),
        0,
        "debounced refresh makes no network calls"
    );
}

#[tokio::test]
async fn favorites_refresh_noops_when_remote_not_newer() {
    let api = FakeApi::default();
    seed_remote_favorites(&api, 7, vec![1]);

    let h = harness(api, SyncFilterConfig::default());
    let engine = collection_engine(&h);

    seed_game(&h.store, 1, "psx", 1, "A");
    seed_game(&h.store, 1, "psx", 5, "Local Favorite");
    h.store.set_favorites_by_romm_ids(&[5]).unwrap();

    // Baseline after the remote's updated_at: nothing to apply
    h.store
        .state_set_timestamp(
            keys::LAST_FAVORITES_SYNC,
            parse_ts("2024-06-02T00:00:00Z"),
        )
        .unwrap();
    h.store
        .state_set_timestamp(
            keys::LAST_FAVORITES_CHECK,
            Utc::now() - chrono::Duration::minutes(5),
        )
        .unwrap();

    engine.refresh_favorites_if_needed().await.unwrap();
    assert_eq!(h.store.favorite_romm_ids().unwrap(), vec![5]);
}

#[tokio::test]
async fn favorites_refresh_applies_newer_remote() {
    let api = FakeApi::default();
    seed_remote_favorites(&api, 7, vec![2]);

    let h = harness(api, SyncFilterConfig::default());
    let engine = collection_engine(&h);

    seed_game(&h.store, 1, "psx", 1, "A");
    seed_game(&h.store, 1, "psx", 2, "B");
    h.store.set_favorites_by_romm_ids(&[1]).unwrap();

    h.store
        .state_set_timestamp(
            keys::LAST_FAVORITES_SYNC,
            parse_ts("2024-05-01T00:00:00Z"),
        )
        .unwrap();
    h.store
        .state_set_timestamp(
            keys::LAST_FAVORITES_CHECK,
            Utc::now() - chrono::Duration::minutes(5),
        )
        .unwrap();

    engine.refresh_favorites_if_needed().await.unwrap();
    assert_eq!(h.store.favorite_romm_ids().unwrap(), vec![2]);
}

fn parse_ts(text: &str) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(text)
        .unwrap()
        .with_timezone(&Utc)
}

#[tokio::test]
async fn collections_sync_two_way() {
    let api = FakeApi::default();
    api.remote_collections
        .lock()
        .unwrap()
        .push(RemoteCollection {
            id: 50,
            name: "RPGs".to_string(),
            description: Some("Role playing".to_string()),
            rom_ids: vec![1],
            is_favorite: false,
            updated_at: Some("2024-06-01T00:00:00Z".to_string()),
        });

    let h = harness(api, SyncFilterConfig::default());
    let engine = collection_engine(&h);

    let game_a = seed_game(&h.store, 1, "psx", 1, "A");
    let game_b = seed_game(&h.store, 1, "psx", 2, "B");

    // A local-only user collection to push up
    let local_id = h
        .store
        .insert_collection(&romdeck_store::CollectionRow {
            id: 0,
            romm_id: None,
            name: "Shooters".to_string(),
            description: None,
            is_user_created: true,
            updated_at: Utc::now(),
        })
        .unwrap();
    h.store.add_game_to_collection(local_id, game_b).unwrap();

    // A local collection whose remote counterpart vanished
    h.store
        .insert_collection(&romdeck_store::CollectionRow {
            id: 0,
            romm_id: Some(404),
            name: "Deleted Remotely".to_string(),
            description: None,
            is_user_created: false,
            updated_at: Utc::now(),
        })
        .unwrap();

    engine.sync_collections().await.unwrap();

    // Pulled: RPGs exists locally with delta-reconciled membership
    let rpgs = h.store.collection_by_romm_id(50).unwrap().unwrap();
    assert_eq!(rpgs.name, "RPGs");
    assert_eq!(h.store.game_ids_in_collection(rpgs.id).unwrap(), vec![game_a]);

    // Pushed: the local-only collection now has a remote id and membership
    let shooters = h.store.collection_by_id(local_id).unwrap().unwrap();
    let remote_id = shooters.romm_id.expect("local collection pushed");
    assert_eq!(h.api.pushed(remote_id), Some(vec![2]));

    // Remote-side deletion propagated
    assert!(h.store.collection_by_romm_id(404).unwrap().is_none());
}

#[tokio::test]
async fn collection_membership_delta_removes_extras() {
    let api = FakeApi::default();
    api.remote_collections
        .lock()
        .unwrap()
        .push(RemoteCollection {
            id: 50,
            name: "RPGs".to_string(),
            description: None,
            rom_ids: vec![1],
            is_favorite: false,
            updated_at: None,
        });

    let h = harness(api, SyncFilterConfig::default());
    let engine = collection_engine(&h);

    let game_a = seed_game(&h.store, 1, "psx", 1, "A");
    let game_b = seed_game(&h.store, 1, "psx", 2, "B");

    let local_id = h
        .store
        .insert_collection(&romdeck_store::CollectionRow {
            id: 0,
            romm_id: Some(50),
            name: "RPGs".to_string(),
            description: None,
            is_user_created: false,
            updated_at: Utc::now(),
        })
        .unwrap();
    h.store.add_game_to_collection(local_id, game_a).unwrap();
    h.store.add_game_to_collection(local_id, game_b).unwrap();

    engine.sync_collections().await.unwrap();

    assert_eq!(
        h.store.game_ids_in_collection(local_id).unwrap(),
        vec![game_a],
        "extra membership removed, matching member kept"
    );
}

// ---- achievement progression cache ----

#[tokio::test]
async fn achievement_cache_is_session_scoped() {
    let mut api = FakeApi::default();
    api.user = Some(RemoteUser {
        id: 1,
        username: "player".to_string(),
        enabled: true,
        role: "viewer".to_string(),
        ra_username: Some("player".to_string()),
        ra_progression: Some(RemoteRaProgression {
            results: vec![RemoteRaGameProgression {
                rom_ra_id: Some(900),
                earned_achievements: vec![EarnedAchievement {
                    id: "12".to_string(),
                    date: Some("2024-06-01T00:00:00Z".to_string()),
                    date_hardcore: None,
                }],
            }],
        }),
    });

    let h = harness(api, SyncFilterConfig::default());
    let cache = AchievementCache::new(Arc::new(FakeProvider(Arc::clone(&h.api))));

    // Lookups never fetch on their own
    assert!(cache.earned_badge_ids(900).is_empty());

    cache.refresh_on_startup().await;
    assert_eq!(
        cache.earned_badge_ids(900),
        HashSet::from(["12".to_string()])
    );
    assert!(cache.earned_achievements(901).is_empty());

    // Already refreshed this session: short-circuits to success
    cache.refresh_if_needed().await.unwrap();

    // App resume clears the cache and re-arms the refresh
    cache.on_app_resumed();
    assert!(cache.earned_achievements(900).is_empty());
    cache.refresh_if_needed().await.unwrap();
}
