//! Romdeck command line
//!
//! Wires the catalog store, connection manager, and sync engines together
//! for headless use: connect to a library server, log in, and run library
//! or collection sync passes.

use anyhow::{bail, Context, Result};
use romdeck_config::AppConfig;
use romdeck_remote::{
    ConnectionManager, ConnectionState, CredentialStore, DeviceInfo, RomDownloader,
    SavedConnection, UserPropsUpdate,
};
use romdeck_store::{keys, CatalogStore};
use romdeck_sync::{
    AchievementCache, CollectionSyncEngine, DiskFileOps, LibraryReconciler, NoHooks, SyncReport,
};
use std::sync::Arc;
use tracing::{error, info};

/// Persists server credentials in the catalog's key-value table
struct StoreCredentials(Arc<CatalogStore>);

impl CredentialStore for StoreCredentials {
    fn load(&self) -> SavedConnection {
        let get = |key| self.0.state_get(key).ok().flatten();
        SavedConnection {
            base_url: get(keys::BASE_URL),
            token: get(keys::TOKEN),
            username: get(keys::USERNAME),
            device_id: get(keys::DEVICE_ID),
            device_client_version: get(keys::DEVICE_CLIENT_VERSION),
        }
    }

    fn save_server(&self, base_url: &str, token: Option<&str>) {
        let _ = self.0.state_set(keys::BASE_URL, base_url);
        match token {
            Some(token) => {
                let _ = self.0.state_set(keys::TOKEN, token);
            }
            None => {
                let _ = self.0.state_delete(keys::TOKEN);
            }
        }
    }

    fn save_login(&self, base_url: &str, token: &str, username: &str) {
        let _ = self.0.state_set(keys::BASE_URL, base_url);
        let _ = self.0.state_set(keys::TOKEN, token);
        let _ = self.0.state_set(keys::USERNAME, username);
    }

    fn save_device(&self, device_id: &str, client_version: &str) {
        let _ = self.0.state_set(keys::DEVICE_ID, device_id);
        let _ = self.0.state_set(keys::DEVICE_CLIENT_VERSION, client_version);
    }
}

struct App {
    store: Arc<CatalogStore>,
    connection: Arc<ConnectionManager>,
    reconciler: Arc<LibraryReconciler>,
    collections: Arc<CollectionSyncEngine>,
    achievements: AchievementCache,
}

impl App {
    fn new(config: &AppConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("creating data dir {}", config.data_dir.display()))?;
        let store = Arc::new(
            CatalogStore::open(config.database_path()).context("opening catalog database")?,
        );

        let connection = Arc::new(ConnectionManager::new(
            Arc::new(StoreCredentials(Arc::clone(&store))),
            DeviceInfo {
                name: config.device_name.clone(),
                client_version: env!("CARGO_PKG_VERSION").to_string(),
            },
        ));

        let reconciler = Arc::new(LibraryReconciler::new(
            Arc::clone(&connection) as _,
            Arc::clone(&store),
            Arc::new(NoHooks),
            Arc::new(DiskFileOps),
            config.filters.clone(),
        ));

        let collections = Arc::new(CollectionSyncEngine::new(
            Arc::clone(&connection) as _,
            Arc::clone(&store),
        ));

        let achievements = AchievementCache::new(Arc::clone(&connection) as _);

        Ok(Self {
            store,
            connection,
            reconciler,
            collections,
            achievements,
        })
    }

    async fn require_connection(&self) -> Result<()> {
        self.connection.initialize().await;
        match self.connection.state() {
            ConnectionState::Connected { version } => {
                info!("connected (server {version})");
                Ok(())
            }
            state => bail!("not connected to a library server ({state:?}) - run `romdeck connect <url>` first"),
        }
    }
}

fn print_report(report: &SyncReport) {
    println!(
        "platforms: {}  added: {}  updated: {}  deleted: {}",
        report.platforms_synced, report.games_added, report.games_updated, report.games_deleted
    );
    for error in &report.errors {
        println!("error: {error}");
    }
}

fn usage() -> ! {
    eprintln!(
        "Usage: romdeck <command>\n\n\
         Commands:\n\
           connect <url> [token]     probe and store a server connection\n\
           login <user> <pass>       authenticate and store a token\n\
           sync                      full library sync\n\
           sync-platform <id>        sync one platform\n\
           platforms                 refresh platform metadata only\n\
           collections               sync favorites and collections\n\
           achievements              refresh achievement progression\n\
           download <rom_id>         download a synced game's ROM file\n\
           rate <rom_id> <1-10>      rate a game locally and on the server\n\
           status                    show connection and catalog status"
    );
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load_default().context("loading configuration")?;
    let app = App::new(&config)?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("");

    match command {
        "connect" => {
            let url = args.get(1).map(String::as_str).unwrap_or_else(|| usage());
            let token = args.get(2).map(String::as_str);
            let base_url = app.connection.connect(url, token).await?;
            println!("connected to {base_url}");
        }
        "login" => {
            let (Some(username), Some(password)) = (args.get(1), args.get(2)) else {
                usage();
            };
            app.require_connection().await?;
            app.connection.login(username, password).await?;
            println!("logged in as {username}");
        }
        "sync" => {
            app.require_connection().await?;
            let report = app.reconciler.sync_library().await?;
            print_report(&report);
        }
        "sync-platform" => {
            let platform_id: i64 = args
                .get(1)
                .and_then(|raw| raw.parse().ok())
                .unwrap_or_else(|| usage());
            app.require_connection().await?;
            let report = app.reconciler.sync_platform(platform_id).await?;
            print_report(&report);
        }
        "platforms" => {
            app.require_connection().await?;
            let count = app.reconciler.sync_platforms_only().await?;
            println!("refreshed {count} platforms");
            for platform in app.store.all_platforms()? {
                println!(
                    "  [{}] {} ({} games{})",
                    platform.id,
                    platform.name,
                    platform.game_count,
                    if platform.sync_enabled { "" } else { ", sync disabled" }
                );
            }
        }
        "collections" => {
            app.require_connection().await?;
            if let Err(err) = app.collections.sync_favorites().await {
                error!("favorites sync failed: {err}");
            }
            app.collections.sync_collections().await?;
            println!("collections synced");
        }
        "achievements" => {
            app.require_connection().await?;
            app.achievements.refresh_on_startup().await;
            println!("achievement progression refreshed");
        }
        "download" => {
            let rom_id: i64 = args
                .get(1)
                .and_then(|raw| raw.parse().ok())
                .unwrap_or_else(|| usage());
            app.require_connection().await?;
            let session = app
                .connection
                .session()
                .context("no active session")?;

            let game = app
                .store
                .game_by_romm_id(rom_id)?
                .with_context(|| format!("no synced game with remote id {rom_id}"))?;
            let file_name = game
                .romm_file_name
                .clone()
                .with_context(|| format!("game '{}' has no remote file name", game.title))?;

            let downloader = RomDownloader::new(config.data_dir.join("downloads"), 3);
            let path = downloader
                .download(
                    session.client(),
                    rom_id,
                    &file_name,
                    game.file_size_bytes.unwrap_or(0).max(0) as u64,
                )
                .await?;

            let mut updated = game;
            updated.local_path = Some(path.to_string_lossy().into_owned());
            updated.source = romdeck_store::GameSource::Synced;
            app.store.update_game(&updated)?;
            println!("downloaded to {}", path.display());
        }
        "rate" => {
            let (Some(rom_id), Some(rating)) = (
                args.get(1).and_then(|raw| raw.parse::<i64>().ok()),
                args.get(2).and_then(|raw| raw.parse::<i32>().ok()),
            ) else {
                usage();
            };
            app.require_connection().await?;

            let mut game = app
                .store
                .game_by_romm_id(rom_id)?
                .with_context(|| format!("no game with remote id {rom_id}"))?;
            game.user_rating = rating;
            app.store.update_game(&game)?;

            // Local write lands first; the remote push is best-effort
            if let Some(session) = app.connection.session() {
                let props = UserPropsUpdate {
                    rating: Some(rating),
                    ..Default::default()
                };
                if let Err(err) = session.client().update_rom_user_props(rom_id, &props).await {
                    error!("failed to push rating to server: {err}");
                }
            }
            println!("rated '{}' {rating}/10", game.title);
        }
        "status" => {
            app.connection.initialize().await;
            println!("connection: {:?}", app.connection.state());
            let platforms = app.store.all_platforms()?;
            let games = app.store.all_games()?;
            println!("platforms: {}  games: {}", platforms.len(), games.len());
            if let Some(last) = app.store.state_timestamp(keys::LAST_LIBRARY_SYNC)? {
                println!("last library sync: {last}");
            }
        }
        _ => usage(),
    }

    Ok(())
}
