//! Catalog row types

use chrono::{DateTime, Utc};

/// Where a game row came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameSource {
    /// Known only locally (scanned or hand-added), no remote counterpart
    Local,
    /// Known from the remote catalog, not downloaded
    Remote,
    /// Known from the remote catalog and downloaded locally
    Synced,
}

impl GameSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameSource::Local => "local",
            GameSource::Remote => "remote",
            GameSource::Synced => "synced",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "local" => Some(GameSource::Local),
            "remote" => Some(GameSource::Remote),
            "synced" => Some(GameSource::Synced),
            _ => None,
        }
    }
}

/// A platform in the local catalog; `id` is the remote platform id
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformRow {
    pub id: i64,
    pub slug: String,
    pub fs_slug: Option<String>,
    pub name: String,
    pub short_name: String,
    /// Comma-separated extension whitelist, empty when unknown
    pub rom_extensions: String,
    pub game_count: i64,
    pub is_visible: bool,
    pub logo_path: Option<String>,
    pub sort_order: i32,
    /// Disabled platforms are frozen: excluded from library sync and from
    /// orphan sweeps
    pub sync_enabled: bool,
    pub custom_rom_path: Option<String>,
    pub last_scanned: Option<DateTime<Utc>>,
}

impl PlatformRow {
    pub fn extensions(&self) -> Vec<String> {
        self.rom_extensions
            .split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_lowercase)
            .collect()
    }
}

/// A game in the local catalog
#[derive(Debug, Clone, PartialEq)]
pub struct GameRow {
    pub id: i64,
    pub platform_id: i64,
    pub platform_slug: String,
    pub title: String,
    pub sort_title: String,
    /// Present only when the game is downloaded; re-validated every sync
    pub local_path: Option<String>,
    /// Remote ROM id; absent for locally-only entries
    pub romm_id: Option<i64>,
    pub romm_file_name: Option<String>,
    pub igdb_id: Option<i64>,
    pub ra_id: Option<i64>,
    pub source: GameSource,
    pub cover_path: Option<String>,
    pub background_path: Option<String>,
    pub screenshot_paths: Option<String>,
    pub description: Option<String>,
    pub release_year: Option<i32>,
    pub genre: Option<String>,
    pub developer: Option<String>,
    pub rating: Option<f32>,
    pub regions: Option<String>,
    pub languages: Option<String>,
    pub game_modes: Option<String>,
    pub franchises: Option<String>,
    pub user_rating: i32,
    pub user_difficulty: i32,
    pub completion: i32,
    pub status: Option<String>,
    pub backlogged: bool,
    pub now_playing: bool,
    pub is_favorite: bool,
    pub is_hidden: bool,
    pub is_multi_disc: bool,
    pub play_count: i32,
    pub play_time_minutes: i64,
    pub last_played: Option<DateTime<Utc>>,
    pub added_at: DateTime<Utc>,
    pub achievement_count: i32,
    pub file_size_bytes: Option<i64>,
}

impl GameRow {
    /// A blank row with user-owned fields zeroed; callers fill in the rest
    pub fn new(platform_id: i64, platform_slug: &str, title: &str) -> Self {
        Self {
            id: 0,
            platform_id,
            platform_slug: platform_slug.to_string(),
            title: title.to_string(),
            sort_title: title.to_lowercase(),
            local_path: None,
            romm_id: None,
            romm_file_name: None,
            igdb_id: None,
            ra_id: None,
            source: GameSource::Remote,
            cover_path: None,
            background_path: None,
            screenshot_paths: None,
            description: None,
            release_year: None,
            genre: None,
            developer: None,
            rating: None,
            regions: None,
            languages: None,
            game_modes: None,
            franchises: None,
            user_rating: 0,
            user_difficulty: 0,
            completion: 0,
            status: None,
            backlogged: false,
            now_playing: false,
            is_favorite: false,
            is_hidden: false,
            is_multi_disc: false,
            play_count: 0,
            play_time_minutes: 0,
            last_played: None,
            added_at: Utc::now(),
            achievement_count: 0,
            file_size_bytes: None,
        }
    }
}

/// One disc of a multi-disc game
#[derive(Debug, Clone, PartialEq)]
pub struct GameDiscRow {
    pub id: i64,
    pub game_id: i64,
    pub romm_id: i64,
    pub disc_number: i32,
    pub file_name: String,
    pub local_path: Option<String>,
    pub file_size: i64,
}

/// Non-primary downloadable content (updates/DLC) attached to a game
#[derive(Debug, Clone, PartialEq)]
pub struct GameFileRow {
    pub id: i64,
    pub game_id: i64,
    pub romm_file_id: i64,
    pub rom_id: i64,
    pub file_name: String,
    pub file_path: Option<String>,
    pub category: String,
    pub file_size: i64,
    pub local_path: Option<String>,
    pub downloaded_at: Option<DateTime<Utc>>,
}

/// A named collection; `romm_id` is absent for local-only collections not
/// yet pushed to the server
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionRow {
    pub id: i64,
    pub romm_id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    pub is_user_created: bool,
    pub updated_at: DateTime<Utc>,
}
