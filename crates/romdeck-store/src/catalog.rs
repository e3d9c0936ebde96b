//! Game catalog store backed by SQLite

use crate::entity::{GameDiscRow, GameFileRow, GameRow, GameSource, PlatformRow};
use crate::{ts_from_sql, ts_to_sql, StoreError};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Durable catalog store shared by the sync engines.
///
/// Row writes are last-writer-wins; the connection is serialized behind a
/// mutex so callers may share one store across tasks.
pub struct CatalogStore {
    conn: Mutex<Connection>,
}

impl CatalogStore {
    /// Open or create a database
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;

        Ok(store)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;

        Ok(store)
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("store mutex poisoned")
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS platforms (
                id INTEGER PRIMARY KEY,
                slug TEXT NOT NULL,
                fs_slug TEXT,
                name TEXT NOT NULL,
                short_name TEXT NOT NULL,
                rom_extensions TEXT NOT NULL DEFAULT '',
                game_count INTEGER NOT NULL DEFAULT 0,
                is_visible INTEGER NOT NULL DEFAULT 1,
                logo_path TEXT,
                sort_order INTEGER NOT NULL DEFAULT 999,
                sync_enabled INTEGER NOT NULL DEFAULT 1,
                custom_rom_path TEXT,
                last_scanned TEXT
            );

            CREATE TABLE IF NOT EXISTS games (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                platform_id INTEGER NOT NULL,
                platform_slug TEXT NOT NULL,
                title TEXT NOT NULL,
                sort_title TEXT NOT NULL,
                local_path TEXT,
                romm_id INTEGER,
                romm_file_name TEXT,
                igdb_id INTEGER,
                ra_id INTEGER,
                source TEXT NOT NULL,
                cover_path TEXT,
                background_path TEXT,
                screenshot_paths TEXT,
                description TEXT,
                release_year INTEGER,
                genre TEXT,
                developer TEXT,
                rating REAL,
                regions TEXT,
                languages TEXT,
                game_modes TEXT,
                franchises TEXT,
                user_rating INTEGER NOT NULL DEFAULT 0,
                user_difficulty INTEGER NOT NULL DEFAULT 0,
                completion INTEGER NOT NULL DEFAULT 0,
                status TEXT,
                backlogged INTEGER NOT NULL DEFAULT 0,
                now_playing INTEGER NOT NULL DEFAULT 0,
                is_favorite INTEGER NOT NULL DEFAULT 0,
                is_hidden INTEGER NOT NULL DEFAULT 0,
                is_multi_disc INTEGER NOT NULL DEFAULT 0,
                play_count INTEGER NOT NULL DEFAULT 0,
                play_time_minutes INTEGER NOT NULL DEFAULT 0,
                last_played TEXT,
                added_at TEXT NOT NULL,
                achievement_count INTEGER NOT NULL DEFAULT 0,
                file_size_bytes INTEGER
            );

            CREATE TABLE IF NOT EXISTS game_discs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                game_id INTEGER NOT NULL,
                romm_id INTEGER NOT NULL,
                disc_number INTEGER NOT NULL,
                file_name TEXT NOT NULL,
                local_path TEXT,
                file_size INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS game_files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                game_id INTEGER NOT NULL,
                romm_file_id INTEGER NOT NULL,
                rom_id INTEGER NOT NULL,
                file_name TEXT NOT NULL,
                file_path TEXT,
                category TEXT NOT NULL,
                file_size INTEGER NOT NULL DEFAULT 0,
                local_path TEXT,
                downloaded_at TEXT
            );

            CREATE TABLE IF NOT EXISTS collections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                romm_id INTEGER,
                name TEXT NOT NULL,
                description TEXT,
                is_user_created INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS collection_games (
                collection_id INTEGER NOT NULL,
                game_id INTEGER NOT NULL,
                PRIMARY KEY (collection_id, game_id)
            );

            CREATE TABLE IF NOT EXISTS orphaned_files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL UNIQUE,
                recorded_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sync_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_games_platform ON games(platform_id);
            CREATE INDEX IF NOT EXISTS idx_games_romm_id ON games(romm_id);
            CREATE INDEX IF NOT EXISTS idx_games_igdb_id ON games(igdb_id);
            CREATE INDEX IF NOT EXISTS idx_games_source ON games(source);
            CREATE INDEX IF NOT EXISTS idx_game_discs_game ON game_discs(game_id);
            CREATE INDEX IF NOT EXISTS idx_game_files_game ON game_files(game_id);
        "#,
        )?;

        Ok(())
    }

    // ---- platforms ----

    pub fn upsert_platform(&self, platform: &PlatformRow) -> Result<(), StoreError> {
        self.conn().execute(
            r#"INSERT OR REPLACE INTO platforms
               (id, slug, fs_slug, name, short_name, rom_extensions, game_count,
                is_visible, logo_path, sort_order, sync_enabled, custom_rom_path, last_scanned)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"#,
            params![
                platform.id,
                platform.slug,
                platform.fs_slug,
                platform.name,
                platform.short_name,
                platform.rom_extensions,
                platform.game_count,
                platform.is_visible,
                platform.logo_path,
                platform.sort_order,
                platform.sync_enabled,
                platform.custom_rom_path,
                platform.last_scanned.as_ref().map(ts_to_sql),
            ],
        )?;
        Ok(())
    }

    pub fn platform_by_id(&self, id: i64) -> Result<Option<PlatformRow>, StoreError> {
        let platform = self
            .conn()
            .query_row(
                "SELECT * FROM platforms WHERE id = ?1",
                params![id],
                Self::row_to_platform,
            )
            .optional()?;
        Ok(platform)
    }

    pub fn all_platforms(&self) -> Result<Vec<PlatformRow>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT * FROM platforms ORDER BY sort_order, name")?;
        let platforms = stmt
            .query_map([], Self::row_to_platform)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(platforms)
    }

    pub fn delete_platform(&self, id: i64) -> Result<(), StoreError> {
        self.conn()
            .execute("DELETE FROM platforms WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn update_platform_game_count(&self, id: i64, count: i64) -> Result<(), StoreError> {
        self.conn().execute(
            "UPDATE platforms SET game_count = ?1 WHERE id = ?2",
            params![count, id],
        )?;
        Ok(())
    }

    pub fn count_games_by_platform(&self, platform_id: i64) -> Result<i64, StoreError> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM games WHERE platform_id = ?1",
            params![platform_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Repoint every game on a legacy platform at its remote replacement
    pub fn migrate_platform_games(&self, from: i64, to: i64) -> Result<usize, StoreError> {
        let changed = self.conn().execute(
            "UPDATE games SET platform_id = ?1 WHERE platform_id = ?2",
            params![to, from],
        )?;
        Ok(changed)
    }

    // ---- games ----

    pub fn insert_game(&self, game: &GameRow) -> Result<i64, StoreError> {
        let conn = self.conn();
        conn.execute(
            r#"INSERT INTO games
               (platform_id, platform_slug, title, sort_title, local_path, romm_id,
                romm_file_name, igdb_id, ra_id, source, cover_path, background_path,
                screenshot_paths, description, release_year, genre, developer, rating,
                regions, languages, game_modes, franchises, user_rating, user_difficulty,
                completion, status, backlogged, now_playing, is_favorite, is_hidden,
                is_multi_disc, play_count, play_time_minutes, last_played, added_at,
                achievement_count, file_size_bytes)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                       ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26,
                       ?27, ?28, ?29, ?30, ?31, ?32, ?33, ?34, ?35, ?36, ?37)"#,
            params_from_iter(Self::game_params(game).iter().map(|v| v.as_ref())),
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update_game(&self, game: &GameRow) -> Result<(), StoreError> {
        let mut values = Self::game_params(game);
        values.push(Box::new(game.id));
        self.conn().execute(
            r#"UPDATE games SET
                platform_id = ?1, platform_slug = ?2, title = ?3, sort_title = ?4,
                local_path = ?5, romm_id = ?6, romm_file_name = ?7, igdb_id = ?8,
                ra_id = ?9, source = ?10, cover_path = ?11, background_path = ?12,
                screenshot_paths = ?13, description = ?14, release_year = ?15,
                genre = ?16, developer = ?17, rating = ?18, regions = ?19,
                languages = ?20, game_modes = ?21, franchises = ?22, user_rating = ?23,
                user_difficulty = ?24, completion = ?25, status = ?26, backlogged = ?27,
                now_playing = ?28, is_favorite = ?29, is_hidden = ?30, is_multi_disc = ?31,
                play_count = ?32, play_time_minutes = ?33, last_played = ?34,
                added_at = ?35, achievement_count = ?36, file_size_bytes = ?37
               WHERE id = ?38"#,
            params_from_iter(values.iter().map(|v| v.as_ref())),
        )?;
        Ok(())
    }

    fn game_params(game: &GameRow) -> Vec<Box<dyn rusqlite::ToSql>> {
        vec![
            Box::new(game.platform_id),
            Box::new(game.platform_slug.clone()),
            Box::new(game.title.clone()),
            Box::new(game.sort_title.clone()),
            Box::new(game.local_path.clone()),
            Box::new(game.romm_id),
            Box::new(game.romm_file_name.clone()),
            Box::new(game.igdb_id),
            Box::new(game.ra_id),
            Box::new(game.source.as_str()),
            Box::new(game.cover_path.clone()),
            Box::new(game.background_path.clone()),
            Box::new(game.screenshot_paths.clone()),
            Box::new(game.description.clone()),
            Box::new(game.release_year),
            Box::new(game.genre.clone()),
            Box::new(game.developer.clone()),
            Box::new(game.rating),
            Box::new(game.regions.clone()),
            Box::new(game.languages.clone()),
            Box::new(game.game_modes.clone()),
            Box::new(game.franchises.clone()),
            Box::new(game.user_rating),
            Box::new(game.user_difficulty),
            Box::new(game.completion),
            Box::new(game.status.clone()),
            Box::new(game.backlogged),
            Box::new(game.now_playing),
            Box::new(game.is_favorite),
            Box::new(game.is_hidden),
            Box::new(game.is_multi_disc),
            Box::new(game.play_count),
            Box::new(game.play_time_minutes),
            Box::new(game.last_played.as_ref().map(ts_to_sql)),
            Box::new(ts_to_sql(&game.added_at)),
            Box::new(game.achievement_count),
            Box::new(game.file_size_bytes),
        ]
    }

    pub fn game_by_id(&self, id: i64) -> Result<Option<GameRow>, StoreError> {
        let game = self
            .conn()
            .query_row(
                "SELECT * FROM games WHERE id = ?1",
                params![id],
                Self::row_to_game,
            )
            .optional()?;
        Ok(game)
    }

    pub fn game_by_romm_id(&self, romm_id: i64) -> Result<Option<GameRow>, StoreError> {
        let game = self
            .conn()
            .query_row(
                "SELECT * FROM games WHERE romm_id = ?1",
                params![romm_id],
                Self::row_to_game,
            )
            .optional()?;
        Ok(game)
    }

    pub fn games_by_igdb_and_platform(
        &self,
        igdb_id: i64,
        platform_id: i64,
    ) -> Result<Vec<GameRow>, StoreError> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT * FROM games WHERE igdb_id = ?1 AND platform_id = ?2")?;
        let games = stmt
            .query_map(params![igdb_id, platform_id], Self::row_to_game)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(games)
    }

    pub fn games_by_source(&self, source: GameSource) -> Result<Vec<GameRow>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT * FROM games WHERE source = ?1 ORDER BY id")?;
        let games = stmt
            .query_map(params![source.as_str()], Self::row_to_game)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(games)
    }

    pub fn all_games(&self) -> Result<Vec<GameRow>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT * FROM games ORDER BY sort_title")?;
        let games = stmt
            .query_map([], Self::row_to_game)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(games)
    }

    /// Delete a game and its child rows
    pub fn delete_game(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute("DELETE FROM game_discs WHERE game_id = ?1", params![id])?;
        conn.execute("DELETE FROM game_files WHERE game_id = ?1", params![id])?;
        conn.execute(
            "DELETE FROM collection_games WHERE game_id = ?1",
            params![id],
        )?;
        conn.execute("DELETE FROM games WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn set_favorite(&self, game_id: i64, favorite: bool) -> Result<(), StoreError> {
        self.conn().execute(
            "UPDATE games SET is_favorite = ?1 WHERE id = ?2",
            params![favorite, game_id],
        )?;
        Ok(())
    }

    pub fn favorite_romm_ids(&self) -> Result<Vec<i64>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT romm_id FROM games WHERE is_favorite = 1 AND romm_id IS NOT NULL")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    pub fn set_favorites_by_romm_ids(&self, romm_ids: &[i64]) -> Result<(), StoreError> {
        if romm_ids.is_empty() {
            return Ok(());
        }
        let sql = format!(
            "UPDATE games SET is_favorite = 1 WHERE romm_id IN ({})",
            repeat_vars(romm_ids.len())
        );
        self.conn().execute(&sql, params_from_iter(romm_ids))?;
        Ok(())
    }

    /// Clear the favorite flag on remote-backed games outside the given set;
    /// local-only favorites are untouched.
    pub fn clear_favorites_not_in(&self, romm_ids: &[i64]) -> Result<(), StoreError> {
        if romm_ids.is_empty() {
            self.conn().execute(
                "UPDATE games SET is_favorite = 0 WHERE is_favorite = 1 AND romm_id IS NOT NULL",
                [],
            )?;
            return Ok(());
        }
        let sql = format!(
            "UPDATE games SET is_favorite = 0
             WHERE is_favorite = 1 AND romm_id IS NOT NULL AND romm_id NOT IN ({})",
            repeat_vars(romm_ids.len())
        );
        self.conn().execute(&sql, params_from_iter(romm_ids))?;
        Ok(())
    }

    // ---- discs ----

    pub fn discs_for_game(&self, game_id: i64) -> Result<Vec<GameDiscRow>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT * FROM game_discs WHERE game_id = ?1 ORDER BY disc_number")?;
        let discs = stmt
            .query_map(params![game_id], Self::row_to_disc)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(discs)
    }

    pub fn disc_by_romm_id(&self, romm_id: i64) -> Result<Option<GameDiscRow>, StoreError> {
        let disc = self
            .conn()
            .query_row(
                "SELECT * FROM game_discs WHERE romm_id = ?1",
                params![romm_id],
                Self::row_to_disc,
            )
            .optional()?;
        Ok(disc)
    }

    pub fn upsert_discs(&self, discs: &[GameDiscRow]) -> Result<(), StoreError> {
        let conn = self.conn();
        for disc in discs {
            if disc.id == 0 {
                conn.execute(
                    r#"INSERT INTO game_discs
                       (game_id, romm_id, disc_number, file_name, local_path, file_size)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
                    params![
                        disc.game_id,
                        disc.romm_id,
                        disc.disc_number,
                        disc.file_name,
                        disc.local_path,
                        disc.file_size,
                    ],
                )?;
            } else {
                conn.execute(
                    r#"UPDATE game_discs SET game_id = ?1, romm_id = ?2, disc_number = ?3,
                       file_name = ?4, local_path = ?5, file_size = ?6 WHERE id = ?7"#,
                    params![
                        disc.game_id,
                        disc.romm_id,
                        disc.disc_number,
                        disc.file_name,
                        disc.local_path,
                        disc.file_size,
                        disc.id,
                    ],
                )?;
            }
        }
        Ok(())
    }

    /// Remove discs whose remote id is no longer part of the group
    pub fn delete_invalid_discs(&self, game_id: i64, keep: &[i64]) -> Result<(), StoreError> {
        if keep.is_empty() {
            self.conn().execute(
                "DELETE FROM game_discs WHERE game_id = ?1",
                params![game_id],
            )?;
            return Ok(());
        }
        let sql = format!(
            "DELETE FROM game_discs WHERE game_id = ? AND romm_id NOT IN ({})",
            repeat_vars(keep.len())
        );
        let mut values: Vec<i64> = vec![game_id];
        values.extend_from_slice(keep);
        self.conn().execute(&sql, params_from_iter(values))?;
        Ok(())
    }

    pub fn delete_discs_for_game(&self, game_id: i64) -> Result<(), StoreError> {
        self.conn().execute(
            "DELETE FROM game_discs WHERE game_id = ?1",
            params![game_id],
        )?;
        Ok(())
    }

    // ---- files ----

    pub fn game_file_by_remote_id(
        &self,
        romm_file_id: i64,
    ) -> Result<Option<GameFileRow>, StoreError> {
        let file = self
            .conn()
            .query_row(
                "SELECT * FROM game_files WHERE romm_file_id = ?1",
                params![romm_file_id],
                Self::row_to_file,
            )
            .optional()?;
        Ok(file)
    }

    pub fn files_for_game(&self, game_id: i64) -> Result<Vec<GameFileRow>, StoreError> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT * FROM game_files WHERE game_id = ?1 ORDER BY file_name")?;
        let files = stmt
            .query_map(params![game_id], Self::row_to_file)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(files)
    }

    pub fn upsert_files(&self, files: &[GameFileRow]) -> Result<(), StoreError> {
        let conn = self.conn();
        for file in files {
            if file.id == 0 {
                conn.execute(
                    r#"INSERT INTO game_files
                       (game_id, romm_file_id, rom_id, file_name, file_path, category,
                        file_size, local_path, downloaded_at)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
                    params![
                        file.game_id,
                        file.romm_file_id,
                        file.rom_id,
                        file.file_name,
                        file.file_path,
                        file.category,
                        file.file_size,
                        file.local_path,
                        file.downloaded_at.as_ref().map(ts_to_sql),
                    ],
                )?;
            } else {
                conn.execute(
                    r#"UPDATE game_files SET game_id = ?1, romm_file_id = ?2, rom_id = ?3,
                       file_name = ?4, file_path = ?5, category = ?6, file_size = ?7,
                       local_path = ?8, downloaded_at = ?9 WHERE id = ?10"#,
                    params![
                        file.game_id,
                        file.romm_file_id,
                        file.rom_id,
                        file.file_name,
                        file.file_path,
                        file.category,
                        file.file_size,
                        file.local_path,
                        file.downloaded_at.as_ref().map(ts_to_sql),
                        file.id,
                    ],
                )?;
            }
        }
        Ok(())
    }

    /// Remove file rows not present in the latest remote file list
    pub fn delete_invalid_files(&self, game_id: i64, keep: &[i64]) -> Result<(), StoreError> {
        if keep.is_empty() {
            return self.delete_files_for_game(game_id);
        }
        let sql = format!(
            "DELETE FROM game_files WHERE game_id = ? AND romm_file_id NOT IN ({})",
            repeat_vars(keep.len())
        );
        let mut values: Vec<i64> = vec![game_id];
        values.extend_from_slice(keep);
        self.conn().execute(&sql, params_from_iter(values))?;
        Ok(())
    }

    pub fn delete_files_for_game(&self, game_id: i64) -> Result<(), StoreError> {
        self.conn().execute(
            "DELETE FROM game_files WHERE game_id = ?1",
            params![game_id],
        )?;
        Ok(())
    }

    // ---- orphaned files ----

    /// Record a file that could not be deleted, for later retry
    pub fn record_orphaned_file(&self, path: &str) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT OR IGNORE INTO orphaned_files (path, recorded_at) VALUES (?1, ?2)",
            params![path, ts_to_sql(&chrono::Utc::now())],
        )?;
        Ok(())
    }

    pub fn orphaned_file_paths(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT path FROM orphaned_files ORDER BY id")?;
        let paths = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(paths)
    }

    pub fn clear_orphaned_file(&self, path: &str) -> Result<(), StoreError> {
        self.conn()
            .execute("DELETE FROM orphaned_files WHERE path = ?1", params![path])?;
        Ok(())
    }

    // ---- row mappers ----

    fn row_to_platform(row: &rusqlite::Row) -> rusqlite::Result<PlatformRow> {
        Ok(PlatformRow {
            id: row.get("id")?,
            slug: row.get("slug")?,
            fs_slug: row.get("fs_slug")?,
            name: row.get("name")?,
            short_name: row.get("short_name")?,
            rom_extensions: row.get("rom_extensions")?,
            game_count: row.get("game_count")?,
            is_visible: row.get("is_visible")?,
            logo_path: row.get("logo_path")?,
            sort_order: row.get("sort_order")?,
            sync_enabled: row.get("sync_enabled")?,
            custom_rom_path: row.get("custom_rom_path")?,
            last_scanned: row
                .get::<_, Option<String>>("last_scanned")?
                .and_then(|s| ts_from_sql(&s)),
        })
    }

    fn row_to_game(row: &rusqlite::Row) -> rusqlite::Result<GameRow> {
        let source: String = row.get("source")?;
        Ok(GameRow {
            id: row.get("id")?,
            platform_id: row.get("platform_id")?,
            platform_slug: row.get("platform_slug")?,
            title: row.get("title")?,
            sort_title: row.get("sort_title")?,
            local_path: row.get("local_path")?,
            romm_id: row.get("romm_id")?,
            romm_file_name: row.get("romm_file_name")?,
            igdb_id: row.get("igdb_id")?,
            ra_id: row.get("ra_id")?,
            source: GameSource::parse(&source).unwrap_or(GameSource::Local),
            cover_path: row.get("cover_path")?,
            background_path: row.get("background_path")?,
            screenshot_paths: row.get("screenshot_paths")?,
            description: row.get("description")?,
            release_year: row.get("release_year")?,
            genre: row.get("genre")?,
            developer: row.get("developer")?,
            rating: row.get("rating")?,
            regions: row.get("regions")?,
            languages: row.get("languages")?,
            game_modes: row.get("game_modes")?,
            franchises: row.get("franchises")?,
            user_rating: row.get("user_rating")?,
            user_difficulty: row.get("user_difficulty")?,
            completion: row.get("completion")?,
            status: row.get("status")?,
            backlogged: row.get("backlogged")?,
            now_playing: row.get("now_playing")?,
            is_favorite: row.get("is_favorite")?,
            is_hidden: row.get("is_hidden")?,
            is_multi_disc: row.get("is_multi_disc")?,
            play_count: row.get("play_count")?,
            play_time_minutes: row.get("play_time_minutes")?,
            last_played: row
                .get::<_, Option<String>>("last_played")?
                .and_then(|s| ts_from_sql(&s)),
            added_at: row
                .get::<_, String>("added_at")
                .map(|s| ts_from_sql(&s).unwrap_or_else(chrono::Utc::now))?,
            achievement_count: row.get("achievement_count")?,
            file_size_bytes: row.get("file_size_bytes")?,
        })
    }

    fn row_to_disc(row: &rusqlite::Row) -> rusqlite::Result<GameDiscRow> {
        Ok(GameDiscRow {
            id: row.get("id")?,
            game_id: row.get("game_id")?,
            romm_id: row.get("romm_id")?,
            disc_number: row.get("disc_number")?,
            file_name: row.get("file_name")?,
            local_path: row.get("local_path")?,
            file_size: row.get("file_size")?,
        })
    }

    fn row_to_file(row: &rusqlite::Row) -> rusqlite::Result<GameFileRow> {
        Ok(GameFileRow {
            id: row.get("id")?,
            game_id: row.get("game_id")?,
            romm_file_id: row.get("romm_file_id")?,
            rom_id: row.get("rom_id")?,
            file_name: row.get("file_name")?,
            file_path: row.get("file_path")?,
            category: row.get("category")?,
            file_size: row.get("file_size")?,
            local_path: row.get("local_path")?,
            downloaded_at: row
                .get::<_, Option<String>>("downloaded_at")?
                .and_then(|s| ts_from_sql(&s)),
        })
    }
}

pub(crate) fn repeat_vars(count: usize) -> String {
    vec!["?"; count].join(",")
}
