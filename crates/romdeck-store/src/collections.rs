//! Collection and membership operations

use crate::catalog::{repeat_vars, CatalogStore};
use crate::entity::CollectionRow;
use crate::{ts_from_sql, ts_to_sql, StoreError};
use rusqlite::{params, params_from_iter, OptionalExtension};

impl CatalogStore {
    pub fn insert_collection(&self, collection: &CollectionRow) -> Result<i64, StoreError> {
        let conn = self.conn();
        conn.execute(
            r#"INSERT INTO collections (romm_id, name, description, is_user_created, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            params![
                collection.romm_id,
                collection.name,
                collection.description,
                collection.is_user_created,
                ts_to_sql(&collection.updated_at),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update_collection(&self, collection: &CollectionRow) -> Result<(), StoreError> {
        self.conn().execute(
            r#"UPDATE collections SET romm_id = ?1, name = ?2, description = ?3,
               is_user_created = ?4, updated_at = ?5 WHERE id = ?6"#,
            params![
                collection.romm_id,
                collection.name,
                collection.description,
                collection.is_user_created,
                ts_to_sql(&collection.updated_at),
                collection.id,
            ],
        )?;
        Ok(())
    }

    pub fn delete_collection(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "DELETE FROM collection_games WHERE collection_id = ?1",
            params![id],
        )?;
        conn.execute("DELETE FROM collections WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn collection_by_id(&self, id: i64) -> Result<Option<CollectionRow>, StoreError> {
        let collection = self
            .conn()
            .query_row(
                "SELECT * FROM collections WHERE id = ?1",
                params![id],
                Self::row_to_collection,
            )
            .optional()?;
        Ok(collection)
    }

    pub fn collection_by_romm_id(
        &self,
        romm_id: i64,
    ) -> Result<Option<CollectionRow>, StoreError> {
        let collection = self
            .conn()
            .query_row(
                "SELECT * FROM collections WHERE romm_id = ?1",
                params![romm_id],
                Self::row_to_collection,
            )
            .optional()?;
        Ok(collection)
    }

    pub fn all_collections(&self) -> Result<Vec<CollectionRow>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT * FROM collections ORDER BY name")?;
        let collections = stmt
            .query_map([], Self::row_to_collection)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(collections)
    }

    pub fn game_ids_in_collection(&self, collection_id: i64) -> Result<Vec<i64>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT game_id FROM collection_games WHERE collection_id = ?1 ORDER BY game_id",
        )?;
        let ids = stmt
            .query_map(params![collection_id], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    pub fn add_game_to_collection(
        &self,
        collection_id: i64,
        game_id: i64,
    ) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT OR IGNORE INTO collection_games (collection_id, game_id) VALUES (?1, ?2)",
            params![collection_id, game_id],
        )?;
        Ok(())
    }

    pub fn remove_game_from_collection(
        &self,
        collection_id: i64,
        game_id: i64,
    ) -> Result<(), StoreError> {
        self.conn().execute(
            "DELETE FROM collection_games WHERE collection_id = ?1 AND game_id = ?2",
            params![collection_id, game_id],
        )?;
        Ok(())
    }

    /// Remote ROM ids for every game in a collection, skipping local-only
    /// games that have no remote counterpart
    pub fn romm_ids_in_collection(&self, collection_id: i64) -> Result<Vec<i64>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"SELECT g.romm_id FROM games g
               JOIN collection_games cg ON cg.game_id = g.id
               WHERE cg.collection_id = ?1 AND g.romm_id IS NOT NULL
               ORDER BY g.romm_id"#,
        )?;
        let ids = stmt
            .query_map(params![collection_id], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Resolve remote ROM ids to local game ids
    pub fn game_ids_for_romm_ids(&self, romm_ids: &[i64]) -> Result<Vec<i64>, StoreError> {
        if romm_ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn();
        let sql = format!(
            "SELECT id FROM games WHERE romm_id IN ({}) ORDER BY id",
            repeat_vars(romm_ids.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map(params_from_iter(romm_ids), |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn row_to_collection(row: &rusqlite::Row) -> rusqlite::Result<CollectionRow> {
        Ok(CollectionRow {
            id: row.get("id")?,
            romm_id: row.get("romm_id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            is_user_created: row.get("is_user_created")?,
            updated_at: row
                .get::<_, String>("updated_at")
                .map(|s| ts_from_sql(&s).unwrap_or_else(chrono::Utc::now))?,
        })
    }
}
