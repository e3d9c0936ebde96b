//! The catalog-facing seam between sync components and the live server
//!
//! Sync engines never hold a client directly; they ask an [`ApiProvider`]
//! for the current [`CatalogApi`] on every operation so that reconnects
//! (which rebuild the session) are picked up transparently.

use crate::models::{
    CollectionCreate, RemoteCollection, RemotePlatform, RemoteRom, RemoteRomPage, RemoteUser,
    UserPropsUpdate,
};
use crate::session::Session;
use crate::RemoteError;
use async_trait::async_trait;
use std::sync::Arc;

/// Catalog operations the sync engines consume
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// Absolute URL for a server-relative media path
    fn media_url(&self, path: &str) -> String;

    async fn platforms(&self) -> Result<Vec<RemotePlatform>, RemoteError>;

    async fn platform(&self, platform_id: i64) -> Result<RemotePlatform, RemoteError>;

    async fn roms_page(
        &self,
        platform_id: i64,
        limit: u32,
        offset: u32,
    ) -> Result<RemoteRomPage, RemoteError>;

    async fn rom(&self, rom_id: i64) -> Result<RemoteRom, RemoteError>;

    async fn current_user(&self) -> Result<RemoteUser, RemoteError>;

    async fn refresh_ra_progression(&self, user_id: i64) -> Result<(), RemoteError>;

    async fn update_rom_user_props(
        &self,
        rom_id: i64,
        props: &UserPropsUpdate,
    ) -> Result<(), RemoteError>;

    async fn collections(
        &self,
        is_favorite: Option<bool>,
    ) -> Result<Vec<RemoteCollection>, RemoteError>;

    async fn create_collection(
        &self,
        is_favorite: bool,
        collection: &CollectionCreate,
    ) -> Result<RemoteCollection, RemoteError>;

    async fn update_collection_roms(
        &self,
        collection_id: i64,
        rom_ids: &[i64],
    ) -> Result<RemoteCollection, RemoteError>;

    async fn delete_collection(&self, collection_id: i64) -> Result<(), RemoteError>;
}

/// Hands out the currently connected catalog API, if any
pub trait ApiProvider: Send + Sync {
    fn api(&self) -> Option<Arc<dyn CatalogApi>>;
}

#[async_trait]
impl CatalogApi for Session {
    fn media_url(&self, path: &str) -> String {
        Session::media_url(self, path)
    }

    async fn platforms(&self) -> Result<Vec<RemotePlatform>, RemoteError> {
        self.client().platforms().await
    }

    async fn platform(&self, platform_id: i64) -> Result<RemotePlatform, RemoteError> {
        self.client().platform(platform_id).await
    }

    async fn roms_page(
        &self,
        platform_id: i64,
        limit: u32,
        offset: u32,
    ) -> Result<RemoteRomPage, RemoteError> {
        let params = self.roms_query(Some(platform_id), None, "name", "asc", limit, offset);
        self.client().roms(&params).await
    }

    async fn rom(&self, rom_id: i64) -> Result<RemoteRom, RemoteError> {
        self.client().rom(rom_id).await
    }

    async fn current_user(&self) -> Result<RemoteUser, RemoteError> {
        self.client().current_user().await
    }

    async fn refresh_ra_progression(&self, user_id: i64) -> Result<(), RemoteError> {
        self.client().refresh_ra_progression(user_id).await
    }

    async fn update_rom_user_props(
        &self,
        rom_id: i64,
        props: &UserPropsUpdate,
    ) -> Result<(), RemoteError> {
        self.client().update_rom_user_props(rom_id, props).await
    }

    async fn collections(
        &self,
        is_favorite: Option<bool>,
    ) -> Result<Vec<RemoteCollection>, RemoteError> {
        self.client().collections(is_favorite).await
    }

    async fn create_collection(
        &self,
        is_favorite: bool,
        collection: &CollectionCreate,
    ) -> Result<RemoteCollection, RemoteError> {
        self.client().create_collection(is_favorite, collection).await
    }

    async fn update_collection_roms(
        &self,
        collection_id: i64,
        rom_ids: &[i64],
    ) -> Result<RemoteCollection, RemoteError> {
        self.client()
            .update_collection_roms(collection_id, rom_ids)
            .await
    }

    async fn delete_collection(&self, collection_id: i64) -> Result<(), RemoteError> {
        self.client().delete_collection(collection_id).await
    }
}
