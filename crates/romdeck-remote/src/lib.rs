//! Remote library server client for Romdeck
//!
//! Typed HTTP operations against a RomM-compatible game library server,
//! connection lifecycle management with version negotiation, and resumable
//! content downloads.

mod api;
mod client;
mod connection;
mod download;
mod models;
mod session;

pub use api::{ApiProvider, CatalogApi};
pub use client::{ApiClient, DownloadResponse};
pub use connection::{
    ConnectionManager, ConnectionState, CredentialStore, DeviceInfo, MemoryCredentials,
    SavedConnection,
};
pub use download::{DownloadProgress, DownloadState, RomDownloader};
pub use models::{
    disc_tag_number, CollectionCreate, DeviceRegistration, EarnedAchievement, HeartbeatResponse,
    RemoteCollection, RemoteDevice, RemoteFirmware, RemoteMetadatum, RemotePlatform,
    RemoteRaAchievement, RemoteRaGameProgression, RemoteRaMetadata, RemoteRaProgression,
    RemoteRom, RemoteRomFile, RemoteRomPage, RemoteRomUser, RemoteSibling, RemoteUser,
    SystemInfo, TokenResponse, UserPropsUpdate,
};
pub use session::{compare_versions, Session};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Not connected to server")]
    NotConnected,

    #[error("Server returned {code}")]
    Status { code: u16 },

    #[error("Authentication failed (HTTP {code})")]
    Auth { code: u16 },

    #[error("{0}")]
    Connection(String),

    #[error("{0}")]
    Download(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RemoteError {
    /// HTTP status carried by this error, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            RemoteError::Status { code } | RemoteError::Auth { code } => Some(*code),
            RemoteError::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self.status_code(), Some(401) | Some(403))
    }
}
