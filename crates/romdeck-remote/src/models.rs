//! Wire models for the remote library server API
//!
//! Field names follow the server's JSON schema; disc numbering is not sent
//! by the server and is derived from `(Disc N)` tags in file system names.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static DISC_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\(disc (\d+)\)").expect("disc tag pattern"));

/// Parse a `(Disc N)` tag out of a display or file system name
pub fn disc_tag_number(name: &str) -> Option<i32> {
    DISC_TAG
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemotePlatform {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub fs_slug: Option<String>,
    pub rom_count: i64,
    pub display_name: Option<String>,
    pub url_logo: Option<String>,
    pub firmware: Option<Vec<RemoteFirmware>>,
}

impl RemotePlatform {
    /// Display name preferred over the canonical name
    pub fn normalized_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteFirmware {
    pub id: i64,
    pub file_name: String,
    pub file_size_bytes: i64,
    pub md5_hash: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteRom {
    pub id: i64,
    pub platform_id: i64,
    pub platform_slug: String,

    pub name: String,
    pub slug: Option<String>,
    pub fs_name: Option<String>,
    pub fs_size_bytes: i64,
    pub full_path: Option<String>,

    pub igdb_id: Option<i64>,
    pub moby_id: Option<i64>,
    pub ra_id: Option<i64>,

    pub summary: Option<String>,
    pub metadatum: Option<RemoteMetadatum>,
    pub ra_metadata: Option<RemoteRaMetadata>,

    pub path_cover_large: Option<String>,
    pub url_cover: Option<String>,
    pub merged_screenshots: Vec<String>,

    pub regions: Option<Vec<String>>,
    pub languages: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub revision: Option<String>,

    /// Folder-packaged multi-disc indicator
    pub multi: bool,
    pub siblings: Option<Vec<RemoteSibling>>,
    pub files: Option<Vec<RemoteRomFile>>,

    pub rom_user: Option<RemoteRomUser>,
}

impl RemoteRom {
    pub fn genres(&self) -> Option<&Vec<String>> {
        self.metadatum.as_ref().and_then(|m| m.genres.as_ref())
    }

    pub fn companies(&self) -> Option<&Vec<String>> {
        self.metadatum.as_ref().and_then(|m| m.companies.as_ref())
    }

    pub fn first_release_date_millis(&self) -> Option<i64> {
        self.metadatum.as_ref().and_then(|m| m.first_release_date)
    }

    /// All discs packaged as one logical entry with an internal file list
    pub fn is_folder_multi_disc(&self) -> bool {
        self.multi
    }

    /// Sibling entries that are disc variants of this entry
    pub fn disc_siblings(&self) -> Vec<&RemoteSibling> {
        self.siblings
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter(|s| s.is_disc_variant())
            .collect()
    }

    pub fn has_disc_siblings(&self) -> bool {
        !self.disc_siblings().is_empty()
    }

    /// Separate per-disc entries linked through the siblings list
    pub fn is_sibling_multi_disc(&self) -> bool {
        self.has_disc_siblings() && !self.is_folder_multi_disc()
    }

    pub fn disc_number(&self) -> Option<i32> {
        self.fs_name
            .as_deref()
            .and_then(disc_tag_number)
            .or_else(|| disc_tag_number(&self.name))
    }

    pub fn achievement_count(&self) -> usize {
        self.ra_metadata
            .as_ref()
            .and_then(|m| m.achievements.as_ref())
            .map(|a| a.len())
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteMetadatum {
    pub genres: Option<Vec<String>>,
    pub companies: Option<Vec<String>>,
    pub first_release_date: Option<i64>,
    pub franchises: Option<Vec<String>>,
    pub game_modes: Option<Vec<String>>,
    pub average_rating: Option<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteRaMetadata {
    pub achievements: Option<Vec<RemoteRaAchievement>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteRaAchievement {
    pub ra_id: Option<i64>,
    pub badge_id: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSibling {
    pub id: i64,
    pub name: Option<String>,
    pub fs_name: Option<String>,
}

impl RemoteSibling {
    pub fn disc_number(&self) -> Option<i32> {
        self.fs_name
            .as_deref()
            .and_then(disc_tag_number)
            .or_else(|| self.name.as_deref().and_then(disc_tag_number))
    }

    pub fn is_disc_variant(&self) -> bool {
        self.disc_number().is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteRomFile {
    pub id: i64,
    pub rom_id: i64,
    pub file_name: String,
    pub full_path: Option<String>,
    pub file_size_bytes: i64,
    /// `update` / `dlc` for non-primary content, absent for the main file
    pub category: Option<String>,
}

impl RemoteRomFile {
    pub fn disc_number(&self) -> Option<i32> {
        disc_tag_number(&self.file_name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteRomUser {
    pub rating: i32,
    pub difficulty: i32,
    pub completion: i32,
    pub status: Option<String>,
    pub backlogged: bool,
    pub now_playing: bool,
    pub last_played: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteRomPage {
    pub items: Vec<RemoteRom>,
    pub total: i64,
    pub page: Option<i64>,
    pub size: Option<i64>,
    pub pages: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteUser {
    pub id: i64,
    pub username: String,
    pub enabled: bool,
    pub role: String,
    pub ra_username: Option<String>,
    pub ra_progression: Option<RemoteRaProgression>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteRaProgression {
    pub results: Vec<RemoteRaGameProgression>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteRaGameProgression {
    pub rom_ra_id: Option<i64>,
    pub earned_achievements: Vec<EarnedAchievement>,
}

/// One earned achievement as reported by the user's progression listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EarnedAchievement {
    pub id: String,
    pub date: Option<String>,
    pub date_hardcore: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteCollection {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub rom_ids: Vec<i64>,
    pub is_favorite: bool,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionCreate {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserPropsUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceRegistration {
    pub name: String,
    pub client_version: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteDevice {
    pub id: Option<String>,
    pub device_id: Option<String>,
    pub name: Option<String>,
}

impl RemoteDevice {
    /// The server is inconsistent about which id field it fills in
    pub fn any_id(&self) -> Option<&str> {
        self.id.as_deref().or(self.device_id.as_deref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatResponse {
    #[serde(rename = "SYSTEM")]
    pub system: Option<SystemInfo>,
}

impl HeartbeatResponse {
    pub fn version(&self) -> Option<&str> {
        self.system.as_ref().and_then(|s| s.version.as_deref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemInfo {
    #[serde(rename = "VERSION")]
    pub version: Option<String>,
    #[serde(rename = "SHOW_SETUP_WIZARD")]
    pub show_setup_wizard: bool,
}
