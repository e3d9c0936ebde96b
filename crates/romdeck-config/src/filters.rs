//! Sync admission filter preferences

use serde::{Deserialize, Serialize};

/// How the selected regions are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RegionFilterMode {
    /// Only entries matching a selected region are admitted
    #[default]
    Include,
    /// Entries matching a selected region are rejected
    Exclude,
}

/// User-configured filters applied to every remote catalog entry before
/// it is admitted into the local library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFilterConfig {
    /// Regions the region filter operates on; empty disables it
    #[serde(default)]
    pub enabled_regions: Vec<String>,

    #[serde(default)]
    pub region_mode: RegionFilterMode,

    #[serde(default)]
    pub exclude_beta: bool,

    #[serde(default)]
    pub exclude_prototype: bool,

    #[serde(default)]
    pub exclude_demo: bool,

    #[serde(default)]
    pub exclude_hack: bool,

    /// Delete local games whose remote id vanished from the server
    #[serde(default)]
    pub delete_orphans: bool,
}

impl Default for SyncFilterConfig {
    fn default() -> Self {
        Self {
            enabled_regions: Vec::new(),
            region_mode: RegionFilterMode::Include,
            exclude_beta: false,
            exclude_prototype: false,
            exclude_demo: false,
            exclude_hack: false,
            delete_orphans: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_admits_everything() {
        let config = SyncFilterConfig::default();
        assert!(config.enabled_regions.is_empty());
        assert_eq!(config.region_mode, RegionFilterMode::Include);
        assert!(!config.delete_orphans);
    }

    #[test]
    fn test_region_mode_roundtrip() {
        let toml_str = "region_mode = \"exclude\"";
        let config: SyncFilterConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.region_mode, RegionFilterMode::Exclude);
    }
}
