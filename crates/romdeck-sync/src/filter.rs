//! Admission predicates for remote catalog entries
//!
//! Pure, stateless, and deterministic: safe to evaluate concurrently.
//! Checks short-circuit in order: extension, bad-dump tags, region,
//! revision/tag exclusions.

use regex::Regex;
use romdeck_config::{platform_def, RegionFilterMode, SyncFilterConfig};
use romdeck_remote::RemoteRom;
use std::sync::LazyLock;

// No-Intro style hack tags: [h], [h1], [hC], [h M]
static NO_INTRO_HACK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[h[0-9a-z ]*\]").expect("hack tag pattern"));
// [hack], [some hack] - but not game titles like ".hack" outside brackets
static HACK_BRACKET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[.*\bhack\b.*\]").expect("hack bracket pattern"));
// (hack), (undub hack) - but not ".hack (USA)" since "(USA)" has no "hack"
static HACK_PAREN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\(.*\bhack\b.*\)").expect("hack paren pattern"));
// Bad dumps and dump-quality markers: [b], [b1], [o] (overdump), [p]
// (pending), [t] (trained), [f] (fixed)
static BAD_DUMP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[[boftp][0-9]*\]").expect("bad dump pattern"));

/// Decides whether a remote entry is admitted into the local library
pub struct SyncFilter<'a> {
    config: &'a SyncFilterConfig,
}

impl<'a> SyncFilter<'a> {
    pub fn new(config: &'a SyncFilterConfig) -> Self {
        Self { config }
    }

    pub fn should_sync(&self, rom: &RemoteRom) -> bool {
        if !Self::passes_extension_filter(rom) {
            return false;
        }
        if !Self::passes_bad_dump_filter(rom) {
            return false;
        }
        if !self.passes_region_filter(rom) {
            return false;
        }
        if !self.passes_revision_filter(rom) {
            return false;
        }
        true
    }

    /// Entries with no derivable extension pass; entries whose extension is
    /// outside the platform's whitelist are rejected.
    fn passes_extension_filter(rom: &RemoteRom) -> bool {
        let Some(extension) = derived_extension(rom) else {
            return true;
        };

        let Some(def) = platform_def(&rom.platform_slug) else {
            return true;
        };
        if def.extensions.is_empty() {
            return true;
        }

        def.extensions.contains(&extension.as_str())
    }

    fn passes_bad_dump_filter(rom: &RemoteRom) -> bool {
        if BAD_DUMP.is_match(&rom.name) {
            return false;
        }
        if let Some(fs_name) = &rom.fs_name
            && BAD_DUMP.is_match(fs_name)
        {
            return false;
        }
        true
    }

    fn passes_region_filter(&self, rom: &RemoteRom) -> bool {
        // Nothing selected: the region filter is off
        if self.config.enabled_regions.is_empty() {
            return true;
        }

        // Entries with no listed region cannot be filtered
        let Some(regions) = rom.regions.as_ref().filter(|r| !r.is_empty()) else {
            return true;
        };

        let matches_enabled = regions.iter().any(|region| {
            self.config
                .enabled_regions
                .iter()
                .any(|enabled| region.eq_ignore_ascii_case(enabled))
        });

        match self.config.region_mode {
            RegionFilterMode::Include => matches_enabled,
            RegionFilterMode::Exclude => !matches_enabled,
        }
    }

    fn passes_revision_filter(&self, rom: &RemoteRom) -> bool {
        let revision = rom
            .revision
            .as_deref()
            .map(str::to_lowercase)
            .unwrap_or_default();
        let name = rom.name.to_lowercase();
        let tags: Vec<String> = rom
            .tags
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|t| t.to_lowercase())
            .collect();

        if self.config.exclude_beta && (revision.contains("beta") || name.contains("(beta)")) {
            return false;
        }
        if self.config.exclude_prototype
            && (revision.contains("proto") || name.contains("(proto)"))
        {
            return false;
        }
        if self.config.exclude_demo
            && (revision.contains("demo") || name.contains("(demo)") || name.contains("(sample)"))
        {
            return false;
        }
        if self.config.exclude_hack && is_hack(&name, &revision, &tags) {
            return false;
        }

        true
    }
}

fn is_hack(name: &str, revision: &str, tags: &[String]) -> bool {
    if revision.contains("hack") {
        return true;
    }
    if tags.iter().any(|t| t.contains("hack")) {
        return true;
    }
    NO_INTRO_HACK.is_match(name) || HACK_BRACKET.is_match(name) || HACK_PAREN.is_match(name)
}

/// Derive a candidate extension from the first root-level file, the full
/// path, or the filesystem name, in that order. A candidate is valid only
/// if non-empty, at most 10 chars, and alphanumeric.
fn derived_extension(rom: &RemoteRom) -> Option<String> {
    let root_file = rom
        .files
        .as_deref()
        .unwrap_or_default()
        .iter()
        .find(|f| !f.file_name.contains('/'))
        .map(|f| f.file_name.as_str());

    let candidates = [
        root_file,
        rom.full_path.as_deref(),
        rom.fs_name.as_deref(),
    ];

    candidates
        .into_iter()
        .flatten()
        .filter_map(extension_of)
        .find(|ext| is_valid_extension(ext))
}

fn extension_of(name: &str) -> Option<String> {
    name.rsplit_once('.').map(|(_, ext)| ext.to_lowercase())
}

fn is_valid_extension(ext: &str) -> bool {
    !ext.is_empty()
        && ext.len() <= 10
        && ext.chars().all(|c| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;
    use romdeck_remote::RemoteRomFile;

    fn rom(name: &str) -> RemoteRom {
        RemoteRom {
            id: 1,
            platform_id: 1,
            platform_slug: "psx".to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn config() -> SyncFilterConfig {
        SyncFilterConfig::default()
    }

    #[test]
    fn test_clean_entry_passes() {
        let config = config();
        assert!(SyncFilter::new(&config).should_sync(&rom("Vagrant Story")));
    }

    #[test]
    fn test_bad_dump_rejected() {
        let config = config();
        let filter = SyncFilter::new(&config);
        assert!(!filter.should_sync(&rom("Crash Bandicoot [b]")));
        assert!(!filter.should_sync(&rom("Crash Bandicoot [b2]")));
        assert!(!filter.should_sync(&rom("Crash Bandicoot [o1]")));
        let mut fs_tagged = rom("Crash Bandicoot");
        fs_tagged.fs_name = Some("crash [p].bin".to_string());
        assert!(!filter.should_sync(&fs_tagged));
    }

    #[test]
    fn test_bad_dump_does_not_match_plain_brackets() {
        let config = config();
        let filter = SyncFilter::new(&config);
        assert!(filter.should_sync(&rom("Final Fantasy [!]")));
    }

    #[test]
    fn test_extension_filter_uses_platform_whitelist() {
        let config = config();
        let filter = SyncFilter::new(&config);

        let mut good = rom("Vagrant Story");
        good.fs_name = Some("vagrant.chd".to_string());
        assert!(filter.should_sync(&good));

        let mut bad = rom("Vagrant Story");
        bad.fs_name = Some("vagrant.exe".to_string());
        assert!(!filter.should_sync(&bad));

        // Unknown platform: fail open
        let mut unknown = rom("Some Game");
        unknown.platform_slug = "obscure-system".to_string();
        unknown.fs_name = Some("game.xyz".to_string());
        assert!(filter.should_sync(&unknown));
    }

    #[test]
    fn test_extension_prefers_root_level_file() {
        let config = config();
        let filter = SyncFilter::new(&config);

        let mut entry = rom("Vagrant Story");
        entry.fs_name = Some("vagrant.exe".to_string());
        entry.files = Some(vec![RemoteRomFile {
            id: 1,
            file_name: "vagrant.chd".to_string(),
            ..Default::default()
        }]);
        assert!(filter.should_sync(&entry));
    }

    #[test]
    fn test_no_derivable_extension_passes() {
        let config = config();
        let mut entry = rom("Vagrant Story");
        entry.fs_name = Some("folder name without extension".to_string());
        assert!(SyncFilter::new(&config).should_sync(&entry));
    }

    #[test]
    fn test_region_include_mode() {
        let mut config = config();
        config.enabled_regions = vec!["US".to_string()];
        config.region_mode = RegionFilterMode::Include;
        let filter = SyncFilter::new(&config);

        let mut eu = rom("Some Game");
        eu.regions = Some(vec!["EU".to_string()]);
        assert!(!filter.should_sync(&eu));

        let mut us = rom("Some Game");
        us.regions = Some(vec!["us".to_string()]);
        assert!(filter.should_sync(&us));
    }

    #[test]
    fn test_region_exclude_mode() {
        let mut config = config();
        config.enabled_regions = vec!["US".to_string()];
        config.region_mode = RegionFilterMode::Exclude;
        let filter = SyncFilter::new(&config);

        let mut eu = rom("Some Game");
        eu.regions = Some(vec!["EU".to_string()]);
        assert!(filter.should_sync(&eu));

        let mut us = rom("Some Game");
        us.regions = Some(vec!["US".to_string()]);
        assert!(!filter.should_sync(&us));
    }

    #[test]
    fn test_region_empty_list_always_passes() {
        for mode in [RegionFilterMode::Include, RegionFilterMode::Exclude] {
            let mut config = config();
            config.enabled_regions = vec!["US".to_string()];
            config.region_mode = mode;
            assert!(SyncFilter::new(&config).should_sync(&rom("Region Free")));
        }
    }

    #[test]
    fn test_no_regions_selected_passes() {
        let config = config();
        let mut entry = rom("Some Game");
        entry.regions = Some(vec!["JP".to_string()]);
        assert!(SyncFilter::new(&config).should_sync(&entry));
    }

    #[test]
    fn test_revision_exclusions() {
        let mut config = config();
        config.exclude_beta = true;
        config.exclude_prototype = true;
        config.exclude_demo = true;
        let filter = SyncFilter::new(&config);

        assert!(!filter.should_sync(&rom("Some Game (Beta)")));
        assert!(!filter.should_sync(&rom("Some Game (Proto)")));
        assert!(!filter.should_sync(&rom("Some Game (Demo)")));
        assert!(!filter.should_sync(&rom("Some Game (Sample)")));
        assert!(filter.should_sync(&rom("Some Game")));

        let mut revision_beta = rom("Some Game");
        revision_beta.revision = Some("Beta 3".to_string());
        assert!(!filter.should_sync(&revision_beta));
    }

    #[test]
    fn test_hack_detection() {
        let mut config = config();
        config.exclude_hack = true;
        let filter = SyncFilter::new(&config);

        assert!(!filter.should_sync(&rom("Super Mario World [h1]")));
        assert!(!filter.should_sync(&rom("Pokemon Red [some hack]")));
        assert!(!filter.should_sync(&rom("Chrono Trigger (undub hack)")));

        let mut tagged = rom("Some Game");
        tagged.tags = Some(vec!["Hack".to_string()]);
        assert!(!filter.should_sync(&tagged));

        // ".hack" series titles are not hacks
        assert!(filter.should_sync(&rom(".hack//Infection (USA)")));
    }

    #[test]
    fn test_hack_filter_disabled_by_default() {
        let config = config();
        assert!(SyncFilter::new(&config).should_sync(&rom("Super Mario World [h1]")));
    }
}
