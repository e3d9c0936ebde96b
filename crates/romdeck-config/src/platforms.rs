//! Built-in platform definitions
//!
//! Maps remote platform slugs to display names, ROM extension whitelists,
//! and sort order. Consulted when upserting platforms and when filtering
//! remote entries by file extension.

/// A known platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformDef {
    pub slug: &'static str,
    pub short_name: &'static str,
    pub extensions: &'static [&'static str],
    pub sort_order: i32,
}

/// Look up a platform definition by its remote slug
pub fn platform_def(slug: &str) -> Option<&'static PlatformDef> {
    PLATFORMS.iter().find(|def| def.slug == slug)
}

static PLATFORMS: &[PlatformDef] = &[
    PlatformDef { slug: "nes", short_name: "NES", extensions: &["nes", "fds", "unf", "zip", "7z"], sort_order: 10 },
    PlatformDef { slug: "snes", short_name: "SNES", extensions: &["smc", "sfc", "fig", "zip", "7z"], sort_order: 20 },
    PlatformDef { slug: "n64", short_name: "N64", extensions: &["n64", "z64", "v64", "zip", "7z"], sort_order: 30 },
    PlatformDef { slug: "ngc", short_name: "GameCube", extensions: &["iso", "gcm", "rvz", "ciso"], sort_order: 40 },
    PlatformDef { slug: "wii", short_name: "Wii", extensions: &["iso", "wbfs", "rvz", "wad"], sort_order: 50 },
    PlatformDef { slug: "gb", short_name: "Game Boy", extensions: &["gb", "zip", "7z"], sort_order: 60 },
    PlatformDef { slug: "gbc", short_name: "GBC", extensions: &["gbc", "gb", "zip", "7z"], sort_order: 70 },
    PlatformDef { slug: "gba", short_name: "GBA", extensions: &["gba", "zip", "7z"], sort_order: 80 },
    PlatformDef { slug: "nds", short_name: "DS", extensions: &["nds", "zip", "7z"], sort_order: 90 },
    PlatformDef { slug: "n3ds", short_name: "3DS", extensions: &["3ds", "cia", "cci", "cxi"], sort_order: 100 },
    PlatformDef { slug: "switch", short_name: "Switch", extensions: &["nsp", "xci", "nsz", "xcz"], sort_order: 110 },
    PlatformDef { slug: "psx", short_name: "PS1", extensions: &["bin", "cue", "img", "iso", "chd", "pbp", "m3u"], sort_order: 120 },
    PlatformDef { slug: "ps2", short_name: "PS2", extensions: &["iso", "chd", "cso", "bin"], sort_order: 130 },
    PlatformDef { slug: "psp", short_name: "PSP", extensions: &["iso", "cso", "chd", "pbp"], sort_order: 140 },
    PlatformDef { slug: "segacd", short_name: "Sega CD", extensions: &["bin", "cue", "iso", "chd", "m3u"], sort_order: 150 },
    PlatformDef { slug: "genesis-slash-megadrive", short_name: "Genesis", extensions: &["md", "gen", "bin", "smd", "zip", "7z"], sort_order: 160 },
    PlatformDef { slug: "saturn", short_name: "Saturn", extensions: &["bin", "cue", "iso", "chd", "m3u"], sort_order: 170 },
    PlatformDef { slug: "dc", short_name: "Dreamcast", extensions: &["gdi", "cdi", "chd", "m3u"], sort_order: 180 },
    PlatformDef { slug: "arcade", short_name: "Arcade", extensions: &["zip", "7z", "chd"], sort_order: 190 },
    PlatformDef { slug: "turbografx16--1", short_name: "TG-16", extensions: &["pce", "sgx", "cue", "chd", "zip"], sort_order: 200 },
];
