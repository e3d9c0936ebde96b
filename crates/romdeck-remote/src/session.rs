//! An authenticated, version-negotiated connection to one server
//!
//! A [`Session`] is built by the connection manager after a successful
//! heartbeat and handed to sync components whole; there is no global
//! connection state.

use crate::client::ApiClient;
use std::cmp::Ordering;

/// Servers at or above this version accept the pluralized `platform_ids`
/// query parameter on the ROM listing.
const PLURALIZED_PLATFORM_PARAMS_VERSION: &str = "4.6.0";

/// Compare two dotted version strings, ignoring any `-suffix`.
///
/// Missing segments count as zero, so `4.7` equals `4.7.0`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let strip = |v: &str| v.split('-').next().unwrap_or("").to_string();
    let (a, b) = (strip(a), strip(b));

    if let (Ok(a), Ok(b)) = (semver::Version::parse(&a), semver::Version::parse(&b)) {
        return a.cmp(&b);
    }

    // Fallback for non-triple versions
    let parts = |v: &str| -> Vec<u64> { v.split('.').filter_map(|p| p.parse().ok()).collect() };
    let (pa, pb) = (parts(&a), parts(&b));
    for i in 0..pa.len().max(pb.len()) {
        let (na, nb) = (
            pa.get(i).copied().unwrap_or(0),
            pb.get(i).copied().unwrap_or(0),
        );
        match na.cmp(&nb) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// A live connection to the remote library server
#[derive(Debug, Clone)]
pub struct Session {
    base_url: String,
    version: String,
    api: ApiClient,
}

impl Session {
    pub fn new(base_url: String, version: String, api: ApiClient) -> Self {
        Self {
            base_url,
            version,
            api,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Negotiated server version string
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn client(&self) -> &ApiClient {
        &self.api
    }

    pub fn is_version_at_least(&self, min_version: &str) -> bool {
        compare_versions(&self.version, min_version) != Ordering::Less
    }

    /// Absolute URL for a server-relative media path
    pub fn media_url(&self, path: &str) -> String {
        if path.starts_with("http") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    /// Query parameters for the paged ROM listing; the platform key is
    /// pluralized on servers that support it.
    pub fn roms_query(
        &self,
        platform_id: Option<i64>,
        search_term: Option<&str>,
        order_by: &str,
        order_dir: &str,
        limit: u32,
        offset: u32,
    ) -> Vec<(String, String)> {
        let platform_key = if self.is_version_at_least(PLURALIZED_PLATFORM_PARAMS_VERSION) {
            "platform_ids"
        } else {
            "platform_id"
        };

        let mut params = Vec::new();
        if let Some(id) = platform_id {
            params.push((platform_key.to_string(), id.to_string()));
        }
        if let Some(term) = search_term {
            params.push(("search_term".to_string(), term.to_string()));
        }
        params.push(("order_by".to_string(), order_by.to_string()));
        params.push(("order_dir".to_string(), order_dir.to_string()));
        params.push(("limit".to_string(), limit.to_string()));
        params.push(("offset".to_string(), offset.to_string()));
        params
    }
}
