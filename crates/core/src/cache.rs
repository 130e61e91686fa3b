//! On-disk cache of fetched resources, keyed by URL (§4.4.6 "Resource
//! cache"), grounded on `WebsiteAnalyzer`'s pickle-backed `_cache` dict --
//! reimplemented here with a typed, `postcard`-encoded wire format instead
//! of an untyped pickle blob.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::resource::{Fetched, Headers};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub status_code: u16,
    pub final_url: String,
    pub content_type: Option<String>,
    pub headers: Headers,
    pub body: Vec<u8>,
}

/// Build a [`CacheEntry`] from a successful fetch outcome; `None` for
/// failures, which are never cached (§4.4.6).
#[must_use]
pub fn entry_for(fetched: &Fetched) -> Option<CacheEntry> {
    match fetched {
        Fetched::Success {
            status_code,
            final_url,
            content_type,
            headers,
            body,
        } => Some(CacheEntry {
            status_code: *status_code,
            final_url: final_url.clone(),
            content_type: content_type.clone(),
            headers: headers.clone(),
            body: body.clone(),
        }),
        Fetched::Failure { .. } => None,
    }
}

/// A `url -> cached successful fetch` map persisted between runs so a
/// repeated `analyze()` against the same site doesn't re-fetch unchanged
/// assets.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Cache {
    entries: HashMap<String, CacheEntry>,
}

impl Cache {
    /// Load a cache file, or start empty if it doesn't exist or fails to
    /// decode. A corrupt cache file is not a fatal error -- `analyze()`
    /// degrades to a cold-cache run rather than failing outright.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        match std::fs::read(path) {
            Ok(bytes) => postcard::from_bytes(&bytes).unwrap_or_else(|err| {
                tracing::warn!(?err, path = %path.display(), "cache file is corrupt, starting fresh");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Write the cache to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or writing the file fails.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let bytes = postcard::to_allocvec(self)
            .map_err(|err| std::io::Error::other(err.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, bytes)
    }

    #[must_use]
    pub fn get(&self, url: &str) -> Option<&CacheEntry> {
        self.entries.get(url)
    }

    pub fn insert(&mut self, url: String, entry: CacheEntry) {
        self.entries.insert(url, entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_postcard() {
        let mut cache = Cache::default();
        cache.insert(
            "https://example.com/a.js".to_string(),
            CacheEntry {
                status_code: 200,
                final_url: "https://example.com/a.js".to_string(),
                content_type: Some("application/javascript".to_string()),
                headers: HashMap::new(),
                body: b"var x = 1;".to_vec(),
            },
        );
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.postcard");
        cache.save(&path).unwrap();

        let loaded = Cache::load(&path);
        assert_eq!(loaded.get("https://example.com/a.js").unwrap().status_code, 200);
    }

    #[test]
    fn missing_file_loads_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.postcard");
        let cache = Cache::load(&path);
        assert!(cache.get("anything").is_none());
    }

    #[test]
    fn corrupt_file_loads_empty_cache_instead_of_failing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.postcard");
        std::fs::write(&path, b"not postcard data at all, much too short to decode").unwrap();
        let cache = Cache::load(&path);
        assert!(cache.get("anything").is_none());
    }
}
