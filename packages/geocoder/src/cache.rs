//! Persistent coordinate-to-region cache.
//!
//! Stored as a single JSON document:
//!
//! ```json
//! { "version": 1, "entries": { "-6.20000,106.81666": "Jakarta Pusat" } }
//! ```
//!
//! A missing file is the normal first-run state and yields an empty
//! cache. A file that exists but cannot be read or parsed is reported as a
//! [`CacheError`] so a corrupt cache is never mistaken for an empty one.
//! Unknown top-level fields are ignored, so newer writers stay readable.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use device_risk_models::CoordinateKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current on-disk format version.
const CACHE_VERSION: u32 = 1;

/// Default cache file name, relative to the working directory.
pub const DEFAULT_CACHE_FILE: &str = "region_cache.json";

/// Errors loading or saving the region cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The file exists but could not be read, or could not be written.
    #[error("Region cache I/O error at {}: {source}", path.display())]
    Io {
        /// Cache file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file exists but is not a valid cache document.
    #[error(
        "Region cache at {} is corrupt ({source}); move or delete it to start a fresh cache",
        path.display()
    )]
    Corrupt {
        /// Cache file path.
        path: PathBuf,
        /// Underlying parse error.
        source: serde_json::Error,
    },

    /// The in-memory cache could not be serialized.
    #[error("Failed to serialize region cache: {0}")]
    Serialize(serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    entries: BTreeMap<CoordinateKey, String>,
}

/// Mapping from rounded coordinate to resolved region name.
///
/// Entries are write-once: [`Self::put`] never replaces an existing value,
/// so a key keeps the same answer for the lifetime of the cache file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionCache {
    entries: BTreeMap<CoordinateKey, String>,
}

impl RegionCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the cache from `path`, returning an empty cache if the file
    /// does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] if the file exists but cannot be read, or
    /// [`CacheError::Corrupt`] if its contents are not a cache document.
    pub fn load(path: &Path) -> Result<Self, CacheError> {
        let contents = match std::fs::read(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::info!(
                    "Region cache not found at {}, starting a new one",
                    path.display()
                );
                return Ok(Self::new());
            }
            Err(source) => {
                return Err(CacheError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let file: CacheFile =
            serde_json::from_slice(&contents).map_err(|source| CacheError::Corrupt {
                path: path.to_path_buf(),
                source,
            })?;

        if file.version > CACHE_VERSION {
            log::warn!(
                "Region cache {} has version {} (newer than {CACHE_VERSION}); reading entries as-is",
                path.display(),
                file.version
            );
        }

        log::info!(
            "Region cache loaded from {} ({} coordinates)",
            path.display(),
            file.entries.len()
        );

        Ok(Self {
            entries: file.entries,
        })
    }

    /// Writes the full cache to `path`, replacing any previous file.
    ///
    /// Writes to a sibling `.tmp` file first and renames it into place, so
    /// an interrupted save leaves the previous cache intact.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if serialization or any file operation fails.
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        let file = CacheFile {
            version: CACHE_VERSION,
            entries: self.entries.clone(),
        };
        let contents = serde_json::to_string_pretty(&file).map_err(CacheError::Serialize)?;

        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let io_err = |source: std::io::Error| CacheError::Io {
            path: path.to_path_buf(),
            source,
        };
        std::fs::write(&tmp_path, contents).map_err(io_err)?;
        std::fs::rename(&tmp_path, path).map_err(io_err)?;

        log::info!(
            "Region cache saved to {} ({} coordinates)",
            path.display(),
            self.entries.len()
        );
        Ok(())
    }

    /// Returns the cached region for `key`.
    #[must_use]
    pub fn get(&self, key: &CoordinateKey) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Stores `region` for `key` unless the key is already cached.
    ///
    /// Returns the value now associated with the key, which is the
    /// previously cached one if there was one.
    pub fn put(&mut self, key: CoordinateKey, region: String) -> &str {
        self.entries.entry(key).or_insert(region)
    }

    /// Number of cached coordinates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over cached entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&CoordinateKey, &str)> {
        self.entries.iter().map(|(k, v)| (k, v.as_str()))
    }
}
