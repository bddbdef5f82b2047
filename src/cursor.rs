//! Persisted source-to-cursor mapping
//!
//! The cursor for a source is the canonical page URL of the newest item
//! observed at the end of its last successful sync. The whole mapping is
//! loaded once at run start and rewritten once at run end; individual
//! entries are updated in memory after each source's batch completes.
//!
//! Saves go through a sibling temp file renamed into place, so an
//! interrupt mid-write can never leave a truncated state file behind.

use crate::error::{PersistenceError, Result};
use crate::types::Source;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// In-memory cursor mapping with JSON file persistence
///
/// Keys are [`Source::key`] values; a `BTreeMap` keeps the persisted file
/// stable under re-serialization so state diffs stay readable.
#[derive(Clone, Debug, Default)]
pub struct CursorStore {
    cursors: BTreeMap<String, String>,
}

impl CursorStore {
    /// Load the mapping from `path`
    ///
    /// A missing file is a first run and yields an empty store. An
    /// unreadable or unparsable file is a [`PersistenceError`], fatal to
    /// the run: silently starting from scratch would re-download every
    /// tracked gallery.
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no state file, starting fresh");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(PersistenceError::ReadFailed {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                }
                .into());
            }
        };

        let cursors: BTreeMap<String, String> =
            serde_json::from_str(&contents).map_err(|e| PersistenceError::Corrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        tracing::debug!(
            path = %path.display(),
            sources = cursors.len(),
            "loaded cursor state"
        );
        Ok(Self { cursors })
    }

    /// Write the mapping to `path` atomically (temp file + rename)
    pub async fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.cursors).map_err(|e| {
            PersistenceError::WriteFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| write_failed(path, &e))?;
        }

        let tmp_path = tmp_sibling(path);
        tokio::fs::write(&tmp_path, json)
            .await
            .map_err(|e| write_failed(path, &e))?;
        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|e| write_failed(path, &e))?;

        tracing::debug!(
            path = %path.display(),
            sources = self.cursors.len(),
            "saved cursor state"
        );
        Ok(())
    }

    /// Cursor of the newest synced item for `source`, if one is stored
    pub fn get(&self, source: &Source) -> Option<&str> {
        self.cursors.get(&source.key()).map(String::as_str)
    }

    /// Record `cursor` as the newest synced item for `source`
    pub fn set(&mut self, source: &Source, cursor: impl Into<String>) {
        self.cursors.insert(source.key(), cursor.into());
    }

    /// Number of sources with a stored cursor
    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    /// True when no source has a stored cursor
    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}

fn write_failed(path: &Path, e: &std::io::Error) -> PersistenceError {
    PersistenceError::WriteFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[tokio::test]
    async fn missing_file_loads_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = CursorStore::load(&dir.path().join("state.json")).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn set_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut store = CursorStore::default();
        let gallery = Source::gallery("artist-a");
        let favourites = Source::favourites("artist-a");
        store.set(&gallery, "https://www.deviantart.com/artist-a/art/Piece-42");
        store.set(&favourites, "https://www.deviantart.com/other/art/Fav-7");
        store.save(&path).await.unwrap();

        let loaded = CursorStore::load(&path).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(
            loaded.get(&gallery),
            Some("https://www.deviantart.com/artist-a/art/Piece-42")
        );
        assert_eq!(
            loaded.get(&favourites),
            Some("https://www.deviantart.com/other/art/Fav-7")
        );
    }

    #[tokio::test]
    async fn gallery_and_favourites_cursors_are_independent() {
        let mut store = CursorStore::default();
        let gallery = Source::gallery("a");
        let favourites = Source::favourites("a");
        store.set(&gallery, "g-cursor");
        assert_eq!(store.get(&gallery), Some("g-cursor"));
        assert_eq!(store.get(&favourites), None);
    }

    #[tokio::test]
    async fn corrupt_file_is_a_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let result = CursorStore::load(&path).await;
        assert!(matches!(
            result,
            Err(Error::Persistence(PersistenceError::Corrupt { .. }))
        ));
    }

    #[tokio::test]
    async fn save_leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut store = CursorStore::default();
        store.set(&Source::gallery("a"), "cursor");
        store.save(&path).await.unwrap();

        assert!(path.exists());
        assert!(!dir.path().join("state.json.tmp").exists());
    }

    #[tokio::test]
    async fn save_creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let store = CursorStore::default();
        store.save(&path).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn save_overwrites_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let source = Source::gallery("a");

        let mut store = CursorStore::default();
        store.set(&source, "old");
        store.save(&path).await.unwrap();

        store.set(&source, "new");
        store.save(&path).await.unwrap();

        let loaded = CursorStore::load(&path).await.unwrap();
        assert_eq!(loaded.get(&source), Some("new"));
    }
}
