// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;

use crate::error::StorageError;

/// Key holding the subscribed feed collection
pub const SUBSCRIPTIONS_KEY: &str = "rssFeeds";

/// Key holding the recently viewed feed collection
pub const RECENTLY_VIEWED_KEY: &str = "recentlyViewed";

/// Key holding the inventory of URLs cached for offline playback
pub const OFFLINE_EPISODES_KEY: &str = "offlineEpisodes";

/// A flat string key/value store holding serialized collections
pub trait KeyValueStore: Send + Sync {
    /// Read the raw value stored under `key`, if any
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replace the value stored under `key`
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// A shared reference to a key/value store
pub type SharedStore = Arc<dyn KeyValueStore>;

/// Volatile store, used for tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedStore {
        Arc::new(Self::new())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Store keeping each key in `<dir>/<key>.json`
///
/// Writes go through a temporary file in the same directory followed by a
/// rename, so a crash never leaves a truncated collection behind.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::ReadFailed { path, source: e }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        let write_failed = |source| StorageError::WriteFailed {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(&self.dir).map_err(write_failed)?;

        let mut temp = NamedTempFile::new_in(&self.dir).map_err(write_failed)?;
        temp.write_all(value.as_bytes()).map_err(write_failed)?;
        temp.flush().map_err(write_failed)?;
        temp.persist(&path).map_err(|e| write_failed(e.error))?;

        Ok(())
    }
}

/// Load a serialized collection, treating absent or malformed data as empty
pub fn load_collection<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Vec<T> {
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(e) => {
            tracing::warn!(key, error = %e, "Failed to read stored collection, starting empty");
            return Vec::new();
        }
    };

    serde_json::from_str(&raw).unwrap_or_else(|e| {
        tracing::warn!(key, error = %e, "Stored collection is malformed, starting empty");
        Vec::new()
    })
}

/// Serialize and store a whole collection under `key`
pub fn save_collection<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    items: &[T],
) -> Result<(), StorageError> {
    let json = serde_json::to_string(items).map_err(|e| StorageError::SerializeFailed {
        key: key.to_string(),
        source: e,
    })?;
    store.set(key, &json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::Feed;
    use tempfile::tempdir;

    fn make_feed(url: &str) -> Feed {
        Feed {
            url: url.to_string(),
            name: Some("Podcast".to_string()),
            image: None,
        }
    }

    #[test]
    fn memory_store_returns_none_for_missing_key() {
        let store = MemoryStore::new();
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn memory_store_overwrites_values() {
        let store = MemoryStore::new();
        store.set("k", "one").unwrap();
        store.set("k", "two").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("two"));
    }

    #[test]
    fn file_store_creates_directory_on_write() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("data"));

        store.set(SUBSCRIPTIONS_KEY, "[]").unwrap();

        assert!(dir.path().join("nested/data/rssFeeds.json").exists());
        assert_eq!(store.get(SUBSCRIPTIONS_KEY).unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn file_store_missing_key_is_none() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(store.get(RECENTLY_VIEWED_KEY).unwrap().is_none());
    }

    #[test]
    fn load_collection_defaults_to_empty_when_absent() {
        let store = MemoryStore::new();
        let feeds: Vec<Feed> = load_collection(&store, SUBSCRIPTIONS_KEY);
        assert!(feeds.is_empty());
    }

    #[test]
    fn load_collection_tolerates_malformed_data() {
        let store = MemoryStore::new();
        store.set(SUBSCRIPTIONS_KEY, "{not json").unwrap();

        let feeds: Vec<Feed> = load_collection(&store, SUBSCRIPTIONS_KEY);
        assert!(feeds.is_empty());
    }

    #[test]
    fn saved_collection_is_a_plain_json_array() {
        let store = MemoryStore::new();
        save_collection(&store, SUBSCRIPTIONS_KEY, &[make_feed("https://a.example/rss")]).unwrap();

        let raw = store.get(SUBSCRIPTIONS_KEY).unwrap().unwrap();
        assert_eq!(
            raw,
            r#"[{"url":"https://a.example/rss","name":"Podcast","image":null}]"#
        );

        let feeds: Vec<Feed> = load_collection(&store, SUBSCRIPTIONS_KEY);
        assert_eq!(feeds, vec![make_feed("https://a.example/rss")]);
    }
}
