// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;
use url::Url;

use crate::error::CacheError;

use super::filename::{cache_file_name, key_digest};

/// Namespace all cached audio lives under
pub const CACHE_NAMESPACE: &str = "audio-cache";

/// A freshly opened handle to cached audio bytes
///
/// Disk entries are not read until [`CachedObject::read`] is called.
#[derive(Debug, Clone)]
pub struct CachedObject {
    /// The URL the bytes were fetched from
    pub key: String,
    /// Local reference that can be handed to an audio sink
    pub object_url: String,
    /// Size of the cached audio in bytes
    pub len: u64,
    contents: Contents,
}

#[derive(Debug, Clone)]
enum Contents {
    Loaded(Bytes),
    File(PathBuf),
}

impl CachedObject {
    /// The cached audio bytes
    pub async fn read(&self) -> Result<Bytes, CacheError> {
        match &self.contents {
            Contents::Loaded(bytes) => Ok(bytes.clone()),
            Contents::File(path) => tokio::fs::read(path)
                .await
                .map(Bytes::from)
                .map_err(io_error(path)),
        }
    }
}

/// Content-addressable store of audio bytes keyed by their source URL
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn contains(&self, key: &str) -> Result<bool, CacheError>;

    async fn open(&self, key: &str) -> Result<Option<CachedObject>, CacheError>;

    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), CacheError>;

    /// Returns whether an entry was removed
    async fn remove(&self, key: &str) -> Result<bool, CacheError>;
}

/// In-process cache store
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, Bytes>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn contains(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.read().await.contains_key(key))
    }

    async fn open(&self, key: &str) -> Result<Option<CachedObject>, CacheError> {
        Ok(self.entries.read().await.get(key).map(|bytes| CachedObject {
            key: key.to_string(),
            object_url: format!("memory://{}/{}", CACHE_NAMESPACE, key_digest(key)),
            len: bytes.len() as u64,
            contents: Contents::Loaded(bytes.clone()),
        }))
    }

    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), CacheError> {
        self.entries.write().await.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.write().await.remove(key).is_some())
    }
}

/// Cache store keeping one file per entry under `<root>/audio-cache/`
#[derive(Debug, Clone)]
pub struct DiskCacheStore {
    dir: PathBuf,
}

impl DiskCacheStore {
    pub fn new(root: &Path) -> Self {
        Self {
            dir: root.join(CACHE_NAMESPACE),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(cache_file_name(key))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CacheError + '_ {
    move |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl CacheStore for DiskCacheStore {
    async fn contains(&self, key: &str) -> Result<bool, CacheError> {
        let path = self.path_for(key);
        tokio::fs::try_exists(&path).await.map_err(io_error(&path))
    }

    async fn open(&self, key: &str) -> Result<Option<CachedObject>, CacheError> {
        let path = self.path_for(key);
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path)(e)),
        };

        let object_url = Url::from_file_path(&path).map_err(|_| {
            CacheError::Unavailable(format!("{} is not an absolute path", path.display()))
        })?;

        Ok(Some(CachedObject {
            key: key.to_string(),
            object_url: object_url.into(),
            len: metadata.len(),
            contents: Contents::File(path),
        }))
    }

    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), CacheError> {
        let path = self.path_for(key);
        let partial = path.with_extension("partial");

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(io_error(&self.dir))?;

        // Readers never see a half-written entry
        tokio::fs::write(&partial, &bytes)
            .await
            .map_err(io_error(&partial))?;
        tokio::fs::rename(&partial, &path)
            .await
            .map_err(io_error(&path))?;

        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(&path)(e)),
        }
    }
}
