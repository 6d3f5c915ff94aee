// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::CacheError;
use crate::http::SharedHttpClient;
use crate::progress::{ProgressEvent, SharedProgressReporter};
use crate::storage::{OFFLINE_EPISODES_KEY, SharedStore, load_collection, save_collection};

use super::download::download_audio;
use super::store::{CacheStore, CachedObject};

/// Result of asking for an episode to be cached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOutcome {
    /// The URL was already cached; nothing was fetched
    AlreadyCached,
    /// The URL was fetched and stored
    Downloaded { bytes: u64, hash: String },
}

/// What to hand to the audio sink for an episode
#[derive(Debug, Clone)]
pub enum Playable {
    /// Local bytes from the cache
    Cached(CachedObject),
    /// Stream from the network
    Network(String),
}

impl Playable {
    /// URL the audio sink should open
    pub fn url(&self) -> &str {
        match self {
            Playable::Cached(object) => &object.object_url,
            Playable::Network(url) => url,
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, Playable::Cached(_))
    }
}

/// Offline audio cache keyed by episode URL, with a persisted inventory
///
/// Overlapping `ensure_cached` calls for the same URL are serialized, so a
/// URL is fetched at most once.
pub struct EpisodeCache {
    client: SharedHttpClient,
    store: Arc<dyn CacheStore>,
    inventory_store: SharedStore,
    inventory: Mutex<Vec<String>>,
    /// One lock per URL with a caching call in progress
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    reporter: SharedProgressReporter,
}

impl EpisodeCache {
    pub fn new(
        client: SharedHttpClient,
        store: Arc<dyn CacheStore>,
        inventory_store: SharedStore,
        reporter: SharedProgressReporter,
    ) -> Self {
        let mut inventory: Vec<String> =
            load_collection(inventory_store.as_ref(), OFFLINE_EPISODES_KEY);
        dedup_in_order(&mut inventory);

        Self {
            client,
            store,
            inventory_store,
            inventory: Mutex::new(inventory),
            in_flight: Mutex::new(HashMap::new()),
            reporter,
        }
    }

    /// Make sure `url` is cached, fetching it only if it is not a cache key yet
    pub async fn ensure_cached(&self, url: &str) -> Result<CacheOutcome, CacheError> {
        let key_lock = self.in_flight.lock().await.entry(url.to_string()).or_default().clone();

        let outcome = {
            let _guard = key_lock.lock().await;
            self.fetch_if_missing(url).await
        };

        let mut in_flight = self.in_flight.lock().await;
        // Only the map and this call still hold the lock: nobody else is waiting
        if Arc::strong_count(&key_lock) == 2 {
            in_flight.remove(url);
        }

        outcome
    }

    async fn fetch_if_missing(&self, url: &str) -> Result<CacheOutcome, CacheError> {
        if self.store.contains(url).await? {
            tracing::debug!(url, "Audio already cached");
            self.record(url).await?;
            self.reporter.report(ProgressEvent::AlreadyCached {
                url: url.to_string(),
            });
            return Ok(CacheOutcome::AlreadyCached);
        }

        let audio = match download_audio(self.client.as_ref(), url, &self.reporter).await {
            Ok(audio) => audio,
            Err(e) => {
                self.reporter.report(ProgressEvent::DownloadFailed {
                    url: url.to_string(),
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        let bytes = audio.bytes.len() as u64;
        self.store.put(url, audio.bytes).await?;
        self.record(url).await?;

        tracing::info!(url, bytes, hash = %audio.hash, "Cached audio for offline playback");
        self.reporter.report(ProgressEvent::DownloadCompleted {
            url: url.to_string(),
            bytes_downloaded: bytes,
            hash: audio.hash.clone(),
        });

        Ok(CacheOutcome::Downloaded {
            bytes,
            hash: audio.hash,
        })
    }

    /// Cached bytes for `url` if present, the network URL otherwise
    ///
    /// Cache failures are logged and fall back to streaming.
    pub async fn resolve_playable(&self, url: &str) -> Playable {
        match self.store.open(url).await {
            Ok(Some(object)) => Playable::Cached(object),
            Ok(None) => Playable::Network(url.to_string()),
            Err(e) => {
                tracing::warn!(url, error = %e, "Error retrieving cached audio, streaming instead");
                Playable::Network(url.to_string())
            }
        }
    }

    /// Drop a cached entry and its inventory record
    pub async fn evict(&self, url: &str) -> Result<bool, CacheError> {
        let removed = self.store.remove(url).await?;

        let mut inventory = self.inventory.lock().await;
        if inventory.iter().any(|u| u == url) {
            let remaining: Vec<String> = inventory.iter().filter(|u| *u != url).cloned().collect();
            save_collection(self.inventory_store.as_ref(), OFFLINE_EPISODES_KEY, &remaining)?;
            *inventory = remaining;
        }

        Ok(removed)
    }

    /// URLs cached for offline playback, in the order they were cached
    pub async fn inventory(&self) -> Vec<String> {
        self.inventory.lock().await.clone()
    }

    async fn record(&self, url: &str) -> Result<(), CacheError> {
        let mut inventory = self.inventory.lock().await;
        if inventory.iter().any(|u| u == url) {
            return Ok(());
        }

        let mut updated = inventory.clone();
        updated.push(url.to_string());
        save_collection(self.inventory_store.as_ref(), OFFLINE_EPISODES_KEY, &updated)?;
        *inventory = updated;
        Ok(())
    }
}

fn dedup_in_order(urls: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    urls.retain(|url| seen.insert(url.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::cache::store::MemoryCacheStore;
    use crate::http::{ByteStream, HttpBody, HttpClient, HttpResponse};
    use crate::progress::NoopReporter;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const EPISODE_URL: &str = "https://example.com/ep1.mp3";

    #[derive(Default)]
    struct CountingClient {
        fetches: AtomicUsize,
    }

    /// Yields before answering so overlapping downloads interleave
    #[derive(Default)]
    struct SlowClient {
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl HttpClient for SlowClient {
        async fn get_bytes(&self, _url: &str) -> Result<HttpBody, reqwest::Error> {
            unimplemented!("audio is streamed")
        }

        async fn get_stream(&self, _url: &str) -> Result<HttpResponse, reqwest::Error> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            for _ in 0..10 {
                tokio::task::yield_now().await;
            }

            let stream: ByteStream = Box::pin(futures::stream::once(async {
                Ok(Bytes::from_static(b"slow audio"))
            }));
            Ok(HttpResponse {
                status: 200,
                content_length: Some(10),
                body: stream,
            })
        }
    }

    #[async_trait]
    impl HttpClient for CountingClient {
        async fn get_bytes(&self, _url: &str) -> Result<HttpBody, reqwest::Error> {
            unimplemented!("audio is streamed")
        }

        async fn get_stream(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let status = if url.contains("missing") { 404 } else { 200 };
            let data = Bytes::from_static(b"fake audio");
            let len = data.len() as u64;

            let stream: ByteStream = Box::pin(futures::stream::once(async move { Ok(data) }));

            Ok(HttpResponse {
                status,
                content_length: Some(len),
                body: stream,
            })
        }
    }

    /// Cache store whose reads always fail
    struct FailingStore;

    #[async_trait]
    impl CacheStore for FailingStore {
        async fn contains(&self, _key: &str) -> Result<bool, CacheError> {
            Err(CacheError::Unavailable("disk gone".to_string()))
        }

        async fn open(&self, _key: &str) -> Result<Option<CachedObject>, CacheError> {
            Err(CacheError::Unavailable("disk gone".to_string()))
        }

        async fn put(&self, _key: &str, _bytes: Bytes) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("disk gone".to_string()))
        }

        async fn remove(&self, _key: &str) -> Result<bool, CacheError> {
            Err(CacheError::Unavailable("disk gone".to_string()))
        }
    }

    fn make_cache(client: Arc<CountingClient>, inventory_store: SharedStore) -> EpisodeCache {
        EpisodeCache::new(
            client,
            Arc::new(MemoryCacheStore::new()),
            inventory_store,
            NoopReporter::shared(),
        )
    }

    #[tokio::test]
    async fn ensure_cached_downloads_once() {
        let client = Arc::new(CountingClient::default());
        let cache = make_cache(client.clone(), MemoryStore::shared());

        let first = cache.ensure_cached(EPISODE_URL).await.unwrap();
        let second = cache.ensure_cached(EPISODE_URL).await.unwrap();

        assert!(matches!(first, CacheOutcome::Downloaded { bytes: 10, .. }));
        assert_eq!(second, CacheOutcome::AlreadyCached);
        assert_eq!(client.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn overlapping_requests_fetch_once() {
        let client = Arc::new(SlowClient::default());
        let cache = EpisodeCache::new(
            client.clone(),
            Arc::new(MemoryCacheStore::new()),
            MemoryStore::shared(),
            NoopReporter::shared(),
        );

        let (first, second) = tokio::join!(
            cache.ensure_cached(EPISODE_URL),
            cache.ensure_cached(EPISODE_URL)
        );

        let mut outcomes = [first.unwrap(), second.unwrap()];
        outcomes.sort_by_key(|outcome| matches!(outcome, CacheOutcome::AlreadyCached));
        assert!(matches!(outcomes[0], CacheOutcome::Downloaded { bytes: 10, .. }));
        assert_eq!(outcomes[1], CacheOutcome::AlreadyCached);
        assert_eq!(client.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(cache.inventory().await, vec![EPISODE_URL.to_string()]);
        assert!(cache.in_flight.lock().await.is_empty());
    }

    #[tokio::test]
    async fn resolve_playable_serves_cached_bytes_without_fetching() {
        let client = Arc::new(CountingClient::default());
        let cache = make_cache(client.clone(), MemoryStore::shared());
        cache.ensure_cached(EPISODE_URL).await.unwrap();

        let first = cache.resolve_playable(EPISODE_URL).await;
        let second = cache.resolve_playable(EPISODE_URL).await;

        assert!(first.is_cached());
        assert!(second.is_cached());
        match first {
            Playable::Cached(object) => assert_eq!(
                object.read().await.unwrap(),
                Bytes::from_static(b"fake audio")
            ),
            Playable::Network(_) => panic!("expected cached audio"),
        }
        assert_eq!(client.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn resolve_playable_falls_back_to_network_url() {
        let client = Arc::new(CountingClient::default());
        let cache = make_cache(client.clone(), MemoryStore::shared());

        let playable = cache.resolve_playable(EPISODE_URL).await;

        assert!(!playable.is_cached());
        assert_eq!(playable.url(), EPISODE_URL);
        assert_eq!(client.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn resolve_playable_degrades_on_cache_error() {
        let cache = EpisodeCache::new(
            Arc::new(CountingClient::default()),
            Arc::new(FailingStore),
            MemoryStore::shared(),
            NoopReporter::shared(),
        );

        let playable = cache.resolve_playable(EPISODE_URL).await;

        assert_eq!(playable.url(), EPISODE_URL);
    }

    #[tokio::test]
    async fn ensure_cached_reports_http_errors() {
        let client = Arc::new(CountingClient::default());
        let store = MemoryStore::shared();
        let cache = make_cache(client, store.clone());

        let result = cache.ensure_cached("https://example.com/missing.mp3").await;

        assert!(matches!(
            result,
            Err(CacheError::HttpStatus { status: 404, .. })
        ));
        assert!(cache.inventory().await.is_empty());
        assert!(store.get(OFFLINE_EPISODES_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn inventory_is_persisted_without_duplicates() {
        let client = Arc::new(CountingClient::default());
        let store = MemoryStore::shared();
        let cache = make_cache(client, store.clone());

        cache.ensure_cached(EPISODE_URL).await.unwrap();
        cache.ensure_cached(EPISODE_URL).await.unwrap();
        cache
            .ensure_cached("https://example.com/ep2.mp3")
            .await
            .unwrap();

        let expected = vec![
            EPISODE_URL.to_string(),
            "https://example.com/ep2.mp3".to_string(),
        ];
        assert_eq!(cache.inventory().await, expected);
        let stored: Vec<String> = load_collection(store.as_ref(), OFFLINE_EPISODES_KEY);
        assert_eq!(stored, expected);
    }

    #[tokio::test]
    async fn inventory_load_drops_duplicates() {
        let store = MemoryStore::shared();
        store
            .set(OFFLINE_EPISODES_KEY, r#"["a","b","a","c","b"]"#)
            .unwrap();

        let cache = make_cache(Arc::new(CountingClient::default()), store);

        assert_eq!(cache.inventory().await, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn evict_removes_entry_and_inventory_record() {
        let client = Arc::new(CountingClient::default());
        let cache = make_cache(client.clone(), MemoryStore::shared());
        cache.ensure_cached(EPISODE_URL).await.unwrap();

        assert!(cache.evict(EPISODE_URL).await.unwrap());

        assert!(cache.inventory().await.is_empty());
        assert!(!cache.resolve_playable(EPISODE_URL).await.is_cached());
        cache.ensure_cached(EPISODE_URL).await.unwrap();
        assert_eq!(client.fetches.load(Ordering::SeqCst), 2);
    }
}
