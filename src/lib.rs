pub mod cache;
pub mod config;
pub mod error;
pub mod feed;
pub mod http;
pub mod player;
pub mod progress;
pub mod proxy;
pub mod registry;
pub mod storage;

// Re-export main types for convenience
pub use cache::{
    CacheOutcome, CacheStore, CachedObject, DiskCacheStore, EpisodeCache, MemoryCacheStore,
    Playable,
};
pub use config::AppConfig;
pub use error::{CacheError, ConfigError, FeedError, PlayerError, RegistryError, StorageError};
pub use feed::{
    Episode, Feed, FeedMetadata, FeedSource, ParsedFeed, fetch_episodes, fetch_feed,
    fetch_feed_metadata, is_url, parse_feed,
};
pub use http::{HttpClient, HttpResponse, ReqwestClient, SharedHttpClient};
pub use player::{LoadOutcome, PlayerController, PlayerRoute, PlayerState, ReadyState};
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter};
pub use registry::{DuplicatePolicy, FeedRegistry};
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore, SharedStore};
