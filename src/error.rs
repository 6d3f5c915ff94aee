use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when fetching or parsing RSS feeds
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Failed to fetch feed from {url}: {source}")]
    FetchFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} while fetching feed from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Failed to parse RSS feed: {0}")]
    ParseFailed(#[from] rss::Error),

    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("RSS feed URL is empty")]
    EmptyUrl,
}

/// Errors raised by a key/value persistence backend
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to read {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize collection '{key}': {source}")]
    SerializeFailed {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Errors that can occur while mutating the feed registry
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Please enter a valid RSS feed URL")]
    EmptyUrl,

    #[error("Failed to fetch RSS feed {url}: {reason}")]
    InvalidFeed { url: String, reason: FeedError },

    #[error("Already subscribed to {0}")]
    AlreadySubscribed(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors that can occur while caching episode audio
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("HTTP request failed for {url}: {source}")]
    HttpFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Stream error while downloading {url}: {source}")]
    StreamFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Cache I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cache store unavailable: {0}")]
    Unavailable(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors reported by player actions
#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("No episodes are loaded yet")]
    NotReady,

    #[error("Episode '{title}' has no audio URL")]
    NoAudio { title: String },

    #[error("Failed to download the episode: {0}")]
    Cache(#[from] CacheError),
}

/// Errors that can occur while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid proxy base URL: {0}")]
    InvalidProxyBase(#[from] url::ParseError),

    #[error("No data directory could be determined; pass --data-dir")]
    NoDataDir,
}
