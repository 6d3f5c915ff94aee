use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;
use crate::feed::FeedSource;
use crate::registry::DuplicatePolicy;

/// Runtime settings, read from an optional TOML file
///
/// Every field has a default so a partial (or empty) file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Where subscriptions, history and cached audio live
    pub data_dir: Option<PathBuf>,
    /// Listen address for `serve`
    pub bind: SocketAddr,
    /// Base URL of a feed proxy; feeds are fetched directly when unset
    pub proxy_base: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub user_agent: Option<String>,
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            proxy_base: None,
            request_timeout_secs: None,
            user_agent: None,
            duplicate_policy: DuplicatePolicy::default(),
        }
    }
}

impl AppConfig {
    /// Read a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&contents, path)
    }

    /// Parse config contents; `path` is only used in error messages
    pub fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Configured data directory, or the platform's per-user data directory
    pub fn resolve_data_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }

        ProjectDirs::from("", "", "podshelf")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or(ConfigError::NoDataDir)
    }

    /// How feeds should be fetched
    pub fn feed_source(&self) -> Result<FeedSource, ConfigError> {
        match &self.proxy_base {
            Some(base) => Ok(FeedSource::Proxy {
                base: Url::parse(base)?,
            }),
            None => Ok(FeedSource::Direct),
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}
