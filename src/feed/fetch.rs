// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use bytes::Bytes;
use url::Url;

use crate::error::FeedError;
use crate::http::HttpClient;
use crate::proxy::FETCH_RSS_PATH;

use super::parse::{Episode, Feed, ParsedFeed, parse_feed};

/// Name shown for a feed whose metadata could not be fetched
pub const INVALID_FEED_NAME: &str = "Invalid Feed";

/// Where feed documents are fetched from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FeedSource {
    /// Fetch the feed URL directly
    #[default]
    Direct,
    /// Relay every fetch through a podshelf proxy at this base URL
    Proxy { base: Url },
}

impl FeedSource {
    /// The URL actually requested for a given feed URL
    pub fn request_url(&self, feed_url: &str) -> Result<String, FeedError> {
        match self {
            FeedSource::Direct => Ok(feed_url.to_string()),
            FeedSource::Proxy { base } => {
                // Resolve relative to the base path, so `http://host/sub` means `http://host/sub/`
                let mut base = base.clone();
                if !base.path().ends_with('/') {
                    let path = format!("{}/", base.path());
                    base.set_path(&path);
                }

                let mut endpoint = base.join(FETCH_RSS_PATH.trim_start_matches('/'))?;
                endpoint.query_pairs_mut().append_pair("url", feed_url);
                Ok(endpoint.into())
            }
        }
    }
}

/// Outcome of a metadata lookup for a feed URL
#[derive(Debug)]
pub enum FeedMetadata {
    Resolved(Feed),
    Invalid { url: String, reason: FeedError },
}

impl FeedMetadata {
    pub fn is_valid(&self) -> bool {
        matches!(self, FeedMetadata::Resolved(_))
    }

    /// The feed entry to display, using the "Invalid Feed" placeholder on failure
    pub fn into_feed(self) -> Feed {
        match self {
            FeedMetadata::Resolved(feed) => feed,
            FeedMetadata::Invalid { url, .. } => Feed {
                url,
                name: Some(INVALID_FEED_NAME.to_string()),
                image: None,
            },
        }
    }
}

/// Fetch raw feed bytes (without parsing), rejecting non-2xx responses
pub async fn fetch_feed_bytes<C: HttpClient + ?Sized>(
    client: &C,
    source: &FeedSource,
    url: &str,
) -> Result<Bytes, FeedError> {
    if url.trim().is_empty() {
        return Err(FeedError::EmptyUrl);
    }

    let request_url = source.request_url(url)?;
    tracing::debug!(feed = url, request = %request_url, "Fetching feed");

    let response = client
        .get_bytes(&request_url)
        .await
        .map_err(|e| FeedError::FetchFailed {
            url: url.to_string(),
            source: e,
        })?;

    if !response.is_success() {
        return Err(FeedError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    Ok(response.body)
}

/// Fetch and parse a podcast feed
pub async fn fetch_feed<C: HttpClient + ?Sized>(
    client: &C,
    source: &FeedSource,
    url: &str,
) -> Result<ParsedFeed, FeedError> {
    let bytes = fetch_feed_bytes(client, source, url).await?;
    parse_feed(&bytes)
}

/// Fetch channel metadata for a feed URL; failures become `FeedMetadata::Invalid`
pub async fn fetch_feed_metadata<C: HttpClient + ?Sized>(
    client: &C,
    source: &FeedSource,
    url: &str,
) -> FeedMetadata {
    match fetch_feed(client, source, url).await {
        Ok(parsed) => FeedMetadata::Resolved(parsed.to_feed(url)),
        Err(reason) => {
            tracing::warn!(feed = url, error = %reason, "Error fetching podcast metadata");
            FeedMetadata::Invalid {
                url: url.to_string(),
                reason,
            }
        }
    }
}

/// Fetch the oldest-first episode list of a feed
pub async fn try_fetch_episodes<C: HttpClient + ?Sized>(
    client: &C,
    source: &FeedSource,
    url: &str,
) -> Result<Vec<Episode>, FeedError> {
    Ok(fetch_feed(client, source, url).await?.episodes)
}

/// Fetch the oldest-first episode list of a feed; failures yield an empty list
pub async fn fetch_episodes<C: HttpClient + ?Sized>(
    client: &C,
    source: &FeedSource,
    url: &str,
) -> Vec<Episode> {
    try_fetch_episodes(client, source, url)
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(feed = url, error = %e, "Error fetching episodes");
            Vec::new()
        })
}

/// Determine if a string looks like an HTTP(S) URL
pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}
