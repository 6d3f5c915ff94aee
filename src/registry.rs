// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::RegistryError;
use crate::feed::{Feed, FeedMetadata, FeedSource, fetch_feed_metadata};
use crate::http::HttpClient;
use crate::storage::{
    RECENTLY_VIEWED_KEY, SUBSCRIPTIONS_KEY, SharedStore, load_collection, save_collection,
};

/// Maximum number of entries kept in the recently viewed list
pub const RECENTLY_VIEWED_LIMIT: usize = 3;

/// What to do when a feed URL is added a second time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Append another entry for the same URL
    #[default]
    Allow,
    /// Refuse with `RegistryError::AlreadySubscribed`
    Reject,
}

#[derive(Debug, Default)]
struct RegistryState {
    feeds: Vec<Feed>,
    recent: Vec<Feed>,
}

/// Subscribed feeds plus the recently viewed list, persisted after every mutation
///
/// Each mutation rewrites the whole affected collection. The state lock is
/// held across the read-modify-write so overlapping calls are applied one
/// after the other.
pub struct FeedRegistry {
    store: SharedStore,
    policy: DuplicatePolicy,
    state: Mutex<RegistryState>,
}

impl FeedRegistry {
    /// Rehydrate both collections from the store
    pub fn load(store: SharedStore, policy: DuplicatePolicy) -> Self {
        let feeds: Vec<Feed> = load_collection(store.as_ref(), SUBSCRIPTIONS_KEY);
        let stored_recent: Vec<Feed> = load_collection(store.as_ref(), RECENTLY_VIEWED_KEY);

        let recent = stored_recent
            .into_iter()
            .rev()
            .fold(Vec::new(), |list, feed| push_recent(list, feed));

        tracing::debug!(
            feeds = feeds.len(),
            recently_viewed = recent.len(),
            "Loaded feed registry"
        );

        Self {
            store,
            policy,
            state: Mutex::new(RegistryState { feeds, recent }),
        }
    }

    pub async fn feeds(&self) -> Vec<Feed> {
        self.state.lock().await.feeds.clone()
    }

    pub async fn recently_viewed(&self) -> Vec<Feed> {
        self.state.lock().await.recent.clone()
    }

    /// First subscribed entry for `url`
    pub async fn find(&self, url: &str) -> Option<Feed> {
        self.state
            .lock()
            .await
            .feeds
            .iter()
            .find(|feed| feed.url == url)
            .cloned()
    }

    /// Fetch metadata for `url` and subscribe to it
    pub async fn add_feed<C: HttpClient + ?Sized>(
        &self,
        client: &C,
        source: &FeedSource,
        url: &str,
    ) -> Result<Feed, RegistryError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(RegistryError::EmptyUrl);
        }

        if self.policy == DuplicatePolicy::Reject && self.find(url).await.is_some() {
            return Err(RegistryError::AlreadySubscribed(url.to_string()));
        }

        // Fetch outside the lock
        let feed = match fetch_feed_metadata(client, source, url).await {
            FeedMetadata::Resolved(feed) => feed,
            FeedMetadata::Invalid { url, reason } => {
                return Err(RegistryError::InvalidFeed { url, reason });
            }
        };

        let mut state = self.state.lock().await;
        if self.policy == DuplicatePolicy::Reject && state.feeds.iter().any(|f| f.url == url) {
            return Err(RegistryError::AlreadySubscribed(url.to_string()));
        }

        let mut feeds = state.feeds.clone();
        feeds.push(feed.clone());
        save_collection(self.store.as_ref(), SUBSCRIPTIONS_KEY, &feeds)?;
        state.feeds = feeds;

        tracing::info!(feed = %feed.url, name = ?feed.name, "Subscribed to feed");
        Ok(feed)
    }

    /// Remove every subscribed entry matching `url`, returning how many were removed
    pub async fn remove_feed(&self, url: &str) -> Result<usize, RegistryError> {
        let mut state = self.state.lock().await;

        let feeds: Vec<Feed> = state
            .feeds
            .iter()
            .filter(|feed| feed.url != url)
            .cloned()
            .collect();
        let removed = state.feeds.len() - feeds.len();

        save_collection(self.store.as_ref(), SUBSCRIPTIONS_KEY, &feeds)?;
        state.feeds = feeds;

        tracing::info!(feed = url, removed, "Removed feed");
        Ok(removed)
    }

    /// Move `feed` to the front of the recently viewed list
    pub async fn record_view(&self, feed: Feed) -> Result<(), RegistryError> {
        let mut state = self.state.lock().await;

        let recent = push_recent(state.recent.clone(), feed);
        save_collection(self.store.as_ref(), RECENTLY_VIEWED_KEY, &recent)?;
        state.recent = recent;

        Ok(())
    }
}

/// Insert `feed` at the front, dropping any older entry with the same URL and
/// anything past the limit
fn push_recent(list: Vec<Feed>, feed: Feed) -> Vec<Feed> {
    std::iter::once(feed.clone())
        .chain(list.into_iter().filter(|f| f.url != feed.url))
        .take(RECENTLY_VIEWED_LIMIT)
        .collect()
}
