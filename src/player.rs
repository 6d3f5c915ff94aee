// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;
use url::form_urlencoded;

use crate::cache::{CacheOutcome, EpisodeCache, Playable};
use crate::error::PlayerError;
use crate::feed::{Episode, FeedSource, fetch_episodes};
use crate::http::SharedHttpClient;
use crate::progress::{ProgressEvent, SharedProgressReporter};

/// Requested index meaning "the newest episode", clamped to the last one
pub const LATEST_EPISODE_INDEX: usize = 10_000;

/// Status shown while no episode can be played
pub const LOADING_MESSAGE: &str = "Loading episodes...";

/// Player location: which feed to open and which episode to start with
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerRoute {
    pub feed_url: Option<String>,
    pub index: usize,
}

impl PlayerRoute {
    /// Parse `rssfeed=<url>&index=<n>`; a missing or unparsable index is 0
    pub fn parse(query: &str) -> Self {
        let mut route = PlayerRoute::default();
        for (key, value) in form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
            match key.as_ref() {
                "rssfeed" if !value.is_empty() => route.feed_url = Some(value.into_owned()),
                "index" => route.index = value.trim().parse().unwrap_or(0),
                _ => {}
            }
        }
        route
    }

    pub fn for_feed(url: &str) -> Self {
        Self {
            feed_url: Some(url.to_string()),
            index: 0,
        }
    }

    /// Route used by "recently viewed" navigation: jump to the newest episode
    pub fn latest(url: &str) -> Self {
        Self {
            feed_url: Some(url.to_string()),
            index: LATEST_EPISODE_INDEX,
        }
    }

    pub fn to_query(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        if let Some(url) = &self.feed_url {
            serializer.append_pair("rssfeed", url);
        }
        if self.index != 0 {
            serializer.append_pair("index", &self.index.to_string());
        }
        serializer.finish()
    }
}

/// Episodes of an opened feed with one of them selected
#[derive(Debug, Clone)]
pub struct ReadyState {
    pub feed_url: String,
    /// Oldest first, never empty
    pub episodes: Vec<Episode>,
    pub index: usize,
    /// `None` while resolving or when the episode has no audio URL
    pub playable: Option<Playable>,
}

impl ReadyState {
    pub fn current(&self) -> &Episode {
        &self.episodes[self.index]
    }

    pub fn can_next(&self) -> bool {
        self.index + 1 < self.episodes.len()
    }

    pub fn can_previous(&self) -> bool {
        self.index > 0
    }
}

#[derive(Debug, Clone)]
pub enum PlayerState {
    Loading { feed_url: Option<String> },
    Ready(ReadyState),
}

/// How a feed load ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Ready { index: usize, total: usize },
    /// The feed produced no episodes; the player keeps showing the loading state
    Empty,
    /// A newer load was started before this one finished; nothing was applied
    Superseded,
    /// The route named no feed
    NoFeed,
}

/// Sequences playback over a feed's episodes
///
/// Every load takes a fresh generation token. Results of a load, or of a
/// playable-source resolution, are applied only while their token is still
/// the latest one, so a slow earlier load never overwrites a newer one.
pub struct PlayerController {
    client: SharedHttpClient,
    source: FeedSource,
    cache: Arc<EpisodeCache>,
    reporter: SharedProgressReporter,
    generation: AtomicU64,
    state: Mutex<PlayerState>,
}

impl PlayerController {
    pub fn new(
        client: SharedHttpClient,
        source: FeedSource,
        cache: Arc<EpisodeCache>,
        reporter: SharedProgressReporter,
    ) -> Self {
        Self {
            client,
            source,
            cache,
            reporter,
            generation: AtomicU64::new(0),
            state: Mutex::new(PlayerState::Loading { feed_url: None }),
        }
    }

    /// Open the feed named by a route
    pub async fn open(&self, route: &PlayerRoute) -> LoadOutcome {
        match &route.feed_url {
            Some(url) => self.open_feed(url, route.index).await,
            None => LoadOutcome::NoFeed,
        }
    }

    /// Load a feed's episodes and select `requested_index`, clamped into range
    pub async fn open_feed(&self, feed_url: &str, requested_index: usize) -> LoadOutcome {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.state.lock().await = PlayerState::Loading {
            feed_url: Some(feed_url.to_string()),
        };

        self.reporter.report(ProgressEvent::FetchingFeed {
            url: feed_url.to_string(),
        });
        let episodes = fetch_episodes(self.client.as_ref(), &self.source, feed_url).await;

        if !self.is_current(generation) {
            tracing::debug!(feed = feed_url, "Discarding superseded feed load");
            return LoadOutcome::Superseded;
        }

        self.reporter.report(ProgressEvent::FeedParsed {
            url: feed_url.to_string(),
            total_episodes: episodes.len(),
        });

        let Some(index) = clamp_index(requested_index, episodes.len()) else {
            tracing::warn!(feed = feed_url, "Feed has no episodes to play");
            return LoadOutcome::Empty;
        };

        let playable = self.resolve(&episodes[index]).await;

        let mut state = self.state.lock().await;
        if !self.is_current(generation) {
            return LoadOutcome::Superseded;
        }

        let total = episodes.len();
        *state = PlayerState::Ready(ReadyState {
            feed_url: feed_url.to_string(),
            episodes,
            index,
            playable,
        });

        LoadOutcome::Ready { index, total }
    }

    /// Advance to the next episode; false at the last one or when not ready
    pub async fn next(&self) -> bool {
        match self.ready_index().await {
            Some((index, total)) if index + 1 < total => self.select(index + 1).await,
            _ => false,
        }
    }

    /// Go back to the previous episode; false at the first one or when not ready
    pub async fn previous(&self) -> bool {
        match self.ready_index().await {
            Some((index, _)) if index > 0 => self.select(index - 1).await,
            _ => false,
        }
    }

    /// Select an episode directly, clamped into range; returns whether the selection changed
    pub async fn select(&self, index: usize) -> bool {
        let (generation, episode, selected) = {
            let mut state = self.state.lock().await;
            let PlayerState::Ready(ready) = &mut *state else {
                return false;
            };
            let Some(clamped) = clamp_index(index, ready.episodes.len()) else {
                return false;
            };
            if clamped == ready.index {
                return false;
            }

            ready.index = clamped;
            ready.playable = None;
            (
                self.generation.load(Ordering::SeqCst),
                ready.episodes[clamped].clone(),
                clamped,
            )
        };

        let playable = self.resolve(&episode).await;

        let mut state = self.state.lock().await;
        if self.is_current(generation)
            && let PlayerState::Ready(ready) = &mut *state
            && ready.index == selected
        {
            ready.playable = playable;
        }

        true
    }

    /// Cache the selected episode's audio for offline playback
    pub async fn download_current(&self) -> Result<CacheOutcome, PlayerError> {
        let episode = match &*self.state.lock().await {
            PlayerState::Ready(ready) => ready.current().clone(),
            PlayerState::Loading { .. } => return Err(PlayerError::NotReady),
        };

        let url = episode.audio_url.ok_or(PlayerError::NoAudio {
            title: episode.title,
        })?;

        Ok(self.cache.ensure_cached(&url).await?)
    }

    pub async fn snapshot(&self) -> PlayerState {
        self.state.lock().await.clone()
    }

    pub async fn current_episode(&self) -> Option<Episode> {
        match &*self.state.lock().await {
            PlayerState::Ready(ready) => Some(ready.current().clone()),
            PlayerState::Loading { .. } => None,
        }
    }

    pub async fn can_next(&self) -> bool {
        matches!(&*self.state.lock().await, PlayerState::Ready(ready) if ready.can_next())
    }

    pub async fn can_previous(&self) -> bool {
        matches!(&*self.state.lock().await, PlayerState::Ready(ready) if ready.can_previous())
    }

    /// One-line description of what the player shows
    pub async fn status_line(&self) -> String {
        match &*self.state.lock().await {
            PlayerState::Ready(ready) => ready.current().title.clone(),
            PlayerState::Loading { .. } => LOADING_MESSAGE.to_string(),
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    async fn ready_index(&self) -> Option<(usize, usize)> {
        match &*self.state.lock().await {
            PlayerState::Ready(ready) => Some((ready.index, ready.episodes.len())),
            PlayerState::Loading { .. } => None,
        }
    }

    async fn resolve(&self, episode: &Episode) -> Option<Playable> {
        match &episode.audio_url {
            Some(url) => Some(self.cache.resolve_playable(url).await),
            None => None,
        }
    }
}

/// Clamp a requested index into `[0, len - 1]`; `None` for an empty list
fn clamp_index(requested: usize, len: usize) -> Option<usize> {
    len.checked_sub(1).map(|last| requested.min(last))
}
