// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::FeedError;

/// Channel title used when a feed does not carry one
pub const UNKNOWN_PODCAST: &str = "Unknown Podcast";

/// Episode title used when an item does not carry one
pub const UNKNOWN_EPISODE: &str = "Unknown Episode";

/// A subscribed podcast source, keyed by its RSS URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feed {
    pub url: String,
    pub name: Option<String>,
    pub image: Option<String>,
}

/// A single playable item of a feed
#[derive(Debug, Clone, PartialEq)]
pub struct Episode {
    pub title: String,
    pub audio_url: Option<String>,
    pub mime_type: Option<String>,
    pub pub_date: Option<DateTime<FixedOffset>>,
}

/// Channel metadata and episodes extracted from a feed document
#[derive(Debug, Clone)]
pub struct ParsedFeed {
    pub title: String,
    pub image: Option<String>,
    /// Oldest first
    pub episodes: Vec<Episode>,
}

impl ParsedFeed {
    /// Build the registry entry for this feed
    pub fn to_feed(&self, url: &str) -> Feed {
        Feed {
            url: url.to_string(),
            name: Some(self.title.clone()),
            image: self.image.clone(),
        }
    }
}

/// Parse RSS feed XML bytes into channel metadata and an oldest-first episode list
pub fn parse_feed(xml_bytes: &[u8]) -> Result<ParsedFeed, FeedError> {
    let channel = rss::Channel::read_from(xml_bytes)?;

    let title = non_empty(channel.title()).unwrap_or(UNKNOWN_PODCAST).to_string();
    let image = resolve_image(&channel);

    // Feeds list newest first
    let mut episodes: Vec<Episode> = channel.items().iter().map(parse_episode).collect();
    episodes.reverse();

    if episodes.is_empty() {
        tracing::warn!(podcast = %title, "No episodes found in the RSS feed");
    }

    Ok(ParsedFeed {
        title,
        image,
        episodes,
    })
}

/// Find the podcast artwork, trying channel artwork before item artwork
fn resolve_image(channel: &rss::Channel) -> Option<String> {
    channel
        .itunes_ext()
        .and_then(|ext| ext.image())
        .and_then(non_empty)
        .or_else(|| channel.image().map(|img| img.url()).and_then(non_empty))
        .or_else(|| {
            channel
                .items()
                .iter()
                .find_map(|item| item.itunes_ext().and_then(|ext| ext.image()).and_then(non_empty))
        })
        .or_else(|| channel.items().iter().find_map(media_thumbnail))
        .map(String::from)
}

fn media_thumbnail(item: &rss::Item) -> Option<&str> {
    item.extensions()
        .get("media")
        .and_then(|media| media.get("thumbnail"))
        .and_then(|thumbnails| thumbnails.first())
        .and_then(|thumbnail| thumbnail.attrs().get("url"))
        .map(String::as_str)
        .and_then(non_empty)
}

fn parse_episode(item: &rss::Item) -> Episode {
    let title = item
        .title()
        .and_then(non_empty)
        .unwrap_or(UNKNOWN_EPISODE)
        .to_string();

    let enclosure = item.enclosure();

    Episode {
        title,
        audio_url: enclosure
            .map(|e| e.url())
            .and_then(non_empty)
            .map(String::from),
        mime_type: enclosure
            .map(|e| e.mime_type())
            .and_then(non_empty)
            .map(String::from),
        pub_date: item.pub_date().and_then(parse_date),
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Parse an RFC 2822 date, falling back to formats seen in sloppy feeds
fn parse_date(date_str: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(date_str.trim()) {
        return Some(dt);
    }

    let formats = [
        "%a, %d %b %Y %H:%M:%S %z",
        "%Y-%m-%dT%H:%M:%S%:z",
        "%Y-%m-%d %H:%M:%S %z",
    ];

    formats
        .iter()
        .find_map(|format| DateTime::parse_from_str(date_str.trim(), format).ok())
}
