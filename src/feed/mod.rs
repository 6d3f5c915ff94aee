mod fetch;
mod parse;

pub use fetch::{
    FeedMetadata, FeedSource, INVALID_FEED_NAME, fetch_episodes, fetch_feed, fetch_feed_bytes,
    fetch_feed_metadata, is_url, try_fetch_episodes,
};
pub use parse::{Episode, Feed, ParsedFeed, UNKNOWN_EPISODE, UNKNOWN_PODCAST, parse_feed};
