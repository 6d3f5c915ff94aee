use std::sync::Arc;

/// Events emitted while loading feeds and caching episode audio
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Feed is being fetched from URL
    FetchingFeed { url: String },

    /// Feed has been parsed successfully
    FeedParsed { url: String, total_episodes: usize },

    /// An audio download is starting
    DownloadStarting {
        url: String,
        /// Expected content length in bytes, if known
        content_length: Option<u64>,
    },

    /// Download progress update
    DownloadProgress {
        url: String,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
    },

    /// A download completed and was stored in the cache
    DownloadCompleted {
        url: String,
        bytes_downloaded: u64,
        /// `sha256:<hex>` digest of the stored bytes
        hash: String,
    },

    /// A download failed
    DownloadFailed { url: String, error: String },

    /// The requested audio was already cached; nothing was fetched
    AlreadyCached { url: String },
}

/// Trait for reporting progress events.
///
/// Implementations can use this to display progress bars, log messages,
/// or collect statistics.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {
        // Intentionally empty
    }
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_reporter_handles_all_events() {
        let reporter = NoopReporter;
        let url = "https://example.com/episode.mp3".to_string();

        reporter.report(ProgressEvent::FetchingFeed {
            url: "https://example.com/feed.xml".to_string(),
        });
        reporter.report(ProgressEvent::FeedParsed {
            url: "https://example.com/feed.xml".to_string(),
            total_episodes: 10,
        });
        reporter.report(ProgressEvent::DownloadStarting {
            url: url.clone(),
            content_length: Some(1024),
        });
        reporter.report(ProgressEvent::DownloadProgress {
            url: url.clone(),
            bytes_downloaded: 512,
            total_bytes: Some(1024),
        });
        reporter.report(ProgressEvent::DownloadCompleted {
            url: url.clone(),
            bytes_downloaded: 1024,
            hash: "sha256:abc123".to_string(),
        });
        reporter.report(ProgressEvent::DownloadFailed {
            url: url.clone(),
            error: "Connection timeout".to_string(),
        });
        reporter.report(ProgressEvent::AlreadyCached { url });
    }
}
