use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use sha2::{Digest, Sha256};

use crate::error::CacheError;
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, SharedProgressReporter};

/// Upper bound on the buffer reserved up front from a server-declared length
const MAX_PREALLOCATION: u64 = 8 * 1024 * 1024;

/// Audio bytes fetched for the cache
#[derive(Debug, Clone)]
pub struct DownloadedAudio {
    pub bytes: Bytes,
    /// `sha256:<hex>` digest of `bytes`
    pub hash: String,
}

/// Download a resource fully into memory
///
/// Streams the response body, reporting progress through the reporter.
pub async fn download_audio<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
    reporter: &SharedProgressReporter,
) -> Result<DownloadedAudio, CacheError> {
    let response = client
        .get_stream(url)
        .await
        .map_err(|e| CacheError::HttpFailed {
            url: url.to_string(),
            source: e,
        })?;

    if response.status >= 400 {
        return Err(CacheError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    reporter.report(ProgressEvent::DownloadStarting {
        url: url.to_string(),
        content_length: response.content_length,
    });

    // Content-Length is untrusted; larger bodies grow the buffer as they arrive
    let mut buffer = match response.content_length {
        Some(len) => BytesMut::with_capacity(len.min(MAX_PREALLOCATION) as usize),
        None => BytesMut::new(),
    };
    let mut hasher = Sha256::new();
    let mut stream = response.body;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| CacheError::StreamFailed {
            url: url.to_string(),
            source: e,
        })?;

        hasher.update(&chunk);
        buffer.extend_from_slice(&chunk);

        reporter.report(ProgressEvent::DownloadProgress {
            url: url.to_string(),
            bytes_downloaded: buffer.len() as u64,
            total_bytes: response.content_length,
        });
    }

    Ok(DownloadedAudio {
        bytes: buffer.freeze(),
        hash: format!("sha256:{:x}", hasher.finalize()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{ByteStream, HttpBody, HttpResponse};
    use crate::progress::{NoopReporter, ProgressReporter};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    struct MockHttpClient {
        chunks: Vec<&'static str>,
        status: u16,
        /// Overrides the declared length, which otherwise matches the chunks
        declared_length: Option<u64>,
    }

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn get_bytes(&self, _url: &str) -> Result<HttpBody, reqwest::Error> {
            unimplemented!("audio is streamed")
        }

        async fn get_stream(&self, _url: &str) -> Result<HttpResponse, reqwest::Error> {
            let chunks: Vec<Result<Bytes, reqwest::Error>> = self
                .chunks
                .iter()
                .map(|chunk| Ok(Bytes::from_static(chunk.as_bytes())))
                .collect();
            let len = self
                .declared_length
                .unwrap_or_else(|| self.chunks.iter().map(|c| c.len() as u64).sum());

            let stream: ByteStream = Box::pin(futures::stream::iter(chunks));

            Ok(HttpResponse {
                status: self.status,
                content_length: Some(len),
                body: stream,
            })
        }
    }

    #[derive(Default)]
    struct RecordingReporter {
        events: Mutex<Vec<ProgressEvent>>,
    }

    impl ProgressReporter for RecordingReporter {
        fn report(&self, event: ProgressEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[tokio::test]
    async fn download_collects_all_chunks() {
        let client = MockHttpClient {
            chunks: vec!["test ", "audio ", "content"],
            status: 200,
            declared_length: None,
        };

        let audio = download_audio(&client, "https://example.com/ep.mp3", &NoopReporter::shared())
            .await
            .unwrap();

        assert_eq!(audio.bytes, Bytes::from_static(b"test audio content"));
        assert_eq!(
            audio.hash,
            format!("sha256:{:x}", Sha256::digest(b"test audio content"))
        );
    }

    #[tokio::test]
    async fn download_reports_progress() {
        let client = MockHttpClient {
            chunks: vec!["abc", "def"],
            status: 200,
            declared_length: None,
        };
        let recorder = Arc::new(RecordingReporter::default());
        let reporter: SharedProgressReporter = recorder.clone();

        download_audio(&client, "https://example.com/ep.mp3", &reporter)
            .await
            .unwrap();

        let events = recorder.events.lock().unwrap();
        assert!(matches!(
            events[0],
            ProgressEvent::DownloadStarting {
                content_length: Some(6),
                ..
            }
        ));
        assert!(matches!(
            events.last(),
            Some(ProgressEvent::DownloadProgress {
                bytes_downloaded: 6,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn download_ignores_absurd_content_length() {
        let client = MockHttpClient {
            chunks: vec!["tiny"],
            status: 200,
            declared_length: Some(1 << 62),
        };

        let audio = download_audio(&client, "https://example.com/ep.mp3", &NoopReporter::shared())
            .await
            .unwrap();

        assert_eq!(audio.bytes, Bytes::from_static(b"tiny"));
    }

    #[tokio::test]
    async fn download_fails_on_http_error() {
        let client = MockHttpClient {
            chunks: vec!["Not Found"],
            status: 404,
            declared_length: None,
        };

        let result =
            download_audio(&client, "https://example.com/ep.mp3", &NoopReporter::shared()).await;

        match result.unwrap_err() {
            CacheError::HttpStatus { status, .. } => assert_eq!(status, 404),
            other => panic!("Expected HttpStatus error, got {other:?}"),
        }
    }
}
