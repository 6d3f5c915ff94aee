// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

/// A streaming response body
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// A fully buffered HTTP response
#[derive(Debug, Clone)]
pub struct HttpBody {
    /// HTTP status code
    pub status: u16,
    /// Complete response body
    pub body: Bytes,
}

impl HttpBody {
    /// Whether the status code is in the 2xx range
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP response with status, content length, and body stream
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Content-Length header value, if present
    pub content_length: Option<u64>,
    /// Response body as a stream of bytes
    pub body: ByteStream,
}

/// HTTP client abstraction for testability
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Fetch the entire response body together with its status code
    async fn get_bytes(&self, url: &str) -> Result<HttpBody, reqwest::Error>;

    /// Get a streaming response for large downloads
    async fn get_stream(&self, url: &str) -> Result<HttpResponse, reqwest::Error>;
}

/// A shared, type-erased HTTP client
pub type SharedHttpClient = Arc<dyn HttpClient>;

/// Default HTTP client implementation using reqwest
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Create a new ReqwestClient with default settings
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Create a new ReqwestClient with a custom reqwest::Client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Create a client with an optional overall request timeout and user agent
    pub fn with_options(
        timeout: Option<Duration>,
        user_agent: Option<&str>,
    ) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(user_agent) = user_agent {
            builder = builder.user_agent(user_agent.to_string());
        }
        Ok(Self::with_client(builder.build()?))
    }
}

impl Default for ReqwestClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get_bytes(&self, url: &str) -> Result<HttpBody, reqwest::Error> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok(HttpBody { status, body })
    }

    async fn get_stream(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
        use futures::StreamExt;

        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let content_length = response.content_length();

        let body: ByteStream = Box::pin(response.bytes_stream().map(|result| result));

        Ok(HttpResponse {
            status,
            content_length,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reqwest_client_can_be_created() {
        let _client = ReqwestClient::new();
        let _client_default = ReqwestClient::default();
    }

    #[test]
    fn reqwest_client_accepts_timeout_and_user_agent() {
        let client = ReqwestClient::with_options(Some(Duration::from_secs(5)), Some("podshelf/test"));
        assert!(client.is_ok());
    }

    #[test]
    fn http_body_reports_success_range() {
        let ok = HttpBody {
            status: 204,
            body: Bytes::new(),
        };
        let not_found = HttpBody {
            status: 404,
            body: Bytes::new(),
        };
        let redirect = HttpBody {
            status: 302,
            body: Bytes::new(),
        };

        assert!(ok.is_success());
        assert!(!not_found.is_success());
        assert!(!redirect.is_success());
    }
}
