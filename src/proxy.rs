// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pass-through HTTP relay for feed documents.
//!
//! `GET /api/fetch-rss?url=<feed>` fetches the feed server-side and returns
//! the body verbatim as `application/xml`. Clients that cannot reach feed
//! hosts directly (cross-origin restrictions, captive networks) point their
//! [`FeedSource::Proxy`](crate::feed::FeedSource) at this server.

use std::net::SocketAddr;

use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use url::Url;

use crate::feed::{FeedSource, fetch_feed_bytes};
use crate::http::SharedHttpClient;

/// Route of the relay endpoint
pub const FETCH_RSS_PATH: &str = "/api/fetch-rss";

#[derive(Clone)]
struct ProxyState {
    client: SharedHttpClient,
}

#[derive(Debug, Deserialize)]
struct ProxyParams {
    url: Option<String>,
}

/// Build the proxy router around an HTTP client
pub fn router(client: SharedHttpClient) -> Router {
    Router::new()
        .route(FETCH_RSS_PATH, get(fetch_rss))
        .with_state(ProxyState { client })
}

/// Serve the proxy on `addr` until ctrl-c is received
pub async fn serve(addr: SocketAddr, client: SharedHttpClient) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "RSS proxy listening");

    axum::serve(listener, router(client))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down RSS proxy");
}

async fn fetch_rss(State(state): State<ProxyState>, Query(params): Query<ProxyParams>) -> Response {
    let Some(target) = params.url.filter(|url| !url.trim().is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "RSS feed URL is required");
    };

    if !is_relayable(&target) {
        tracing::debug!(url = %target, "Rejected non-HTTP feed URL");
        return error_response(StatusCode::BAD_REQUEST, "Invalid RSS feed URL");
    }

    tracing::debug!(url = %target, "Relaying feed");

    match fetch_feed_bytes(state.client.as_ref(), &FeedSource::Direct, &target).await {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/xml")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(url = %target, error = %e, "Error fetching RSS feed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch RSS feed")
        }
    }
}

/// Only absolute http(s) URLs are relayed; the host is not restricted
fn is_relayable(target: &str) -> bool {
    Url::parse(target)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
        .unwrap_or(false)
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}
