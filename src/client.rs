//! Authenticated HTTP client for the Microsoft Graph API.
//!
//! `GraphClient` wraps a `reqwest::Client` and a bearer [`AccessToken`],
//! providing JSON-based request helpers (`get`, `post`, `patch`, `delete`)
//! plus `get_url` for following absolute `@odata.nextLink` continuation
//! URLs during pagination.
//!
//! GET responses are cached in a TTL-boxed in-memory cache keyed by the
//! full request URL, so repeated identical reads avoid redundant network
//! round trips. Mutating verbs (POST/PATCH/DELETE) never touch the cache,
//! and the cache is never invalidated by writes: a cached GET can be stale
//! relative to a recent write for up to the configured TTL. Operators who
//! need read-your-writes must wait out the TTL or use a fresh client.
//!
//! The token is immutable for the client's lifetime. There is no refresh
//! and no 401 retry: an expired or revoked token surfaces as a 401
//! `GraphError::Api` and the caller must build a new client with a new
//! token.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use reqwest::{Client, Method};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::auth::AccessToken;
use crate::error::{GraphError, Result};

/// Production Graph API v1.0 endpoint. Override with `with_base_url` for
/// the beta API or a mock server.
const BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Connect timeout for Graph API calls.
/// Covers TCP + TLS handshake only. 10 seconds is generous for Azure.
const API_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Overall request timeout for Graph API calls, covering the full
/// round-trip including response body download. User pages are at most
/// 999 records, so 20 seconds is plenty.
const API_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Builds a `reqwest::Client` with explicit timeouts for Graph API calls.
///
/// Separate from the `TokenProvider`'s client so the two can carry
/// different timeout policies.
fn build_api_client() -> Client {
    Client::builder()
        .connect_timeout(API_CONNECT_TIMEOUT)
        .timeout(API_REQUEST_TIMEOUT)
        .build()
        .expect("failed to build HTTP client for the Graph API")
}

// ── Cache configuration ────────────────────────────────────────────────

/// Configuration for the GET-response cache.
///
/// The cache belongs to the `GraphClient` that was built with it; nothing
/// is shared process-wide. Entries are keyed by the full request URL and
/// evicted after `ttl`.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached responses.
    pub capacity: u64,
    /// How long a cached response stays valid.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            capacity: 1024,
            ttl: Duration::from_secs(3600),
        }
    }
}

// ── OData collection wrapper ───────────────────────────────────────────

/// OData collection page returned by Graph list endpoints.
///
/// Graph wraps collections in `{ "value": [...] }` with an optional
/// `@odata.nextLink` continuation URL when more pages exist. The wrapper
/// is generic so the user-flow-attributes and users endpoints can share it.
#[derive(Debug, Deserialize)]
pub struct ODataPage<T> {
    /// The array of result items for this page.
    pub value: Vec<T>,

    /// Absolute URL of the next page, present while more results remain.
    /// Resolve it with [`GraphClient::get_url`].
    #[serde(rename = "@odata.nextLink", default)]
    pub next_link: Option<String>,
}

// ── Client ─────────────────────────────────────────────────────────────

/// Authenticated HTTP client for the Graph REST API.
///
/// Design decisions:
/// - `base_url` is stored as a `String` rather than a `&'static str` so it
///   can be overridden in tests (e.g. pointing at a wiremock server).
/// - The GET cache stores raw response bodies (`Arc<str>`), not
///   deserialized values, so one cache serves every response type.
pub struct GraphClient {
    client: Client,
    base_url: String,
    token: AccessToken,
    cache: Cache<String, Arc<str>>,
}

impl GraphClient {
    /// Client against the production v1.0 endpoint with the default cache
    /// policy (1024 entries, 1 hour TTL).
    pub fn new(token: AccessToken) -> Self {
        Self::with_cache(token, BASE_URL, CacheConfig::default())
    }

    /// Constructor that accepts a custom base URL, used by tests to point
    /// at a local mock server instead of the real Graph API.
    pub fn with_base_url(token: AccessToken, base_url: &str) -> Self {
        Self::with_cache(token, base_url, CacheConfig::default())
    }

    /// Fully explicit constructor: base URL plus cache policy.
    pub fn with_cache(token: AccessToken, base_url: &str, cache: CacheConfig) -> Self {
        GraphClient {
            client: build_api_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            cache: Cache::builder()
                .max_capacity(cache.capacity)
                .time_to_live(cache.ttl)
                .build(),
        }
    }

    /// Core send path: authenticated request, body read as text before the
    /// status check so Graph's diagnostic error body survives into
    /// `GraphError::Api`.
    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
    ) -> Result<String> {
        debug!(%method, %url, "graph request");
        let mut req = self
            .client
            .request(method, url)
            .bearer_auth(self.token.as_str());
        if let Some(payload) = body {
            req = req.json(payload);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(GraphError::Api { status, body: text });
        }
        Ok(text)
    }

    /// Sends an authenticated GET for a path relative to the base URL and
    /// deserializes the JSON response. Served from the cache when a live
    /// entry exists for the same URL.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        self.get_url(&url).await
    }

    /// Sends an authenticated GET to an absolute URL (typically an
    /// `@odata.nextLink` continuation) and deserializes the JSON response.
    /// Cached like any other GET.
    pub async fn get_url<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        if let Some(cached) = self.cache.get(url).await {
            debug!(%url, "cache hit");
            return Ok(serde_json::from_str(&cached)?);
        }

        let body = self.send::<()>(Method::GET, url, None).await?;
        let body: Arc<str> = Arc::from(body);
        // Only successful responses reach this point, so errors are never
        // cached.
        self.cache.insert(url.to_string(), Arc::clone(&body)).await;
        Ok(serde_json::from_str(&body)?)
    }

    /// Sends an authenticated POST with a JSON body and deserializes the
    /// response. Never cached.
    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let text = self.send(Method::POST, &url, Some(body)).await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Sends an authenticated PATCH with a JSON body. Never cached.
    ///
    /// Graph answers PATCH with `204 No Content` and no body, so success
    /// is the only useful signal; there is nothing to deserialize.
    pub async fn patch<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        let url = format!("{}{}", self.base_url, path);
        self.send(Method::PATCH, &url, Some(body)).await?;
        Ok(())
    }

    /// Sends an authenticated DELETE. Never cached. Graph answers with
    /// `204 No Content`.
    pub async fn delete(&self, path: &str) -> Result<()> {
        let url = format!("{}{}", self.base_url, path);
        self.send::<()>(Method::DELETE, &url, None).await?;
        Ok(())
    }
}
