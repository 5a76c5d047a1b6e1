use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::{ClientBuildError, UpstreamFailure, UpstreamResult};

/// Header carrying the pass-through API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Body of a successful (2xx) upstream response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body as text
    pub body: String,
}

impl RawResponse {
    /// Parse the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

/// A single outbound call to the flow service.
///
/// Implementations classify every failure instead of panicking; non-2xx
/// statuses come back as `FailureKind::HttpError` for the caller to judge.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// GET `path` with the given query parameters
    async fn get(&self, path: &str, query: &[(&str, &str)]) -> UpstreamResult<RawResponse>;

    /// POST `body` as JSON to `path`
    async fn post(&self, path: &str, body: &Value) -> UpstreamResult<RawResponse>;
}

/// Configuration for the HTTP upstream client
#[derive(Debug, Clone)]
pub struct UpstreamClientConfig {
    /// Base URL of the flow service
    pub base_url: String,
    /// Wall-clock timeout applied to GET calls
    pub get_timeout: Duration,
    /// Wall-clock timeout applied to POST calls
    pub post_timeout: Duration,
    /// Timeout for establishing a connection
    pub connect_timeout: Duration,
    /// Idle keep-alive connections kept per host
    pub pool_max_idle_per_host: usize,
    /// Optional API key forwarded as `x-api-key`
    pub api_key: Option<String>,
}

impl Default for UpstreamClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:7860".to_string(),
            get_timeout: Duration::from_secs(30),
            post_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            pool_max_idle_per_host: 5,
            api_key: None,
        }
    }
}

/// Client for the flow service over HTTP.
///
/// Cloning is cheap and clones share one connection pool.
#[derive(Debug, Clone)]
pub struct HttpUpstreamClient {
    base_url: String,
    get_timeout: Duration,
    post_timeout: Duration,
    client: Client,
}

impl HttpUpstreamClient {
    /// Creates a new client with the provided configuration
    pub fn new(config: UpstreamClientConfig) -> Result<Self, ClientBuildError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url).map_err(|e| ClientBuildError::InvalidBaseUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;

        let mut headers = HeaderMap::new();
        if let Some(api_key) = &config.api_key {
            let mut value = HeaderValue::from_str(api_key)
                .map_err(|e| ClientBuildError::InvalidApiKey(e.to_string()))?;
            value.set_sensitive(true);
            headers.insert(API_KEY_HEADER, value);
        }

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            base_url,
            get_timeout: config.get_timeout,
            post_timeout: config.post_timeout,
            client,
        })
    }

    /// Creates a client for `base_url` with default timeouts
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, ClientBuildError> {
        Self::new(UpstreamClientConfig {
            base_url: base_url.into(),
            ..UpstreamClientConfig::default()
        })
    }

    /// Base URL without trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Sends the request and turns the outcome into a raw response or a failure
    async fn dispatch(&self, request: RequestBuilder, timeout: Duration) -> UpstreamResult<RawResponse> {
        let started = Instant::now();
        let response = request
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| UpstreamFailure::from_reqwest(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| UpstreamFailure::from_reqwest(&e))?;

        debug!(
            status = status.as_u16(),
            elapsed = ?started.elapsed(),
            "Upstream responded"
        );

        if status.is_success() {
            Ok(RawResponse {
                status: status.as_u16(),
                body,
            })
        } else {
            Err(UpstreamFailure::http(status.as_u16(), body))
        }
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstreamClient {
    #[instrument(skip(self, query), fields(method = "GET"))]
    async fn get(&self, path: &str, query: &[(&str, &str)]) -> UpstreamResult<RawResponse> {
        let request = self.client.get(self.url(path)).query(query);
        self.dispatch(request, self.get_timeout).await
    }

    #[instrument(skip(self, body), fields(method = "POST"))]
    async fn post(&self, path: &str, body: &Value) -> UpstreamResult<RawResponse> {
        let request = self.client.post(self.url(path)).json(body);
        self.dispatch(request, self.post_timeout).await
    }
}
