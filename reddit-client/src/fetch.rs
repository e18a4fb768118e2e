//! JSON fetch collaborator.
//!
//! Every upstream call in the pipeline is described as a [`FetchRequest`] and
//! executed through the [`Fetch`] trait, so the pipeline never touches the
//! HTTP client directly. [`HttpFetcher`] is the production implementation.

use crate::metrics::{ApiMetrics, EndpointSummary, MetricsCollector, RequestMetrics};
use crate::rate_limiter::{RateLimitConfig, RateLimitStatus, RateLimiter};
use async_trait::async_trait;
use curator_core::{CoreError, RedditApiError};
use reqwest::{Client, Method};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    /// Short label used for metrics and logs, e.g. `search` or `comments`.
    pub endpoint: &'static str,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl FetchRequest {
    pub fn get(endpoint: &'static str, url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            endpoint,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(endpoint: &'static str, url: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            ..Self::get(endpoint, url)
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {}", token))
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Performs a request and returns the parsed JSON body. Non-success statuses
/// are errors.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch_json(&self, request: FetchRequest) -> Result<Value, CoreError>;
}

#[derive(Debug)]
pub struct HttpFetcher {
    http_client: Client,
    rate_limiter: Arc<RateLimiter>,
    metrics: Arc<MetricsCollector>,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, CoreError> {
        Self::with_rate_limit(timeout, RateLimitConfig::reddit_oauth())
    }

    pub fn with_rate_limit(timeout: Duration, config: RateLimitConfig) -> Result<Self, CoreError> {
        let http_client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            rate_limiter: Arc::new(RateLimiter::new(config)),
            metrics: Arc::new(MetricsCollector::new()),
            timeout,
        })
    }

    pub async fn get_metrics(&self) -> ApiMetrics {
        self.metrics.get_metrics().await
    }

    pub async fn endpoint_summaries(&self) -> Vec<EndpointSummary> {
        self.metrics.endpoint_summaries().await
    }

    pub async fn get_rate_limit_status(&self) -> RateLimitStatus {
        self.rate_limiter.get_rate_limit_status().await
    }

    async fn execute(&self, request: &FetchRequest) -> Result<Value, CoreError> {
        let mut builder = self
            .http_client
            .request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                CoreError::Timeout {
                    seconds: self.timeout.as_secs(),
                }
            } else {
                CoreError::Network(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status.as_u16(), request, response.headers()));
        }

        let body = response.text().await?;
        parse_body(request, &body)
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch_json(&self, request: FetchRequest) -> Result<Value, CoreError> {
        let start_time = Instant::now();
        let permit = self.rate_limiter.acquire_permit().await;
        debug!(
            "Acquired rate limit permit for {} {} after {:?}",
            request.method, request.endpoint, permit.queue_wait_time
        );

        let result = self.execute(&request).await;

        let (status_code, rate_limited, error_type) = match &result {
            Ok(_) => (Some(200), false, None),
            Err(CoreError::RedditApi(RedditApiError::RateLimitExceeded { .. })) => {
                (Some(429), true, Some("rate_limited".to_string()))
            }
            Err(CoreError::RequestFailed { status_code, .. }) => {
                (*status_code, false, Some("request_failed".to_string()))
            }
            Err(CoreError::Timeout { .. }) => (None, false, Some("timeout".to_string())),
            Err(e) => (None, false, Some(e.to_string())),
        };

        self.metrics
            .record_request(RequestMetrics {
                endpoint: request.endpoint.to_string(),
                method: request.method.to_string(),
                status_code,
                response_time: start_time.elapsed(),
                success: result.is_ok(),
                rate_limited,
                error_type,
            })
            .await;

        if let Err(e) = &result {
            warn!("{} {} failed: {}", request.method, request.endpoint, e);
        }
        result
    }
}

fn status_error(status: u16, request: &FetchRequest, headers: &reqwest::header::HeaderMap) -> CoreError {
    match status {
        429 => {
            let retry_after = headers
                .get("retry-after")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok())
                .unwrap_or(60);
            warn!("Rate limited on {}, retry after {} seconds", request.endpoint, retry_after);
            CoreError::RedditApi(RedditApiError::RateLimitExceeded { retry_after })
        }
        401 => CoreError::RedditApi(RedditApiError::InvalidToken),
        403 => CoreError::RedditApi(RedditApiError::Forbidden {
            resource: request.url.clone(),
        }),
        404 if matches!(request.endpoint, "community_search" | "community_listing") => {
            CoreError::RedditApi(RedditApiError::SubredditNotFound {
                subreddit: community_from_url(&request.url).unwrap_or_default(),
            })
        }
        500..=599 => CoreError::RedditApi(RedditApiError::ServerError {
            status_code: status,
        }),
        _ => CoreError::RequestFailed {
            message: format!("{} {} returned {}", request.method, request.url, status),
            status_code: Some(status),
        },
    }
}

fn parse_body(request: &FetchRequest, body: &str) -> Result<Value, CoreError> {
    serde_json::from_str(body).map_err(|e| {
        CoreError::RedditApi(RedditApiError::InvalidResponse {
            details: format!("{} returned malformed JSON: {}", request.endpoint, e),
        })
    })
}

/// Community name from a `/r/<name>/...` URL.
fn community_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let mut segments = parsed.path_segments()?;
    match (segments.next(), segments.next()) {
        (Some("r"), Some(name)) if !name.is_empty() => Some(name.to_string()),
        _ => None,
    }
}
