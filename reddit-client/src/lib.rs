pub mod aggregate;
pub mod auth;
pub mod dedup;
pub mod fanout;
pub mod fetch;
pub mod flatten;
pub mod metrics;
pub mod query;
pub mod rate_limiter;
pub mod search;
pub mod wire;

#[cfg(test)]
mod test_support;

pub use aggregate::DEFAULT_MIN_COMMENT_TOTAL;
pub use dedup::dedupe_by_permalink;
pub use fetch::{Fetch, FetchRequest, HttpFetcher};
pub use flatten::{clean_body, consolidate_replies, FlattenedThread, COMMENT_DELIMITER};
pub use metrics::{ApiMetrics, EndpointMetrics, EndpointSummary, MetricsCollector, RequestMetrics};
pub use query::QueryParams;
pub use rate_limiter::{RateLimitConfig, RateLimitStatus, RateLimiter};
pub use search::{validate_community_ids, Page, SearchEndpoint};

use curator_core::{CoreError, RedditConfig};
use std::sync::Arc;
use std::time::Duration;

/// Reddit API client. Cheap to clone; all clones share one fetcher.
#[derive(Clone)]
pub struct RedditClient {
    config: RedditConfig,
    fetcher: Arc<dyn Fetch>,
}

impl RedditClient {
    pub fn new(config: RedditConfig) -> Result<Self, CoreError> {
        let fetcher = HttpFetcher::new(Duration::from_secs(config.request_timeout_secs))?;
        Ok(Self::with_fetcher(config, Arc::new(fetcher)))
    }

    pub fn with_fetcher(config: RedditConfig, fetcher: Arc<dyn Fetch>) -> Self {
        Self { config, fetcher }
    }

    pub fn config(&self) -> &RedditConfig {
        &self.config
    }

    pub(crate) fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_host.trim_end_matches('/'), path)
    }
}

impl std::fmt::Debug for RedditClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditClient")
            .field("api_host", &self.config.api_host)
            .field("user_agent", &self.config.user_agent)
            .finish_non_exhaustive()
    }
}
