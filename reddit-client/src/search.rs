use crate::fetch::FetchRequest;
use crate::query::QueryParams;
use crate::wire::{self, RedditListing, RedditThreadData};
use crate::RedditClient;
use curator_core::{AccessToken, CoreError, FetchOutcome, Thread};
use futures::future::join_all;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Where a page of threads comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchEndpoint {
    /// Site-wide search, `/search/`.
    Global,
    /// Search restricted to one community, `/r/<community>/search/`.
    Community(String),
    /// Sorted community listing such as `/r/<community>/hot`.
    Listing { community: String, sort: String },
}

impl SearchEndpoint {
    pub fn path(&self) -> String {
        match self {
            SearchEndpoint::Global => "/search/".to_string(),
            SearchEndpoint::Community(community) => format!("/r/{}/search/", community),
            SearchEndpoint::Listing { community, sort } => format!("/r/{}/{}", community, sort),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            SearchEndpoint::Global => "search",
            SearchEndpoint::Community(_) => "community_search",
            SearchEndpoint::Listing { .. } => "community_listing",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    pub threads: Vec<Thread>,
    /// `None` once the source reports no further results.
    pub next_cursor: Option<String>,
}

/// Community names are ASCII alphanumerics and underscores.
pub fn validate_community_ids(community_ids: &[String]) -> Result<(), CoreError> {
    if community_ids.is_empty() {
        return Err(CoreError::invalid_input("at least one subreddit is required"));
    }
    for id in community_ids {
        let valid = !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(CoreError::invalid_input(format!(
                "malformed subreddit name: {:?}",
                id
            )));
        }
    }
    Ok(())
}

impl RedditClient {
    /// Fetches a single page. Looping over cursors is up to the caller.
    pub async fn fetch_page(
        &self,
        endpoint: &SearchEndpoint,
        params: &QueryParams,
        cursor: Option<&str>,
        token: &AccessToken,
    ) -> Result<Page, CoreError> {
        let url = format!(
            "{}{}",
            self.api_url(&endpoint.path()),
            params.with_cursor(cursor).to_query_string()
        );
        let request = self.api_request(endpoint.label(), url, token);

        let body = self.fetcher.fetch_json(request).await?;
        let listing: RedditListing<RedditThreadData> = wire::parse(body)?;

        let next_cursor = listing.data.after.filter(|after| !after.is_empty());
        let threads: Vec<Thread> = listing.data.children.into_iter().map(Thread::from).collect();
        debug!(
            "Fetched {} threads from {} (next cursor: {:?})",
            threads.len(),
            endpoint.path(),
            next_cursor
        );

        Ok(Page {
            threads,
            next_cursor,
        })
    }

    /// Site-wide search that pages until more than `result_budget` results
    /// have been seen or the cursor runs out.
    ///
    /// At least one page is always fetched, and the last page is kept whole,
    /// so the result may exceed the budget by up to one page. Only threads
    /// with `min_num_comments` or more comments are kept; the budget counts
    /// every result seen. A failed page stops the loop with what was
    /// gathered so far.
    pub async fn search_all(
        &self,
        query: &str,
        result_budget: usize,
        min_num_comments: u32,
        token: &AccessToken,
    ) -> FetchOutcome<Vec<Thread>> {
        if query.trim().is_empty() {
            return FetchOutcome::Failed(CoreError::invalid_input("search query is empty"));
        }

        let endpoint = SearchEndpoint::Global;
        let params = QueryParams::global_search(query);
        let mut results = Vec::new();
        let mut seen = 0usize;
        let mut pages = 0usize;
        let mut cursor: Option<String> = None;
        let mut seen_cursors = HashSet::new();

        loop {
            let page = match self
                .fetch_page(&endpoint, &params, cursor.as_deref(), token)
                .await
            {
                Ok(page) => page,
                Err(error) => {
                    warn!(
                        "Search for {:?} stopped after {} pages: {}",
                        query, pages, error
                    );
                    return if pages == 0 {
                        FetchOutcome::Failed(error)
                    } else {
                        FetchOutcome::Partial {
                            value: results,
                            error,
                        }
                    };
                }
            };
            pages += 1;
            seen += page.threads.len();
            results.extend(
                page.threads
                    .into_iter()
                    .filter(|thread| thread.comment_count.unwrap_or(0) >= min_num_comments),
            );

            match page.next_cursor {
                Some(next) if seen <= result_budget && seen_cursors.insert(next.clone()) => {
                    cursor = Some(next)
                }
                _ => break,
            }
        }

        info!(
            "Search for {:?} kept {} of {} threads across {} pages",
            query,
            results.len(),
            seen,
            pages
        );
        FetchOutcome::Complete(results)
    }

    /// One page of a sorted listing per community, fetched concurrently.
    /// A failing community contributes nothing.
    pub async fn list_community_threads(
        &self,
        community_ids: &[String],
        sort: &str,
        params: &QueryParams,
        token: &AccessToken,
    ) -> Result<Vec<Thread>, CoreError> {
        validate_community_ids(community_ids)?;

        let listings = community_ids.iter().map(|community| async move {
            let endpoint = SearchEndpoint::Listing {
                community: community.clone(),
                sort: sort.to_string(),
            };
            match self.fetch_page(&endpoint, params, None, token).await {
                Ok(page) => page.threads,
                Err(e) => {
                    warn!("Listing r/{}/{} failed: {}", community, sort, e);
                    Vec::new()
                }
            }
        });

        let threads: Vec<Thread> = join_all(listings).await.into_iter().flatten().collect();
        info!(
            "Listed {} threads across {} subreddits",
            threads.len(),
            community_ids.len()
        );
        Ok(threads)
    }

    pub(crate) fn api_request(
        &self,
        endpoint: &'static str,
        url: String,
        token: &AccessToken,
    ) -> FetchRequest {
        FetchRequest::get(endpoint, url)
            .header("User-Agent", self.config.user_agent.as_str())
            .header("Content-Type", "application/json")
            .bearer(&token.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{listing, test_client, test_token, thread_json, MockFetch};

    const SEARCH: &str = "https://oauth.reddit.com/search/?q=rust&sort=relevance&t=year&limit=100";

    fn search_page(after: &str) -> String {
        format!("{}&after={}", SEARCH, after)
    }

    #[test]
    fn test_validate_community_ids() {
        assert!(validate_community_ids(&["rust".to_string(), "learn_rust".to_string()]).is_ok());
        assert!(validate_community_ids(&[]).is_err());
        assert!(validate_community_ids(&["".to_string()]).is_err());
        assert!(validate_community_ids(&["rust/../admin".to_string()]).is_err());
        assert!(validate_community_ids(&["rust lang".to_string()]).is_err());
    }

    #[test]
    fn test_endpoint_paths() {
        assert_eq!(SearchEndpoint::Global.path(), "/search/");
        assert_eq!(
            SearchEndpoint::Community("rust".to_string()).path(),
            "/r/rust/search/"
        );
        assert_eq!(
            SearchEndpoint::Listing {
                community: "rust".to_string(),
                sort: "top".to_string()
            }
            .path(),
            "/r/rust/top"
        );
    }

    #[tokio::test]
    async fn test_fetch_page_sends_bearer_and_cursor() {
        let fetch = MockFetch::new().respond(
            &search_page("t3_a"),
            listing(vec![thread_json("b", "rust", 3)], None),
        );
        let client = test_client(fetch.clone());

        let page = client
            .fetch_page(
                &SearchEndpoint::Global,
                &QueryParams::global_search("rust"),
                Some("t3_a"),
                &test_token(),
            )
            .await
            .unwrap();

        assert_eq!(page.threads.len(), 1);
        assert!(page.next_cursor.is_none());
        let request = &fetch.requests()[0];
        assert_eq!(request.header_value("Authorization"), Some("Bearer test-token"));
        assert_eq!(request.header_value("User-Agent"), Some("curator-test/1.0"));
    }

    #[tokio::test]
    async fn test_search_all_zero_budget_fetches_once() {
        let fetch = MockFetch::new().respond(
            SEARCH,
            listing(
                vec![
                    thread_json("a", "rust", 10),
                    thread_json("b", "rust", 10),
                    thread_json("c", "rust", 10),
                ],
                Some("t3_c"),
            ),
        );
        let client = test_client(fetch.clone());

        let outcome = client.search_all("rust", 0, 0, &test_token()).await;

        assert!(matches!(outcome, FetchOutcome::Complete(_)));
        assert_eq!(fetch.requests().len(), 1);
        // Overshoots the budget by the whole first page
        assert_eq!(outcome.into_value().len(), 3);
    }

    #[tokio::test]
    async fn test_search_all_stops_on_cursor_cycle() {
        let fetch = MockFetch::new()
            .respond(SEARCH, listing(vec![thread_json("a", "rust", 10)], Some("t3_a")))
            .respond(
                &search_page("t3_a"),
                listing(vec![thread_json("b", "rust", 10)], Some("t3_b")),
            )
            .respond(
                &search_page("t3_b"),
                listing(vec![thread_json("c", "rust", 10)], Some("t3_a")),
            );
        let client = test_client(fetch.clone());

        let outcome = client.search_all("rust", 100, 0, &test_token()).await;

        assert_eq!(fetch.requests().len(), 3);
        assert_eq!(outcome.into_value().len(), 3);
    }

    #[tokio::test]
    async fn test_search_all_follows_cursor_until_exhausted() {
        let fetch = MockFetch::new()
            .respond(SEARCH, listing(vec![thread_json("a", "rust", 10)], Some("t3_a")))
            .respond(
                &search_page("t3_a"),
                listing(vec![thread_json("b", "rust", 2)], Some("t3_b")),
            )
            .respond(
                &search_page("t3_b"),
                listing(vec![thread_json("c", "rust", 7)], None),
            );
        let client = test_client(fetch.clone());

        let outcome = client.search_all("rust", 100, 5, &test_token()).await;

        assert_eq!(fetch.requests().len(), 3);
        let ids: Vec<String> = outcome
            .into_value()
            .into_iter()
            .map(|t| t.thread_id)
            .collect();
        // "b" has fewer than 5 comments
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_search_all_stops_when_budget_exceeded() {
        let fetch = MockFetch::new()
            .respond(
                SEARCH,
                listing(
                    vec![thread_json("a", "rust", 10), thread_json("b", "rust", 10)],
                    Some("t3_b"),
                ),
            )
            .respond(
                &search_page("t3_b"),
                listing(vec![thread_json("c", "rust", 10)], Some("t3_c")),
            );
        let client = test_client(fetch.clone());

        let outcome = client.search_all("rust", 2, 0, &test_token()).await;

        // 2 seen is not more than the budget, so a second page is fetched
        assert_eq!(fetch.requests().len(), 2);
        assert_eq!(outcome.into_value().len(), 3);
    }

    #[tokio::test]
    async fn test_search_all_partial_on_page_error() {
        let fetch = MockFetch::new().respond(
            SEARCH,
            listing(vec![thread_json("a", "rust", 10)], Some("t3_a")),
        );
        let client = test_client(fetch.clone());

        let outcome = client.search_all("rust", 100, 0, &test_token()).await;

        assert!(outcome.is_partial());
        assert_eq!(fetch.requests().len(), 2);
        assert_eq!(outcome.into_value().len(), 1);
    }

    #[tokio::test]
    async fn test_search_all_failed_on_first_page() {
        let client = test_client(MockFetch::new());
        let outcome = client.search_all("rust", 100, 0, &test_token()).await;
        assert!(matches!(outcome, FetchOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_search_all_rejects_empty_query() {
        let fetch = MockFetch::new();
        let client = test_client(fetch.clone());
        let outcome = client.search_all("  ", 100, 0, &test_token()).await;
        assert!(matches!(outcome, FetchOutcome::Failed(CoreError::InvalidInput { .. })));
        assert!(fetch.requests().is_empty());
    }

    #[tokio::test]
    async fn test_list_community_threads_isolates_failures() {
        let fetch = MockFetch::new().respond(
            "https://oauth.reddit.com/r/rust/hot?limit=25",
            listing(vec![thread_json("a", "rust", 1)], Some("t3_a")),
        );
        let client = test_client(fetch.clone());

        let threads = client
            .list_community_threads(
                &["rust".to_string(), "golang".to_string()],
                "hot",
                &QueryParams::new().with("limit", "25"),
                &test_token(),
            )
            .await
            .unwrap();

        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].community, "rust");
        assert_eq!(fetch.requests().len(), 2);
    }
}
