use crate::query::QueryParams;
use crate::search::{validate_community_ids, SearchEndpoint};
use crate::RedditClient;
use curator_core::{AccessToken, CoreError, FetchOutcome, Thread};
use futures::future::join_all;
use std::collections::HashSet;
use tracing::{debug, info, warn};

impl RedditClient {
    /// Searches every community for every query.
    ///
    /// All query x community branches run concurrently; inside one branch the
    /// cursor chain is followed page by page. A failing branch keeps the pages
    /// it already fetched and does not affect its siblings. Results are
    /// concatenated query-major in input order.
    pub async fn search_across_communities(
        &self,
        community_ids: &[String],
        queries: &[String],
        token: &AccessToken,
    ) -> Result<Vec<Thread>, CoreError> {
        validate_community_ids(community_ids)?;
        if queries.is_empty() || queries.iter().all(|q| q.trim().is_empty()) {
            return Err(CoreError::invalid_input("at least one query is required"));
        }

        let per_query = queries
            .iter()
            .filter(|query| !query.trim().is_empty())
            .map(|query| async move {
                let params = QueryParams::community_search(query);
                let branches = community_ids
                    .iter()
                    .map(|community| self.paginate_community(community, &params, token));

                join_all(branches)
                    .await
                    .into_iter()
                    .zip(community_ids)
                    .flat_map(|(outcome, community)| {
                        if let Some(error) = outcome.error() {
                            warn!(
                                "Search for {:?} in r/{} incomplete: {}",
                                query, community, error
                            );
                        }
                        outcome.into_value()
                    })
                    .collect::<Vec<Thread>>()
            });

        let threads: Vec<Thread> = join_all(per_query).await.into_iter().flatten().collect();
        info!(
            "Fan-out search returned {} threads for {} queries across {} subreddits",
            threads.len(),
            queries.len(),
            community_ids.len()
        );
        Ok(threads)
    }

    /// Follows one community's cursor chain sequentially until it ends.
    pub async fn paginate_community(
        &self,
        community: &str,
        params: &QueryParams,
        token: &AccessToken,
    ) -> FetchOutcome<Vec<Thread>> {
        let endpoint = SearchEndpoint::Community(community.to_string());
        let mut threads = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen_cursors = HashSet::new();
        let mut pages = 0usize;

        loop {
            let page = match self
                .fetch_page(&endpoint, params, cursor.as_deref(), token)
                .await
            {
                Ok(page) => page,
                Err(error) if pages == 0 => return FetchOutcome::Failed(error),
                Err(error) => {
                    return FetchOutcome::Partial {
                        value: threads,
                        error,
                    }
                }
            };
            pages += 1;
            threads.extend(page.threads);

            match page.next_cursor {
                // Any cursor already followed starts a cycle.
                Some(next) if seen_cursors.insert(next.clone()) => {
                    debug!("Paginating r/{} with after id: {}", community, next);
                    cursor = Some(next);
                }
                _ => break,
            }
        }

        debug!(
            "Collected {} threads from r/{} over {} pages",
            threads.len(),
            community,
            pages
        );
        FetchOutcome::Complete(threads)
    }
}
