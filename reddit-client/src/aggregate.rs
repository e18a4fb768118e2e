use crate::dedup::dedupe_by_permalink;
use crate::search::validate_community_ids;
use crate::RedditClient;
use curator_core::{
    AccessToken, AggregatedThread, Aggregation, CoreError, MoreMarker, MoreMarkers,
};
use futures::future::join_all;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Threads need more than this many retained comments unless the caller
/// asks otherwise.
pub const DEFAULT_MIN_COMMENT_TOTAL: usize = 0;

impl RedditClient {
    /// Runs the whole pipeline with the default comment threshold.
    pub async fn init_reddit_service(
        &self,
        community_ids: &[String],
        queries: &[String],
    ) -> Result<Aggregation, CoreError> {
        self.aggregate(community_ids, queries, DEFAULT_MIN_COMMENT_TOTAL)
            .await
    }

    /// token -> fan-out search -> dedup -> flatten every thread -> collect
    /// deferred markers -> resolve markers -> threshold filter.
    ///
    /// Returns an error when no token could be acquired, when the input is
    /// malformed, or when the search found no threads at all. Failures of
    /// individual communities or threads only shrink the result.
    pub async fn aggregate(
        &self,
        community_ids: &[String],
        queries: &[String],
        min_comment_total: usize,
    ) -> Result<Aggregation, CoreError> {
        let span = info_span!("aggregation", id = %Uuid::new_v4());
        async move {
            validate_community_ids(community_ids)?;
            if queries.iter().all(|q| q.trim().is_empty()) {
                return Err(CoreError::invalid_input("at least one query is required"));
            }

            let token = self.acquire_token().await?;

            let threads = self
                .search_across_communities(community_ids, queries, &token)
                .await?;
            if threads.is_empty() {
                info!("Search returned no threads");
                return Err(CoreError::not_found("threads matching the queries"));
            }

            let unique = dedupe_by_permalink(threads);
            if unique.is_empty() {
                return Err(CoreError::not_found("threads matching the queries"));
            }
            info!("Flattening comments for {} unique threads", unique.len());

            let flattened = join_all(
                unique
                    .iter()
                    .map(|thread| self.flatten_thread(thread, &token, min_comment_total)),
            )
            .await;

            let mut markers = MoreMarkers::new();
            let mut aggregated = Vec::new();
            for (result, thread) in flattened.into_iter().zip(&unique) {
                match result {
                    Ok(flat) => {
                        markers.extend(flat.markers);
                        aggregated.extend(flat.thread);
                    }
                    Err(e) => warn!("Dropping thread {}: {}", thread.permalink, e),
                }
            }

            let marker_total = markers.len();
            let deferred = markers.into_deferred();
            debug!(
                "{} deferred reply markers collected out of {} unique markers",
                deferred.len(),
                marker_total
            );

            let resolved = self
                .resolve_more_replies(&deferred, aggregated, &token)
                .await;
            let threads: Vec<AggregatedThread> = resolved
                .into_iter()
                .filter(|thread| thread.comments.len() > min_comment_total)
                .collect();

            info!(
                "Aggregation finished with {} threads and {} deferred markers",
                threads.len(),
                deferred.len()
            );
            Ok(Aggregation { threads, deferred })
        }
        .instrument(span)
        .await
    }

    /// Extension point for loading the replies behind deferred markers.
    ///
    /// The threads are returned unchanged and the markers are reported to
    /// the caller as-is.
    // TODO: call /api/morechildren with link_id and the marker's child ids once the thread fullname is carried on MoreMarker.
    pub async fn resolve_more_replies(
        &self,
        markers: &[MoreMarker],
        threads: Vec<AggregatedThread>,
        _token: &AccessToken,
    ) -> Vec<AggregatedThread> {
        if !markers.is_empty() {
            debug!(
                "Leaving {} deferred markers unresolved across {} threads",
                markers.len(),
                threads.len()
            );
        }
        threads
    }
}
