//! Comment tree flattening.
//!
//! A thread's comment forest is reduced to its top-level comments, each
//! carrying the text of its whole reply subtree in one string. Deferred
//! "more" placeholders met along the way are collected into the
//! [`MoreMarkers`] passed in by the caller.

use crate::wire::{self, RedditListing};
use crate::RedditClient;
use curator_core::{
    AccessToken, AggregatedComment, AggregatedThread, CommentNode, CoreError, MoreMarkers,
    Replies, Thread,
};
use serde_json::Value;
use tracing::{debug, trace};

/// Prefix written before every comment body in consolidated reply text.
pub const COMMENT_DELIMITER: &str = "COMMENT_START-";

#[derive(Debug, Clone, Default)]
pub struct FlattenedThread {
    /// `None` when the thread did not keep enough comments.
    pub thread: Option<AggregatedThread>,
    pub markers: MoreMarkers,
}

/// Trims a comment body and drops its newlines.
pub fn clean_body(body: &str) -> String {
    body.trim().replace('\n', "")
}

/// Depth-first concatenation of every comment below `replies`, each written
/// as [`COMMENT_DELIMITER`] followed by its cleaned body.
///
/// "more" placeholders are recorded in `markers` and not descended into.
/// Distinguished comments are skipped along with their subtree.
pub fn consolidate_replies(replies: &Replies, markers: &mut MoreMarkers) -> String {
    let mut consolidated = String::new();
    if let Replies::Listing(nodes) = replies {
        consolidate_into(nodes, &mut consolidated, markers);
    }
    consolidated
}

fn consolidate_into(nodes: &[CommentNode], consolidated: &mut String, markers: &mut MoreMarkers) {
    for node in nodes {
        match node {
            CommentNode::More(marker) => {
                markers.push(marker.clone());
            }
            CommentNode::Comment(comment) if comment.is_distinguished() => {
                trace!("Skipping distinguished reply {}", comment.comment_id);
            }
            CommentNode::Comment(comment) => {
                consolidated.push_str(COMMENT_DELIMITER);
                consolidated.push_str(&clean_body(&comment.text));
                if let Replies::Listing(children) = &comment.replies {
                    consolidate_into(children, consolidated, markers);
                }
            }
            CommentNode::Other(kind) => {
                trace!("Ignoring {} node in replies", kind);
            }
        }
    }
}

/// Builds the aggregated comment list for a thread from its top-level nodes.
pub fn aggregate_comments(nodes: &[CommentNode], markers: &mut MoreMarkers) -> Vec<AggregatedComment> {
    let mut comments = Vec::new();
    for node in nodes {
        match node {
            CommentNode::Comment(comment) if comment.is_distinguished() => {
                debug!("Dropping distinguished comment {}", comment.comment_id);
            }
            CommentNode::Comment(comment) => comments.push(AggregatedComment {
                comment_id: comment.comment_id.clone(),
                text: comment.text.clone(),
                upvote_count: comment.upvote_count,
                consolidated_reply_text: consolidate_replies(&comment.replies, markers),
            }),
            CommentNode::More(marker) => {
                markers.push(marker.clone());
            }
            CommentNode::Other(_) => {}
        }
    }
    comments
}

/// Flattens an already fetched thread detail response.
pub fn flatten_listings(
    thread: &Thread,
    listings: Vec<RedditListing<Value>>,
    min_comment_total: usize,
) -> Result<FlattenedThread, CoreError> {
    let mut markers = MoreMarkers::new();
    let mut comments = Vec::new();

    for listing in listings.into_iter().filter(wire::has_comments) {
        let nodes = wire::comment_nodes(listing.data.children)?;
        comments.extend(aggregate_comments(&nodes, &mut markers));
    }

    if comments.len() <= min_comment_total {
        debug!(
            "Thread {} kept {} comments, needs more than {}",
            thread.permalink,
            comments.len(),
            min_comment_total
        );
        return Ok(FlattenedThread {
            thread: None,
            markers,
        });
    }

    let comment_total = thread.comment_count.unwrap_or(comments.len() as u32);
    Ok(FlattenedThread {
        thread: Some(AggregatedThread {
            thread: thread.clone(),
            comment_total,
            comments,
        }),
        markers,
    })
}

impl RedditClient {
    /// Fetches a thread's comments and flattens them. Errors are local to
    /// this thread.
    pub async fn flatten_thread(
        &self,
        thread: &Thread,
        token: &AccessToken,
        min_comment_total: usize,
    ) -> Result<FlattenedThread, CoreError> {
        if !thread.permalink.starts_with('/') {
            return Err(CoreError::invalid_input(format!(
                "thread {} has no usable permalink",
                thread.thread_id
            )));
        }

        let url = self.api_url(&thread.permalink);
        let body = self
            .fetcher
            .fetch_json(self.api_request("comments", url, token))
            .await?;
        let listings: Vec<RedditListing<Value>> = wire::parse(body)?;

        flatten_listings(thread, listings, min_comment_total)
    }
}
