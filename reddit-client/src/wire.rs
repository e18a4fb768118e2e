//! Raw listing shapes returned by the Reddit API and their conversion into
//! domain types.

use curator_core::{Comment, CommentNode, Replies, ThingKind, Thread};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct RedditListing<T> {
    #[serde(default)]
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditListingData<T> {
    #[serde(default = "Vec::new")]
    pub children: Vec<RedditListingChild<T>>,
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub before: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RedditThreadData {
    pub subreddit_id: String,
    pub id: String,
    pub permalink: String,
    pub subreddit: String,
    pub selftext: String,
    pub title: String,
    pub num_comments: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RedditCommentData {
    id: String,
    body: String,
    ups: i64,
    distinguished: Option<String>,
    replies: Option<RedditReplies>,
}

/// `replies` is either a nested listing or an empty string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RedditReplies {
    Listing(RedditListing<Value>),
    Sentinel(String),
}

impl From<RedditListingChild<RedditThreadData>> for Thread {
    fn from(child: RedditListingChild<RedditThreadData>) -> Self {
        let kind = ThingKind::from_tag(&child.kind);
        let data = child.data;
        Self {
            community_id: data.subreddit_id,
            thread_id: data.id,
            permalink: data.permalink,
            community: data.subreddit,
            body: data.selftext,
            kind_label: kind.label().map(str::to_string),
            kind_tag: child.kind,
            title: data.title,
            comment_count: data.num_comments,
        }
    }
}

pub fn parse<T: DeserializeOwned>(value: Value) -> Result<T, serde_json::Error> {
    serde_json::from_value(value)
}

/// Converts listing children into comment nodes, descending into every
/// nested `replies` listing.
pub fn comment_nodes(
    children: Vec<RedditListingChild<Value>>,
) -> Result<Vec<CommentNode>, serde_json::Error> {
    children.into_iter().map(comment_node).collect()
}

fn comment_node(child: RedditListingChild<Value>) -> Result<CommentNode, serde_json::Error> {
    match ThingKind::from_tag(&child.kind) {
        ThingKind::Comment => {
            let data: RedditCommentData = serde_json::from_value(child.data)?;
            let replies = match data.replies {
                Some(RedditReplies::Listing(listing)) => {
                    Replies::Listing(comment_nodes(listing.data.children)?)
                }
                Some(RedditReplies::Sentinel(_)) | None => Replies::None,
            };
            Ok(CommentNode::Comment(Comment {
                comment_id: data.id,
                text: data.body,
                upvote_count: data.ups,
                distinguished: data.distinguished,
                replies,
            }))
        }
        ThingKind::More => Ok(CommentNode::More(serde_json::from_value(child.data)?)),
        other => Ok(CommentNode::Other(other)),
    }
}

/// True when a listing carries at least one comment. Thread detail responses
/// put the post itself in a separate listing without any.
pub fn has_comments<T>(listing: &RedditListing<T>) -> bool {
    listing
        .data
        .children
        .iter()
        .any(|child| ThingKind::from_tag(&child.kind) == ThingKind::Comment)
}
