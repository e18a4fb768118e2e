use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Reddit "thing" type prefix.
///
/// Tags come straight from the API, so anything outside the known table
/// falls back to [`ThingKind::Unknown`] instead of failing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ThingKind {
    Comment,
    Account,
    Link,
    Message,
    Subreddit,
    Award,
    More,
    Unknown(String),
}

impl ThingKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "t1" => ThingKind::Comment,
            "t2" => ThingKind::Account,
            "t3" => ThingKind::Link,
            "t4" => ThingKind::Message,
            "t5" => ThingKind::Subreddit,
            "t6" => ThingKind::Award,
            "more" => ThingKind::More,
            other => ThingKind::Unknown(other.to_string()),
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            ThingKind::Comment => "t1",
            ThingKind::Account => "t2",
            ThingKind::Link => "t3",
            ThingKind::Message => "t4",
            ThingKind::Subreddit => "t5",
            ThingKind::Award => "t6",
            ThingKind::More => "more",
            ThingKind::Unknown(tag) => tag,
        }
    }

    /// Human-readable name from the type prefix table. `more` is a listing
    /// placeholder rather than a thing type, so it has no label.
    pub fn label(&self) -> Option<&'static str> {
        match self {
            ThingKind::Comment => Some("Comment"),
            ThingKind::Account => Some("Account"),
            ThingKind::Link => Some("Link"),
            ThingKind::Message => Some("Message"),
            ThingKind::Subreddit => Some("Subreddit"),
            ThingKind::Award => Some("Award"),
            ThingKind::More | ThingKind::Unknown(_) => None,
        }
    }
}

impl fmt::Display for ThingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A top-level post returned by a listing or search.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub community_id: String,
    pub thread_id: String,
    pub permalink: String,
    pub community: String,
    pub body: String,
    pub kind_tag: String,
    pub kind_label: Option<String>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_count: Option<u32>,
}

/// Placeholder the API emits in place of a reply subtree it did not inline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MoreMarker {
    #[serde(rename(serialize = "deferredCount", deserialize = "count"), default)]
    pub deferred_count: u32,
    #[serde(rename(serialize = "nodeName", deserialize = "name"), default)]
    pub node_name: String,
    #[serde(rename(serialize = "markerId", deserialize = "id"), default)]
    pub marker_id: String,
    #[serde(rename(serialize = "parentId", deserialize = "parent_id"), default)]
    pub parent_id: String,
    #[serde(default)]
    pub depth: u32,
    #[serde(rename(serialize = "childIds", deserialize = "children"), default)]
    pub child_ids: Vec<String>,
}

/// Markers collected during one aggregation pass, unique by `marker_id`.
#[derive(Debug, Clone, Default)]
pub struct MoreMarkers {
    markers: Vec<MoreMarker>,
    seen: HashSet<String>,
}

impl MoreMarkers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a marker unless one with the same id is already present.
    /// Returns whether the marker was recorded.
    pub fn push(&mut self, marker: MoreMarker) -> bool {
        if !self.seen.insert(marker.marker_id.clone()) {
            return false;
        }
        self.markers.push(marker);
        true
    }

    pub fn extend(&mut self, other: MoreMarkers) {
        for marker in other.markers {
            self.push(marker);
        }
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Markers that still defer at least one reply, in first-seen order.
    pub fn into_deferred(self) -> Vec<MoreMarker> {
        self.markers
            .into_iter()
            .filter(|marker| marker.deferred_count > 0)
            .collect()
    }
}

/// Replies attached to a comment. The API sends an empty string when a
/// comment has no fetched replies.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Replies {
    #[default]
    None,
    Listing(Vec<CommentNode>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommentNode {
    Comment(Comment),
    More(MoreMarker),
    Other(ThingKind),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Comment {
    pub comment_id: String,
    pub text: String,
    pub upvote_count: i64,
    pub distinguished: Option<String>,
    pub replies: Replies,
}

impl Comment {
    /// Moderator or admin authored.
    pub fn is_distinguished(&self) -> bool {
        self.distinguished
            .as_deref()
            .map(|marker| !marker.is_empty())
            .unwrap_or(false)
    }
}

/// Bearer token for one aggregation request. Never cached across requests.
#[derive(Clone)]
pub struct AccessToken {
    pub value: String,
    pub expires_in_seconds: u64,
}

impl AccessToken {
    pub fn new(value: String, expires_in_seconds: u64) -> Self {
        Self {
            value,
            expires_in_seconds,
        }
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"[redacted]")
            .field("expires_in_seconds", &self.expires_in_seconds)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedComment {
    pub comment_id: String,
    pub text: String,
    pub upvote_count: i64,
    pub consolidated_reply_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedThread {
    #[serde(flatten)]
    pub thread: Thread,
    pub comment_total: u32,
    pub comments: Vec<AggregatedComment>,
}

/// Result of one aggregation request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Aggregation {
    pub threads: Vec<AggregatedThread>,
    pub deferred: Vec<MoreMarker>,
}
