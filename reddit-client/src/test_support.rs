//! Canned upstream responses for unit tests.

use crate::fetch::{Fetch, FetchRequest};
use crate::RedditClient;
use async_trait::async_trait;
use curator_core::{AccessToken, CoreError, RedditConfig, DEFAULT_TOKEN_URL};
use oauth2::{ClientId, ClientSecret};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Answers requests by exact URL. Unknown URLs fail like a 404 and every
/// request is recorded.
#[derive(Clone, Default)]
pub struct MockFetch {
    responses: Arc<Mutex<HashMap<String, Value>>>,
    requests: Arc<Mutex<Vec<FetchRequest>>>,
}

impl MockFetch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, url: &str, body: Value) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), body);
        self
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetch for MockFetch {
    async fn fetch_json(&self, request: FetchRequest) -> Result<Value, CoreError> {
        let response = self.responses.lock().unwrap().get(&request.url).cloned();
        let url = request.url.clone();
        self.requests.lock().unwrap().push(request);

        response.ok_or_else(|| CoreError::RequestFailed {
            message: format!("no canned response for {}", url),
            status_code: Some(404),
        })
    }
}

pub fn test_client(fetch: MockFetch) -> RedditClient {
    let config = RedditConfig {
        client_id: ClientId::new("client".to_string()),
        client_secret: ClientSecret::new("secret".to_string()),
        token_url: DEFAULT_TOKEN_URL.to_string(),
        api_host: "https://oauth.reddit.com".to_string(),
        user_agent: "curator-test/1.0".to_string(),
        request_timeout_secs: 30,
    };
    RedditClient::with_fetcher(config, Arc::new(fetch))
}

pub fn test_token() -> AccessToken {
    AccessToken::new("test-token".to_string(), 3600)
}

pub fn thread_json(id: &str, community: &str, num_comments: u32) -> Value {
    json!({
        "kind": "t3",
        "data": {
            "subreddit_id": format!("t5_{}", community),
            "id": id,
            "permalink": format!("/r/{}/comments/{}/", community, id),
            "subreddit": community,
            "selftext": format!("body of {}", id),
            "title": format!("title {}", id),
            "num_comments": num_comments
        }
    })
}

pub fn listing(children: Vec<Value>, after: Option<&str>) -> Value {
    json!({
        "kind": "Listing",
        "data": {
            "children": children,
            "after": after,
            "before": null
        }
    })
}

pub fn comment_json(id: &str, body: &str, replies: Value) -> Value {
    json!({
        "kind": "t1",
        "data": {
            "id": id,
            "body": body,
            "ups": 3,
            "distinguished": null,
            "replies": replies
        }
    })
}

pub fn more_json(id: &str, count: u32) -> Value {
    json!({
        "kind": "more",
        "data": {
            "count": count,
            "name": format!("t1_{}", id),
            "id": id,
            "parent_id": "t3_parent",
            "depth": 0,
            "children": [id]
        }
    })
}

/// The two-element array returned for a thread permalink.
pub fn thread_detail(thread: Value, comments: Vec<Value>) -> Value {
    json!([listing(vec![thread], None), listing(comments, None)])
}
