use crate::ip_limit::{limit_by_ip, IpRateLimiter};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use curator_core::{AggregationConfig, Aggregation, CoreError, ErrorExt, Thread};
use reddit_client::{ApiMetrics, EndpointSummary, HttpFetcher, RateLimitStatus, RedditClient};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::{info, warn, Level};

pub const CONTENT_SECURITY_POLICY: &str =
    "default-src 'none'; frame-src 'none'; frame-ancestors 'none';";

#[derive(Clone)]
pub struct AppState {
    pub client: RedditClient,
    pub aggregation: AggregationConfig,
    /// Present when the client talks to Reddit through [`HttpFetcher`].
    pub fetcher: Option<Arc<HttpFetcher>>,
    pub ip_limiter: Arc<IpRateLimiter>,
}

pub fn build_router(state: AppState, origin: &str) -> Router {
    let cors = match origin.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new().allow_origin(AllowOrigin::exact(origin)),
        Err(e) => {
            warn!("Ignoring unusable CORS origin {:?}: {}", origin, e);
            CorsLayer::new()
        }
    }
    .allow_methods([Method::GET, Method::POST])
    .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/api/v1/createCategory", post(create_category))
        .route("/api/v1/search", post(search))
        .route("/api/v1/metrics", get(metrics))
        .layer(middleware::from_fn_with_state(
            state.ip_limiter.clone(),
            limit_by_ip,
        ))
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(CONTENT_SECURITY_POLICY),
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                })
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCategoryRequest {
    #[serde(default)]
    pub subreddits: Vec<String>,
    #[serde(default)]
    pub queries: Vec<String>,
    #[serde(default)]
    pub min_comment_total: Option<usize>,
}

#[derive(Debug, Serialize)]
struct CategoryResponse {
    /// `null` when nothing could be aggregated.
    result: Option<Aggregation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub result_limit: Option<usize>,
    #[serde(default)]
    pub min_comments: Option<u32>,
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    result: Vec<Thread>,
    partial: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MetricsResponse {
    metrics: ApiMetrics,
    endpoints: Vec<EndpointSummary>,
    rate_limit: RateLimitStatus,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: String,
}

fn bad_request(error: String, code: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error,
            code: code.to_string(),
        }),
    )
        .into_response()
}

fn rejected(error: &CoreError) -> Response {
    bad_request(error.user_friendly_message(), &error.error_code())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "hello": "world" }))
}

async fn create_category(
    State(state): State<AppState>,
    payload: Result<Json<CreateCategoryRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return bad_request(rejection.body_text(), "INVALID_INPUT"),
    };
    let min_comment_total = request
        .min_comment_total
        .unwrap_or(state.aggregation.min_comment_total);
    info!(
        "createCategory for {} subreddits and {} queries",
        request.subreddits.len(),
        request.queries.len()
    );

    let response = match state
        .client
        .aggregate(&request.subreddits, &request.queries, min_comment_total)
        .await
    {
        Ok(aggregation) => CategoryResponse {
            result: Some(aggregation),
            error: None,
        },
        Err(error @ CoreError::InvalidInput { .. }) => return rejected(&error),
        Err(error) => {
            error.log_warn();
            CategoryResponse {
                result: None,
                error: Some(error.error_code()),
            }
        }
    };
    (StatusCode::CREATED, Json(response)).into_response()
}

async fn search(
    State(state): State<AppState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return bad_request(rejection.body_text(), "INVALID_INPUT"),
    };
    if request.query.trim().is_empty() {
        return rejected(&CoreError::invalid_input("search query is empty"));
    }

    let token = match state.client.acquire_token().await {
        Ok(token) => token,
        Err(error) => {
            return Json(SearchResponse {
                result: Vec::new(),
                partial: false,
                error: Some(error.error_code()),
            })
            .into_response()
        }
    };

    let outcome = state
        .client
        .search_all(
            &request.query,
            request
                .result_limit
                .unwrap_or(state.aggregation.search_result_limit),
            request
                .min_comments
                .unwrap_or(state.aggregation.search_min_comments),
            &token,
        )
        .await;

    let partial = outcome.is_partial();
    let error = outcome.error().map(|e| e.log_warn().error_code());
    Json(SearchResponse {
        result: outcome.into_value(),
        partial,
        error,
    })
    .into_response()
}

async fn metrics(State(state): State<AppState>) -> Response {
    match &state.fetcher {
        Some(fetcher) => Json(MetricsResponse {
            metrics: fetcher.get_metrics().await,
            endpoints: fetcher.endpoint_summaries().await,
            rate_limit: fetcher.get_rate_limit_status().await,
        })
        .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use curator_core::AppConfig;
    use reddit_client::{Fetch, FetchRequest};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use tower::ServiceExt;

    const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

    #[derive(Default)]
    struct StubFetch {
        responses: HashMap<String, Value>,
        requests: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Fetch for StubFetch {
        async fn fetch_json(&self, request: FetchRequest) -> Result<Value, CoreError> {
            self.requests.lock().unwrap().push(request.url.clone());
            self.responses
                .get(&request.url)
                .cloned()
                .ok_or(CoreError::RequestFailed {
                    message: "not stubbed".to_string(),
                    status_code: Some(404),
                })
        }
    }

    fn app(responses: Vec<(String, Value)>) -> (Router, Arc<StubFetch>) {
        let config = AppConfig::from_lookup(|key| match key {
            "REDDIT_CLIENT_ID" => Some("client".to_string()),
            "REDDIT_CLIENT_SECRET" => Some("secret".to_string()),
            _ => None,
        })
        .unwrap();
        let fetch = Arc::new(StubFetch {
            responses: responses.into_iter().collect(),
            ..Default::default()
        });
        let state = AppState {
            client: RedditClient::with_fetcher(config.reddit, fetch.clone()),
            aggregation: config.aggregation,
            fetcher: None,
            ip_limiter: Arc::new(IpRateLimiter::new(
                config.server.rate_limit_max_requests,
                Duration::from_secs(config.server.rate_limit_window_secs),
            )),
        };
        (build_router(state, &config.server.origin), fetch)
    }

    fn token() -> (String, Value) {
        (
            TOKEN_URL.to_string(),
            json!({"access_token": "tok", "token_type": "bearer", "expires_in": 3600}),
        )
    }

    fn thread(id: &str, num_comments: u32) -> Value {
        json!({"kind": "t3", "data": {
            "subreddit_id": "t5_rust", "id": id, "permalink": format!("/r/rust/comments/{}/", id),
            "subreddit": "rust", "selftext": "", "title": id, "num_comments": num_comments
        }})
    }

    fn listing(children: Vec<Value>) -> Value {
        json!({"kind": "Listing", "data": {"children": children, "after": null}})
    }

    fn post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get_from(uri: &str, client: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("x-forwarded-for", client)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_sets_security_header() {
        let (router, _) = app(vec![]);
        let response = router
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_SECURITY_POLICY).unwrap(),
            CONTENT_SECURITY_POLICY
        );
        assert_eq!(body_json(response).await, json!({"hello": "world"}));
    }

    #[tokio::test]
    async fn test_twenty_first_request_in_window_is_rejected() {
        let (router, _) = app(vec![]);

        for i in 0..20 {
            let response = router
                .clone()
                .oneshot(get_from("/", "198.51.100.4"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "request {}", i + 1);
        }

        let response = router
            .clone()
            .oneshot(get_from("/", "198.51.100.4"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body_json(response).await["code"], "RATE_LIMITED");

        // Other clients keep their own budget
        let response = router
            .oneshot(get_from("/", "198.51.100.5"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("ratelimit-remaining").unwrap(), "19");
    }

    #[tokio::test]
    async fn test_rate_limit_shared_across_routes() {
        let (router, fetch) = app(vec![token()]);
        for _ in 0..20 {
            router
                .clone()
                .oneshot(get_from("/api/v1/metrics", "198.51.100.6"))
                .await
                .unwrap();
        }

        let mut request = post("/api/v1/search", r#"{"query": "rust"}"#);
        request
            .headers_mut()
            .insert("x-forwarded-for", HeaderValue::from_static("198.51.100.6"));
        let response = router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(fetch.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_category_rejects_missing_subreddits() {
        let (router, fetch) = app(vec![token()]);
        let response = router
            .oneshot(post("/api/v1/createCategory", r#"{"queries": ["async"]}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["code"], "INVALID_INPUT");
        assert!(fetch.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_category_rejects_malformed_json() {
        let (router, _) = app(vec![]);
        let response = router
            .oneshot(post("/api/v1/createCategory", "{not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_category_returns_aggregation() {
        let comments = json!([
            listing(vec![thread("a", 3)]),
            listing(vec![json!({"kind": "t1", "data": {
                "id": "c1", "body": "hello", "ups": 2, "replies": ""
            }})])
        ]);
        let (router, _) = app(vec![
            token(),
            (
                "https://oauth.reddit.com/r/rust/search/?q=async&sort=relevance&t=year&restrict_sr=1&limit=100"
                    .to_string(),
                listing(vec![thread("a", 3)]),
            ),
            ("https://oauth.reddit.com/r/rust/comments/a/".to_string(), comments),
        ]);

        let response = router
            .oneshot(post(
                "/api/v1/createCategory",
                r#"{"subreddits": ["rust"], "queries": ["async"]}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        let threads = body["result"]["threads"].as_array().unwrap();
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0]["threadId"], "a");
        assert_eq!(threads[0]["commentTotal"], 3);
        assert_eq!(threads[0]["comments"][0]["text"], "hello");
    }

    #[tokio::test]
    async fn test_create_category_absent_result_is_null() {
        let (router, _) = app(vec![]);
        let response = router
            .oneshot(post(
                "/api/v1/createCategory",
                r#"{"subreddits": ["rust"], "queries": ["async"]}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert!(body["result"].is_null());
        assert_eq!(body["error"], "REDDIT_API");
    }

    #[tokio::test]
    async fn test_search_filters_by_min_comments() {
        let (router, _) = app(vec![
            token(),
            (
                "https://oauth.reddit.com/search/?q=rust&sort=relevance&t=year&limit=100".to_string(),
                listing(vec![thread("busy", 50), thread("quiet", 1)]),
            ),
        ]);

        let response = router
            .oneshot(post("/api/v1/search", r#"{"query": "rust"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["partial"], false);
        let result = body["result"].as_array().unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0]["threadId"], "busy");
    }

    #[tokio::test]
    async fn test_search_rejects_empty_query() {
        let (router, _) = app(vec![token()]);
        let response = router
            .oneshot(post("/api/v1/search", r#"{"query": "   "}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_metrics_unavailable_without_http_fetcher() {
        let (router, _) = app(vec![]);
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/v1/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_metrics_reports_endpoint_summaries() {
        let config = AppConfig::from_lookup(|key| match key {
            "REDDIT_CLIENT_ID" => Some("client".to_string()),
            "REDDIT_CLIENT_SECRET" => Some("secret".to_string()),
            _ => None,
        })
        .unwrap();
        let fetcher = Arc::new(HttpFetcher::new(Duration::from_secs(5)).unwrap());
        let state = AppState {
            client: RedditClient::with_fetcher(config.reddit, fetcher.clone()),
            aggregation: config.aggregation,
            fetcher: Some(fetcher),
            ip_limiter: Arc::new(IpRateLimiter::new(20, Duration::from_secs(900))),
        };
        let router = build_router(state, &config.server.origin);

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/v1/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["metrics"]["total_requests"], 0);
        assert_eq!(body["endpoints"], json!([]));
        assert!(body["rateLimit"].is_object());
    }
}
