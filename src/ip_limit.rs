//! Per-client request limiting.
//!
//! Every request is counted against the client address over a sliding
//! window. The service sits behind one proxy hop, so the last
//! `X-Forwarded-For` entry is the client; without that header the socket
//! peer address is used.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

#[derive(Debug)]
pub struct IpRateLimiter {
    max_requests: usize,
    window: Duration,
    entries: Mutex<HashMap<IpAddr, Vec<Instant>>>,
}

impl IpRateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Records a request from `ip` at `now`. Returns the requests left in
    /// the window, or `None` when the limit is already reached.
    pub async fn check(&self, ip: IpAddr, now: Instant) -> Option<usize> {
        let mut guard = self.entries.lock().await;
        let entries = guard.entry(ip).or_default();
        if !check_rate_limit(entries, now, self.window, self.max_requests) {
            return None;
        }
        let remaining = self.max_requests - entries.len();
        // Forget addresses whose window has fully drained
        guard.retain(|_, hits| hits.iter().any(|t| now.duration_since(*t) < self.window));
        Some(remaining)
    }
}

/// Prunes hits older than `window` and records `now` if the limit allows it.
pub fn check_rate_limit(
    entries: &mut Vec<Instant>,
    now: Instant,
    window: Duration,
    max_requests: usize,
) -> bool {
    if let Some(cutoff) = now.checked_sub(window) {
        entries.retain(|t| *t > cutoff);
    }
    if entries.len() >= max_requests {
        return false;
    }
    entries.push(now);
    true
}

/// Client address with one trusted proxy hop.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.rsplit(',').next())
        .and_then(|hop| hop.trim().parse().ok())
        .or_else(|| peer.map(|addr| addr.ip()))
}

pub async fn limit_by_ip(
    State(limiter): State<Arc<IpRateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let Some(ip) = client_ip(request.headers(), peer) else {
        return next.run(request).await;
    };

    match limiter.check(ip, Instant::now()).await {
        Some(remaining) => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert("ratelimit-limit", HeaderValue::from(limiter.max_requests));
            headers.insert("ratelimit-remaining", HeaderValue::from(remaining));
            response
        }
        None => {
            warn!("Rate limit reached for {}", ip);
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "error": "Too many requests, please try again later.",
                    "code": "RATE_LIMITED"
                })),
            )
                .into_response();
            response
                .headers_mut()
                .insert("retry-after", HeaderValue::from(limiter.window.as_secs()));
            response
        }
    }
}
