use anyhow::Result;
use curator_core::{AppConfig, ErrorExt};
use reddit_client::{HttpFetcher, RedditClient};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod ip_limit;
mod routes;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("curator=info,reddit_client=info,tower_http=info")
            }),
        )
        .init();

    tracing::info!("Starting Curator");

    let config = match std::env::var("CURATOR_CONFIG") {
        Ok(path) => AppConfig::from_file(path),
        Err(_) => AppConfig::from_env(),
    }
    .inspect_err(|e| {
        e.log_error();
    })?;

    let fetcher = Arc::new(HttpFetcher::new(Duration::from_secs(
        config.reddit.request_timeout_secs,
    ))?);
    let client = RedditClient::with_fetcher(config.reddit.clone(), fetcher.clone());

    let state = routes::AppState {
        client,
        aggregation: config.aggregation.clone(),
        fetcher: Some(fetcher),
        ip_limiter: Arc::new(ip_limit::IpRateLimiter::new(
            config.server.rate_limit_max_requests,
            Duration::from_secs(config.server.rate_limit_window_secs),
        )),
    };
    let app = routes::build_router(state, &config.server.origin);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {} (allowed origin {})", addr, config.server.origin);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
