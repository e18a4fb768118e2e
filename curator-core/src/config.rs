use crate::error::ConfigError;
use oauth2::{ClientId, ClientSecret};
use serde::Deserialize;
use std::str::FromStr;
use tracing::{debug, info};
use url::Url;

pub const DEFAULT_USER_AGENT: &str = "curator:v0.1.0 (aggregation service)";
pub const DEFAULT_API_HOST: &str = "https://oauth.reddit.com";
pub const DEFAULT_TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

#[derive(Debug, Clone)]
pub struct RedditConfig {
    pub client_id: ClientId,
    pub client_secret: ClientSecret,
    pub token_url: String,
    pub api_host: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub origin: String,
    /// Requests allowed per client IP within one window.
    pub rate_limit_max_requests: usize,
    pub rate_limit_window_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            origin: "http://localhost:8000".to_string(),
            rate_limit_max_requests: 20,
            rate_limit_window_secs: 15 * 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// A thread is kept only when it has more retained comments than this.
    pub min_comment_total: usize,
    /// Result budget for the flat search loop.
    pub search_result_limit: usize,
    /// Flat search keeps threads with at least this many comments.
    pub search_min_comments: u32,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            min_comment_total: 0,
            search_result_limit: 100,
            search_min_comments: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub reddit: RedditConfig,
    pub server: ServerConfig,
    pub aggregation: AggregationConfig,
}

/// On-disk layout; credentials stay plain strings until validated.
#[derive(Debug, Deserialize)]
struct FileConfig {
    reddit: FileRedditConfig,
    #[serde(default)]
    server: FileServerConfig,
    #[serde(default)]
    aggregation: AggregationConfig,
}

#[derive(Debug, Deserialize)]
struct FileRedditConfig {
    client_id: String,
    client_secret: String,
    token_url: Option<String>,
    api_host: Option<String>,
    user_agent: Option<String>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct FileServerConfig {
    port: Option<u16>,
    origin: Option<String>,
    rate_limit_max_requests: Option<usize>,
    rate_limit_window_secs: Option<u64>,
}

impl AppConfig {
    /// Loads configuration from the process environment, reading `.env` first
    /// when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. `from_env` uses the
    /// process environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingEnvironmentVariable {
                    var_name: key.to_string(),
                })
        };

        let defaults = AggregationConfig::default();
        let server_defaults = ServerConfig::default();

        let config = Self {
            reddit: RedditConfig {
                client_id: ClientId::new(required("REDDIT_CLIENT_ID")?),
                client_secret: ClientSecret::new(required("REDDIT_CLIENT_SECRET")?),
                token_url: lookup("REDDIT_API_ACCESS_TOKEN_URI")
                    .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
                api_host: lookup("REDDIT_API_HOST").unwrap_or_else(|| DEFAULT_API_HOST.to_string()),
                user_agent: lookup("REDDIT_UNIQUE_USER_AGENT")
                    .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
                request_timeout_secs: parse_or("REQUEST_TIMEOUT_SECS", &lookup, 30)?,
            },
            server: ServerConfig {
                port: parse_or("PORT", &lookup, server_defaults.port)?,
                origin: lookup("ORIGIN").unwrap_or(server_defaults.origin),
                rate_limit_max_requests: parse_or(
                    "RATE_LIMIT_MAX_REQUESTS",
                    &lookup,
                    server_defaults.rate_limit_max_requests,
                )?,
                rate_limit_window_secs: parse_or(
                    "RATE_LIMIT_WINDOW_SECS",
                    &lookup,
                    server_defaults.rate_limit_window_secs,
                )?,
            },
            aggregation: AggregationConfig {
                min_comment_total: parse_or(
                    "MIN_COMMENT_TOTAL",
                    &lookup,
                    defaults.min_comment_total,
                )?,
                ..defaults
            },
        };

        config.validate()?;
        info!(
            "Loaded configuration: api_host={}, token_url={}, port={}",
            config.reddit.api_host, config.reddit.token_url, config.server.port
        );
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(raw)?;
        let server_defaults = ServerConfig::default();

        let config = Self {
            reddit: RedditConfig {
                client_id: ClientId::new(file.reddit.client_id),
                client_secret: ClientSecret::new(file.reddit.client_secret),
                token_url: file
                    .reddit
                    .token_url
                    .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
                api_host: file
                    .reddit
                    .api_host
                    .unwrap_or_else(|| DEFAULT_API_HOST.to_string()),
                user_agent: file
                    .reddit
                    .user_agent
                    .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
                request_timeout_secs: file.reddit.request_timeout_secs.unwrap_or(30),
            },
            server: ServerConfig {
                port: file.server.port.unwrap_or(server_defaults.port),
                origin: file.server.origin.unwrap_or(server_defaults.origin),
                rate_limit_max_requests: file
                    .server
                    .rate_limit_max_requests
                    .unwrap_or(server_defaults.rate_limit_max_requests),
                rate_limit_window_secs: file
                    .server
                    .rate_limit_window_secs
                    .unwrap_or(server_defaults.rate_limit_window_secs),
            },
            aggregation: file.aggregation,
        };

        config.validate()?;
        debug!("Parsed TOML configuration for {}", config.reddit.api_host);
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        info!("Loading configuration from {}", path.display());
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reddit.client_id.as_str().trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "reddit.client_id".to_string(),
            });
        }
        if self.reddit.client_secret.secret().trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "reddit.client_secret".to_string(),
            });
        }
        if self.reddit.user_agent.trim().is_empty() {
            return Err(ConfigError::ValidationFailed {
                reason: "user agent must not be empty".to_string(),
            });
        }
        if self.reddit.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "reddit.request_timeout_secs".to_string(),
                value: "0".to_string(),
            });
        }
        if self.server.rate_limit_max_requests == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.rate_limit_max_requests".to_string(),
                value: "0".to_string(),
            });
        }
        if self.server.rate_limit_window_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.rate_limit_window_secs".to_string(),
                value: "0".to_string(),
            });
        }
        check_http_url("reddit.api_host", &self.reddit.api_host)?;
        check_http_url("reddit.token_url", &self.reddit.token_url)?;
        Ok(())
    }
}

fn parse_or<T, F>(key: &str, lookup: &F, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            field: key.to_string(),
            value: raw,
        }),
        None => Ok(default),
    }
}

fn check_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    };
    let url = Url::parse(value).map_err(|_| invalid())?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        _ => Err(invalid()),
    }
}
