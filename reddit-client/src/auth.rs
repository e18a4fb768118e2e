use crate::fetch::FetchRequest;
use crate::RedditClient;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use curator_core::{AccessToken, CoreError, ErrorExt, RedditApiError};
use oauth2::basic::BasicTokenResponse;
use oauth2::TokenResponse;
use tracing::info;

const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;

impl RedditClient {
    /// Client-credentials exchange against the configured token endpoint.
    ///
    /// Every failure is logged and surfaces as
    /// [`RedditApiError::AuthenticationFailed`]; callers must not continue
    /// the aggregation without a token.
    pub async fn acquire_token(&self) -> Result<AccessToken, CoreError> {
        let credentials = format!(
            "{}:{}",
            self.config.client_id.as_str(),
            self.config.client_secret.secret()
        );

        let request = FetchRequest::post("token", self.config.token_url.as_str())
            .header("User-Agent", self.config.user_agent.as_str())
            .header("Authorization", format!("Basic {}", STANDARD.encode(credentials)))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body("grant_type=client_credentials");

        let body = self
            .fetcher
            .fetch_json(request)
            .await
            .map_err(|e| auth_failure(format!("token request failed: {}", e)))?;

        let response: BasicTokenResponse = serde_json::from_value(body)
            .map_err(|e| auth_failure(format!("invalid token response: {}", e)))?;

        let expires_in = response
            .expires_in()
            .map(|d| d.as_secs())
            .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        info!("Acquired Reddit access token, expires in {}s", expires_in);

        Ok(AccessToken::new(
            response.access_token().secret().to_string(),
            expires_in,
        ))
    }
}

/// Logs a token failure at error level and wraps it.
fn auth_failure(reason: String) -> CoreError {
    let error = RedditApiError::AuthenticationFailed { reason };
    error.log_error();
    CoreError::RedditApi(error)
}
