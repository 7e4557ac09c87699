//! Google OAuth2 token endpoint.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, instrument};

use crate::error::AuthError;

use super::credentials::ClientSecret;
use super::refresher::{TokenEndpoint, TokenGrant};

/// Refreshes tokens with `grant_type=refresh_token`.
#[derive(Debug, Clone)]
pub struct GoogleTokenEndpoint {
    client: reqwest::Client,
    secret: ClientSecret,
}

impl GoogleTokenEndpoint {
    pub fn new(secret: ClientSecret) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("photobooth/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AuthError::Network(e.to_string()))?;
        Ok(Self { client, secret })
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
    refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
    error_description: Option<String>,
}

/// Interpret a token endpoint response.
pub fn parse_token_response(status: u16, body: &str) -> Result<TokenGrant, AuthError> {
    if (200..300).contains(&status) {
        let response: TokenResponse =
            serde_json::from_str(body).map_err(|e| AuthError::Malformed(e.to_string()))?;
        return Ok(TokenGrant {
            access_token: response.access_token,
            expires_in: Duration::from_secs(response.expires_in),
            refresh_token: response.refresh_token,
        });
    }

    let detail = serde_json::from_str::<ErrorResponse>(body).map_or_else(
        |_| format!("HTTP {status}"),
        |e| match e.error_description {
            Some(description) => format!("{}: {description}", e.error),
            None => e.error,
        },
    );
    match status {
        400 | 401 => Err(AuthError::Rejected(detail)),
        _ => Err(AuthError::Network(detail)),
    }
}

impl TokenEndpoint for GoogleTokenEndpoint {
    #[instrument(skip_all, fields(uri = %self.secret.token_uri))]
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError> {
        let response = self
            .client
            .post(&self.secret.token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.secret.client_id.as_str()),
                ("client_secret", self.secret.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;
        debug!(status, "Token endpoint responded");
        parse_token_response(status, &body)
    }
}
