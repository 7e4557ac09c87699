//! Mail collaborator and the Gmail REST implementation.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::auth::AccessToken;
use crate::error::DeliveryError;

use super::mime::OutgoingMail;

/// Sends one message with a bearer token.
#[trait_variant::make(Mailer: Send)]
pub trait LocalMailer {
    async fn send(&self, token: &AccessToken, mail: &OutgoingMail) -> Result<(), DeliveryError>;
}

/// Map an HTTP status to a delivery result.
///
/// 401 and 403 mean the token was refused. 408, 429 and 5xx may succeed on a
/// later attempt. Any other client error is final.
pub fn classify_status(status: u16, body: &str) -> Result<(), DeliveryError> {
    let detail = || {
        let body = body.trim();
        if body.is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {}", body.chars().take(200).collect::<String>())
        }
    };
    match status {
        200..=299 => Ok(()),
        401 | 403 => Err(DeliveryError::Auth(detail())),
        408 | 429 | 500..=599 => Err(DeliveryError::Network(detail())),
        _ => Err(DeliveryError::Rejected(detail())),
    }
}

/// `users/me/messages/send` over HTTPS.
#[derive(Debug, Clone)]
pub struct GmailMailer {
    client: reqwest::Client,
    api_url: String,
}

impl GmailMailer {
    pub fn new(api_url: impl Into<String>) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("photobooth/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| DeliveryError::Network(e.to_string()))?;
        Ok(Self {
            client,
            api_url: api_url.into(),
        })
    }
}

impl Mailer for GmailMailer {
    #[instrument(skip_all, fields(attachment = %mail.attachment.file_name))]
    async fn send(&self, token: &AccessToken, mail: &OutgoingMail) -> Result<(), DeliveryError> {
        let boundary = format!("booth-{}", Uuid::new_v4().simple());
        let raw = URL_SAFE.encode(mail.to_mime(&boundary));

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(token.secret())
            .json(&serde_json::json!({ "raw": raw }))
            .send()
            .await
            .map_err(|e| DeliveryError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        debug!(status, "Gmail responded");
        classify_status(status, &body)
    }
}
