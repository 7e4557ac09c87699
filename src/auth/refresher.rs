//! Background token refresh.
//!
//! The refresher is the only writer of the current token. Readers hold a
//! [`TokenHandle`]; senders that see the token rejected report it through a
//! [`ReauthTrigger`] and carry on without waiting.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::error::AuthError;

use super::credentials::{AccessToken, CredentialStore};

/// Pending re-authentication requests kept before further ones are dropped.
const REAUTH_CAPACITY: usize = 4;

/// Result of one successful refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in: Duration,
    /// Set when the server rotates the refresh token.
    pub refresh_token: Option<String>,
}

/// Exchanges a refresh token for an access token.
#[trait_variant::make(TokenEndpoint: Send)]
pub trait LocalTokenEndpoint {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError>;
}

/// Read-only view of the current token.
#[derive(Debug, Clone)]
pub struct TokenHandle {
    rx: watch::Receiver<Option<AccessToken>>,
}

impl TokenHandle {
    /// A handle that always returns `token`.
    pub fn fixed(token: Option<AccessToken>) -> Self {
        let (_tx, rx) = watch::channel(token);
        Self { rx }
    }

    pub fn current(&self) -> Option<AccessToken> {
        self.rx.borrow().clone()
    }

    /// Wait until the refresher publishes a new value.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

/// A sender's report that the server rejected a token.
#[derive(Clone, PartialEq, Eq)]
pub struct ReauthRequest {
    /// Secret of the rejected token, if a token was used at all.
    pub rejected: Option<String>,
}

impl std::fmt::Debug for ReauthRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReauthRequest")
            .field("rejected", &self.rejected.is_some())
            .finish()
    }
}

/// Asks the refresher to re-acquire the token. Never blocks.
#[derive(Debug, Clone)]
pub struct ReauthTrigger {
    tx: mpsc::Sender<ReauthRequest>,
}

impl ReauthTrigger {
    /// A trigger and the receiving end, for wiring outside a refresher.
    pub fn channel() -> (Self, mpsc::Receiver<ReauthRequest>) {
        let (tx, rx) = mpsc::channel(REAUTH_CAPACITY);
        (Self { tx }, rx)
    }

    pub fn request(&self, rejected: Option<&AccessToken>) {
        let request = ReauthRequest {
            rejected: rejected.map(|t| t.secret().to_string()),
        };
        if self.tx.try_send(request).is_err() {
            debug!("Re-authentication already pending");
        }
    }
}

/// Keeps the access token fresh on a fixed period.
pub struct TokenRefresher<E> {
    endpoint: E,
    store: CredentialStore,
    period: Duration,
    tx: watch::Sender<Option<AccessToken>>,
    reauth: mpsc::Receiver<ReauthRequest>,
}

impl<E: TokenEndpoint> TokenRefresher<E> {
    /// Seed the current token from the credential store.
    pub fn new(
        endpoint: E,
        store: CredentialStore,
        period: Duration,
    ) -> (Self, TokenHandle, ReauthTrigger) {
        let initial = match store.load() {
            Ok(credentials) => credentials
                .access_token()
                .filter(|t| !t.is_expired_at(Utc::now())),
            Err(e) => {
                warn!(error = %e, "No usable stored credentials");
                None
            }
        };
        let (tx, rx) = watch::channel(initial);
        let (trigger, reauth) = ReauthTrigger::channel();
        let refresher = Self {
            endpoint,
            store,
            period,
            tx,
            reauth,
        };
        (refresher, TokenHandle { rx }, trigger)
    }

    /// Refresh once, persist the result, then publish it.
    #[instrument(skip(self), fields(store = %self.store.path().display()))]
    pub async fn refresh_once(&mut self) -> Result<AccessToken, AuthError> {
        let mut credentials = self.store.load()?;
        let grant = self.endpoint.refresh(&credentials.refresh_token).await?;

        let lifetime = chrono::Duration::from_std(grant.expires_in)
            .map_err(|e| AuthError::Malformed(format!("expires_in out of range: {e}")))?;
        let token = AccessToken::new(grant.access_token, Utc::now() + lifetime);
        credentials.access_token = Some(token.secret().to_string());
        credentials.expiry = Some(token.expiry());
        if let Some(rotated) = grant.refresh_token {
            credentials.refresh_token = rotated;
        }
        self.store.save(&credentials)?;

        self.tx.send_replace(Some(token.clone()));
        info!(expiry = %token.expiry(), "Access token refreshed");
        Ok(token)
    }

    /// Refresh on every tick until every [`TokenHandle`] is gone. The first
    /// tick fires immediately.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut triggers_open = true;
        info!(period_ms = self.period.as_millis() as u64, "Token refresher started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh_once().await {
                        warn!(error = %e, "Token refresh failed, keeping the current token");
                    }
                }
                request = self.reauth.recv(), if triggers_open => match request {
                    Some(request) => self.reauthenticate(request).await,
                    None => triggers_open = false,
                },
                () = self.tx.closed() => break,
            }
        }
        debug!("Token refresher stopped");
    }

    async fn reauthenticate(&mut self, request: ReauthRequest) {
        let current = self.tx.borrow().clone();
        if let (Some(rejected), Some(current)) = (&request.rejected, &current) {
            if rejected != current.secret() {
                debug!("Rejected token was already replaced");
                return;
            }
        }

        warn!("Access token rejected, re-acquiring");
        self.tx.send_replace(None);
        match self.refresh_once().await {
            Ok(_) => info!("Access token re-acquired"),
            Err(e) => error!(
                error = %e,
                "Silent re-acquisition failed, interactive authorisation required"
            ),
        }
    }
}
