//! Artifact delivery by email and print.
//!
//! The session controller submits [`DeliveryRequest`]s to a [`DeliveryQueue`]
//! and returns to idle at once. The [`Dispatcher`] drains the queue on its
//! own tasks, retries transient email failures with backoff, and reports
//! every outcome to the journal and to subscribers.

mod gmail;
pub mod journal;
mod mime;
pub mod mock;
mod print;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::auth::{ReauthTrigger, TokenHandle};
use crate::config::EmailSettings;
use crate::error::DeliveryError;
use crate::session::ArchivedArtifact;

pub use gmail::{GmailMailer, LocalMailer, Mailer, classify_status};
pub use journal::{Journal, JournalEntry};
pub use mime::{Attachment, OutgoingMail};
pub use print::{CommandPrinter, LocalPrinter, Printer};

const REPORT_CAPACITY: usize = 32;

/// Where an artifact goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeliveryKind {
    Email { recipient: String },
    Print,
}

impl DeliveryKind {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Email { .. } => "email",
            Self::Print => "print",
        }
    }
}

/// One queued delivery.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryRequest {
    pub id: Uuid,
    pub session: Uuid,
    pub kind: DeliveryKind,
    pub artifact: ArchivedArtifact,
    pub requested_at: DateTime<Utc>,
}

impl DeliveryRequest {
    pub fn new(session: Uuid, kind: DeliveryKind, artifact: ArchivedArtifact) -> Self {
        Self {
            id: Uuid::new_v4(),
            session,
            kind,
            artifact,
            requested_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed { reason: String },
}

/// Final result of one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub request: Uuid,
    pub session: Uuid,
    pub kind: DeliveryKind,
    pub attempts: u32,
    pub status: DeliveryStatus,
}

impl DeliveryReport {
    pub const fn is_sent(&self) -> bool {
        matches!(self.status, DeliveryStatus::Sent)
    }
}

/// Submission side of the dispatcher queue. Never blocks.
#[derive(Debug, Clone)]
pub struct DeliveryQueue {
    tx: mpsc::UnboundedSender<DeliveryRequest>,
}

impl DeliveryQueue {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DeliveryRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Returns false if the dispatcher has stopped.
    pub fn submit(&self, request: DeliveryRequest) -> bool {
        self.tx.send(request).is_ok()
    }
}

/// Email retry schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f32,
    pub max_delay: Duration,
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &EmailSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_delay: Duration::from_millis(settings.initial_backoff_millis),
            backoff_factor: settings.backoff_factor,
            max_delay: Duration::from_millis(settings.max_backoff_millis),
            attempt_timeout: Duration::from_millis(settings.attempt_timeout_millis),
        }
    }

    /// Delay after `current`, capped at `max_delay`. A factor that does not
    /// yield a valid duration jumps straight to the cap.
    pub fn next_delay(&self, current: Duration) -> Duration {
        Duration::try_from_secs_f32(current.as_secs_f32() * self.backoff_factor)
            .map_or(self.max_delay, |next| next.min(self.max_delay))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&EmailSettings::default())
    }
}

/// Executes delivery requests off the controller's path.
pub struct Dispatcher<M, P> {
    mailer: Arc<M>,
    printer: Arc<P>,
    tokens: TokenHandle,
    reauth: ReauthTrigger,
    policy: RetryPolicy,
    email: Arc<EmailSettings>,
    journal: Option<Arc<Mutex<Journal>>>,
    reports: broadcast::Sender<DeliveryReport>,
}

impl<M, P> Clone for Dispatcher<M, P> {
    fn clone(&self) -> Self {
        Self {
            mailer: Arc::clone(&self.mailer),
            printer: Arc::clone(&self.printer),
            tokens: self.tokens.clone(),
            reauth: self.reauth.clone(),
            policy: self.policy,
            email: Arc::clone(&self.email),
            journal: self.journal.clone(),
            reports: self.reports.clone(),
        }
    }
}

impl<M, P> Dispatcher<M, P>
where
    M: Mailer + Send + Sync + 'static,
    P: Printer + Send + Sync + 'static,
{
    pub fn new(mailer: Arc<M>, printer: Arc<P>, tokens: TokenHandle, reauth: ReauthTrigger) -> Self {
        let (reports, _) = broadcast::channel(REPORT_CAPACITY);
        Self {
            mailer,
            printer,
            tokens,
            reauth,
            policy: RetryPolicy::default(),
            email: Arc::new(EmailSettings::default()),
            journal: None,
            reports,
        }
    }

    #[must_use]
    pub const fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Message text and sender. Also sets the retry policy.
    #[must_use]
    pub fn with_email(mut self, settings: EmailSettings) -> Self {
        self.policy = RetryPolicy::from_settings(&settings);
        self.email = Arc::new(settings);
        self
    }

    #[must_use]
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(Arc::new(Mutex::new(journal)));
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeliveryReport> {
        self.reports.subscribe()
    }

    /// Process requests until the queue closes and in-flight work finishes.
    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<DeliveryRequest>) {
        info!("Delivery dispatcher started");
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                request = rx.recv() => {
                    let Some(request) = request else { break };
                    let this = self.clone();
                    in_flight.spawn(async move { this.deliver(request).await });
                }
                Some(joined) = in_flight.join_next() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Delivery task failed");
                    }
                }
            }
        }

        debug!(pending = in_flight.len(), "Queue closed, draining deliveries");
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Delivery task failed");
            }
        }
        info!("Delivery dispatcher stopped");
    }

    /// Run one request to completion and report it.
    #[instrument(skip_all, fields(request = %request.id, kind = request.kind.name()))]
    pub async fn deliver(&self, request: DeliveryRequest) -> DeliveryReport {
        let (attempts, result) = match &request.kind {
            DeliveryKind::Email { recipient } => self.send_email(&request, recipient).await,
            DeliveryKind::Print => (1, self.print(&request).await),
        };

        let status = match result {
            Ok(()) => {
                info!(attempts, "Delivery succeeded");
                DeliveryStatus::Sent
            }
            Err(e) => {
                error!(attempts, error = %e, "Delivery failed");
                DeliveryStatus::Failed {
                    reason: e.to_string(),
                }
            }
        };

        let report = DeliveryReport {
            request: request.id,
            session: request.session,
            kind: request.kind.clone(),
            attempts,
            status,
        };
        self.record(&request, &report);
        let _ = self.reports.send(report.clone());
        report
    }

    async fn send_email(&self, request: &DeliveryRequest, recipient: &str) -> (u32, Result<(), DeliveryError>) {
        let data = match tokio::fs::read(&request.artifact.path).await {
            Ok(data) => data,
            Err(e) => {
                return (
                    0,
                    Err(DeliveryError::Artifact(format!(
                        "{}: {e}",
                        request.artifact.path.display()
                    ))),
                );
            }
        };
        let mail = OutgoingMail::new(
            &self.email,
            recipient,
            Attachment {
                file_name: request.artifact.file_name(),
                content_type: request.artifact.content_type.clone(),
                data,
            },
        );

        let mut delay = self.policy.initial_delay;
        let mut attempt = 0;
        loop {
            attempt += 1;

            let Some(token) = self.tokens.current() else {
                self.reauth.request(None);
                return (
                    attempt,
                    Err(DeliveryError::Auth("no access token available".to_string())),
                );
            };

            let timeout_ms = u64::try_from(self.policy.attempt_timeout.as_millis()).unwrap_or(u64::MAX);
            let result = tokio::time::timeout(self.policy.attempt_timeout, self.mailer.send(&token, &mail))
                .await
                .unwrap_or(Err(DeliveryError::Timeout(timeout_ms)));

            match result {
                Ok(()) => return (attempt, Ok(())),
                Err(DeliveryError::Auth(reason)) => {
                    warn!(reason = %reason, "Access token rejected, requesting re-authentication");
                    self.reauth.request(Some(&token));
                    return (attempt, Err(DeliveryError::Auth(reason)));
                }
                Err(e) if e.is_transient() && attempt < self.policy.max_attempts => {
                    warn!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        error = %e,
                        delay_ms = delay.as_millis(),
                        "Email send failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = self.policy.next_delay(delay);
                }
                Err(e) => return (attempt, Err(e)),
            }
        }
    }

    async fn print(&self, request: &DeliveryRequest) -> Result<(), DeliveryError> {
        if !request.artifact.path.exists() {
            return Err(DeliveryError::Artifact(format!(
                "{} does not exist",
                request.artifact.path.display()
            )));
        }
        let timeout = self.policy.attempt_timeout;
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        tokio::time::timeout(timeout, self.printer.print(&request.artifact.path))
            .await
            .unwrap_or(Err(DeliveryError::Timeout(timeout_ms)))
    }

    fn record(&self, request: &DeliveryRequest, report: &DeliveryReport) {
        let Some(journal) = &self.journal else {
            return;
        };
        let entry = JournalEntry::from_report(request, report);
        match journal.lock() {
            Ok(journal) => {
                if let Err(e) = journal.record(&entry) {
                    warn!(error = %e, "Failed to journal delivery");
                }
            }
            Err(_) => warn!("Delivery journal lock poisoned"),
        }
    }
}
