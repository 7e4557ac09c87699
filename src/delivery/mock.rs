//! Mock mailer and printer for testing.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::auth::AccessToken;
use crate::error::DeliveryError;

use super::gmail::Mailer;
use super::mime::OutgoingMail;
use super::print::Printer;

/// A message the mock accepted or refused.
#[derive(Debug, Clone)]
pub struct SentMail {
    pub token: String,
    pub mail: OutgoingMail,
}

#[derive(Debug, Default)]
struct MailerState {
    calls: Vec<SentMail>,
    scripted: VecDeque<Result<(), DeliveryError>>,
    failure: Option<DeliveryError>,
}

/// Recording [`Mailer`]. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockMailer {
    state: Arc<Mutex<MailerState>>,
    delay: Duration,
}

impl MockMailer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every unscripted call.
    #[must_use]
    pub fn failing(self, error: DeliveryError) -> Self {
        self.state.lock().unwrap().failure = Some(error);
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue the result of the next call.
    pub fn push_result(&self, result: Result<(), DeliveryError>) {
        self.state.lock().unwrap().scripted.push_back(result);
    }

    /// Every call, including failed ones.
    #[must_use]
    pub fn sent(&self) -> Vec<SentMail> {
        self.state.lock().unwrap().calls.clone()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }
}

impl Mailer for MockMailer {
    async fn send(&self, token: &AccessToken, mail: &OutgoingMail) -> Result<(), DeliveryError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let mut state = self.state.lock().unwrap();
        state.calls.push(SentMail {
            token: token.secret().to_string(),
            mail: mail.clone(),
        });
        if let Some(result) = state.scripted.pop_front() {
            return result;
        }
        state.failure.clone().map_or(Ok(()), Err)
    }
}

#[derive(Debug, Default)]
struct PrinterState {
    printed: Vec<PathBuf>,
    failure: Option<DeliveryError>,
}

/// Recording [`Printer`]. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockPrinter {
    state: Arc<Mutex<PrinterState>>,
    delay: Duration,
}

impl MockPrinter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failing(self, error: DeliveryError) -> Self {
        self.state.lock().unwrap().failure = Some(error);
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Paths printed successfully.
    #[must_use]
    pub fn printed(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().printed.clone()
    }
}

impl Printer for MockPrinter {
    async fn print(&self, path: &Path) -> Result<(), DeliveryError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.failure.clone() {
            return Err(error);
        }
        state.printed.push(path.to_path_buf());
        Ok(())
    }
}
