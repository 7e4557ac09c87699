//! Mock token endpoint for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::AuthError;

use super::refresher::{TokenEndpoint, TokenGrant};

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<String>,
    scripted: VecDeque<Result<TokenGrant, AuthError>>,
    failure: Option<AuthError>,
}

/// Recording [`TokenEndpoint`]. Clones share state.
///
/// Unscripted calls succeed with `token-<n>` valid for an hour, unless a
/// standing failure is set.
#[derive(Debug, Clone, Default)]
pub struct MockTokenEndpoint {
    state: Arc<Mutex<MockState>>,
    delay: Duration,
}

impl MockTokenEndpoint {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every unscripted call.
    #[must_use]
    pub fn failing(self, error: AuthError) -> Self {
        self.state.lock().unwrap().failure = Some(error);
        self
    }

    /// Take `delay` to answer.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue the result of the next call.
    pub fn push_result(&self, result: Result<TokenGrant, AuthError>) {
        self.state.lock().unwrap().scripted.push_back(result);
    }

    /// Refresh tokens presented so far.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }
}

impl TokenEndpoint for MockTokenEndpoint {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let mut state = self.state.lock().unwrap();
        state.calls.push(refresh_token.to_string());
        if let Some(result) = state.scripted.pop_front() {
            return result;
        }
        if let Some(error) = &state.failure {
            return Err(error.clone());
        }
        Ok(TokenGrant {
            access_token: format!("token-{}", state.calls.len()),
            expires_in: Duration::from_secs(3600),
            refresh_token: None,
        })
    }
}
