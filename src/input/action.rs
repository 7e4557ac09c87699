//! Logical actions produced by the input source.

use std::fmt;
use std::time::Instant;

use serde::Serialize;

use crate::config::ModeKind;
use crate::error::ConfigError;

/// A logical user request, independent of the trigger that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum Action {
    /// Start a session in the given mode.
    Snap(ModeKind),
    /// Email the artifact under review. The on-screen keyboard may supply a recipient.
    SendEmail { recipient: Option<String> },
    /// Print the artifact under review.
    Print,
    /// Open the configuration screen.
    Configure,
    /// Leave the review screen, or cancel a countdown.
    Dismiss,
    /// Pick the effect applied to the next session.
    SelectEffect(String),
}

impl Action {
    /// Parse an action from its wire name (`snap_Four`, `send_email`,
    /// `send_email:guest@example.com`, `select_effect:sketch`).
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let s = s.trim();
        if let Some(mode) = s.strip_prefix("snap_") {
            return ModeKind::parse(mode)
                .map(Self::Snap)
                .ok_or_else(|| ConfigError::UnknownAction(s.to_string()));
        }
        if let Some(key) = s.strip_prefix("select_effect:") {
            if key.is_empty() {
                return Err(ConfigError::UnknownAction(s.to_string()));
            }
            return Ok(Self::SelectEffect(key.to_string()));
        }
        if let Some(recipient) = s.strip_prefix("send_email:") {
            return Ok(Self::SendEmail {
                recipient: Some(recipient.to_string()).filter(|r| !r.is_empty()),
            });
        }
        match s {
            "send_email" => Ok(Self::SendEmail { recipient: None }),
            "print" => Ok(Self::Print),
            "configure" => Ok(Self::Configure),
            "dismiss" => Ok(Self::Dismiss),
            _ => Err(ConfigError::UnknownAction(s.to_string())),
        }
    }

    /// Actions that abandon a countdown or an animation in progress.
    pub const fn cancels_capture(&self) -> bool {
        matches!(self, Self::Configure | Self::Dismiss)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Snap(mode) => write!(f, "snap_{mode}"),
            Self::SendEmail { recipient: None } => f.write_str("send_email"),
            Self::SendEmail {
                recipient: Some(recipient),
            } => write!(f, "send_email:{recipient}"),
            Self::Print => f.write_str("print"),
            Self::Configure => f.write_str("configure"),
            Self::Dismiss => f.write_str("dismiss"),
            Self::SelectEffect(key) => write!(f, "select_effect:{key}"),
        }
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        action.to_string()
    }
}

/// Where an action came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionSource {
    /// Hardware button on a GPIO pin (configured numbering).
    Gpio { pin: u8 },
    /// Keyboard key code.
    Key { code: String },
    /// On-screen button.
    Touch,
}

/// An action together with its origin and enqueue time.
#[derive(Debug, Clone)]
pub struct ActionEvent {
    pub action: Action,
    pub source: ActionSource,
    /// Monotonic time the event entered the queue.
    pub at: Instant,
}

impl ActionEvent {
    pub fn new(action: Action, source: ActionSource) -> Self {
        Self {
            action,
            source,
            at: Instant::now(),
        }
    }
}
