//! Error types for photobooth operations.
//!
//! The domain enums mirror the failure taxonomy of the booth: configuration
//! errors are fatal at startup, capture and render errors abort a single
//! session, and auth/network errors stay local to one delivery attempt.

use thiserror::Error;

/// Fatal configuration problems detected while loading or validating.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    NotFound { path: String },

    #[error("Configuration parse error: {0}")]
    Parse(String),

    #[error("GPIO pin {pin} is bound to both '{first}' and '{second}'")]
    DuplicatePin {
        pin: u8,
        first: String,
        second: String,
    },

    #[error("Key '{key}' is bound to both '{first}' and '{second}'")]
    DuplicateKey {
        key: String,
        first: String,
        second: String,
    },

    #[error("Unknown image effect '{effect}' referenced by {referrer}")]
    UnknownEffect { effect: String, referrer: String },

    #[error("Unknown action '{0}'")]
    UnknownAction(String),

    #[error("Missing resource file: {path}")]
    MissingResource { path: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("GPIO pin {pin} could not be configured: {reason}")]
    PinSetup { pin: u8, reason: String },
}

/// Camera failure while capturing a single frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Camera unavailable: {0}")]
    Unavailable(String),

    #[error("Camera command failed: {0}")]
    Command(String),

    #[error("Captured frame could not be decoded: {0}")]
    Decode(String),

    #[error("Camera returned {actual_w}x{actual_h}, requested {expected_w}x{expected_h}")]
    WrongSize {
        expected_w: u32,
        expected_h: u32,
        actual_w: u32,
        actual_h: u32,
    },
}

/// Effect rendering, compositing or encoding failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("Unsupported effect '{0}'")]
    UnsupportedEffect(String),

    #[error("Invalid parameter for effect '{effect}': {reason}")]
    InvalidParam { effect: String, reason: String },

    #[error("Expected {expected} frames, got {actual}")]
    FrameCount { expected: usize, actual: usize },

    #[error("Image processing failed: {0}")]
    Processing(String),

    #[error("Encoding failed: {0}")]
    Encode(String),

    #[error("Could not store artifact: {0}")]
    Storage(String),
}

/// OAuth2 token acquisition failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("No credentials available: {0}")]
    MissingCredentials(String),

    #[error("Refresh token rejected: {0}")]
    Rejected(String),

    #[error("Token endpoint unreachable: {0}")]
    Network(String),

    #[error("Malformed token response: {0}")]
    Malformed(String),

    #[error("Credential store error: {0}")]
    Store(String),
}

/// Failure of one delivery attempt (email or print).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("Authentication rejected: {0}")]
    Auth(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Attempt timed out after {0} ms")]
    Timeout(u64),

    #[error("Message rejected: {0}")]
    Rejected(String),

    #[error("Print failed: {0}")]
    Print(String),

    #[error("Artifact unreadable: {0}")]
    Artifact(String),
}

impl DeliveryError {
    /// Returns true if another attempt may succeed.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }
}

/// Primary error type for top-level booth operations.
#[derive(Error, Debug)]
pub enum BoothError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error("Journal error: {0}")]
    Journal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl BoothError {
    /// Returns true if the error is recoverable by the user.
    pub const fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Config(
                ConfigError::NotFound { .. }
                    | ConfigError::MissingResource { .. }
                    | ConfigError::DuplicatePin { .. }
                    | ConfigError::DuplicateKey { .. }
                    | ConfigError::UnknownEffect { .. }
            ) | Self::Auth(AuthError::MissingCredentials(_))
        )
    }

    /// Returns a suggestion for how to fix the error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Config(ConfigError::NotFound { .. }) => Some("Run: booth init"),
            Self::Config(ConfigError::MissingResource { .. }) => {
                Some("Resource paths are resolved relative to the configuration file")
            }
            Self::Config(ConfigError::DuplicatePin { .. }) => {
                Some("Each GPIO pin may trigger only one action")
            }
            Self::Config(ConfigError::PinSetup { .. }) => {
                Some("Check the pin number and run with access to /sys/class/gpio")
            }
            Self::Auth(AuthError::MissingCredentials(_) | AuthError::Rejected(_)) => {
                Some("Authorize the booth's Google account again")
            }
            _ => None,
        }
    }
}

/// Convenience type alias for Results using BoothError.
pub type Result<T> = std::result::Result<T, BoothError>;

/// Extension trait for adding context to errors.
pub trait ResultExt<T> {
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| BoothError::Other(format!("{}: {e}", f().into())))
    }
}
