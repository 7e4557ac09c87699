//! On-disk credentials: the client secret and the token store.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::AuthError;

/// Token endpoint used when the client secret does not name one.
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// A bearer token and its expiry. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    secret: String,
    expiry: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>, expiry: DateTime<Utc>) -> Self {
        Self {
            secret: secret.into(),
            expiry,
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub const fn expiry(&self) -> DateTime<Utc> {
        self.expiry
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// Contents of the credential store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl StoredCredentials {
    pub fn new(refresh_token: impl Into<String>) -> Self {
        Self {
            refresh_token: refresh_token.into(),
            access_token: None,
            expiry: None,
        }
    }

    /// The stored access token, if one was saved with an expiry.
    pub fn access_token(&self) -> Option<AccessToken> {
        match (&self.access_token, self.expiry) {
            (Some(secret), Some(expiry)) => Some(AccessToken::new(secret.clone(), expiry)),
            _ => None,
        }
    }
}

impl fmt::Debug for StoredCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredCredentials")
            .field("has_access_token", &self.access_token.is_some())
            .field("expiry", &self.expiry)
            .finish_non_exhaustive()
    }
}

/// JSON credential store, rewritten on every successful refresh.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn load(&self) -> Result<StoredCredentials, AuthError> {
        let content = fs::read_to_string(&self.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AuthError::MissingCredentials(format!("{} does not exist", self.path.display()))
            } else {
                AuthError::Store(format!("{}: {e}", self.path.display()))
            }
        })?;
        serde_json::from_str(&content)
            .map_err(|e| AuthError::Store(format!("{}: {e}", self.path.display())))
    }

    /// Write through a temporary file and rename, so readers never see a
    /// half-written store.
    #[instrument(skip(self, credentials), fields(path = %self.path.display()))]
    pub fn save(&self, credentials: &StoredCredentials) -> Result<(), AuthError> {
        let store_err = |e: &dyn fmt::Display| AuthError::Store(format!("{}: {e}", self.path.display()));
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| store_err(&e))?;
        }
        let json = serde_json::to_string_pretty(credentials).map_err(|e| store_err(&e))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json).map_err(|e| store_err(&e))?;
        fs::rename(&tmp, &self.path).map_err(|e| store_err(&e))?;
        debug!("Credentials saved");
        Ok(())
    }
}

/// OAuth2 client registration.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    pub token_uri: String,
}

impl fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSecret")
            .field("client_id", &self.client_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct SecretSection {
    client_id: String,
    client_secret: String,
    token_uri: Option<String>,
}

#[derive(Deserialize)]
struct SecretFile {
    installed: Option<SecretSection>,
    web: Option<SecretSection>,
}

impl ClientSecret {
    /// Parse a client secret file as downloaded from the Google console.
    pub fn parse(content: &str) -> Result<Self, AuthError> {
        let file: SecretFile =
            serde_json::from_str(content).map_err(|e| AuthError::Malformed(e.to_string()))?;
        let section = file.installed.or(file.web).ok_or_else(|| {
            AuthError::Malformed("client secret has no 'installed' or 'web' section".to_string())
        })?;
        Ok(Self {
            client_id: section.client_id,
            client_secret: section.client_secret,
            token_uri: section
                .token_uri
                .unwrap_or_else(|| GOOGLE_TOKEN_URI.to_string()),
        })
    }

    pub fn load(path: &Path) -> Result<Self, AuthError> {
        let content = fs::read_to_string(path).map_err(|e| {
            AuthError::MissingCredentials(format!("{}: {e}", path.display()))
        })?;
        Self::parse(&content)
    }
}
