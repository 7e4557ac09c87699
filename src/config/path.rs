//! Path resolution for configuration files.
//!
//! Supports absolute paths, paths relative to the config file, and "~" home
//! directory expansion. Resource files (overlays, icons, logo) must exist
//! once resolved; the booth never discovers a missing overlay mid-session.

use std::path::{Path, PathBuf};

use tracing::{debug, trace, warn};

use super::schema::BoothConfig;
use crate::error::ConfigError;

/// Resolve a path from a config file.
///
/// Resolution rules:
/// 1. Absolute paths: used as-is
/// 2. Paths starting with `~`: expanded to home directory
/// 3. Relative paths: resolved relative to the config file's directory
pub fn resolve_path(path: &Path, config_dir: &Path) -> Result<PathBuf, ConfigError> {
    trace!(
        path = %path.display(),
        config_dir = %config_dir.display(),
        "Resolving path"
    );

    let path_str = path.to_string_lossy();

    if path_str == "~" || path_str.starts_with("~/") {
        let home = home_dir()?;
        let rest = path_str.strip_prefix("~/").unwrap_or("");
        let resolved = if rest.is_empty() {
            home
        } else {
            home.join(rest)
        };
        debug!(
            original = %path.display(),
            resolved = %resolved.display(),
            "Expanded home directory path"
        );
        return Ok(resolved);
    }

    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }

    Ok(config_dir.join(path))
}

/// Resolve the user's home directory (cross-platform).
pub fn home_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or_else(|| ConfigError::InvalidValue {
        field: "path".to_string(),
        reason: "could not determine home directory".to_string(),
    })
}

/// Default configuration file location: `~/.config/booth/booth.yaml`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("booth")
        .join("booth.yaml")
}

/// Validate that a resource path exists and is a regular file.
pub fn validate_resource(path: &Path) -> Result<(), ConfigError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ConfigError::MissingResource {
            path: path.display().to_string(),
        })
    }
}

/// Path resolution context for a config file.
pub struct PathResolver {
    config_dir: PathBuf,
}

impl PathResolver {
    /// Create a resolver for a specific config file path.
    pub fn new(config_path: &Path) -> Result<Self, ConfigError> {
        let config_dir = match config_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };

        let canonical = config_dir.canonicalize().unwrap_or_else(|_| {
            warn!(
                config_dir = %config_dir.display(),
                "Failed to canonicalize config directory"
            );
            config_dir.to_path_buf()
        });

        Ok(Self {
            config_dir: canonical,
        })
    }

    /// Resolver anchored at an explicit directory.
    pub fn with_dir(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    /// Resolve a path relative to the config file.
    pub fn resolve(&self, path: &Path) -> Result<PathBuf, ConfigError> {
        resolve_path(path, &self.config_dir)
    }

    /// Rewrite every path in the configuration relative to the config directory.
    pub fn resolve_config(&self, config: &mut BoothConfig) -> Result<(), ConfigError> {
        let modes = &mut config.modes;
        if let Some(logo) = modes.single.logo.as_mut() {
            *logo = self.resolve(logo)?;
        }
        modes.collage.foreground_image = self.resolve(&modes.collage.foreground_image)?;

        for effect in config.effects.values_mut() {
            if let Some(icon) = effect.icon.as_mut() {
                *icon = self.resolve(icon)?;
            }
        }
        for binding in config.buttons.values_mut() {
            if let Some(icon) = binding.icon.as_mut() {
                *icon = self.resolve(icon)?;
            }
        }
        if let Some(icon) = config.icons.effects.as_mut() {
            *icon = self.resolve(icon)?;
        }
        for overlay in &mut config.countdown.overlays {
            *overlay = self.resolve(overlay)?;
        }

        config.oauth.client_secret_file = self.resolve(&config.oauth.client_secret_file)?;
        config.oauth.credentials_file = self.resolve(&config.oauth.credentials_file)?;
        config.storage.photos_dir = self.resolve(&config.storage.photos_dir)?;
        config.storage.journal = self.resolve(&config.storage.journal)?;

        debug!(config_dir = %self.config_dir.display(), "Resolved configuration paths");
        Ok(())
    }

    /// Return the base config directory.
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }
}

/// Every resource file the booth reads during a session or renders on screen.
pub fn resource_files(config: &BoothConfig) -> Vec<&Path> {
    let mut files: Vec<&Path> = vec![config.modes.collage.foreground_image.as_path()];
    files.extend(config.modes.single.logo.as_deref());
    files.extend(config.countdown.overlays.iter().map(PathBuf::as_path));
    files.extend(config.effects.values().filter_map(|e| e.icon.as_deref()));
    files.extend(config.buttons.values().filter_map(|b| b.icon.as_deref()));
    files.extend(config.icons.effects.as_deref());
    files
}

/// Check that every resource file exists.
pub fn check_resources(config: &BoothConfig) -> Result<(), ConfigError> {
    let files = resource_files(config);
    for file in &files {
        validate_resource(file)?;
    }
    debug!(count = files.len(), "All resource files present");
    Ok(())
}
