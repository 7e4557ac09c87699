//! Loading and saving the booth configuration file.
//!
//! The format is detected from the file extension. JSON is accepted for
//! configurations carried over from older booths.

use std::path::Path;

use tracing::{debug, info, instrument, trace};

use super::path::{PathResolver, check_resources};
use super::schema::BoothConfig;
use crate::error::ConfigError;

/// Configuration file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format (.yaml, .yml).
    Yaml,
    /// TOML format (.toml).
    Toml,
    /// JSON format (.json).
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension.
    ///
    /// Returns `None` if the extension is not recognized.
    #[must_use]
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        trace!(extension = %ext, "Detecting config format from extension");
        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Some(Self::Yaml),
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Get the canonical file extension for this format.
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Toml => "toml",
            Self::Json => "json",
        }
    }

    fn detect(path: &Path) -> Result<Self, ConfigError> {
        Self::from_extension(path).ok_or_else(|| {
            ConfigError::Parse(format!(
                "Unknown config format for '{}': expected .yaml, .yml, .toml or .json",
                path.display()
            ))
        })
    }
}

/// Parse configuration content without validating it.
pub fn parse_config(content: &str, format: ConfigFormat) -> Result<BoothConfig, ConfigError> {
    match format {
        // An empty YAML document is `null`, which serde_yaml refuses for a struct.
        ConfigFormat::Yaml if content.trim().is_empty() => Ok(BoothConfig::default()),
        ConfigFormat::Yaml => {
            serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(format!("YAML: {e}")))
        }
        ConfigFormat::Toml => {
            toml::from_str(content).map_err(|e| ConfigError::Parse(format!("TOML: {e}")))
        }
        ConfigFormat::Json => {
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(format!("JSON: {e}")))
        }
    }
}

/// Load a configuration from a string with a specified format.
///
/// Paths are left as written; resources are not checked.
#[instrument(skip(content), fields(format = ?format, content_len = content.len()))]
pub fn load_config_from_str(content: &str, format: ConfigFormat) -> Result<BoothConfig, ConfigError> {
    let config = parse_config(content, format)?;
    config.validate()?;
    Ok(config)
}

/// Load a configuration file.
///
/// Parses, resolves paths relative to the file, validates the tables and
/// checks that every resource file exists.
///
/// # Errors
///
/// Any failure is a [`ConfigError`]; the booth must not start.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<BoothConfig, ConfigError> {
    let path = path.as_ref();
    info!("Loading configuration file");

    let format = ConfigFormat::detect(path)?;
    debug!(format = ?format, "Detected config format");

    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::NotFound {
                path: path.display().to_string(),
            }
        } else {
            ConfigError::Parse(format!("{}: {e}", path.display()))
        }
    })?;
    debug!(bytes = content.len(), "Read config file");

    let mut config = parse_config(&content, format)?;
    PathResolver::new(path)?.resolve_config(&mut config)?;
    config.validate()?;
    check_resources(&config)?;

    info!(
        name = ?config.name,
        effects = config.effects.len(),
        bindings = config.buttons.len(),
        "Configuration loaded and validated"
    );
    Ok(config)
}

/// Save a configuration to a file.
///
/// Automatically detects the format from the file extension.
#[instrument(skip(config), fields(path = %path.as_ref().display()))]
pub fn save_config<P: AsRef<Path>>(config: &BoothConfig, path: P) -> Result<(), ConfigError> {
    let path = path.as_ref();
    let format = ConfigFormat::detect(path)?;

    let content = match format {
        ConfigFormat::Yaml => serde_yaml::to_string(config)
            .map_err(|e| ConfigError::Parse(format!("YAML: {e}")))?,
        ConfigFormat::Toml => toml::to_string_pretty(config)
            .map_err(|e| ConfigError::Parse(format!("TOML: {e}")))?,
        ConfigFormat::Json => serde_json::to_string_pretty(config)
            .map_err(|e| ConfigError::Parse(format!("JSON: {e}")))?,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Parse(format!("{}: {e}", parent.display())))?;
    }
    std::fs::write(path, content)
        .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;

    info!("Configuration saved");
    Ok(())
}
