//! CLI argument definitions.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::ModeKind;

/// Photobooth controller for single-board computers.
///
/// Runs the booth appliance, or takes a single unattended session for testing
/// the camera, effects and delivery setup.
#[derive(Parser, Debug)]
#[command(name = "booth", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(long, short = 'c', global = true, env = "BOOTH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format (text for humans, json for scripts)
    #[arg(
        long,
        short = 'f',
        default_value = "text",
        global = true,
        env = "BOOTH_FORMAT"
    )]
    pub format: OutputFormat,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Output format selection.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text with optional color
    #[default]
    Text,
    /// JSON output for scripts
    Json,
    /// Compact JSON (single line)
    JsonCompact,
}

impl Cli {
    /// Returns true if output should be JSON.
    pub const fn use_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json | OutputFormat::JsonCompact)
    }

    /// Returns true if output should be compact JSON.
    pub const fn use_compact_json(&self) -> bool {
        matches!(self.format, OutputFormat::JsonCompact)
    }

    /// The configuration file to use.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::default_config_path)
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    // === Booth ===
    /// Start the booth: buttons, keyboard, camera and delivery
    Run,

    /// Take one unattended session and print the artifact path
    Snap(SnapArgs),

    // === Configuration ===
    /// Load and validate the configuration
    Check,

    /// List the configured image effects
    Effects,

    /// Write the default configuration
    Init(InitArgs),

    /// Refresh the OAuth2 access token once
    Token,

    // === Utilities ===
    /// Show version and build information
    Version,

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// === Argument Structs ===

/// Arguments for a single session.
///
/// # Examples
///
/// ```bash
/// # One picture with the default effect
/// booth snap None
///
/// # Four-frame collage, sketched, mailed to a guest
/// booth snap Four --effect sketch --email guest@example.com
///
/// # Animated GIF, printed
/// booth snap Animation --print
/// ```
#[derive(Parser, Debug)]
pub struct SnapArgs {
    /// Capture mode: None, Four or Animation
    #[arg(value_parser = parse_mode)]
    pub mode: ModeKind,

    /// Effect key applied to every frame
    #[arg(long, short = 'e')]
    pub effect: Option<String>,

    /// Email the artifact to this address
    #[arg(long, conflicts_with = "print")]
    pub email: Option<String>,

    /// Print the artifact
    #[arg(long)]
    pub print: bool,
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Overwrite an existing configuration
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

fn parse_mode(s: &str) -> Result<ModeKind, String> {
    ModeKind::parse(s).ok_or_else(|| format!("unknown mode '{s}' (expected None, Four or Animation)"))
}
