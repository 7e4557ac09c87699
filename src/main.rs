//! Photobooth controller CLI.
//!
//! Runs the booth appliance and provides setup helpers; every command has a
//! JSON form for scripts.
#![forbid(unsafe_code)]

use std::io;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use console::style;
use serde::Serialize;

use booth::app::{self, SnapRequest, TokenService};
use booth::auth::{ClientSecret, CredentialStore, GoogleTokenEndpoint, TokenRefresher};
use booth::camera::CommandCamera;
use booth::cli::{self, Cli, Commands};
use booth::config::{BoothConfig, ModeKind, load_config};
use booth::error::{BoothError, Result};
use booth::logging::init_logging;
use booth::render::ImageRenderer;
use booth::session::{ConsoleUi, NullUi, SessionEnd, Ui};

/// Build information embedded at compile time.
mod build_info {
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");

    pub fn git_sha() -> &'static str {
        option_env!("VERGEN_GIT_SHA").unwrap_or("unknown")
    }

    pub fn git_dirty() -> &'static str {
        option_env!("VERGEN_GIT_DIRTY").unwrap_or("false")
    }

    pub fn build_timestamp() -> &'static str {
        option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown")
    }

    pub fn rustc_semver() -> &'static str {
        option_env!("VERGEN_RUSTC_SEMVER").unwrap_or("unknown")
    }

    pub fn target() -> &'static str {
        option_env!("VERGEN_CARGO_TARGET_TRIPLE").unwrap_or("unknown")
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.no_color {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }
    init_logging(cli.use_json(), cli.verbose, cli.quiet);

    if let Err(e) = run(&cli).await {
        output_error(&cli, &e);
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        None => print_quick_start(cli),
        Some(Commands::Run) => cmd_run(cli).await,
        Some(Commands::Snap(args)) => cmd_snap(cli, args).await,
        Some(Commands::Check) => cmd_check(cli),
        Some(Commands::Effects) => cmd_effects(cli),
        Some(Commands::Init(args)) => cmd_init(cli, args),
        Some(Commands::Token) => cmd_token(cli).await,
        Some(Commands::Version) => cmd_version(cli),
        Some(Commands::Completions(args)) => cmd_completions(cli, args),
    }
}

// === Quick Start ===

#[allow(clippy::unnecessary_wraps)] // Consistent return type with other commands
fn print_quick_start(cli: &Cli) -> Result<()> {
    if cli.use_json() {
        output_json(
            cli,
            &QuickStart {
                tool: "booth",
                version: build_info::VERSION,
                description: "Photobooth controller for single-board computers",
                setup: "booth init && booth check",
                run: "booth run",
                test_session: "booth snap <None|Four|Animation> [--effect KEY] [--email ADDR] [--print]",
                config_env: "BOOTH_CONFIG",
                output_modes: "--format text|json|json-compact",
            },
        );
        return Ok(());
    }

    println!(
        "{} {} - photobooth controller\n",
        style("booth").bold().cyan(),
        build_info::VERSION
    );
    println!("{}", style("QUICK START").bold().underlined());
    println!();
    println!("  {}  Write the default configuration", style("booth init").green());
    println!("  {}  Validate it", style("booth check").green());
    println!("  {}  Start the booth", style("booth run").green());
    println!("  {}  One collage, no delivery", style("booth snap Four").green());
    println!("  {}  List effects", style("booth effects").green());
    println!();
    println!("Run {} for full help", style("booth --help").yellow());
    Ok(())
}

#[derive(Serialize)]
struct QuickStart {
    tool: &'static str,
    version: &'static str,
    description: &'static str,
    setup: &'static str,
    run: &'static str,
    test_session: &'static str,
    config_env: &'static str,
    output_modes: &'static str,
}

// === Command Implementations ===

fn load(cli: &Cli) -> Result<BoothConfig> {
    Ok(load_config(cli.config_path())?)
}

fn session_ui(cli: &Cli) -> Arc<dyn Ui> {
    if cli.quiet || cli.use_json() {
        Arc::new(NullUi)
    } else {
        Arc::new(ConsoleUi::new())
    }
}

async fn cmd_run(cli: &Cli) -> Result<()> {
    let config = load(cli)?;
    if !cli.quiet && !cli.use_json() {
        eprintln!(
            "{} (keys on stdin, Ctrl+C to stop)",
            style("Booth running").green().bold()
        );
    }
    app::run(config, session_ui(cli)).await
}

async fn cmd_snap(cli: &Cli, args: &cli::SnapArgs) -> Result<()> {
    let config = Arc::new(load(cli)?);
    let tokens = TokenService::start(&config);
    let dispatcher = app::dispatcher(&config, &tokens)?;
    let request = SnapRequest {
        mode: Some(args.mode),
        effect: args.effect.clone(),
        email: args.email.clone(),
        print: args.print,
    };

    let report = app::snap(
        Arc::clone(&config),
        Arc::new(CommandCamera::new(config.camera.clone())),
        Arc::new(ImageRenderer),
        dispatcher,
        request,
        session_ui(cli),
    )
    .await;
    tokens.stop();
    let report = report?;

    if cli.use_json() {
        output_json(cli, &report);
    } else if !cli.quiet {
        if let Some(artifact) = report.outcome.artifact() {
            println!("{}", artifact.path.display());
        }
        for delivery in &report.deliveries {
            if delivery.is_sent() {
                println!("{} {}", style("Delivered").green(), delivery.kind.name());
            } else {
                println!("{} {}", style("Not delivered").red(), delivery.kind.name());
            }
        }
    }

    match &report.outcome.end {
        SessionEnd::Aborted { reason } => Err(BoothError::Other(format!("Session aborted: {reason}"))),
        SessionEnd::Completed { .. } => Ok(()),
    }
}

fn cmd_check(cli: &Cli) -> Result<()> {
    let path = cli.config_path();
    let config = load(cli)?;

    if cli.use_json() {
        output_json(
            cli,
            &serde_json::json!({
                "ok": true,
                "path": path.display().to_string(),
                "name": config.name,
                "modes": ModeKind::ALL.iter().map(|kind| {
                    let mode = config.modes.get(*kind);
                    serde_json::json!({
                        "mode": kind.as_str(),
                        "frames": mode.frame_count(),
                        "snap_size": mode.snap_size(),
                        "default_effect": mode.default_effect(),
                    })
                }).collect::<Vec<_>>(),
                "effects": config.effects.len(),
                "buttons": config.buttons.len(),
                "gpio_pins": config.buttons.values().filter_map(|b| b.gpio).collect::<Vec<_>>(),
                "email": config.email.enabled,
                "print": config.print.enabled,
                "photos_dir": config.storage.photos_dir.display().to_string(),
            }),
        );
    } else if !cli.quiet {
        println!("{} {}", style("Configuration OK:").green().bold(), path.display());
        for kind in ModeKind::ALL {
            let mode = config.modes.get(kind);
            println!(
                "  {:<10} {} frame(s) at {}, effect {}",
                kind.as_str(),
                mode.frame_count(),
                mode.snap_size(),
                mode.default_effect().unwrap_or("none")
            );
        }
        println!("  {} effects, {} button bindings", config.effects.len(), config.buttons.len());
        println!(
            "  email {}, print {}",
            enabled(config.email.enabled),
            enabled(config.print.enabled)
        );
        println!("  photos in {}", config.storage.photos_dir.display());
    }
    Ok(())
}

fn enabled(on: bool) -> &'static str {
    if on { "enabled" } else { "disabled" }
}

fn cmd_effects(cli: &Cli) -> Result<()> {
    let config = load(cli)?;

    if cli.use_json() {
        output_json(
            cli,
            &serde_json::json!({
                "palette": config.effect_palette,
                "effects": config.effects,
            }),
        );
    } else {
        for (key, effect) in &config.effects {
            let marker = if config.effect_palette.contains(key) {
                style("*").cyan().to_string()
            } else {
                " ".to_string()
            };
            println!("{marker} {:<12} {}", key, effect.name);
        }
        if !cli.quiet {
            println!();
            println!("{} effect shown in the on-screen palette", style("*").cyan());
        }
    }
    Ok(())
}

fn cmd_init(cli: &Cli, args: &cli::InitArgs) -> Result<()> {
    let path = cli.config_path();
    let created = app::init(&path, args.force)?;

    if cli.use_json() {
        output_json(
            cli,
            &serde_json::json!({
                "ok": true,
                "path": path.display().to_string(),
                "resources_created": created.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
            }),
        );
    } else if !cli.quiet {
        println!("Configuration written to {}", path.display());
        if !created.is_empty() {
            println!("  {} placeholder resource image(s) created", created.len());
        }
    }
    Ok(())
}

async fn cmd_token(cli: &Cli) -> Result<()> {
    let config = load(cli)?;
    let secret = ClientSecret::load(&config.oauth.client_secret_file)?;
    let endpoint = GoogleTokenEndpoint::new(secret)?;
    let (mut refresher, _handle, _reauth) = TokenRefresher::new(
        endpoint,
        CredentialStore::new(&config.oauth.credentials_file),
        Duration::from_millis(config.oauth.refresh_period_millis),
    );
    let token = refresher.refresh_once().await?;

    if cli.use_json() {
        output_json(
            cli,
            &serde_json::json!({ "ok": true, "expiry": token.expiry().to_rfc3339() }),
        );
    } else if !cli.quiet {
        println!("Access token valid until {}", token.expiry().to_rfc3339());
    }
    Ok(())
}

#[allow(clippy::unnecessary_wraps)] // Consistent return type with other commands
fn cmd_version(cli: &Cli) -> Result<()> {
    if cli.use_json() {
        output_json(
            cli,
            &serde_json::json!({
                "version": build_info::VERSION,
                "git_sha": build_info::git_sha(),
                "git_dirty": build_info::git_dirty() == "true",
                "build_timestamp": build_info::build_timestamp(),
                "rustc_version": build_info::rustc_semver(),
                "target": build_info::target(),
            }),
        );
    } else {
        println!("booth {}", build_info::VERSION);
        println!(
            "git: {}{}",
            build_info::git_sha(),
            if build_info::git_dirty() == "true" {
                " (dirty)"
            } else {
                ""
            }
        );
        println!("built: {}", build_info::build_timestamp());
        println!("rustc: {}", build_info::rustc_semver());
        println!("target: {}", build_info::target());
    }
    Ok(())
}

#[allow(clippy::unnecessary_wraps)] // Consistent return type with other commands
fn cmd_completions(_cli: &Cli, args: &cli::CompletionsArgs) -> Result<()> {
    use clap::CommandFactory;
    clap_complete::generate(args.shell, &mut Cli::command(), "booth", &mut io::stdout());
    Ok(())
}

// === Utility Functions ===

fn output_json<T: Serialize>(cli: &Cli, data: &T) {
    let json = if cli.use_compact_json() {
        serde_json::to_string(data)
    } else {
        serde_json::to_string_pretty(data)
    };
    match json {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("{}: {e}", style("Error").red().bold()),
    }
}

fn output_error(cli: &Cli, error: &BoothError) {
    if cli.use_json() {
        let json = serde_json::json!({
            "error": true,
            "message": error.to_string(),
            "suggestion": error.suggestion(),
            "recoverable": error.is_user_recoverable(),
        });
        eprintln!("{json}");
    } else {
        eprintln!("{}: {}", style("Error").red().bold(), error);
        if let Some(suggestion) = error.suggestion() {
            eprintln!("{}: {}", style("Hint").yellow(), suggestion);
        }
    }
}
