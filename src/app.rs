//! Wiring of the booth's long-running tasks.
//!
//! `run` starts the appliance: input sources, token refresher, delivery
//! dispatcher and session controller. `snap` drives one unattended session
//! through the same controller and waits for its deliveries.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use serde::Serialize;
use tokio::io::BufReader;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth::{
    ClientSecret, CredentialStore, GoogleTokenEndpoint, ReauthRequest, ReauthTrigger, TokenHandle,
    TokenRefresher,
};
use crate::camera::{Camera, CommandCamera};
use crate::config::{BoothConfig, ModeKind, PathResolver, resource_files, save_config};
use crate::delivery::{
    CommandPrinter, DeliveryQueue, DeliveryReport, Dispatcher, GmailMailer, Journal, Mailer,
    Printer,
};
use crate::error::{BoothError, Result, ResultExt};
use crate::input::{Action, GpioPoller, KeyMap, SysfsPins, action_queue, spawn_key_reader};
use crate::render::{ImageRenderer, Renderer};
use crate::session::{
    ArtifactStore, ControllerState, SessionController, SessionOutcome, Ui,
};

/// Side of the transparent images written for missing resources.
const PLACEHOLDER_SIZE: u32 = 64;

/// Token view, re-auth trigger and the task keeping them alive.
pub struct TokenService {
    pub handle: TokenHandle,
    pub reauth: ReauthTrigger,
    task: JoinHandle<()>,
}

impl TokenService {
    /// Start the refresher from the configured client secret and credential
    /// store. Without a client secret the booth still runs; email delivery
    /// then fails with an authentication error.
    pub fn start(config: &BoothConfig) -> Self {
        let store = CredentialStore::new(&config.oauth.credentials_file);
        let period = Duration::from_millis(config.oauth.refresh_period_millis);

        match ClientSecret::load(&config.oauth.client_secret_file)
            .and_then(GoogleTokenEndpoint::new)
        {
            Ok(endpoint) => {
                let (refresher, handle, reauth) = TokenRefresher::new(endpoint, store, period);
                Self {
                    handle,
                    reauth,
                    task: tokio::spawn(refresher.run()),
                }
            }
            Err(e) => {
                warn!(error = %e, "Token refresher disabled, email delivery will fail");
                let (reauth, requests) = ReauthTrigger::channel();
                Self {
                    handle: TokenHandle::fixed(None),
                    reauth,
                    task: tokio::spawn(ignore_reauth(requests)),
                }
            }
        }
    }

    pub fn stop(self) {
        self.task.abort();
    }
}

async fn ignore_reauth(mut requests: mpsc::Receiver<ReauthRequest>) {
    while requests.recv().await.is_some() {
        warn!("Re-authentication requested but no client secret is configured");
    }
}

/// Build the production dispatcher.
pub fn dispatcher(
    config: &BoothConfig,
    tokens: &TokenService,
) -> Result<Dispatcher<GmailMailer, CommandPrinter>> {
    let mailer = GmailMailer::new(config.email.api_url.clone())?;
    let printer = CommandPrinter::new(&config.print);
    let journal = Journal::open(&config.storage.journal)?;
    Ok(Dispatcher::new(
        Arc::new(mailer),
        Arc::new(printer),
        tokens.handle.clone(),
        tokens.reauth.clone(),
    )
    .with_email(config.email.clone())
    .with_journal(journal))
}

/// Run the appliance until Ctrl-C.
pub async fn run(config: BoothConfig, ui: Arc<dyn Ui>) -> Result<()> {
    let config = Arc::new(config);

    let poller = GpioPoller::from_config(&config, SysfsPins::from_settings(&config.gpio))?;
    let keymap = KeyMap::from_bindings(&config.buttons)?;
    info!(pins = poller.pins().count(), keys = keymap.len(), "Inputs configured");

    let tokens = TokenService::start(&config);
    let dispatcher = dispatcher(&config, &tokens)?;
    let (queue, requests) = DeliveryQueue::channel();
    let delivery_task = tokio::spawn(dispatcher.run(requests));

    let (sender, actions) = action_queue();
    let controller = SessionController::new(
        Arc::clone(&config),
        Arc::new(CommandCamera::new(config.camera.clone())),
        Arc::new(ImageRenderer),
        actions,
    )
    .with_ui(ui)
    .with_store(ArtifactStore::new(&config.storage.photos_dir))
    .with_deliveries(queue);

    let gpio_task = poller.spawn(sender.clone());
    let key_task = spawn_key_reader(BufReader::new(tokio::io::stdin()), keymap, sender);
    let mut controller_task = tokio::spawn(controller.run());

    tokio::select! {
        joined = &mut controller_task => {
            if let Err(e) = joined {
                warn!(error = %e, "Controller task ended abnormally");
            }
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!(error = %e, "Could not listen for Ctrl-C");
            }
            info!("Shutting down");
            controller_task.abort();
            let _ = controller_task.await;
        }
    }

    key_task.abort();
    // Exits on its next poll now that the queue is closed.
    let _ = gpio_task.await;
    // Finishes in-flight deliveries before returning.
    if let Err(e) = delivery_task.await {
        warn!(error = %e, "Delivery dispatcher ended abnormally");
    }
    tokens.stop();
    info!("Booth stopped");
    Ok(())
}

/// One unattended session.
#[derive(Debug, Clone, Default)]
pub struct SnapRequest {
    pub mode: Option<ModeKind>,
    pub effect: Option<String>,
    pub email: Option<String>,
    pub print: bool,
}

/// What a `snap` produced.
#[derive(Debug, Clone, Serialize)]
pub struct SnapReport {
    pub outcome: SessionOutcome,
    pub deliveries: Vec<DeliveryReport>,
}

/// Take one picture session and hand the artifact to the dispatcher.
///
/// Email and print are mutually exclusive: a review ends with the first
/// hand-off, as it does at the booth.
pub async fn snap<C, R, M, P>(
    config: Arc<BoothConfig>,
    camera: Arc<C>,
    renderer: Arc<R>,
    dispatcher: Dispatcher<M, P>,
    request: SnapRequest,
    ui: Arc<dyn Ui>,
) -> Result<SnapReport>
where
    C: Camera,
    R: Renderer,
    M: Mailer + Send + Sync + 'static,
    P: Printer + Send + Sync + 'static,
{
    let review_action = review_action(&config, &request)?;
    if let Some(key) = &request.effect {
        if config.effect(key).is_none() {
            return Err(BoothError::Other(format!("Unknown effect '{key}'")));
        }
    }
    let mode = request.mode.unwrap_or(ModeKind::Single);

    let mut reports = dispatcher.subscribe();
    let (queue, requests) = DeliveryQueue::channel();
    let delivery_task = tokio::spawn(dispatcher.run(requests));

    let (sender, actions) = action_queue();
    let controller = SessionController::new(Arc::clone(&config), camera, renderer, actions)
        .with_ui(ui)
        .with_effect(request.effect.as_deref())
        .with_deliveries(queue);
    let mut states = controller.subscribe_state();
    let mut outcomes = controller.subscribe_outcomes();
    let controller_task = tokio::spawn(controller.run());

    sender.tap(Action::Snap(mode));

    let mut watching = true;
    let outcome = loop {
        tokio::select! {
            outcome = outcomes.recv() => match outcome {
                Ok(outcome) => break outcome,
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(BoothError::Other("controller stopped before the session ended".into()));
                }
            },
            changed = states.changed(), if watching => {
                if changed.is_err() {
                    watching = false;
                    continue;
                }
                let in_review = matches!(*states.borrow_and_update(), ControllerState::ReviewOrDeliver { .. });
                if in_review {
                    debug!(action = %review_action, "Ending review");
                    sender.tap(review_action.clone());
                }
            }
        }
    };
    info!(session = %outcome.session, aborted = outcome.is_aborted(), "Snap session ended");

    drop(sender);
    let _ = controller_task.await;
    // The controller held the last queue handle; the dispatcher drains and stops.
    if let Err(e) = delivery_task.await {
        warn!(error = %e, "Delivery dispatcher ended abnormally");
    }

    let mut deliveries = Vec::new();
    while let Ok(report) = reports.try_recv() {
        deliveries.push(report);
    }
    Ok(SnapReport {
        outcome,
        deliveries,
    })
}

/// Write the default configuration next to placeholder resources.
///
/// Returns the resource files created. An existing configuration is kept
/// unless `force` is set; existing resources are never touched.
pub fn init(path: &Path, force: bool) -> Result<Vec<PathBuf>> {
    if path.exists() && !force {
        return Err(BoothError::Other(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }

    let config = BoothConfig::default();
    save_config(&config, path)?;

    let mut resolved = config;
    PathResolver::new(path)?.resolve_config(&mut resolved)?;
    let mut created = Vec::new();
    for file in resource_files(&resolved) {
        if file.exists() {
            continue;
        }
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        RgbaImage::new(PLACEHOLDER_SIZE, PLACEHOLDER_SIZE)
            .save(file)
            .with_context(|| format!("Failed to write {}", file.display()))?;
        created.push(file.to_path_buf());
    }
    info!(path = %path.display(), resources = created.len(), "Default configuration written");
    Ok(created)
}

fn review_action(config: &BoothConfig, request: &SnapRequest) -> Result<Action> {
    match (&request.email, request.print) {
        (Some(_), true) => Err(BoothError::Other(
            "Choose either --email or --print".to_string(),
        )),
        (Some(_), false) if !config.email.enabled => {
            Err(BoothError::Other("Email delivery is disabled in the configuration".to_string()))
        }
        (None, true) if !config.print.enabled => {
            Err(BoothError::Other("Printing is disabled in the configuration".to_string()))
        }
        (Some(recipient), false) => Ok(Action::SendEmail {
            recipient: Some(recipient.clone()),
        }),
        (None, true) => Ok(Action::Print),
        (None, false) => Ok(Action::Dismiss),
    }
}
