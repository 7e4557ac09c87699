//! The session state machine.
//!
//! ```text
//! Idle -> CountingDown -> Capturing -> Processing -> ReviewOrDeliver -> Idle
//!              \______________\______________\
//!                                             -> Aborted -> Idle
//! ```
//!
//! One task reads the action queue. Capture and rendering run on the blocking
//! pool and the controller waits for them without reading actions; anything
//! queued meanwhile is stale once the controller is ready again and gets
//! dropped. Countdowns and the gaps between animation frames keep reading the
//! queue so the session can be cancelled.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use serde::{Serialize, Serializer};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, instrument, trace, warn};
use uuid::Uuid;

use crate::camera::{Camera, Frame};
use crate::config::{BoothConfig, CaptureMode, ImageEffect, ModeKind};
use crate::delivery::{DeliveryKind, DeliveryQueue, DeliveryRequest};
use crate::error::{CaptureError, RenderError};
use crate::input::{Action, ActionEvent};
use crate::pipeline::{self, LeadIn, ShotStep};
use crate::render::Renderer;

use super::archive::{ArchivedArtifact, ArtifactStore};
use super::ui::{NullUi, Ui};
use super::{DeliveryOutcome, Session};

/// Buffered session outcomes per subscriber.
const OUTCOME_CAPACITY: usize = 16;

/// Published controller state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ControllerState {
    Idle,
    CountingDown {
        mode: ModeKind,
        frame: usize,
        total: usize,
    },
    Capturing {
        mode: ModeKind,
        frame: usize,
        total: usize,
    },
    Processing {
        mode: ModeKind,
    },
    ReviewOrDeliver {
        mode: ModeKind,
        artifact: PathBuf,
    },
    Aborted {
        mode: ModeKind,
        reason: AbortReason,
    },
}

impl ControllerState {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CountingDown { .. } => "counting_down",
            Self::Capturing { .. } => "capturing",
            Self::Processing { .. } => "processing",
            Self::ReviewOrDeliver { .. } => "review_or_deliver",
            Self::Aborted { .. } => "aborted",
        }
    }

    pub const fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// True while a snap would be refused.
    pub const fn is_busy(&self) -> bool {
        matches!(
            self,
            Self::CountingDown { .. } | Self::Capturing { .. } | Self::Processing { .. }
        )
    }
}

/// Why a session ended without an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// The camera failed on frame `frame` (0-based).
    Capture { frame: usize, error: CaptureError },
    Render(RenderError),
    /// Cancelled during a countdown or between animation frames.
    Cancelled(Action),
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Capture { frame, error } => write!(f, "capture of frame {} failed: {error}", frame + 1),
            Self::Render(error) => write!(f, "rendering failed: {error}"),
            Self::Cancelled(action) => write!(f, "cancelled by {action}"),
        }
    }
}

impl Serialize for AbortReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SessionEnd {
    Completed {
        artifact: ArchivedArtifact,
        delivery: DeliveryOutcome,
    },
    Aborted {
        reason: AbortReason,
    },
}

/// Summary of one finished session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionOutcome {
    pub session: Uuid,
    pub mode: ModeKind,
    /// Configuration key of the applied effect.
    pub effect: Option<String>,
    /// Frames captured before processing or before the abort.
    pub frames_captured: usize,
    pub started: DateTime<Local>,
    pub end: SessionEnd,
}

impl SessionOutcome {
    pub fn artifact(&self) -> Option<&ArchivedArtifact> {
        match &self.end {
            SessionEnd::Completed { artifact, .. } => Some(artifact),
            SessionEnd::Aborted { .. } => None,
        }
    }

    pub const fn is_aborted(&self) -> bool {
        matches!(self.end, SessionEnd::Aborted { .. })
    }
}

/// Drives sessions from the action queue.
pub struct SessionController<C, R> {
    config: Arc<BoothConfig>,
    camera: Arc<C>,
    renderer: Arc<R>,
    actions: mpsc::Receiver<ActionEvent>,
    ui: Arc<dyn Ui>,
    store: ArtifactStore,
    deliveries: Option<DeliveryQueue>,
    state: watch::Sender<ControllerState>,
    outcomes: broadcast::Sender<SessionOutcome>,
    selected_effect: Option<String>,
    /// Events enqueued before this instant are stale.
    ready_since: Instant,
    inputs_closed: bool,
}

impl<C: Camera, R: Renderer> SessionController<C, R> {
    pub fn new(
        config: Arc<BoothConfig>,
        camera: Arc<C>,
        renderer: Arc<R>,
        actions: mpsc::Receiver<ActionEvent>,
    ) -> Self {
        let (state, _) = watch::channel(ControllerState::Idle);
        let (outcomes, _) = broadcast::channel(OUTCOME_CAPACITY);
        let store = ArtifactStore::new(&config.storage.photos_dir);
        Self {
            config,
            camera,
            renderer,
            actions,
            ui: Arc::new(NullUi),
            store,
            deliveries: None,
            state,
            outcomes,
            selected_effect: None,
            ready_since: Instant::now(),
            inputs_closed: false,
        }
    }

    #[must_use]
    pub fn with_ui(mut self, ui: Arc<dyn Ui>) -> Self {
        self.ui = ui;
        self
    }

    #[must_use]
    pub fn with_store(mut self, store: ArtifactStore) -> Self {
        self.store = store;
        self
    }

    #[must_use]
    pub fn with_deliveries(mut self, queue: DeliveryQueue) -> Self {
        self.deliveries = Some(queue);
        self
    }

    /// Preselect the effect for the first session. Unknown keys are ignored.
    #[must_use]
    pub fn with_effect(mut self, key: Option<&str>) -> Self {
        if let Some(key) = key {
            self.select_effect(key);
        }
        self
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ControllerState> {
        self.state.subscribe()
    }

    pub fn subscribe_outcomes(&self) -> broadcast::Receiver<SessionOutcome> {
        self.outcomes.subscribe()
    }

    /// Run until the action queue closes.
    pub async fn run(mut self) {
        info!(photos = %self.store.dir().display(), "Controller started");
        self.set_state(ControllerState::Idle);

        let mut next: Option<ModeKind> = None;
        loop {
            let mode = match next.take() {
                Some(mode) => mode,
                None => {
                    let Some(event) = self.actions.recv().await else {
                        break;
                    };
                    if self.is_stale(&event) {
                        trace!(action = %event.action, "Stale action dropped");
                        continue;
                    }
                    match event.action {
                        Action::Snap(mode) => mode,
                        action => {
                            self.handle_idle(action);
                            continue;
                        }
                    }
                }
            };
            next = self.run_session(mode).await;
            self.become_idle();
        }
        info!("Action queue closed, controller stopped");
    }

    #[instrument(skip(self, kind), fields(mode = %kind))]
    async fn run_session(&mut self, kind: ModeKind) -> Option<ModeKind> {
        let mode = self.config.modes.get(kind);
        let effect = self.effect_for(&mode);
        let mut session = Session::new(mode, effect, self.config.countdown.animation);
        info!(
            session = %session.id,
            effect = session.effect_key().unwrap_or("none"),
            frames = session.frame_count(),
            "Session started"
        );

        if let Err(reason) = self.capture_all(&mut session).await {
            let discarded = session.discard();
            self.abort(&session, reason, discarded);
            return None;
        }

        let artifact = match self.process(&mut session).await {
            Ok(artifact) => artifact,
            Err(reason) => {
                let captured = session.frame_count();
                self.abort(&session, reason, captured);
                return None;
            }
        };
        info!(session = %session.id, path = %artifact.path.display(), "Artifact ready");

        let (delivery, next) = self.review(&session, &artifact).await;
        info!(session = %session.id, delivery = ?delivery, "Session finished");
        self.emit(SessionOutcome {
            session: session.id,
            mode: kind,
            effect: session.effect_key().map(str::to_string),
            frames_captured: session.frame_count(),
            started: session.started,
            end: SessionEnd::Completed { artifact, delivery },
        });
        next
    }

    async fn capture_all(&mut self, session: &mut Session) -> Result<(), AbortReason> {
        let kind = session.kind();
        let total = session.frame_count();
        let mut last_start: Option<Instant> = None;

        while let Some(shot) = session.next_shot() {
            if shot.lead_in == LeadIn::Countdown {
                self.countdown(kind, shot.index, total).await?;
            }
            self.set_state(ControllerState::Capturing {
                mode: kind,
                frame: shot.index,
                total,
            });
            if let (LeadIn::Tick { period }, Some(previous)) = (shot.lead_in, last_start) {
                let deadline = previous + Duration::from_millis(period);
                self.wait_for(tokio::time::sleep_until(deadline.into())).await?;
            }

            let (started, frame) = self.capture(shot).await?;
            last_start = Some(started);
            session.push_frame(frame);
            self.ui.frame_captured(shot.index, total);
            debug!(session = %session.id, frame = shot.index + 1, total, "Frame captured");
        }
        Ok(())
    }

    async fn countdown(&mut self, mode: ModeKind, frame: usize, total: usize) -> Result<(), AbortReason> {
        self.set_state(ControllerState::CountingDown { mode, frame, total });
        let config = Arc::clone(&self.config);
        let hold = Duration::from_millis(config.countdown.step_millis);
        let steps = config.countdown.overlays.len();
        for (step, overlay) in config.countdown.overlays.iter().enumerate() {
            self.ui.countdown(frame, overlay, step, steps);
            self.wait_for(tokio::time::sleep(hold)).await?;
        }
        Ok(())
    }

    /// Blocking capture. Returns the instant the camera was called.
    async fn capture(&mut self, shot: ShotStep) -> Result<(Instant, Frame), AbortReason> {
        let camera = Arc::clone(&self.camera);
        let size = shot.size;
        let joined = tokio::task::spawn_blocking(move || {
            let started = Instant::now();
            (started, camera.capture(size))
        })
        .await;
        self.ready_since = Instant::now();

        let failed = |error| AbortReason::Capture {
            frame: shot.index,
            error,
        };
        let (started, result) = joined
            .map_err(|e| failed(CaptureError::Unavailable(format!("capture task failed: {e}"))))?;
        let frame = result.map_err(failed)?;
        Ok((started, frame))
    }

    /// Blocking render and archive.
    async fn process(&mut self, session: &mut Session) -> Result<ArchivedArtifact, AbortReason> {
        let mode = session.kind();
        self.set_state(ControllerState::Processing { mode });

        let sizes = session.frame_sizes();
        let frames = session.take_frames();
        let renderer = Arc::clone(&self.renderer);
        let plan = session.plan.clone();
        let store = self.store.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let artifact = pipeline::process(&*renderer, &plan, frames)?;
            store.save(&artifact, mode)
        })
        .await;
        self.ready_since = Instant::now();

        joined
            .map_err(|e| RenderError::Processing(format!("render task failed: {e}")))
            .and_then(|result| result)
            .map_err(|error| {
                warn!(
                    session = %session.id,
                    frames = sizes.len(),
                    sizes = ?sizes,
                    "Raw frames kept for diagnostics only, discarding"
                );
                AbortReason::Render(error)
            })
    }

    /// Show the artifact until it is handed off, dismissed or times out.
    ///
    /// Also returns the mode of a snap that ended the review.
    async fn review(
        &mut self,
        session: &Session,
        artifact: &ArchivedArtifact,
    ) -> (DeliveryOutcome, Option<ModeKind>) {
        self.set_state(ControllerState::ReviewOrDeliver {
            mode: session.kind(),
            artifact: artifact.path.clone(),
        });
        self.ui.review(artifact);

        let timeout = tokio::time::sleep(Duration::from_secs(self.config.review.timeout_secs));
        tokio::pin!(timeout);
        loop {
            if self.inputs_closed {
                debug!("No more input, leaving review");
                return (DeliveryOutcome::Skipped, None);
            }
            let event = tokio::select! {
                () = &mut timeout => {
                    debug!(session = %session.id, "Review timed out");
                    return (DeliveryOutcome::Skipped, None);
                }
                event = self.actions.recv() => event,
            };
            let Some(event) = event else {
                self.inputs_closed = true;
                continue;
            };
            if self.is_stale(&event) {
                trace!(action = %event.action, "Stale action dropped");
                continue;
            }

            match event.action {
                Action::SendEmail { recipient } => {
                    if !self.config.email.enabled {
                        warn!("Email delivery is disabled");
                        continue;
                    }
                    let Some(recipient) =
                        recipient.or_else(|| self.config.email.default_recipient.clone())
                    else {
                        info!(session = %session.id, "No recipient, delivery skipped");
                        return (DeliveryOutcome::Skipped, None);
                    };
                    if let Some(outcome) =
                        self.dispatch(session, artifact, DeliveryKind::Email { recipient })
                    {
                        return (outcome, None);
                    }
                }
                Action::Print => {
                    if !self.config.print.enabled {
                        warn!("Printing is disabled");
                        continue;
                    }
                    if let Some(outcome) = self.dispatch(session, artifact, DeliveryKind::Print) {
                        return (outcome, None);
                    }
                }
                Action::Dismiss => return (DeliveryOutcome::Skipped, None),
                Action::Configure => {
                    self.ui.configure();
                    return (DeliveryOutcome::Skipped, None);
                }
                Action::Snap(mode) => {
                    debug!(%mode, "Snap during review starts a new session");
                    return (DeliveryOutcome::Skipped, Some(mode));
                }
                Action::SelectEffect(key) => self.select_effect(&key),
            }
        }
    }

    /// Hand the artifact to the dispatcher. `None` when there is none.
    fn dispatch(
        &self,
        session: &Session,
        artifact: &ArchivedArtifact,
        kind: DeliveryKind,
    ) -> Option<DeliveryOutcome> {
        let Some(queue) = &self.deliveries else {
            warn!(?kind, "No delivery dispatcher running");
            return None;
        };
        let request = DeliveryRequest::new(session.id, kind.clone(), artifact.clone());
        let id = request.id;
        if queue.submit(request) {
            info!(session = %session.id, request = %id, ?kind, "Delivery requested");
            Some(DeliveryOutcome::Pending { request: id, kind })
        } else {
            warn!(session = %session.id, "Delivery dispatcher has stopped");
            Some(DeliveryOutcome::Failed {
                reason: "delivery dispatcher stopped".to_string(),
            })
        }
    }

    /// Await `fut` while serving the action queue. Cancelling actions abort
    /// the wait; snaps and other requests are dropped.
    async fn wait_for<F: Future>(&mut self, fut: F) -> Result<F::Output, AbortReason> {
        tokio::pin!(fut);
        loop {
            if self.inputs_closed {
                return Ok(fut.await);
            }
            tokio::select! {
                biased;
                out = &mut fut => return Ok(out),
                event = self.actions.recv() => match event {
                    Some(event) => self.interrupt(event)?,
                    None => self.inputs_closed = true,
                },
            }
        }
    }

    fn interrupt(&mut self, event: ActionEvent) -> Result<(), AbortReason> {
        if self.is_stale(&event) {
            trace!(action = %event.action, "Stale action dropped");
            return Ok(());
        }
        match event.action {
            action if action.cancels_capture() => Err(AbortReason::Cancelled(action)),
            Action::SelectEffect(key) => {
                self.select_effect(&key);
                Ok(())
            }
            action => {
                debug!(%action, "Session in progress, action dropped");
                Ok(())
            }
        }
    }

    fn handle_idle(&mut self, action: Action) {
        match action {
            Action::SelectEffect(key) => self.select_effect(&key),
            Action::Configure => {
                info!("Configuration requested");
                self.ui.configure();
            }
            Action::SendEmail { .. } | Action::Print => {
                debug!(%action, "Nothing under review, ignoring");
            }
            Action::Dismiss | Action::Snap(_) => trace!(%action, "Ignored while idle"),
        }
    }

    fn abort(&self, session: &Session, reason: AbortReason, frames: usize) {
        let mode = session.kind();
        if let AbortReason::Cancelled(_) = reason {
            info!(session = %session.id, %mode, frames, %reason, "Session cancelled");
        } else {
            warn!(session = %session.id, %mode, frames, %reason, "Session aborted");
            self.ui.error(&reason.to_string());
        }
        self.set_state(ControllerState::Aborted {
            mode,
            reason: reason.clone(),
        });
        self.emit(SessionOutcome {
            session: session.id,
            mode,
            effect: session.effect_key().map(str::to_string),
            frames_captured: frames,
            started: session.started,
            end: SessionEnd::Aborted { reason },
        });
    }

    fn become_idle(&mut self) {
        self.ready_since = Instant::now();
        self.set_state(ControllerState::Idle);
    }

    fn set_state(&self, state: ControllerState) {
        debug!(state = state.name(), "Controller state");
        self.ui.state_changed(&state);
        self.state.send_replace(state);
    }

    fn emit(&self, outcome: SessionOutcome) {
        if self.outcomes.send(outcome).is_err() {
            trace!("No session outcome subscribers");
        }
    }

    fn is_stale(&self, event: &ActionEvent) -> bool {
        event.at < self.ready_since
    }

    /// Key and definition of the selected effect, or of the mode's default.
    fn effect_for(&self, mode: &CaptureMode) -> Option<(String, ImageEffect)> {
        let key = self
            .selected_effect
            .as_deref()
            .or_else(|| mode.default_effect())?;
        let effect = self.config.effect(key)?.clone();
        Some((key.to_string(), effect))
    }

    fn select_effect(&mut self, key: &str) {
        if self.config.effect(key).is_some() {
            info!(effect = key, "Effect selected");
            self.selected_effect = Some(key.to_string());
            self.ui.effect_selected(key);
        } else {
            warn!(effect = key, "Unknown effect selected, ignoring");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::mock::MockCamera;
    use crate::config::FrameSize;
    use crate::input::{ActionSource, action_queue};
    use crate::render::mock::MockRenderer;
    use crate::session::ui::RecordingUi;

    fn fast_config(photos: &std::path::Path) -> BoothConfig {
        let mut config = BoothConfig::default();
        config.modes.single.snap_size = FrameSize::new(8, 6);
        config.countdown.step_millis = 1;
        config.countdown.overlays.truncate(2);
        config.review.timeout_secs = 0;
        config.storage.photos_dir = photos.to_path_buf();
        config
    }

    #[test]
    fn test_state_names_and_busy() {
        let counting = ControllerState::CountingDown {
            mode: ModeKind::Collage,
            frame: 0,
            total: 4,
        };
        assert_eq!(counting.name(), "counting_down");
        assert!(counting.is_busy());
        assert!(!ControllerState::Idle.is_busy());
        assert!(
            !ControllerState::ReviewOrDeliver {
                mode: ModeKind::Single,
                artifact: PathBuf::from("a.jpg"),
            }
            .is_busy()
        );
    }

    #[test]
    fn test_state_serializes_with_reason() {
        let state = ControllerState::Aborted {
            mode: ModeKind::Collage,
            reason: AbortReason::Capture {
                frame: 2,
                error: CaptureError::Command("exit status 1".into()),
            },
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["state"], "aborted");
        assert_eq!(json["mode"], "Four");
        assert_eq!(
            json["reason"],
            "capture of frame 3 failed: Camera command failed: exit status 1"
        );
    }

    #[tokio::test]
    async fn test_single_session_reaches_review_and_times_out() {
        let temp = tempfile::tempdir().unwrap();
        let config = Arc::new(fast_config(temp.path()));
        let camera = Arc::new(MockCamera::new());
        let renderer = Arc::new(MockRenderer::new());
        let ui = Arc::new(RecordingUi::new());
        let (sender, rx) = action_queue();

        let controller = SessionController::new(config, Arc::clone(&camera), renderer, rx)
            .with_ui(ui.clone());
        let mut outcomes = controller.subscribe_outcomes();
        let task = tokio::spawn(controller.run());

        assert!(sender.send(Action::Snap(ModeKind::Single), ActionSource::Touch));
        let outcome = outcomes.recv().await.unwrap();
        drop(sender);
        task.await.unwrap();

        assert_eq!(camera.call_count(), 1);
        assert_eq!(outcome.frames_captured, 1);
        assert!(matches!(
            outcome.end,
            SessionEnd::Completed {
                delivery: DeliveryOutcome::Skipped,
                ..
            }
        ));
        assert!(outcome.artifact().unwrap().path.exists());

        let names: Vec<&str> = ui.states().iter().map(ControllerState::name).collect();
        assert_eq!(
            names,
            [
                "idle",
                "counting_down",
                "capturing",
                "processing",
                "review_or_deliver",
                "idle"
            ]
        );
        assert_eq!(ui.countdowns(), 2);
    }

    #[tokio::test]
    async fn test_stale_events_are_dropped() {
        let temp = tempfile::tempdir().unwrap();
        let (sender, rx) = action_queue();
        // Queued before the controller exists.
        sender.tap(Action::Snap(ModeKind::Single));
        std::thread::sleep(Duration::from_millis(2));

        let controller = SessionController::new(
            Arc::new(fast_config(temp.path())),
            Arc::new(MockCamera::new()),
            Arc::new(MockRenderer::new()),
            rx,
        );
        let mut outcomes = controller.subscribe_outcomes();
        let task = tokio::spawn(controller.run());
        drop(sender);
        task.await.unwrap();

        assert!(outcomes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_effect_selection_applies_to_next_session() {
        let temp = tempfile::tempdir().unwrap();
        let renderer = Arc::new(MockRenderer::new());
        let (sender, rx) = action_queue();
        let controller = SessionController::new(
            Arc::new(fast_config(temp.path())),
            Arc::new(MockCamera::new()),
            Arc::clone(&renderer),
            rx,
        );
        let mut outcomes = controller.subscribe_outcomes();
        let task = tokio::spawn(controller.run());

        sender.tap(Action::SelectEffect("no-such-effect".into()));
        sender.tap(Action::SelectEffect("sketch".into()));
        sender.tap(Action::Snap(ModeKind::Single));
        let outcome = outcomes.recv().await.unwrap();
        drop(sender);
        task.await.unwrap();

        assert_eq!(outcome.effect.as_deref(), Some("sketch"));
        assert_eq!(renderer.effect_calls(), 1);
    }

    #[tokio::test]
    async fn test_outcome_names_effect_by_key() {
        let temp = tempfile::tempdir().unwrap();
        let (sender, rx) = action_queue();
        let controller = SessionController::new(
            Arc::new(fast_config(temp.path())),
            Arc::new(MockCamera::new()),
            Arc::new(MockRenderer::new()),
            rx,
        );
        let mut outcomes = controller.subscribe_outcomes();
        let mut state = controller.subscribe_state();
        let task = tokio::spawn(controller.run());

        sender.tap(Action::SelectEffect("colorswap0".into()));
        sender.tap(Action::Snap(ModeKind::Single));
        let first = outcomes.recv().await.unwrap();
        state.wait_for(|s| matches!(s, ControllerState::Idle)).await.unwrap();

        sender.tap(Action::SelectEffect("colorswap1".into()));
        sender.tap(Action::Snap(ModeKind::Single));
        let second = outcomes.recv().await.unwrap();
        drop(sender);
        task.await.unwrap();

        assert_eq!(first.effect.as_deref(), Some("colorswap0"));
        assert_eq!(second.effect.as_deref(), Some("colorswap1"));
    }
}
