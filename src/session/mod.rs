//! Session state and the controller that drives it.
//!
//! A [`Session`] lives from the snap action that created it until its artifact
//! is handed off, dismissed or the session aborts. The
//! [`SessionController`] owns at most one at a time.

pub mod archive;
mod controller;
pub mod ui;

use chrono::{DateTime, Local};
use serde::Serialize;
use uuid::Uuid;

use crate::camera::Frame;
use crate::config::{AnimationCountdown, CaptureMode, FrameSize, ImageEffect, ModeKind};
use crate::delivery::{DeliveryKind, DeliveryReport, DeliveryStatus};
use crate::pipeline::{CapturePlan, ShotStep};

pub use archive::{ArchivedArtifact, ArtifactStore};
pub use controller::{AbortReason, ControllerState, SessionController, SessionEnd, SessionOutcome};
pub use ui::{ConsoleUi, NullUi, RecordingUi, Ui, UiEvent};

/// What became of a session's artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// Handed to the dispatcher; the result arrives as a [`DeliveryReport`].
    Pending { request: Uuid, kind: DeliveryKind },
    Sent,
    Failed { reason: String },
    /// Dismissed, timed out or nothing to deliver to.
    Skipped,
}

impl From<&DeliveryReport> for DeliveryOutcome {
    fn from(report: &DeliveryReport) -> Self {
        match &report.status {
            DeliveryStatus::Sent => Self::Sent,
            DeliveryStatus::Failed { reason } => Self::Failed {
                reason: reason.clone(),
            },
        }
    }
}

/// One capture-to-delivery cycle.
#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub mode: CaptureMode,
    /// Configuration key of the effect, which names it uniquely.
    pub effect_key: Option<String>,
    pub effect: Option<ImageEffect>,
    pub plan: CapturePlan,
    pub started: DateTime<Local>,
    frames: Vec<Frame>,
}

impl Session {
    pub fn new(
        mode: CaptureMode,
        effect: Option<(String, ImageEffect)>,
        animation_countdown: AnimationCountdown,
    ) -> Self {
        let (effect_key, effect) = effect.unzip();
        let plan = CapturePlan::new(&mode, effect.as_ref(), animation_countdown);
        Self {
            id: Uuid::new_v4(),
            mode,
            effect_key,
            effect,
            plan,
            started: Local::now(),
            frames: Vec::new(),
        }
    }

    pub fn kind(&self) -> ModeKind {
        self.mode.kind()
    }

    pub fn effect_key(&self) -> Option<&str> {
        self.effect_key.as_deref()
    }

    pub fn frame_count(&self) -> usize {
        self.plan.frame_count()
    }

    /// The shot still to be taken, if any.
    pub fn next_shot(&self) -> Option<ShotStep> {
        self.plan.shots.get(self.frames.len()).copied()
    }

    pub fn is_complete(&self) -> bool {
        self.frames.len() == self.frame_count()
    }

    /// Append a captured frame. Frames beyond the plan are refused.
    pub fn push_frame(&mut self, frame: Frame) -> bool {
        if self.is_complete() {
            return false;
        }
        self.frames.push(frame);
        true
    }

    /// Sizes of the captured frames, for diagnostics.
    pub fn frame_sizes(&self) -> Vec<FrameSize> {
        self.frames
            .iter()
            .map(|f| FrameSize::new(f.width(), f.height()))
            .collect()
    }

    /// Move the frames out for processing.
    pub fn take_frames(&mut self) -> Vec<Frame> {
        std::mem::take(&mut self.frames)
    }

    /// Drop all captured frames, returning how many there were.
    pub fn discard(&mut self) -> usize {
        let count = self.frames.len();
        self.frames.clear();
        count
    }
}
