//! Presentation seam of the controller.
//!
//! The controller tells the UI what to show; it never waits on it. Rendering
//! the touchscreen is left to an implementation of [`Ui`]; the crate ships a
//! terminal one and a recorder for tests.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use console::{Term, style};
use indicatif::{ProgressBar, ProgressStyle};

use super::archive::ArchivedArtifact;
use super::controller::ControllerState;

/// Receives display updates from the controller. Every method defaults to a no-op.
pub trait Ui: Send + Sync {
    fn state_changed(&self, _state: &ControllerState) {}

    /// Show countdown overlay `step` of `steps` before shot `frame`.
    fn countdown(&self, _frame: usize, _overlay: &Path, _step: usize, _steps: usize) {}

    fn frame_captured(&self, _index: usize, _total: usize) {}

    fn review(&self, _artifact: &ArchivedArtifact) {}

    fn effect_selected(&self, _key: &str) {}

    /// The configuration screen was requested.
    fn configure(&self) {}

    /// Transient error indicator.
    fn error(&self, _message: &str) {}
}

/// Shows nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullUi;

impl Ui for NullUi {}

/// Recorded UI call.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    State(ControllerState),
    Countdown {
        frame: usize,
        overlay: PathBuf,
        step: usize,
    },
    FrameCaptured {
        index: usize,
        total: usize,
    },
    Review(PathBuf),
    EffectSelected(String),
    Configure,
    Error(String),
}

/// [`Ui`] that records every call.
#[derive(Debug, Default)]
pub struct RecordingUi {
    events: Mutex<Vec<UiEvent>>,
}

impl RecordingUi {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<UiEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Published states in order.
    #[must_use]
    pub fn states(&self) -> Vec<ControllerState> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                UiEvent::State(state) => Some(state),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn countdowns(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, UiEvent::Countdown { .. }))
            .count()
    }

    fn push(&self, event: UiEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl Ui for RecordingUi {
    fn state_changed(&self, state: &ControllerState) {
        self.push(UiEvent::State(state.clone()));
    }

    fn countdown(&self, frame: usize, overlay: &Path, step: usize, _steps: usize) {
        self.push(UiEvent::Countdown {
            frame,
            overlay: overlay.to_path_buf(),
            step,
        });
    }

    fn frame_captured(&self, index: usize, total: usize) {
        self.push(UiEvent::FrameCaptured { index, total });
    }

    fn review(&self, artifact: &ArchivedArtifact) {
        self.push(UiEvent::Review(artifact.path.clone()));
    }

    fn effect_selected(&self, key: &str) {
        self.push(UiEvent::EffectSelected(key.to_string()));
    }

    fn configure(&self) {
        self.push(UiEvent::Configure);
    }

    fn error(&self, message: &str) {
        self.push(UiEvent::Error(message.to_string()));
    }
}

/// Terminal UI on stderr: styled status lines and a frame progress bar.
pub struct ConsoleUi {
    term: Term,
    progress: Mutex<Option<ProgressBar>>,
}

impl Default for ConsoleUi {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleUi {
    pub fn new() -> Self {
        Self {
            term: Term::stderr(),
            progress: Mutex::new(None),
        }
    }

    fn line(&self, text: &str) {
        let bar = self.progress.lock().ok().and_then(|p| p.clone());
        match bar {
            Some(bar) => bar.println(text),
            None => {
                let _ = self.term.write_line(text);
            }
        }
    }

    fn finish_progress(&self) {
        if let Ok(mut progress) = self.progress.lock() {
            if let Some(bar) = progress.take() {
                bar.finish_and_clear();
            }
        }
    }
}

impl Ui for ConsoleUi {
    fn state_changed(&self, state: &ControllerState) {
        match state {
            ControllerState::Idle => {
                self.finish_progress();
                self.line(&format!("{}", style("Ready").green().bold()));
            }
            ControllerState::Capturing { frame: 0, total, .. } if *total > 1 => {
                let bar = ProgressBar::new(*total as u64);
                if let Ok(template) =
                    ProgressStyle::with_template("{prefix:.cyan} [{bar:20}] {pos}/{len}")
                {
                    bar.set_style(template.progress_chars("=> "));
                }
                bar.set_prefix("Frames");
                if let Ok(mut progress) = self.progress.lock() {
                    *progress = Some(bar);
                }
            }
            ControllerState::Processing { mode } => {
                self.finish_progress();
                self.line(&format!("{} {mode}", style("Processing").cyan()));
            }
            ControllerState::Aborted { reason, .. } => {
                self.finish_progress();
                self.line(&format!("{} {reason}", style("Aborted:").red().bold()));
            }
            _ => {}
        }
    }

    fn countdown(&self, frame: usize, _overlay: &Path, step: usize, steps: usize) {
        let remaining = steps - step;
        if remaining > 1 {
            self.line(&format!("{} {}", style(format!("#{}", frame + 1)).dim(), remaining - 1));
        } else {
            self.line(&format!("{} {}", style(format!("#{}", frame + 1)).dim(), style("Smile!").yellow()));
        }
    }

    fn frame_captured(&self, _index: usize, _total: usize) {
        if let Ok(progress) = self.progress.lock() {
            if let Some(bar) = progress.as_ref() {
                bar.inc(1);
            }
        }
    }

    fn review(&self, artifact: &ArchivedArtifact) {
        self.line(&format!(
            "{} {} ({})",
            style("Saved").green(),
            artifact.path.display(),
            artifact.size
        ));
    }

    fn effect_selected(&self, key: &str) {
        self.line(&format!("{} {key}", style("Effect:").cyan()));
    }

    fn configure(&self) {
        self.line(&format!("{}", style("Configuration requested").dim()));
    }

    fn error(&self, message: &str) {
        self.line(&format!("{} {message}", style("Error:").red().bold()));
    }
}
