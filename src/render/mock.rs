//! Mock renderer for testing.
//!
//! Records every call. Effects return the frame unchanged; compositing places
//! frames in the grid without loading the overlay; encoding produces a fake
//! GIF payload.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::trace;

use crate::camera::Frame;
use crate::config::{FrameSize, ImageEffect};
use crate::error::RenderError;

use super::{Animation, GridLayout, LogoSpec, Renderer, compose};

/// Recorded render call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOp {
    ApplyEffect {
        effect: String,
        size: FrameSize,
    },
    Composite {
        frames: usize,
        layout: GridLayout,
        overlay: PathBuf,
    },
    EncodeAnimation {
        frames: usize,
        delay_ms: u64,
    },
    StampLogo {
        logo: PathBuf,
    },
}

#[derive(Debug, Default)]
struct MockState {
    ops: Vec<RenderOp>,
    fail_next: Option<RenderError>,
    fail_composite: Option<RenderError>,
}

/// Recording [`Renderer`] with failure injection.
#[derive(Debug, Default)]
pub struct MockRenderer {
    state: Mutex<MockState>,
}

impl MockRenderer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next call of any kind.
    pub fn fail_next(&self, error: RenderError) {
        self.state.lock().unwrap().fail_next = Some(error);
    }

    /// Fail every composite call.
    #[must_use]
    pub fn failing_composite(self, error: RenderError) -> Self {
        self.state.lock().unwrap().fail_composite = Some(error);
        self
    }

    #[must_use]
    pub fn operations(&self) -> Vec<RenderOp> {
        self.state.lock().unwrap().ops.clone()
    }

    #[must_use]
    pub fn effect_calls(&self) -> usize {
        self.count(|op| matches!(op, RenderOp::ApplyEffect { .. }))
    }

    #[must_use]
    pub fn composite_calls(&self) -> usize {
        self.count(|op| matches!(op, RenderOp::Composite { .. }))
    }

    #[must_use]
    pub fn encode_calls(&self) -> usize {
        self.count(|op| matches!(op, RenderOp::EncodeAnimation { .. }))
    }

    /// Assert no render call was made.
    ///
    /// # Panics
    ///
    /// Panics if any operation was recorded.
    pub fn assert_no_operations(&self) {
        let ops = self.operations();
        assert!(ops.is_empty(), "Expected no render calls, but found: {ops:#?}");
    }

    fn count(&self, f: impl Fn(&RenderOp) -> bool) -> usize {
        self.state.lock().unwrap().ops.iter().filter(|op| f(op)).count()
    }

    fn record(&self, op: RenderOp) -> Result<(), RenderError> {
        trace!(?op, "Recording render call");
        let mut state = self.state.lock().unwrap();
        let is_composite = matches!(op, RenderOp::Composite { .. });
        state.ops.push(op);
        if let Some(error) = state.fail_next.take() {
            return Err(error);
        }
        if is_composite {
            if let Some(error) = &state.fail_composite {
                return Err(error.clone());
            }
        }
        Ok(())
    }
}

impl Renderer for MockRenderer {
    fn apply_effect(&self, frame: Frame, effect: &ImageEffect) -> Result<Frame, RenderError> {
        self.record(RenderOp::ApplyEffect {
            effect: effect.name.clone(),
            size: FrameSize::new(frame.width(), frame.height()),
        })?;
        Ok(frame)
    }

    fn composite(
        &self,
        frames: Vec<Frame>,
        layout: &GridLayout,
        overlay: &Path,
    ) -> Result<Frame, RenderError> {
        self.record(RenderOp::Composite {
            frames: frames.len(),
            layout: *layout,
            overlay: overlay.to_path_buf(),
        })?;
        compose::composite_grid(&frames, layout, None)
    }

    fn encode_animation(
        &self,
        frames: Vec<Frame>,
        delay_ms: u64,
    ) -> Result<Animation, RenderError> {
        self.record(RenderOp::EncodeAnimation {
            frames: frames.len(),
            delay_ms,
        })?;
        let frame_size = frames
            .first()
            .map_or(FrameSize::new(0, 0), |f| FrameSize::new(f.width(), f.height()));
        Ok(Animation {
            frame_count: frames.len(),
            frame_size,
            delay_ms,
            data: b"GIF89a-mock".to_vec(),
        })
    }

    fn stamp_logo(&self, frame: Frame, logo: &LogoSpec) -> Result<Frame, RenderError> {
        self.record(RenderOp::StampLogo {
            logo: logo.path.clone(),
        })?;
        Ok(frame)
    }
}
