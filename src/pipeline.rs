//! Effect pipeline: what to capture and how to turn frames into an artifact.
//!
//! A [`CapturePlan`] is derived from a capture mode and the selected effect by
//! an exhaustive match, so every mode states its shot pattern and its
//! post-processing in one place.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, instrument, trace};

use crate::camera::Frame;
use crate::config::{AnimationCountdown, CaptureMode, FrameSize, ImageEffect, ModeKind};
use crate::error::RenderError;
use crate::render::{Artifact, GridLayout, LogoSpec, Renderer};

/// What happens right before a shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LeadIn {
    /// Full countdown overlay sequence.
    Countdown,
    /// Wait for the next tick of a fixed-period timer started by the first shot.
    Tick {
        #[serde(rename = "period_ms")]
        period: u64,
    },
    /// Capture straight away.
    Immediate,
}

impl LeadIn {
    pub const fn tick(period: Duration) -> Self {
        Self::Tick {
            period: period.as_millis() as u64,
        }
    }
}

/// One raw-frame capture request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ShotStep {
    pub index: usize,
    pub size: FrameSize,
    pub lead_in: LeadIn,
}

/// Post-processing applied once all frames are captured, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostStep {
    /// Apply the effect to every frame.
    ApplyEffect(ImageEffect),
    /// Stamp the logo on every frame.
    StampLogo(LogoSpec),
    /// Assemble all frames into a grid under the overlay.
    Composite {
        layout: GridLayout,
        overlay: PathBuf,
    },
    /// Encode all frames into a looping animation.
    EncodeAnimation { delay_ms: u64 },
}

/// Ordered capture and processing plan for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturePlan {
    pub mode: ModeKind,
    pub shots: Vec<ShotStep>,
    pub post: Vec<PostStep>,
}

impl CapturePlan {
    /// Build the plan for a mode.
    ///
    /// The pass-through effect (`none`) adds no processing step.
    pub fn new(
        mode: &CaptureMode,
        effect: Option<&ImageEffect>,
        animation_countdown: AnimationCountdown,
    ) -> Self {
        let mut post: Vec<PostStep> = effect
            .filter(|e| !e.is_identity())
            .cloned()
            .map(PostStep::ApplyEffect)
            .into_iter()
            .collect();

        let shots = match mode {
            CaptureMode::Single(single) => {
                if let Some(logo) = &single.logo {
                    post.push(PostStep::StampLogo(LogoSpec {
                        path: logo.clone(),
                        height: single.logo_size,
                        padding: single.logo_padding,
                    }));
                }
                vec![ShotStep {
                    index: 0,
                    size: single.snap_size,
                    lead_in: LeadIn::Countdown,
                }]
            }
            CaptureMode::Collage(collage) => {
                let layout = GridLayout::two_by_two(collage.snap_size);
                post.push(PostStep::Composite {
                    layout,
                    overlay: collage.foreground_image.clone(),
                });
                (0..layout.cells())
                    .map(|index| ShotStep {
                        index,
                        size: collage.snap_size,
                        lead_in: LeadIn::Countdown,
                    })
                    .collect()
            }
            CaptureMode::Animation(animation) => {
                post.push(PostStep::EncodeAnimation {
                    delay_ms: animation.gif_period_millis,
                });
                let first = match animation_countdown {
                    AnimationCountdown::FirstFrame => LeadIn::Countdown,
                    AnimationCountdown::Skip => LeadIn::Immediate,
                };
                let period = LeadIn::tick(Duration::from_millis(animation.snap_period_millis));
                (0..animation.frame_number as usize)
                    .map(|index| ShotStep {
                        index,
                        size: animation.snap_size,
                        lead_in: if index == 0 { first } else { period },
                    })
                    .collect()
            }
        };

        trace!(mode = %mode.kind(), shots = shots.len(), post = post.len(), "Capture plan built");
        Self {
            mode: mode.kind(),
            shots,
            post,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.shots.len()
    }

    pub fn countdowns(&self) -> usize {
        self.shots
            .iter()
            .filter(|s| s.lead_in == LeadIn::Countdown)
            .count()
    }
}

/// Run the post-processing steps of a plan over the captured frames.
///
/// Frames are consumed; on error nothing partial is returned.
#[instrument(skip(renderer, plan, frames), fields(mode = %plan.mode, frames = frames.len()))]
pub fn process<R: Renderer + ?Sized>(
    renderer: &R,
    plan: &CapturePlan,
    frames: Vec<Frame>,
) -> Result<Artifact, RenderError> {
    if frames.len() != plan.frame_count() {
        return Err(RenderError::FrameCount {
            expected: plan.frame_count(),
            actual: frames.len(),
        });
    }

    let mut frames = frames;
    let mut collage = None;
    let mut animation = None;
    for step in &plan.post {
        match step {
            PostStep::ApplyEffect(effect) => {
                frames = frames
                    .into_iter()
                    .map(|frame| renderer.apply_effect(frame, effect))
                    .collect::<Result<_, _>>()?;
            }
            PostStep::StampLogo(logo) => {
                frames = frames
                    .into_iter()
                    .map(|frame| renderer.stamp_logo(frame, logo))
                    .collect::<Result<_, _>>()?;
            }
            PostStep::Composite { layout, overlay } => {
                collage = Some(renderer.composite(std::mem::take(&mut frames), layout, overlay)?);
            }
            PostStep::EncodeAnimation { delay_ms } => {
                animation = Some(renderer.encode_animation(std::mem::take(&mut frames), *delay_ms)?);
            }
        }
    }

    let artifact = match plan.mode {
        ModeKind::Single => frames.into_iter().next().map(Artifact::Still),
        ModeKind::Collage => collage.map(Artifact::Collage),
        ModeKind::Animation => animation.map(Artifact::Animation),
    };
    let artifact = artifact.ok_or_else(|| {
        RenderError::Processing(format!("plan for mode {} produced no artifact", plan.mode))
    })?;
    debug!(kind = ?artifact.kind(), size = %artifact.dimensions(), "Artifact rendered");
    Ok(artifact)
}
