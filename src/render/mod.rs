//! Render collaborator: effects, compositing and animation encoding.
//!
//! Like capture, rendering is blocking and runs on the blocking pool while the
//! controller waits.

pub mod compose;
pub mod effects;
pub mod mock;

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, instrument};

use crate::camera::Frame;
use crate::config::{FrameSize, ImageEffect};
use crate::error::RenderError;

pub use compose::GridLayout;

/// Logo stamped on single shots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoSpec {
    pub path: PathBuf,
    /// Height after thumbnailing.
    pub height: u32,
    /// Distance from the bottom and right edges.
    pub padding: u32,
}

/// An encoded looping animation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Animation {
    pub frame_count: usize,
    pub frame_size: FrameSize,
    /// Display delay between frames.
    pub delay_ms: u64,
    /// Encoded GIF bytes.
    pub data: Vec<u8>,
}

/// Final output of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    Still(Frame),
    Collage(Frame),
    Animation(Animation),
}

/// Serializable description of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Still,
    Collage,
    Animation,
}

impl Artifact {
    pub const fn kind(&self) -> ArtifactKind {
        match self {
            Self::Still(_) => ArtifactKind::Still,
            Self::Collage(_) => ArtifactKind::Collage,
            Self::Animation(_) => ArtifactKind::Animation,
        }
    }

    pub fn dimensions(&self) -> FrameSize {
        match self {
            Self::Still(frame) | Self::Collage(frame) => {
                FrameSize::new(frame.width(), frame.height())
            }
            Self::Animation(animation) => animation.frame_size,
        }
    }

    /// File extension of the encoded artifact.
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Still(_) | Self::Collage(_) => "jpg",
            Self::Animation(_) => "gif",
        }
    }

    /// MIME type of the encoded artifact.
    pub const fn content_type(&self) -> &'static str {
        match self {
            Self::Still(_) | Self::Collage(_) => "image/jpeg",
            Self::Animation(_) => "image/gif",
        }
    }

    /// Encoded file contents.
    pub fn encode(&self) -> Result<Vec<u8>, RenderError> {
        match self {
            Self::Still(frame) | Self::Collage(frame) => compose::encode_jpeg(frame),
            Self::Animation(animation) => Ok(animation.data.clone()),
        }
    }
}

/// Applies effects and assembles artifacts.
pub trait Renderer: Send + Sync + 'static {
    fn apply_effect(&self, frame: Frame, effect: &ImageEffect) -> Result<Frame, RenderError>;

    /// Place frames into the grid and draw the overlay on top.
    fn composite(
        &self,
        frames: Vec<Frame>,
        layout: &GridLayout,
        overlay: &Path,
    ) -> Result<Frame, RenderError>;

    fn encode_animation(&self, frames: Vec<Frame>, delay_ms: u64)
    -> Result<Animation, RenderError>;

    fn stamp_logo(&self, frame: Frame, logo: &LogoSpec) -> Result<Frame, RenderError>;
}

/// Renderer backed by the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageRenderer;

impl Renderer for ImageRenderer {
    #[instrument(skip(self, frame), fields(effect = %effect.name))]
    fn apply_effect(&self, frame: Frame, effect: &ImageEffect) -> Result<Frame, RenderError> {
        effects::apply(frame, effect)
    }

    #[instrument(skip(self, frames), fields(frames = frames.len(), overlay = %overlay.display()))]
    fn composite(
        &self,
        frames: Vec<Frame>,
        layout: &GridLayout,
        overlay: &Path,
    ) -> Result<Frame, RenderError> {
        let overlay = compose::load_rgba(overlay)?;
        compose::composite_grid(&frames, layout, Some(&overlay))
    }

    #[instrument(skip(self, frames), fields(frames = frames.len()))]
    fn encode_animation(
        &self,
        frames: Vec<Frame>,
        delay_ms: u64,
    ) -> Result<Animation, RenderError> {
        let first = frames.first().ok_or(RenderError::FrameCount {
            expected: 1,
            actual: 0,
        })?;
        let frame_size = FrameSize::new(first.width(), first.height());
        let data = compose::encode_gif(&frames, delay_ms)?;
        debug!(bytes = data.len(), "Animation encoded");
        Ok(Animation {
            frame_count: frames.len(),
            frame_size,
            delay_ms,
            data,
        })
    }

    fn stamp_logo(&self, frame: Frame, logo: &LogoSpec) -> Result<Frame, RenderError> {
        let image = compose::load_rgba(&logo.path)?;
        Ok(compose::stamp_logo(frame, &image, logo.height, logo.padding))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, Rgba, RgbaImage};

    #[test]
    fn test_artifact_file_types() {
        let still = Artifact::Still(Frame::new(2, 2));
        assert_eq!(still.extension(), "jpg");
        assert_eq!(still.content_type(), "image/jpeg");
        assert_eq!(still.kind(), ArtifactKind::Still);

        let animation = Artifact::Animation(Animation {
            frame_count: 2,
            frame_size: FrameSize::new(4, 4),
            delay_ms: 50,
            data: b"GIF89a".to_vec(),
        });
        assert_eq!(animation.extension(), "gif");
        assert_eq!(animation.dimensions(), FrameSize::new(4, 4));
        assert_eq!(animation.encode().unwrap(), b"GIF89a");
    }

    #[test]
    fn test_image_renderer_composite_loads_overlay() {
        let temp = tempfile::tempdir().unwrap();
        let overlay_path = temp.path().join("overlay.png");
        let mut overlay = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 0]));
        overlay.put_pixel(7, 7, Rgba([0, 0, 255, 255]));
        overlay.save(&overlay_path).unwrap();

        let frames = vec![Frame::from_pixel(4, 4, Rgb([9, 9, 9])); 4];
        let layout = GridLayout::two_by_two(FrameSize::new(4, 4));
        let collage = ImageRenderer.composite(frames, &layout, &overlay_path).unwrap();

        assert_eq!(collage.dimensions(), (8, 8));
        assert_eq!(collage.get_pixel(7, 7), &Rgb([0, 0, 255]));
        assert_eq!(collage.get_pixel(0, 0), &Rgb([9, 9, 9]));
    }

    #[test]
    fn test_image_renderer_missing_overlay() {
        let frames = vec![Frame::new(2, 2); 4];
        let layout = GridLayout::two_by_two(FrameSize::new(2, 2));
        let err = ImageRenderer
            .composite(frames, &layout, Path::new("/nonexistent/overlay.png"))
            .unwrap_err();
        assert!(matches!(err, RenderError::Processing(_)));
    }

    #[test]
    fn test_image_renderer_animation() {
        let frames = vec![Frame::new(5, 5); 4];
        let animation = ImageRenderer.encode_animation(frames, 50).unwrap();
        assert_eq!(animation.frame_count, 4);
        assert_eq!(animation.frame_size, FrameSize::new(5, 5));
        assert!(animation.data.starts_with(b"GIF"));
    }
}
