//! Camera collaborator.
//!
//! Capture is a blocking call. The controller runs it on the blocking pool
//! and waits for it; an in-flight capture is never cancelled.

mod command;
pub mod mock;

use image::RgbImage;

use crate::config::FrameSize;
use crate::error::CaptureError;

pub use command::CommandCamera;

/// One raw frame as delivered by the camera.
pub type Frame = RgbImage;

/// Produces raw frames on request.
pub trait Camera: Send + Sync + 'static {
    /// Capture one frame of exactly `size`.
    fn capture(&self, size: FrameSize) -> Result<Frame, CaptureError>;
}

/// Check a frame against the requested size.
pub fn ensure_size(frame: &Frame, size: FrameSize) -> Result<(), CaptureError> {
    let (actual_w, actual_h) = frame.dimensions();
    if actual_w == size.width && actual_h == size.height {
        Ok(())
    } else {
        Err(CaptureError::WrongSize {
            expected_w: size.width,
            expected_h: size.height,
            actual_w,
            actual_h,
        })
    }
}
