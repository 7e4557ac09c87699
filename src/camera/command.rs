//! Still capture through an external program (`rpicam-still` by default).

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, instrument, trace, warn};

use crate::config::{CameraSettings, FrameSize};
use crate::error::CaptureError;

use super::{Camera, Frame, ensure_size};

const WAIT_STEP: Duration = Duration::from_millis(20);

/// Camera driven by a still-capture command writing a PNG file.
#[derive(Debug, Clone)]
pub struct CommandCamera {
    settings: CameraSettings,
    scratch_dir: PathBuf,
}

impl CommandCamera {
    pub fn new(settings: CameraSettings) -> Self {
        Self {
            settings,
            scratch_dir: std::env::temp_dir(),
        }
    }

    #[must_use]
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    /// Full argument list for one capture.
    pub fn capture_args(&self, size: FrameSize, output: &Path) -> Vec<String> {
        let mut args = self.settings.args.clone();
        args.extend([
            "--width".to_string(),
            size.width.to_string(),
            "--height".to_string(),
            size.height.to_string(),
            "--encoding".to_string(),
            "png".to_string(),
            "--output".to_string(),
            output.display().to_string(),
        ]);
        args
    }

    fn run(&self, args: &[String]) -> Result<(), CaptureError> {
        let timeout = Duration::from_millis(self.settings.timeout_millis);
        let mut child = Command::new(&self.settings.command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                CaptureError::Unavailable(format!("{}: {e}", self.settings.command))
            })?;

        let started = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) if status.success() => return Ok(()),
                Ok(Some(status)) => {
                    return Err(CaptureError::Command(format!(
                        "{} exited with {status}",
                        self.settings.command
                    )));
                }
                Ok(None) if started.elapsed() >= timeout => {
                    warn!(timeout_ms = timeout.as_millis(), "Camera command timed out");
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(CaptureError::Command(format!(
                        "{} timed out after {} ms",
                        self.settings.command,
                        timeout.as_millis()
                    )));
                }
                Ok(None) => std::thread::sleep(WAIT_STEP),
                Err(e) => return Err(CaptureError::Command(e.to_string())),
            }
        }
    }
}

impl Camera for CommandCamera {
    #[instrument(skip(self), fields(size = %size))]
    fn capture(&self, size: FrameSize) -> Result<Frame, CaptureError> {
        let output = self
            .scratch_dir
            .join(format!("booth-capture-{}.png", uuid::Uuid::new_v4()));
        let args = self.capture_args(size, &output);
        trace!(command = %self.settings.command, ?args, "Running capture command");

        let result = self.run(&args).and_then(|()| {
            let img = image::open(&output).map_err(|e| CaptureError::Decode(e.to_string()))?;
            Ok(img.to_rgb8())
        });
        let _ = std::fs::remove_file(&output);

        let frame = result?;
        ensure_size(&frame, size)?;
        debug!("Frame captured");
        Ok(frame)
    }
}
