//! Test fixtures: scratch directories and configurations that run fast.

use std::path::{Path, PathBuf};

use image::{Rgba, RgbaImage};
use tempfile::TempDir;

use booth::config::{BoothConfig, FrameSize};

/// Scratch directory holding photos, journal and credentials.
pub struct Scratch {
    pub dir: TempDir,
}

impl Scratch {
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    #[must_use]
    pub fn join(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Files written to the photos directory.
    #[must_use]
    pub fn photos(&self) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(self.join("photos")) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
        files.sort();
        files
    }
}

/// Default configuration shrunk for tests: tiny frames, 1 ms countdown
/// steps, a short review and everything stored under `scratch`.
#[must_use]
pub fn fast_config(scratch: &Scratch) -> BoothConfig {
    let mut config = BoothConfig::default();
    config.modes.single.snap_size = FrameSize::new(16, 12);
    config.modes.collage.snap_size = FrameSize::new(16, 12);
    config.modes.animation.snap_size = FrameSize::new(10, 10);
    config.countdown.step_millis = 1;
    config.review.timeout_secs = 5;
    config.storage.photos_dir = scratch.join("photos");
    config.storage.journal = scratch.join("sendmail.db");
    config.oauth.credentials_file = scratch.join("google_credentials.dat");
    config.oauth.client_secret_file = scratch.join("google_client_id.json");
    config
}

/// Write a semi-transparent overlay image.
///
/// # Panics
///
/// Panics if the image cannot be written.
pub fn write_overlay(path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create overlay dir");
    }
    RgbaImage::from_pixel(8, 8, Rgba([255, 255, 255, 64]))
        .save(path)
        .expect("Failed to write overlay");
}
