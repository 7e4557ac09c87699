//! Archive of finished artifacts.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::config::{FrameSize, ModeKind};
use crate::error::RenderError;
use crate::render::{Artifact, ArtifactKind};

/// An artifact written to the photos directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchivedArtifact {
    pub path: PathBuf,
    pub kind: ArtifactKind,
    pub content_type: String,
    pub size: FrameSize,
    pub bytes: u64,
}

impl ArchivedArtifact {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map_or_else(String::new, |n| n.to_string_lossy().into_owned())
    }
}

/// Writes encoded artifacts under timestamped names.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for an artifact finished at `at`, e.g.
    /// `booth_Four_20240601_143012_123.jpg`.
    pub fn file_name(mode: ModeKind, at: DateTime<Local>, extension: &str) -> String {
        format!("{}.{extension}", Self::stem(mode, at))
    }

    fn stem(mode: ModeKind, at: DateTime<Local>) -> String {
        format!("booth_{mode}_{}", at.format("%Y%m%d_%H%M%S_%3f"))
    }

    /// Encode and write the artifact.
    #[instrument(skip(self, artifact), fields(dir = %self.dir.display()))]
    pub fn save(&self, artifact: &Artifact, mode: ModeKind) -> Result<ArchivedArtifact, RenderError> {
        let data = artifact.encode()?;
        fs::create_dir_all(&self.dir)
            .map_err(|e| RenderError::Storage(format!("{}: {e}", self.dir.display())))?;

        let stem = Self::stem(mode, Local::now());
        let extension = artifact.extension();
        let mut path = self.dir.join(format!("{stem}.{extension}"));
        // Two sessions finishing in the same millisecond keep both files.
        let mut suffix = 1;
        while path.exists() {
            path = self.dir.join(format!("{stem}-{suffix}.{extension}"));
            suffix += 1;
        }

        fs::write(&path, &data)
            .map_err(|e| RenderError::Storage(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), bytes = data.len(), "Artifact archived");

        Ok(ArchivedArtifact {
            path,
            kind: artifact.kind(),
            content_type: artifact.content_type().to_string(),
            size: artifact.dimensions(),
            bytes: data.len() as u64,
        })
    }
}
