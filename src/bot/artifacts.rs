//! Layout of the downloaded-artifact directory and its public URLs.

use crate::config::DOWNLOADED_PREFIX;
use std::path::{Path, PathBuf};

/// Downloaded artifacts keyed by message ID, exposed under `/downloaded`
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
    base_url: String,
}

impl ArtifactStore {
    /// Create a store rooted at `dir`, published under `base_url`
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            dir: dir.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Whether a message ID is safe to use as a file name stem
    #[must_use]
    pub fn is_valid_id(message_id: &str) -> bool {
        !message_id.is_empty()
            && message_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }

    /// `{dir}/{message_id}.{extension}`
    #[must_use]
    pub fn original_path(&self, message_id: &str, extension: &str) -> PathBuf {
        self.dir.join(format!("{message_id}.{extension}"))
    }

    /// `{dir}/{message_id}-preview.jpg`
    #[must_use]
    pub fn preview_path(&self, message_id: &str) -> PathBuf {
        self.dir.join(format!("{message_id}-preview.jpg"))
    }

    /// Public URL of an artifact, built from its file name
    #[must_use]
    pub fn public_url(&self, path: &Path) -> String {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_default();
        format!("{}{DOWNLOADED_PREFIX}/{file_name}", self.base_url)
    }
}
