//! Preview generation through an external image tool.
//!
//! `Transcoder` is synchronous; `run_transcoder` moves the call onto the
//! blocking pool so only the calling handler waits on it.

use crate::config::{PREVIEW_WIDTH, TRANSCODER_PROGRAM};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Kind of preview to derive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscodeMode {
    /// Resized JPEG of an image
    ImagePreview,
    /// JPEG of the first frame of a video
    VideoFrame,
}

/// Errors from the transcoding step
#[derive(Debug, Error)]
pub enum TranscodeError {
    /// The tool could not be started
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        /// Program name
        program: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
    /// The tool exited unsuccessfully
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        /// Program name
        program: String,
        /// Exit status description
        status: String,
        /// Captured standard error
        stderr: String,
    },
    /// The blocking task did not complete
    #[error("Transcode task failed: {0}")]
    Join(String),
}

/// Derives preview artifacts from downloaded media
#[cfg_attr(test, mockall::automock)]
pub trait Transcoder: Send + Sync {
    /// Write the preview of `input` to `output`, blocking until done
    ///
    /// # Errors
    ///
    /// Returns a `TranscodeError` if the conversion fails.
    fn transcode(&self, input: &Path, output: &Path, mode: TranscodeMode)
        -> Result<(), TranscodeError>;
}

/// `Transcoder` backed by ImageMagick's `convert`
#[derive(Debug, Clone)]
pub struct ImageMagickTranscoder {
    program: String,
}

impl Default for ImageMagickTranscoder {
    fn default() -> Self {
        Self::with_program(TRANSCODER_PROGRAM)
    }
}

impl ImageMagickTranscoder {
    /// Use a specific binary instead of `convert`
    #[must_use]
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn args(input: &Path, output: &Path, mode: TranscodeMode) -> Vec<OsString> {
        let target = prefixed("jpeg:", output, "");
        match mode {
            TranscodeMode::ImagePreview => vec![
                OsString::from("-resize"),
                OsString::from(format!("{PREVIEW_WIDTH}x")),
                prefixed("jpeg:", input, ""),
                target,
            ],
            TranscodeMode::VideoFrame => vec![prefixed("mp4:", input, "[0]"), target],
        }
    }
}

fn prefixed(prefix: &str, path: &Path, suffix: &str) -> OsString {
    let mut arg = OsString::from(prefix);
    arg.push(path.as_os_str());
    arg.push(suffix);
    arg
}

impl Transcoder for ImageMagickTranscoder {
    fn transcode(
        &self,
        input: &Path,
        output: &Path,
        mode: TranscodeMode,
    ) -> Result<(), TranscodeError> {
        let args = Self::args(input, output, mode);
        debug!(program = %self.program, ?args, "Running transcoder");

        let result = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|source| TranscodeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if result.status.success() {
            Ok(())
        } else {
            Err(TranscodeError::Failed {
                program: self.program.clone(),
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            })
        }
    }
}

/// Run a transcode on the blocking pool
///
/// # Errors
///
/// Propagates the transcoder's error, or `TranscodeError::Join` if the task
/// panicked.
pub async fn run_transcoder(
    transcoder: Arc<dyn Transcoder>,
    input: PathBuf,
    output: PathBuf,
    mode: TranscodeMode,
) -> Result<(), TranscodeError> {
    tokio::task::spawn_blocking(move || transcoder.transcode(&input, &output, mode))
        .await
        .map_err(|e| TranscodeError::Join(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_preview_args() {
        let args = ImageMagickTranscoder::args(
            Path::new("downloaded/abc123.jpg"),
            Path::new("downloaded/abc123-preview.jpg"),
            TranscodeMode::ImagePreview,
        );
        assert_eq!(
            args,
            vec![
                "-resize",
                "240x",
                "jpeg:downloaded/abc123.jpg",
                "jpeg:downloaded/abc123-preview.jpg",
            ]
        );
    }

    #[test]
    fn test_video_frame_args() {
        let args = ImageMagickTranscoder::args(
            Path::new("downloaded/42.mp4"),
            Path::new("downloaded/42-preview.jpg"),
            TranscodeMode::VideoFrame,
        );
        assert_eq!(
            args,
            vec!["mp4:downloaded/42.mp4[0]", "jpeg:downloaded/42-preview.jpg"]
        );
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let transcoder = ImageMagickTranscoder::with_program("definitely-not-a-real-binary-xyz");
        let result = transcoder.transcode(
            Path::new("in.jpg"),
            Path::new("out.jpg"),
            TranscodeMode::ImagePreview,
        );
        assert!(matches!(result, Err(TranscodeError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_fails() {
        let transcoder: Arc<dyn Transcoder> = Arc::new(ImageMagickTranscoder::with_program("false"));
        let result = run_transcoder(
            transcoder,
            PathBuf::from("in.mp4"),
            PathBuf::from("out.jpg"),
            TranscodeMode::VideoFrame,
        )
        .await;
        assert!(matches!(result, Err(TranscodeError::Failed { .. })));
    }
}
