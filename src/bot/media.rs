//! Content fetcher
//!
//! Streams message content from the platform into the artifact directory.

use crate::line::{LinePlatform, PlatformError};
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Errors while downloading message content
#[derive(Debug, Error)]
pub enum FetchError {
    /// Opening or reading the content stream failed
    #[error("Content stream failed: {0}")]
    Stream(#[from] PlatformError),
    /// Writing the artifact failed
    #[error("Failed to write {path}: {source}")]
    Io {
        /// Destination file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Downloads message content to local files
#[derive(Clone)]
pub struct ContentFetcher {
    platform: Arc<dyn LinePlatform>,
}

impl ContentFetcher {
    /// Create a fetcher on top of a platform client
    #[must_use]
    pub fn new(platform: Arc<dyn LinePlatform>) -> Self {
        Self { platform }
    }

    /// Pipe the content of `message_id` into a new file at `destination`.
    ///
    /// One attempt per call. On a stream error the partially written file
    /// is left in place for the cleanup sweep.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Stream` if the platform stream fails and
    /// `FetchError::Io` if the file cannot be written.
    pub async fn fetch(&self, message_id: &str, destination: &Path) -> Result<PathBuf, FetchError> {
        let io_error = |source| FetchError::Io {
            path: destination.to_path_buf(),
            source,
        };

        let mut stream = self.platform.get_message_content(message_id).await?;
        let mut file = tokio::fs::File::create(destination)
            .await
            .map_err(io_error)?;

        let mut written = 0usize;
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    if let Err(flush_error) = file.flush().await {
                        warn!(
                            path = %destination.display(),
                            error = %flush_error,
                            "Failed to flush partial download"
                        );
                    }
                    return Err(e.into());
                }
            };
            file.write_all(&chunk).await.map_err(io_error)?;
            written += chunk.len();
        }
        file.flush().await.map_err(io_error)?;

        debug!(
            message_id,
            path = %destination.display(),
            bytes = written,
            "Downloaded message content"
        );
        Ok(destination.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::MockLinePlatform;
    use bytes::Bytes;
    use futures_util::stream;

    #[tokio::test]
    async fn test_fetch_writes_all_chunks() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let destination = dir.path().join("325708.jpg");

        let mut platform = MockLinePlatform::new();
        platform
            .expect_get_message_content()
            .withf(|id| id == "325708")
            .times(1)
            .returning(|_| {
                Ok(stream::iter(vec![
                    Ok(Bytes::from_static(b"\xff\xd8")),
                    Ok(Bytes::from_static(b"jpeg-body")),
                ])
                .boxed())
            });

        let fetcher = ContentFetcher::new(Arc::new(platform));
        let path = fetcher.fetch("325708", &destination).await?;

        assert_eq!(path, destination);
        assert_eq!(tokio::fs::read(&destination).await?, b"\xff\xd8jpeg-body");
        Ok(())
    }

    #[tokio::test]
    async fn test_stream_error_fails_and_keeps_partial_file(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let destination = dir.path().join("42.mp4");

        let mut platform = MockLinePlatform::new();
        platform.expect_get_message_content().returning(|_| {
            Ok(stream::iter(vec![
                Ok(Bytes::from_static(b"partial")),
                Err(PlatformError::Network("connection reset".to_string())),
            ])
            .boxed())
        });

        let fetcher = ContentFetcher::new(Arc::new(platform));
        let result = fetcher.fetch("42", &destination).await;

        assert!(matches!(result, Err(FetchError::Stream(_))));
        assert_eq!(tokio::fs::read(&destination).await?, b"partial");
        Ok(())
    }

    #[tokio::test]
    async fn test_open_error_creates_no_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let destination = dir.path().join("7.m4a");

        let mut platform = MockLinePlatform::new();
        platform.expect_get_message_content().returning(|_| {
            Err(PlatformError::Api {
                status: 404,
                message: "Not found".to_string(),
            })
        });

        let fetcher = ContentFetcher::new(Arc::new(platform));
        assert!(fetcher.fetch("7", &destination).await.is_err());
        assert!(!destination.exists());
        Ok(())
    }
}
