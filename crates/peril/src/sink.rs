//! Destinations for game logs consumed by the server.

use std::future::Future;
use std::path::{Path, PathBuf};

use peril_protocol::GameLog;
use tokio::io::AsyncWriteExt;

use crate::PerilError;

/// Somewhere to record game logs.
///
/// A failed write requeues the log, so the sink sees it again later.
pub trait GameLogSink: Send + Sync + 'static {
    fn write(&self, log: &GameLog) -> impl Future<Output = Result<(), PerilError>> + Send;
}

/// Emits each log as a `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl GameLogSink for TracingSink {
    async fn write(&self, log: &GameLog) -> Result<(), PerilError> {
        tracing::info!(
            username = %log.username,
            time = %log.current_time.to_rfc3339(),
            message = %log.message,
            "game log"
        );
        Ok(())
    }
}

/// Appends each log as one line to a file, creating it if needed.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    /// File name the server uses when none is given.
    pub const DEFAULT_PATH: &str = "game.log";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileSink {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PATH)
    }
}

impl GameLogSink for FileSink {
    async fn write(&self, log: &GameLog) -> Result<(), PerilError> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(format!("{log}\n").as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
