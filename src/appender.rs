//! Serialized appends to the shared log destination.
//!
//! The file is opened once in append mode at startup and every write goes
//! through one async lock, so each accepted entry lands as exactly one
//! complete line regardless of how many handlers are writing. Failures are
//! returned to the caller; the offending entry is not retried.

use bytes::BytesMut;
use std::path::Path;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;

/// Append-only writer shared by all connection handlers
pub struct LogAppender {
    file: Mutex<File>,
}

impl LogAppender {
    /// Open (creating if needed) the destination file in append mode.
    pub async fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        info!(path = %path.display(), "Opened log destination");
        Ok(Self { file: Mutex::new(file) })
    }

    /// Append one formatted entry as a single line.
    ///
    /// The entry and its trailing newline are written as one buffer under
    /// the lock, so concurrent appends never interleave.
    pub async fn append(&self, entry: &str) -> std::io::Result<()> {
        let mut line = BytesMut::with_capacity(entry.len() + 1);
        line.extend_from_slice(entry.as_bytes());
        line.extend_from_slice(b"\n");

        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await
    }
}
