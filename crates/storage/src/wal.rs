// SPDX-License-Identifier: MIT

//! Append-only durable log of [`StateEvent`]s, one JSON object per line.
//!
//! The state store's CAS guarantees come from pairing this log with a
//! single writer lock (see `WalStateStore`): a mutation reads the current
//! materialized view, checks its precondition, and only then appends —
//! the append is the commit point, and it happens before the store's
//! public method returns (§4.1 "All state transitions are persisted
//! before the operation returns").

use std::io::Write;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use wfe_core::StateEvent;

#[derive(Debug, thiserror::Error)]
pub enum WalError {
    #[error("I/O error on WAL at {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
    #[error("corrupt WAL entry at line {line}: {source}")]
    Corrupt { line: usize, #[source] source: serde_json::Error },
}

/// A durable, append-only log backed by a file. `None` path means
/// in-memory-only (used by tests that don't need crash recovery).
pub struct Wal {
    path: Option<PathBuf>,
    file: Option<std::fs::File>,
}

impl Wal {
    pub fn in_memory() -> Self {
        Self { path: None, file: None }
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self, WalError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|source| WalError::Io { path: path.clone(), source })?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| WalError::Io { path: path.clone(), source })?;
        Ok(Self { path: Some(path), file: Some(file) })
    }

    /// Append one event and fsync before returning, so a crash immediately
    /// after this call still recovers the event on replay.
    pub fn append(&mut self, event: &StateEvent) -> Result<(), WalError> {
        let Some(file) = self.file.as_mut() else { return Ok(()) };
        let path = self.path.clone().unwrap_or_default();
        let line = serde_json::to_string(event).map_err(|source| WalError::Corrupt { line: 0, source })?;
        writeln!(file, "{line}").map_err(|source| WalError::Io { path: path.clone(), source })?;
        file.sync_data().map_err(|source| WalError::Io { path, source })?;
        Ok(())
    }

    /// Replay every event in the log in append order, folding into `sink`.
    pub async fn replay(path: &Path, mut sink: impl FnMut(StateEvent)) -> Result<(), WalError> {
        if !path.exists() {
            return Ok(());
        }
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|source| WalError::Io { path: path.to_path_buf(), source })?;
        let mut lines = BufReader::new(file).lines();
        let mut line_no = 0usize;
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|source| WalError::Io { path: path.to_path_buf(), source })?
        {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let event: StateEvent = serde_json::from_str(&line)
                .map_err(|source| WalError::Corrupt { line: line_no, source })?;
            sink(event);
        }
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<(), WalError> {
        if let Some(file) = self.file.as_mut() {
            let mut tokio_file = tokio::fs::File::from_std(
                file.try_clone().map_err(|source| WalError::Io {
                    path: self.path.clone().unwrap_or_default(),
                    source,
                })?,
            );
            tokio_file
                .flush()
                .await
                .map_err(|source| WalError::Io { path: self.path.clone().unwrap_or_default(), source })?;
        }
        Ok(())
    }
}
