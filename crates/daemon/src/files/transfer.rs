//! Streaming uploads and downloads with atomic writes.
//!
//! This module moves raw byte runs between a connection and the storage tree:
//! - Uploads stream into a staging file that is renamed onto the destination
//!   only once every announced byte has arrived
//! - Downloads send exactly the length recorded when the file was opened
//! - Rejected uploads are drained so the connection stays in step

use std::path::{Path, PathBuf};
use std::sync::Arc;

use protocol::{ProtocolError, TRANSFER_CHUNK_SIZE};
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::auth::Identity;
use crate::storage::{StorageError, StorageNamespace};

/// Errors that can occur during file transfer.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Announced upload size exceeds the configured limit.
    #[error("file too large: {size} bytes exceeds limit of {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    /// The file shrank while it was being sent.
    #[error("source truncated: expected {expected} bytes, read {actual}")]
    SourceTruncated { expected: u64, actual: u64 },

    /// Name validation or storage tree error.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The connection failed or closed mid-transfer.
    #[error("connection error: {0}")]
    Connection(#[from] ProtocolError),

    /// Local file IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransferError {
    /// True if the upload was refused because of the names the client sent.
    ///
    /// No payload byte has been read when this is returned.
    pub fn is_rejected_name(&self) -> bool {
        matches!(self, TransferError::Storage(e) if e.is_invalid_name())
    }
}

/// An opened download: the file and its length at open time.
#[derive(Debug)]
pub struct DownloadSource {
    file: File,
    len: u64,
    path: PathBuf,
}

impl DownloadSource {
    /// Bytes that will be sent.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// True for an empty file.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Path of the opened file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// File transfer handler.
///
/// Shared by all sessions. Holds no per-transfer state.
#[derive(Debug, Clone)]
pub struct TransferEngine {
    /// Storage tree for path resolution.
    storage: Arc<StorageNamespace>,
    /// Maximum file size allowed.
    max_file_size: u64,
}

impl TransferEngine {
    /// Create a new transfer engine.
    pub fn new(storage: Arc<StorageNamespace>, max_file_size: u64) -> Self {
        Self {
            storage,
            max_file_size,
        }
    }

    /// Largest upload accepted.
    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Store exactly `size` bytes from `source` as `category/name`.
    ///
    /// The size limit and both names are checked before any byte is read.
    /// The bytes go to a staging file which replaces the destination only
    /// after the last byte arrived, so readers never see a partial upload.
    /// If `source` ends early the staging file is removed and the error is
    /// [`TransferError::Connection`].
    ///
    /// Returns the number of bytes stored.
    pub async fn upload<R>(
        &self,
        identity: &Identity,
        category: &str,
        name: &str,
        size: u64,
        source: &mut R,
    ) -> Result<u64, TransferError>
    where
        R: AsyncRead + Unpin,
    {
        if size > self.max_file_size {
            return Err(TransferError::FileTooLarge {
                size,
                limit: self.max_file_size,
            });
        }

        let destination = self.storage.resolve(identity, category, name)?;
        let staging = self.storage.staging_path(identity)?;

        if let Some(parent) = staging.parent() {
            fs::create_dir_all(parent).await?;
        }

        let result = receive_into(&staging, size, source).await;
        if let Err(e) = result {
            if let Err(cleanup) = fs::remove_file(&staging).await {
                warn!(path = ?staging, error = %cleanup, "Failed to cleanup staging file after aborted upload");
            }
            return Err(e);
        }

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Atomic rename to destination
        if let Err(e) = fs::rename(&staging, &destination).await {
            if let Err(cleanup) = fs::remove_file(&staging).await {
                warn!(path = ?staging, error = %cleanup, "Failed to cleanup staging file after rename failure");
            }
            return Err(e.into());
        }

        debug!(user = %identity, path = ?destination, size, "Upload stored");
        Ok(size)
    }

    /// Read and drop exactly `size` bytes from `source`.
    pub async fn discard<R>(&self, size: u64, source: &mut R) -> Result<u64, TransferError>
    where
        R: AsyncRead + Unpin,
    {
        let mut limited = source.take(size);
        let copied = tokio::io::copy(&mut limited, &mut tokio::io::sink())
            .await
            .map_err(ProtocolError::from)?;

        if copied < size {
            return Err(ProtocolError::ConnectionClosed(format!(
                "stream ended after {} of {} discarded bytes",
                copied, size
            ))
            .into());
        }
        Ok(copied)
    }

    /// Open `category/name` for sending.
    ///
    /// Returns `None` for invalid names, missing files, and anything that is
    /// not a regular file.
    pub async fn open_download(
        &self,
        identity: &Identity,
        category: &str,
        name: &str,
    ) -> Option<DownloadSource> {
        let path = match self.storage.resolve(identity, category, name) {
            Ok(path) => path,
            Err(e) => {
                warn!(user = %identity, category, name, error = %e, "Rejected download request");
                return None;
            }
        };

        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?path, "Download target not found");
                return None;
            }
            Err(e) => {
                warn!(path = ?path, error = %e, "Failed to open download target");
                return None;
            }
        };

        let metadata = match file.metadata().await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => {
                debug!(path = ?path, "Download target is not a regular file");
                return None;
            }
            Err(e) => {
                warn!(path = ?path, error = %e, "Failed to stat download target");
                return None;
            }
        };

        Some(DownloadSource {
            file,
            len: metadata.len(),
            path,
        })
    }

    /// Write exactly `source.len()` bytes of the file to `sink`.
    ///
    /// Does not flush `sink`. If the file ends early the peer has already
    /// been promised more bytes than exist, so the caller must close the
    /// connection on [`TransferError::SourceTruncated`].
    pub async fn send_download<W>(
        &self,
        source: DownloadSource,
        sink: &mut W,
    ) -> Result<u64, TransferError>
    where
        W: AsyncWrite + Unpin,
    {
        let DownloadSource { mut file, len, path } = source;
        let mut buffer = vec![0u8; TRANSFER_CHUNK_SIZE];
        let mut sent = 0u64;

        while sent < len {
            let want = chunk_len(len - sent);
            let n = file.read(&mut buffer[..want]).await?;
            if n == 0 {
                warn!(path = ?path, expected = len, actual = sent, "File shrank during download");
                return Err(TransferError::SourceTruncated {
                    expected: len,
                    actual: sent,
                });
            }
            sink.write_all(&buffer[..n])
                .await
                .map_err(ProtocolError::from)?;
            sent += n as u64;
        }

        Ok(sent)
    }
}

fn chunk_len(remaining: u64) -> usize {
    remaining.min(TRANSFER_CHUNK_SIZE as u64) as usize
}

async fn receive_into<R>(staging: &Path, size: u64, source: &mut R) -> Result<(), TransferError>
where
    R: AsyncRead + Unpin,
{
    let mut file = File::create(staging).await?;
    let mut buffer = vec![0u8; TRANSFER_CHUNK_SIZE];
    let mut received = 0u64;

    while received < size {
        let want = chunk_len(size - received);
        let n = source
            .read(&mut buffer[..want])
            .await
            .map_err(ProtocolError::from)?;
        if n == 0 {
            return Err(ProtocolError::ConnectionClosed(format!(
                "stream ended after {} of {} upload bytes",
                received, size
            ))
            .into());
        }
        file.write_all(&buffer[..n]).await?;
        received += n as u64;
    }

    file.flush().await?;
    Ok(())
}
