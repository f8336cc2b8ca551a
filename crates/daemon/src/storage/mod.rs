//! Per-user file storage.
//!
//! Every user owns one directory under the storage root with a subdirectory
//! per [`FileCategory`](protocol::FileCategory):
//!
//! ```text
//! <root>/<username>/<category>/<filename>
//! <root>/<username>/.incoming/<staging files>
//! ```
//!
//! # Security
//!
//! Category and file names arrive from the network. [`StorageNamespace`]
//! checks both before building a path, so a resolved path always sits
//! exactly two levels below the user's directory and can never reach
//! another user's files.

pub mod namespace;

use std::path::PathBuf;

use thiserror::Error;

pub use namespace::{validate_file_name, StorageNamespace, MAX_FILE_NAME_LEN, STAGING_DIR};

/// Errors raised while mapping names to paths or touching the storage tree.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Category is not one of the fixed set.
    #[error("invalid category: {0:?}")]
    InvalidCategory(String),

    /// File name is empty, too long, hidden, or contains a separator.
    #[error("invalid file name: {0:?}")]
    InvalidFileName(String),

    /// Username cannot be used as a directory name.
    #[error("invalid username for storage: {0:?}")]
    InvalidUsername(String),

    /// Filesystem error.
    #[error("storage IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    /// True for errors caused by the names a client sent.
    ///
    /// These are rejected before any file is touched.
    pub fn is_invalid_name(&self) -> bool {
        matches!(
            self,
            StorageError::InvalidCategory(_) | StorageError::InvalidFileName(_)
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_invalid_name() {
        assert!(StorageError::InvalidCategory("png".into()).is_invalid_name());
        assert!(StorageError::InvalidFileName("..".into()).is_invalid_name());
        assert!(!StorageError::InvalidUsername("..".into()).is_invalid_name());
        let io = StorageError::io("/x", std::io::Error::other("boom"));
        assert!(!io.is_invalid_name());
        assert!(io.to_string().contains("/x"));
    }
}
