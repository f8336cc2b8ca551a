//! Name validation and path resolution for the storage tree.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub use protocol::{validate_file_name, MAX_FILE_NAME_LEN};
use protocol::{FileCategory, Listing};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use super::StorageError;
use crate::auth::{validate_username, Identity};

/// Directory under each user's root that holds in-progress uploads.
pub const STAGING_DIR: &str = ".incoming";

/// Maps identities and names onto the directory tree under a root.
#[derive(Debug, Clone)]
pub struct StorageNamespace {
    root: PathBuf,
}

impl StorageNamespace {
    /// Create a namespace rooted at `root`. Nothing is created on disk yet.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The directory owned by `identity`.
    pub fn user_root(&self, identity: &Identity) -> Result<PathBuf, StorageError> {
        if !validate_username(identity.username()) {
            return Err(StorageError::InvalidUsername(identity.username().to_string()));
        }
        Ok(self.root.join(identity.username()))
    }

    /// Create the user's directory and every category directory.
    ///
    /// Safe to call on every login.
    pub async fn ensure(&self, identity: &Identity) -> Result<(), StorageError> {
        let user_root = self.user_root(identity)?;
        for category in FileCategory::ALL {
            let dir = user_root.join(category.as_str());
            fs::create_dir_all(&dir)
                .await
                .map_err(|e| StorageError::io(&dir, e))?;
        }
        debug!(user = %identity, root = %user_root.display(), "Storage ready");
        Ok(())
    }

    /// The user's files, grouped by category in [`FileCategory::ALL`] order.
    ///
    /// Within a category, files appear in directory enumeration order, which
    /// depends on the platform and is not sorted. Only regular files with
    /// names [`validate_file_name`] accepts are listed. A missing category
    /// directory lists as empty.
    pub async fn list(&self, identity: &Identity) -> Result<Listing, StorageError> {
        let user_root = self.user_root(identity)?;
        let mut listing = Listing::new();

        for category in FileCategory::ALL {
            let dir = user_root.join(category.as_str());
            let files = list_dir(&dir).await?;
            listing.push(category.as_str(), files);
        }

        Ok(listing)
    }

    /// Path of `filename` in `category` for `identity`.
    ///
    /// Both names are checked; nothing on disk is touched.
    pub fn resolve(
        &self,
        identity: &Identity,
        category: &str,
        filename: &str,
    ) -> Result<PathBuf, StorageError> {
        let category: FileCategory = category
            .parse()
            .map_err(|_| StorageError::InvalidCategory(category.to_string()))?;

        if !validate_file_name(filename) {
            return Err(StorageError::InvalidFileName(filename.to_string()));
        }

        Ok(self
            .user_root(identity)?
            .join(category.as_str())
            .join(filename))
    }

    /// A fresh, unique path for an in-progress upload.
    ///
    /// The parent directory may not exist yet.
    pub fn staging_path(&self, identity: &Identity) -> Result<PathBuf, StorageError> {
        Ok(self
            .user_root(identity)?
            .join(STAGING_DIR)
            .join(format!("{}.part", Uuid::new_v4())))
    }
}

async fn list_dir(dir: &Path) -> Result<Vec<String>, StorageError> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "Category directory missing, listing as empty");
            return Ok(Vec::new());
        }
        Err(e) => return Err(StorageError::io(dir, e)),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StorageError::io(dir, e))?
    {
        let file_type = match entry.file_type().await {
            Ok(t) => t,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        if !file_type.is_file() {
            continue;
        }

        match entry.file_name().into_string() {
            Ok(name) if validate_file_name(&name) => files.push(name),
            Ok(_) => {}
            Err(raw) => {
                debug!(name = ?raw, "Skipping file with non UTF-8 name");
            }
        }
    }

    Ok(files)
}
