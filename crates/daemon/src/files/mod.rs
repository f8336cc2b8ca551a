//! File transfer between connections and the storage tree.
//!
//! This module provides:
//! - Streaming uploads into staging files with atomic rename
//! - Downloads that send exactly the length announced to the peer
//! - Draining of rejected uploads
//!
//! Path validation lives in [`crate::storage`]; every transfer resolves its
//! target through a [`StorageNamespace`](crate::storage::StorageNamespace).

pub mod transfer;

pub use transfer::{DownloadSource, TransferEngine, TransferError};
