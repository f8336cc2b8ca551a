//! # FileDrive Daemon Library
//!
//! This crate provides the server side of FileDrive: authenticated users
//! upload, list and download files kept in per-user, per-category
//! directories.
//!
//! ## Overview
//!
//! The daemon is a TCP service. Each connection gets its own task running a
//! [`SessionController`], which walks the connection through login and then
//! serves commands one at a time.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          FileServer                          │
//! │                 accept loop, one task per peer               │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌─────────────────────────────────────────────────────────┐ │
//! │  │                  SessionController                      │ │
//! │  │     Unauthenticated ──▶ Authenticated ──▶ Closed        │ │
//! │  └─────────────────────────────────────────────────────────┘ │
//! │                                                              │
//! │  ┌───────────────┐  ┌──────────────────┐  ┌──────────────┐   │
//! │  │ Authenticator │  │ StorageNamespace │  │TransferEngine│   │
//! │  └───────────────┘  └──────────────────┘  └──────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use daemon::{Config, FileServer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!     config.validate()?;
//!
//!     let server = FileServer::from_config(&config).await?;
//!     let shutdown = server.shutdown_token();
//!
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         shutdown.cancel();
//!     });
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`auth`]: Credential checking
//! - [`storage`]: Per-user directory tree and name validation
//! - [`files`]: Upload and download streaming
//! - [`session`]: Per-connection state machine
//! - [`server`]: TCP accept loop

pub mod auth;
pub mod config;
pub mod files;
pub mod server;
pub mod session;
pub mod storage;

// Re-export protocol for convenience
pub use protocol;

// Re-export config types for convenience
pub use config::{Config, ConfigError};

// Re-export auth types for convenience
pub use auth::{AuthError, Authenticator, CredentialStore, Identity};

// Re-export storage and transfer types for convenience
pub use files::{DownloadSource, TransferEngine, TransferError};
pub use storage::{StorageError, StorageNamespace};

// Re-export session types for convenience
pub use session::{
    CloseReason, SessionContext, SessionController, SessionError, SessionState, SessionSummary,
};

// Re-export server types for convenience
pub use server::{FileServer, ServerError};
