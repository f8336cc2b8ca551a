//! Per-connection protocol driver.

use std::sync::Arc;

use protocol::{
    Command, DownloadStatus, FramedStream, LoginReply, ProtocolError, INVALID_COMMAND,
    PASSWORD_PROMPT, USERNAME_PROMPT,
};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use super::state::{CloseReason, SessionState, SessionSummary};
use crate::auth::{AuthError, Authenticator, CredentialStore, Identity};
use crate::config::Config;
use crate::files::{TransferEngine, TransferError};
use crate::storage::{StorageError, StorageNamespace};

/// Errors that end a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Framing or connection failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Upload or download failure.
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// Storage tree failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SessionError {
    /// Map the error onto the reason recorded in the summary.
    pub fn close_reason(&self) -> CloseReason {
        match self {
            SessionError::Protocol(e) | SessionError::Transfer(TransferError::Connection(e)) => {
                if e.is_connection_error() {
                    CloseReason::Disconnected
                } else {
                    CloseReason::ProtocolViolation(e.to_string())
                }
            }
            SessionError::Transfer(e @ TransferError::FileTooLarge { .. }) => {
                CloseReason::ProtocolViolation(e.to_string())
            }
            other => CloseReason::Failed(other.to_string()),
        }
    }
}

/// Shared services every session uses.
///
/// Cloning is cheap; all members are reference counted and read-only.
#[derive(Clone)]
pub struct SessionContext {
    /// Credential check.
    pub authenticator: Arc<dyn Authenticator>,
    /// Storage tree.
    pub storage: Arc<StorageNamespace>,
    /// Upload and download engine.
    pub transfer: Arc<TransferEngine>,
}

impl SessionContext {
    /// Assemble a context around an authenticator and a storage root.
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        storage: Arc<StorageNamespace>,
        max_file_size: u64,
    ) -> Self {
        let transfer = Arc::new(TransferEngine::new(Arc::clone(&storage), max_file_size));
        Self {
            authenticator,
            storage,
            transfer,
        }
    }

    /// Build the context described by a validated configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store = CredentialStore::from_config(&config.auth)?;
        if store.is_empty() {
            warn!("No users configured; every login will fail");
        }
        let storage = Arc::new(StorageNamespace::new(&config.storage.root));
        Ok(Self::new(Arc::new(store), storage, config.storage.max_size))
    }
}

/// Drives one connection from the login prompt to close.
///
/// Commands are handled strictly one at a time; the next token is not read
/// until the previous reply has been flushed.
pub struct SessionController<S> {
    stream: FramedStream<S>,
    ctx: SessionContext,
    state: SessionState,
    commands: u64,
    bytes_received: u64,
    bytes_sent: u64,
}

impl<S> SessionController<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a controller for a freshly accepted connection.
    pub fn new(stream: S, ctx: SessionContext) -> Self {
        Self {
            stream: FramedStream::new(stream),
            ctx,
            state: SessionState::Unauthenticated,
            commands: 0,
            bytes_received: 0,
            bytes_sent: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Run the session to completion and release the connection.
    pub async fn run(mut self) -> SessionSummary {
        let close_reason = match self.drive().await {
            Ok(reason) => reason,
            Err(e) => {
                let reason = e.close_reason();
                match &reason {
                    CloseReason::Disconnected => debug!(error = %e, "Connection lost"),
                    _ => warn!(error = %e, "Session aborted"),
                }
                reason
            }
        };

        let identity = self.state.identity().cloned();
        self.transition(SessionState::Closed);

        if let Err(e) = self.stream.shutdown().await {
            debug!(error = %e, "Shutdown after close failed");
        }

        SessionSummary {
            identity,
            commands: self.commands,
            bytes_received: self.bytes_received,
            bytes_sent: self.bytes_sent,
            close_reason,
        }
    }

    async fn drive(&mut self) -> Result<CloseReason, SessionError> {
        let identity = match self.login().await? {
            Some(identity) => identity,
            None => return Ok(CloseReason::LoginFailed),
        };

        loop {
            let token = self.stream.read_string().await?;
            self.commands += 1;

            match Command::from_token(&token) {
                Some(Command::List) => self.handle_list(&identity).await?,
                Some(Command::Upload) => self.handle_upload(&identity).await?,
                Some(Command::Download) => self.handle_download(&identity).await?,
                Some(Command::Exit) => {
                    debug!(user = %identity, "EXIT");
                    return Ok(CloseReason::Exit);
                }
                None => {
                    warn!(user = %identity, command = %token, "Invalid command");
                    self.stream.write_string(INVALID_COMMAND).await?;
                    self.stream.flush().await?;
                }
            }
        }
    }

    async fn login(&mut self) -> Result<Option<Identity>, SessionError> {
        self.stream.write_string(USERNAME_PROMPT).await?;
        self.stream.flush().await?;
        let username = self.stream.read_string().await?;

        self.stream.write_string(PASSWORD_PROMPT).await?;
        self.stream.flush().await?;
        let password = self.stream.read_string().await?;

        match self.ctx.authenticator.authenticate(&username, &password) {
            Ok(identity) => {
                self.ctx.storage.ensure(&identity).await?;
                self.stream.write_string(LoginReply::Success.as_token()).await?;
                self.stream.flush().await?;

                info!(user = %identity, "Login succeeded");
                self.transition(SessionState::Authenticated {
                    identity: identity.clone(),
                });
                Ok(Some(identity))
            }
            Err(e) => {
                match e {
                    AuthError::UnknownUser(_) => {
                        warn!(user = %username, "Login failed: unknown user")
                    }
                    AuthError::BadPassword(_) => {
                        warn!(user = %username, "Login failed: bad password")
                    }
                }
                self.stream.write_string(LoginReply::Failed.as_token()).await?;
                self.stream.flush().await?;
                Ok(None)
            }
        }
    }

    async fn handle_list(&mut self, identity: &Identity) -> Result<(), SessionError> {
        let listing = self.ctx.storage.list(identity).await?;
        debug!(user = %identity, files = listing.file_count(), "LIST");

        self.stream.write_string(&listing.render()).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn handle_upload(&mut self, identity: &Identity) -> Result<(), SessionError> {
        let category = self.stream.read_string().await?;
        let name = self.stream.read_string().await?;
        let size = self.stream.read_length().await?;
        debug!(user = %identity, %category, %name, size, "UPLOAD");

        let result = self
            .ctx
            .transfer
            .upload(identity, &category, &name, size, self.stream.get_mut())
            .await;

        match result {
            Ok(stored) => {
                self.bytes_received += stored;
                info!(user = %identity, %category, %name, size, "File uploaded");
                Ok(())
            }
            Err(e) if e.is_rejected_name() => {
                warn!(user = %identity, %category, %name, size, error = %e, "Upload rejected, discarding payload");
                let dropped = self.ctx.transfer.discard(size, self.stream.get_mut()).await?;
                self.bytes_received += dropped;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn handle_download(&mut self, identity: &Identity) -> Result<(), SessionError> {
        let category = self.stream.read_string().await?;
        let name = self.stream.read_string().await?;
        debug!(user = %identity, %category, %name, "DOWNLOAD");

        match self.ctx.transfer.open_download(identity, &category, &name).await {
            Some(source) => {
                let size = source.len();
                self.stream.write_string(DownloadStatus::Found.as_token()).await?;
                self.stream.write_length(size).await?;
                let sent = self
                    .ctx
                    .transfer
                    .send_download(source, self.stream.get_mut())
                    .await?;
                self.stream.flush().await?;

                self.bytes_sent += sent;
                info!(user = %identity, %category, %name, size, "File downloaded");
            }
            None => {
                self.stream
                    .write_string(DownloadStatus::NotFound.as_token())
                    .await?;
                self.stream.flush().await?;
            }
        }
        Ok(())
    }

    fn transition(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_transition_to(&next),
            "illegal session transition {} -> {}",
            self.state,
            next
        );
        debug!(from = self.state.name(), to = next.name(), "Session state change");
        self.state = next;
    }
}
