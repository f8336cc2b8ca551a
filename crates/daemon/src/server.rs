//! TCP listener that hands each connection to its own session task.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::Config;
use crate::session::{CloseReason, SessionContext, SessionController};

/// Errors raised by the listener itself. Session failures never surface here.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Socket error outside of any session.
    #[error("server IO error: {0}")]
    Io(#[from] io::Error),
}

/// Accepts connections and runs one [`SessionController`] per connection.
pub struct FileServer {
    listener: TcpListener,
    ctx: SessionContext,
    /// Bounds concurrent sessions when set.
    limit: Option<Arc<Semaphore>>,
    shutdown_token: CancellationToken,
}

impl FileServer {
    /// Bind to `addr`.
    ///
    /// `max_connections` of 0 means no limit.
    pub async fn bind(
        addr: SocketAddr,
        ctx: SessionContext,
        max_connections: usize,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        let limit = (max_connections > 0).then(|| Arc::new(Semaphore::new(max_connections)));

        info!(
            addr = %listener.local_addr()?,
            max_connections,
            "File server bound"
        );

        Ok(Self {
            listener,
            ctx,
            limit,
            shutdown_token: CancellationToken::new(),
        })
    }

    /// Bind using the `[server]`, `[storage]` and `[auth]` sections.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let ctx = SessionContext::from_config(config)?;
        let addr = config.bind_addr()?;
        Ok(Self::bind(addr, ctx, config.server.max_connections).await?)
    }

    /// The address actually bound, useful when binding port 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Token that stops the accept loop when cancelled.
    ///
    /// Sessions already running are not interrupted.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Accept connections until the shutdown token is cancelled.
    ///
    /// A failed accept is logged and the loop keeps going.
    pub async fn run(self) -> Result<(), ServerError> {
        let Self {
            listener,
            ctx,
            limit,
            shutdown_token,
        } = self;

        loop {
            let permit = match &limit {
                Some(semaphore) => {
                    tokio::select! {
                        _ = shutdown_token.cancelled() => break,
                        permit = Arc::clone(semaphore).acquire_owned() => match permit {
                            Ok(permit) => Some(permit),
                            // Only happens if the semaphore is closed
                            Err(_) => break,
                        },
                    }
                }
                None => None,
            };

            let (stream, peer) = tokio::select! {
                _ = shutdown_token.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                        continue;
                    }
                },
            };

            if let Err(e) = stream.set_nodelay(true) {
                debug!(%peer, error = %e, "Failed to set TCP_NODELAY");
            }

            let controller = SessionController::new(stream, ctx.clone());
            let span = info_span!("session", %peer);

            tokio::spawn(
                async move {
                    info!("Connection accepted");
                    let summary = controller.run().await;
                    let user = summary
                        .identity
                        .as_ref()
                        .map(|i| i.username().to_string())
                        .unwrap_or_default();
                    match summary.close_reason {
                        CloseReason::Exit | CloseReason::LoginFailed | CloseReason::Disconnected => {
                            info!(
                                %user,
                                commands = summary.commands,
                                bytes_received = summary.bytes_received,
                                bytes_sent = summary.bytes_sent,
                                reason = %summary.close_reason,
                                "Connection closed"
                            );
                        }
                        _ => {
                            warn!(
                                %user,
                                commands = summary.commands,
                                bytes_received = summary.bytes_received,
                                bytes_sent = summary.bytes_sent,
                                reason = %summary.close_reason,
                                "Connection closed abnormally"
                            );
                        }
                    }
                    drop(permit);
                }
                .instrument(span),
            );
        }

        info!("File server stopped accepting connections");
        Ok(())
    }
}
