//! # FileDrive Client Library
//!
//! A client for the FileDrive daemon. [`DriveClient`] speaks the wire
//! protocol from the [`protocol`] crate over any async byte stream; the
//! `filedrive` binary wraps it in a command line interface.
//!
//! ## Example
//!
//! ```rust,no_run
//! use client::DriveClient;
//! use protocol::FileCategory;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), client::ClientError> {
//!     let mut drive = DriveClient::connect("127.0.0.1:12345").await?;
//!     drive.login("usuario1", "senha1").await?;
//!     drive.upload_bytes(FileCategory::Txt, "notes.txt", b"hello").await?;
//!     println!("{}", drive.list().await?);
//!     drive.exit().await?;
//!     Ok(())
//! }
//! ```

use std::io;
use std::path::{Path, PathBuf};

use protocol::{
    validate_file_name, Command, DownloadStatus, FileCategory, FramedStream, Listing, LoginReply,
    ProtocolError, PASSWORD_PROMPT, USERNAME_PROMPT,
};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

/// Prefix the client puts on downloaded file names.
pub const DOWNLOAD_PREFIX: &str = "downloaded_";

/// Most memory reserved up front for an in-memory download; the buffer grows
/// past this only as bytes actually arrive.
const DOWNLOAD_PREALLOC_LIMIT: u64 = 1024 * 1024;

/// Errors returned by [`DriveClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// Framing or connection failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The server answered `LOGIN_FALHOU`.
    #[error("login rejected by server")]
    LoginRejected,

    /// The file to upload does not exist. Nothing was sent.
    #[error("local file not found: {0}")]
    LocalFileNotFound(PathBuf),

    /// A file name that cannot be used locally or on the server.
    #[error("invalid file name: {0:?}")]
    InvalidFileName(String),

    /// Local file IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Convenience alias for client results.
pub type Result<T> = std::result::Result<T, ClientError>;

/// A connection to a FileDrive server.
pub struct DriveClient<S> {
    stream: FramedStream<S>,
}

impl DriveClient<TcpStream> {
    /// Connect over TCP.
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr).await.map_err(ProtocolError::from)?;
        stream.set_nodelay(true).map_err(ProtocolError::from)?;
        Ok(Self::new(stream))
    }
}

impl<S> DriveClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an established connection.
    pub fn new(stream: S) -> Self {
        Self {
            stream: FramedStream::new(stream),
        }
    }

    /// Answer both login prompts.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        self.expect(USERNAME_PROMPT).await?;
        self.stream.write_string(username).await?;
        self.stream.flush().await?;

        self.expect(PASSWORD_PROMPT).await?;
        self.stream.write_string(password).await?;
        self.stream.flush().await?;

        let reply = self.stream.read_string().await?;
        match LoginReply::from_token(&reply) {
            Some(LoginReply::Success) => {
                debug!(user = username, "Logged in");
                Ok(())
            }
            Some(LoginReply::Failed) => Err(ClientError::LoginRejected),
            None => Err(unexpected("login reply", reply)),
        }
    }

    /// Fetch the listing text exactly as the server sent it.
    pub async fn list(&mut self) -> Result<String> {
        self.send_command(Command::List).await?;
        Ok(self.stream.read_string().await?)
    }

    /// Fetch and parse the listing.
    pub async fn list_parsed(&mut self) -> Result<Listing> {
        let text = self.list().await?;
        Ok(Listing::parse(&text))
    }

    /// Upload `data` as `category/name`.
    ///
    /// Names the server would refuse fail with
    /// [`ClientError::InvalidFileName`] before anything is sent. Otherwise the
    /// server sends no reply; a problem shows up as an error on the next call
    /// or as a missing file in the next listing.
    pub async fn upload_bytes(
        &mut self,
        category: FileCategory,
        name: &str,
        data: &[u8],
    ) -> Result<()> {
        check_name(name)?;
        self.write_upload_header(category, name, data.len() as u64)
            .await?;
        self.stream.write_exactly(data).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Upload a local file under its own file name.
    ///
    /// Returns the number of bytes sent. Fails before anything is sent with
    /// [`ClientError::LocalFileNotFound`] if `path` is not a readable regular
    /// file, or with [`ClientError::InvalidFileName`] if the server would
    /// refuse the name.
    pub async fn upload_file(&mut self, category: FileCategory, path: &Path) -> Result<u64> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ClientError::InvalidFileName(path.display().to_string()))?
            .to_string();
        check_name(&name)?;

        let file = match File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ClientError::LocalFileNotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(ClientError::LocalFileNotFound(path.to_path_buf()));
        }
        let size = metadata.len();

        self.write_upload_header(category, &name, size).await?;

        let mut limited = file.take(size);
        let sent = tokio::io::copy(&mut limited, self.stream.get_mut())
            .await
            .map_err(ProtocolError::from)?;
        if sent < size {
            // The announced size can no longer be honored; the connection is unusable.
            return Err(ClientError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{} shrank during upload", path.display()),
            )));
        }
        self.stream.flush().await?;

        debug!(%category, %name, size, "Uploaded file");
        Ok(size)
    }

    /// Download `category/name` into memory.
    ///
    /// Returns `None` if the server reports the file as missing.
    pub async fn download_bytes(
        &mut self,
        category: FileCategory,
        name: &str,
    ) -> Result<Option<Vec<u8>>> {
        let Some(size) = self.request_download(category, name).await? else {
            return Ok(None);
        };

        let mut data = Vec::with_capacity(size.min(DOWNLOAD_PREALLOC_LIMIT) as usize);
        let received = self
            .stream
            .get_mut()
            .take(size)
            .read_to_end(&mut data)
            .await
            .map_err(ProtocolError::from)?;
        if (received as u64) < size {
            return Err(ProtocolError::ConnectionClosed(format!(
                "download ended after {} of {} bytes",
                received, size
            ))
            .into());
        }
        Ok(Some(data))
    }

    /// Download `category/name` to `dest_dir/downloaded_<name>`.
    ///
    /// Returns the path written, or `None` if the server reports the file as
    /// missing. A partial file is removed if the connection drops.
    pub async fn download(
        &mut self,
        category: FileCategory,
        name: &str,
        dest_dir: &Path,
    ) -> Result<Option<PathBuf>> {
        check_name(name)?;

        let Some(size) = self.request_download(category, name).await? else {
            return Ok(None);
        };

        let dest = dest_dir.join(format!("{}{}", DOWNLOAD_PREFIX, name));
        let mut file = File::create(&dest).await?;

        let mut limited = self.stream.get_mut().take(size);
        let received = match tokio::io::copy(&mut limited, &mut file).await {
            Ok(n) => n,
            Err(e) => {
                drop(file);
                remove_partial(&dest).await;
                return Err(ClientError::Io(e));
            }
        };
        if received < size {
            drop(file);
            remove_partial(&dest).await;
            return Err(ProtocolError::ConnectionClosed(format!(
                "download ended after {} of {} bytes",
                received, size
            ))
            .into());
        }
        file.flush().await?;

        debug!(%category, name, size, path = %dest.display(), "Downloaded file");
        Ok(Some(dest))
    }

    /// Send `EXIT` and close the connection.
    pub async fn exit(mut self) -> Result<()> {
        self.send_command(Command::Exit).await?;
        self.stream.shutdown().await?;
        Ok(())
    }

    /// Direct access to the framed connection, for requests this type does
    /// not model.
    pub fn stream_mut(&mut self) -> &mut FramedStream<S> {
        &mut self.stream
    }

    async fn send_command(&mut self, command: Command) -> Result<()> {
        self.stream.write_string(command.as_token()).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn write_upload_header(
        &mut self,
        category: FileCategory,
        name: &str,
        size: u64,
    ) -> Result<()> {
        self.stream.write_string(Command::Upload.as_token()).await?;
        self.stream.write_string(category.as_str()).await?;
        self.stream.write_string(name).await?;
        self.stream.write_length(size).await?;
        Ok(())
    }

    /// Send a download request; returns the announced size if found.
    async fn request_download(&mut self, category: FileCategory, name: &str) -> Result<Option<u64>> {
        self.stream.write_string(Command::Download.as_token()).await?;
        self.stream.write_string(category.as_str()).await?;
        self.stream.write_string(name).await?;
        self.stream.flush().await?;

        let status = self.stream.read_string().await?;
        match DownloadStatus::from_token(&status) {
            Some(DownloadStatus::Found) => Ok(Some(self.stream.read_length().await?)),
            Some(DownloadStatus::NotFound) => Ok(None),
            None => Err(unexpected("download status", status)),
        }
    }

    async fn expect(&mut self, expected: &str) -> Result<()> {
        let got = self.stream.read_string().await?;
        if got != expected {
            return Err(unexpected(expected, got));
        }
        Ok(())
    }
}

fn check_name(name: &str) -> Result<()> {
    if !validate_file_name(name) {
        return Err(ClientError::InvalidFileName(name.to_string()));
    }
    Ok(())
}

fn unexpected(expected: &str, got: String) -> ClientError {
    ProtocolError::UnexpectedReply {
        expected: expected.to_string(),
        got,
    }
    .into()
}

async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial download");
    }
}
