//! # FileDrive Protocol Library
//!
//! This crate defines the wire protocol spoken between the FileDrive daemon
//! and its clients.
//!
//! ## Overview
//!
//! The protocol is sequential and stateful. Nothing on the wire says what kind
//! of unit comes next; both sides track the session state instead:
//!
//! ```text
//! server: "Usuario:"         client: <username>
//! server: "Senha:"           client: <password>
//! server: "LOGIN_SUCESSO" | "LOGIN_FALHOU"
//!
//! client: "LIST"                                  server: <listing>
//! client: "UPLOAD" <cat> <name> <i64 n> <n bytes> server: (nothing)
//! client: "DOWNLOAD" <cat> <name>                 server: "ARQUIVO_OK" <i64 n> <n bytes>
//!                                                      | "ARQUIVO_NAO_ENCONTRADO"
//! client: "EXIT"                                  server: closes
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{Command, FrameCodec};
//!
//! let codec = FrameCodec::new();
//! let bytes = codec.encode_string(Command::List.as_token()).unwrap();
//! let (token, _) = codec.decode_string(&bytes).unwrap();
//! assert_eq!(Command::from_token(&token), Some(Command::List));
//! ```
//!
//! ## Modules
//!
//! - [`framing`]: string/int64/raw-run codec and the framed stream
//! - [`messages`]: protocol tokens, categories and listings
//! - [`error`]: Error types

pub mod error;
pub mod framing;
pub mod messages;

pub use error::{ProtocolError, Result};
pub use framing::{
    validate_length, FrameCodec, FramedStream, INT64_SIZE, MAX_STRING_LEN, STRING_PREFIX_SIZE,
    TRANSFER_CHUNK_SIZE,
};
pub use messages::{
    validate_file_name, Command, DownloadStatus, FileCategory, Listing, ListingSection, LoginReply,
    UnknownCategory, FILE_NOT_FOUND, FILE_OK, INVALID_COMMAND, LOGIN_FAILED, LOGIN_SUCCESS,
    MAX_FILE_NAME_LEN, PASSWORD_PROMPT, USERNAME_PROMPT,
};
