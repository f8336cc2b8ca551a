//! Protocol tokens and the structured values carried in string frames.
//!
//! Every token here travels as a single string frame. The literal values are
//! fixed by deployed clients and must not change.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Prompt sent before the username.
pub const USERNAME_PROMPT: &str = "Usuario:";

/// Prompt sent before the password.
pub const PASSWORD_PROMPT: &str = "Senha:";

/// Login accepted.
pub const LOGIN_SUCCESS: &str = "LOGIN_SUCESSO";

/// Login rejected; the server closes the connection after sending it.
pub const LOGIN_FAILED: &str = "LOGIN_FALHOU";

/// Download target exists; an int64 size and the file bytes follow.
pub const FILE_OK: &str = "ARQUIVO_OK";

/// Download target does not exist; nothing follows.
pub const FILE_NOT_FOUND: &str = "ARQUIVO_NAO_ENCONTRADO";

/// Reply to an unrecognized command token.
pub const INVALID_COMMAND: &str = "Comando inválido";

/// Longest file name accepted, in bytes.
pub const MAX_FILE_NAME_LEN: usize = 255;

/// Whether a file name may be stored and listed.
///
/// Rejects empty names, names over [`MAX_FILE_NAME_LEN`] bytes, `/`, `\`,
/// control characters (NUL and line breaks included), and anything starting
/// with `.` (which covers `.` and `..`).
pub fn validate_file_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_FILE_NAME_LEN
        && !name.starts_with('.')
        && !name.contains(['/', '\\'])
        && !name.chars().any(char::is_control)
}

/// Commands a client may send once logged in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Request the file listing.
    List,
    /// Store a file: category, name, size, then the bytes.
    Upload,
    /// Fetch a file: category, name.
    Download,
    /// End the session.
    Exit,
}

impl Command {
    /// All commands, in protocol order.
    pub const ALL: [Command; 4] = [
        Command::List,
        Command::Upload,
        Command::Download,
        Command::Exit,
    ];

    /// The wire token for this command.
    pub fn as_token(self) -> &'static str {
        match self {
            Command::List => "LIST",
            Command::Upload => "UPLOAD",
            Command::Download => "DOWNLOAD",
            Command::Exit => "EXIT",
        }
    }

    /// Parse a wire token. Matching is exact and case-sensitive.
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_token() == token)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_token())
    }
}

/// Outcome of a login exchange as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginReply {
    /// Credentials accepted.
    Success,
    /// Credentials rejected.
    Failed,
}

impl LoginReply {
    /// The wire token for this reply.
    pub fn as_token(self) -> &'static str {
        match self {
            LoginReply::Success => LOGIN_SUCCESS,
            LoginReply::Failed => LOGIN_FAILED,
        }
    }

    /// Parse a wire token.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            LOGIN_SUCCESS => Some(LoginReply::Success),
            LOGIN_FAILED => Some(LoginReply::Failed),
            _ => None,
        }
    }
}

/// Status preceding a download body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    /// Size and bytes follow.
    Found,
    /// Nothing follows.
    NotFound,
}

impl DownloadStatus {
    /// The wire token for this status.
    pub fn as_token(self) -> &'static str {
        match self {
            DownloadStatus::Found => FILE_OK,
            DownloadStatus::NotFound => FILE_NOT_FOUND,
        }
    }

    /// Parse a wire token.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            FILE_OK => Some(DownloadStatus::Found),
            FILE_NOT_FOUND => Some(DownloadStatus::NotFound),
            _ => None,
        }
    }
}

/// The fixed set of file categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    /// PDF documents.
    Pdf,
    /// JPEG images.
    Jpg,
    /// Plain text.
    Txt,
}

impl FileCategory {
    /// All categories, in listing order.
    pub const ALL: [FileCategory; 3] = [FileCategory::Pdf, FileCategory::Jpg, FileCategory::Txt];

    /// Directory and wire name of the category.
    pub fn as_str(self) -> &'static str {
        match self {
            FileCategory::Pdf => "pdf",
            FileCategory::Jpg => "jpg",
            FileCategory::Txt => "txt",
        }
    }
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not one of the fixed categories.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown file category: {0:?} (expected pdf, jpg or txt)")]
pub struct UnknownCategory(pub String);

impl FromStr for FileCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// One category's files within a [`Listing`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingSection {
    /// Category name as it appears on the wire.
    pub category: String,
    /// File names, in the order the server enumerated them.
    pub files: Vec<String>,
}

/// A user's files grouped by category.
///
/// Renders to the single string sent in reply to `LIST`:
///
/// ```text
/// pdf:
/// jpg:
/// txt:
///  - a.txt
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    /// Sections in display order.
    pub sections: Vec<ListingSection>,
}

impl Listing {
    /// Create an empty listing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a section.
    pub fn push(&mut self, category: impl Into<String>, files: Vec<String>) {
        self.sections.push(ListingSection {
            category: category.into(),
            files,
        });
    }

    /// Files of one category, if the section is present.
    pub fn files(&self, category: &str) -> Option<&[String]> {
        self.sections
            .iter()
            .find(|s| s.category == category)
            .map(|s| s.files.as_slice())
    }

    /// Total number of files across all sections.
    pub fn file_count(&self) -> usize {
        self.sections.iter().map(|s| s.files.len()).sum()
    }

    /// Render to the wire text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            out.push_str(&section.category);
            out.push_str(":\n");
            for file in &section.files {
                out.push_str(" - ");
                out.push_str(file);
                out.push('\n');
            }
        }
        out
    }

    /// Parse the wire text back into sections.
    ///
    /// Lines that are neither a header nor an entry are ignored; an entry
    /// before any header is dropped.
    pub fn parse(text: &str) -> Self {
        let mut listing = Listing::new();
        for line in text.lines() {
            if let Some(file) = line.strip_prefix(" - ") {
                if let Some(section) = listing.sections.last_mut() {
                    section.files.push(file.to_string());
                }
            } else if let Some(category) = line.strip_suffix(':') {
                listing.push(category, Vec::new());
            }
        }
        listing
    }
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
