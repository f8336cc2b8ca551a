//! Credential checking for incoming sessions.
//!
//! Sessions hold an `Arc<dyn Authenticator>` so the credential source can be
//! swapped without touching the session logic. [`CredentialStore`] is the
//! implementation the daemon ships with.

pub mod store;

use std::fmt;

use thiserror::Error;

pub use store::CredentialStore;

/// Reasons a login is refused.
///
/// Both variants are reported to the client the same way; they differ only
/// in the server log.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// No such username.
    #[error("unknown user: {0}")]
    UnknownUser(String),

    /// Username exists but the password does not match.
    #[error("bad password for user: {0}")]
    BadPassword(String),
}

/// An authenticated user.
///
/// Sessions only obtain one from an [`Authenticator`], so a session holding
/// one has completed a login.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    username: String,
}

impl Identity {
    /// Create an identity for `username`. Meant for [`Authenticator`]
    /// implementations.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }

    /// The login name. Also the user's directory under the storage root.
    pub fn username(&self) -> &str {
        &self.username
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.username)
    }
}

/// Decides whether a username/password pair may log in.
///
/// Matching is exact and case-sensitive on both fields. Implementations
/// must not have side effects visible to the session.
pub trait Authenticator: Send + Sync {
    /// Check a credential pair.
    fn authenticate(&self, username: &str, password: &str) -> Result<Identity, AuthError>;
}

/// Whether `name` is safe to use as a directory name under the storage root.
///
/// Rejects empty names, path separators, NUL and a leading `.`.
pub fn validate_username(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0'])
}
