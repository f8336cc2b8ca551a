//! Session states and the record a finished session leaves behind.

use std::fmt;

use crate::auth::Identity;

/// Where a session is in its lifecycle.
///
/// ```text
/// Unauthenticated ──login ok──▶ Authenticated ──EXIT / error──▶ Closed
///        │                                                        ▲
///        └──────────────login failed / error──────────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for credentials.
    Unauthenticated,
    /// Logged in; commands are accepted.
    Authenticated { identity: Identity },
    /// Terminal. The connection is released.
    Closed,
}

impl SessionState {
    /// Whether moving from `self` to `next` is a legal edge.
    pub fn can_transition_to(&self, next: &SessionState) -> bool {
        matches!(
            (self, next),
            (SessionState::Unauthenticated, SessionState::Authenticated { .. })
                | (SessionState::Unauthenticated, SessionState::Closed)
                | (SessionState::Authenticated { .. }, SessionState::Closed)
        )
    }

    /// The logged in user, if any.
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            SessionState::Authenticated { identity } => Some(identity),
            _ => None,
        }
    }

    /// True once the session has ended.
    pub fn is_closed(&self) -> bool {
        matches!(self, SessionState::Closed)
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Unauthenticated => "unauthenticated",
            SessionState::Authenticated { .. } => "authenticated",
            SessionState::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The client sent `EXIT`.
    Exit,
    /// Credentials were rejected.
    LoginFailed,
    /// The peer went away or the connection broke.
    Disconnected,
    /// The peer sent something the protocol does not allow.
    ProtocolViolation(String),
    /// A server-side failure, such as a storage error.
    Failed(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Exit => f.write_str("client exit"),
            CloseReason::LoginFailed => f.write_str("login failed"),
            CloseReason::Disconnected => f.write_str("disconnected"),
            CloseReason::ProtocolViolation(msg) => write!(f, "protocol violation: {}", msg),
            CloseReason::Failed(msg) => write!(f, "failed: {}", msg),
        }
    }
}

/// What a session did, returned once it reaches [`SessionState::Closed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    /// The user, if login succeeded.
    pub identity: Option<Identity>,
    /// Command tokens read after login, including unrecognized ones.
    pub commands: u64,
    /// Upload payload bytes read, including discarded ones.
    pub bytes_received: u64,
    /// Download payload bytes written.
    pub bytes_sent: u64,
    /// Why the session ended.
    pub close_reason: CloseReason,
}
