//! Session handling.
//!
//! One [`SessionController`] runs per accepted connection. It prompts for
//! credentials, then serves `LIST`, `UPLOAD`, `DOWNLOAD` and `EXIT` until the
//! client leaves or the connection fails, and finally returns a
//! [`SessionSummary`].

pub mod controller;
pub mod state;

pub use controller::{SessionContext, SessionController, SessionError};
pub use state::{CloseReason, SessionState, SessionSummary};
