//! Unified error handling for slbnc.
//!
//! Errors are grouped by how the bouncer reacts to them: connection-level
//! errors close one client, session-level errors drive a reconnect, and none
//! of them end the process.

use slbnc_proto::{MessageParseError, ProtocolError};
use thiserror::Error;

use crate::db::DbError;

/// Errors raised while serving a client connection or a session.
#[derive(Debug, Error)]
pub enum BouncerError {
    /// Unparseable wire input.
    #[error("malformed line: {0}")]
    MalformedLine(#[from] MessageParseError),

    /// Bad credentials.
    #[error("authentication failed for {0}")]
    AuthenticationFailed(String),

    /// The client asked for a network that does not exist for its account.
    #[error("unknown connection: {0}")]
    UnknownTarget(String),

    /// A CAP REQ named a capability we do not offer.
    #[error("capability rejected: {0}")]
    CapabilityRejected(String),

    /// Every resolved upstream address failed.
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    /// Backlog file failure.
    #[error("backlog io error: {0}")]
    BacklogIo(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] DbError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The session actor has shut down.
    #[error("session closed")]
    SessionClosed,

    #[error("internal error: {0}")]
    Internal(String),
}

pub type BouncerResult<T> = Result<T, BouncerError>;

impl BouncerError {
    /// Get a static error code string for log labeling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MalformedLine(_) => "malformed_line",
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::UnknownTarget(_) => "unknown_target",
            Self::CapabilityRejected(_) => "capability_rejected",
            Self::UpstreamUnreachable(_) => "upstream_unreachable",
            Self::BacklogIo(_) => "backlog_io",
            Self::Database(_) => "database",
            Self::Protocol(_) => "protocol",
            Self::SessionClosed => "session_closed",
            Self::Internal(_) => "internal_error",
        }
    }

    /// The reason shown to a client before its connection is closed.
    pub fn user_message(&self) -> String {
        match self {
            Self::AuthenticationFailed(user) => {
                format!("Unknown username: {user} or bad password.")
            }
            Self::UnknownTarget(network) => format!("Unknown connection: {network}"),
            Self::SessionClosed => "The IRC session was closed.".to_string(),
            other => format!("Internal error: {other}"),
        }
    }
}
