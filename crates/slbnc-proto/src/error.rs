//! Error types for IRC line handling.

use thiserror::Error;

/// Convenience type alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Transport-level errors. Any of these ends the stream they occurred on.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// I/O error during reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors encountered when parsing a single IRC line.
///
/// These never end a stream: the codec hands them out per line so the
/// connection can decide whether to skip the line or give up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum MessageParseError {
    /// The line was empty (or only a line terminator).
    #[error("empty message")]
    EmptyMessage,

    /// No command followed the tags/prefix.
    #[error("missing command in {0:?}")]
    MissingCommand(String),

    /// A tags section was not followed by anything.
    #[error("unterminated tags section")]
    UnterminatedTags,

    /// A line exceeded the configured maximum length and was dropped.
    #[error("message too long: {actual} bytes (limit: {limit})")]
    MessageTooLong {
        /// Length of the dropped line.
        actual: usize,
        /// Maximum allowed length.
        limit: usize,
    },
}
