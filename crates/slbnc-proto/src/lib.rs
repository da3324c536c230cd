//! # slbnc-proto
//!
//! IRC line handling for the slbnc bouncer.
//!
//! A bouncer mostly relays lines it does not need to understand, so the
//! message model here is deliberately loose: a command string and a list of
//! arguments, plus the handful of things a bouncer does care about (tags,
//! prefix, CTCP framing).
//!
//! ```rust
//! use slbnc_proto::Message;
//!
//! let msg: Message = ":nick!user@host PRIVMSG #rust :\x01ACTION waves\x01".parse().unwrap();
//! assert_eq!(msg.command, "PRIVMSG");
//! assert!(msg.is_action());
//! assert_eq!(msg.args, vec!["#rust", "waves"]);
//! assert_eq!(msg.to_string(), ":nick!user@host PRIVMSG #rust :\x01ACTION waves\x01");
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod command;
pub mod ctcp;
pub mod error;
pub mod message;
pub mod numeric;

#[cfg(feature = "tokio")]
pub mod irc;
#[cfg(feature = "tokio")]
pub mod line;

pub use self::command::parse_client_command;
pub use self::error::{MessageParseError, ProtocolError};
pub use self::message::{Message, Tag};

#[cfg(feature = "tokio")]
pub use self::irc::IrcCodec;
#[cfg(feature = "tokio")]
pub use self::line::LineCodec;
