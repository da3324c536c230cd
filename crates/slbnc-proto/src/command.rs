//! Client-style command shorthand, as typed into an IRC client's input box.
//!
//! Stored at-connect commands are written this way (`/msg NickServ identify
//! hunter2`, `/join #rust`), so they need translating into wire form before
//! they can be sent upstream.

use crate::error::MessageParseError;
use crate::message::Message;

/// Translate `/cmd args` into a [`Message`]. `/msg target text` becomes
/// `PRIVMSG target :text`; anything else is parsed as a raw line with the
/// slash removed. A line without a leading slash is parsed as-is.
pub fn parse_client_command(line: &str) -> Result<Message, MessageParseError> {
    let line = line.trim();
    let Some(body) = line.strip_prefix('/') else {
        return line.parse();
    };

    let (cmd, rest) = body.split_once(' ').unwrap_or((body, ""));
    if cmd.eq_ignore_ascii_case("msg") {
        let (target, text) = rest.trim_start().split_once(' ').unwrap_or((rest, ""));
        if target.is_empty() {
            return Err(MessageParseError::MissingCommand(line.to_owned()));
        }
        return Ok(Message::privmsg(target, text));
    }

    body.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msg_shorthand() {
        let msg = parse_client_command("/msg NickServ identify hunter2").unwrap();
        assert_eq!(msg.to_string(), "PRIVMSG NickServ :identify hunter2");
    }

    #[test]
    fn test_other_shorthand() {
        let msg = parse_client_command("/nick x").unwrap();
        assert_eq!(msg.command, "NICK");
        assert_eq!(msg.args, vec!["x"]);

        let msg = parse_client_command("/join #rust").unwrap();
        assert_eq!(msg.to_string(), "JOIN #rust");
    }

    #[test]
    fn test_raw_line() {
        let msg = parse_client_command("MODE me +i").unwrap();
        assert_eq!(msg.args, vec!["me", "+i"]);
    }

    #[test]
    fn test_msg_without_target() {
        assert!(parse_client_command("/msg").is_err());
        assert!(parse_client_command("/").is_err());
    }
}
