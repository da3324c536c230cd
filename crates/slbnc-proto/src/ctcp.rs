//! CTCP (Client-to-Client Protocol) framing.
//!
//! CTCP payloads ride inside a PRIVMSG or NOTICE argument wrapped in SOH
//! (`\x01`) bytes: `\x01TAG body\x01`.
//!
//! ```
//! use slbnc_proto::ctcp;
//!
//! assert_eq!(
//!     ctcp::unwrap("\x01ACTION waves hello\x01"),
//!     Some(("ACTION".to_string(), "waves hello".to_string()))
//! );
//! assert_eq!(ctcp::wrap("ACTION", "dances"), "\x01ACTION dances\x01");
//! ```

/// The CTCP delimiter character.
pub const CTCP_DELIM: char = '\x01';

/// Split a SOH-framed argument into its upper-cased tag and trimmed body.
///
/// Returns `None` when the argument is not framed or the tag is empty.
pub fn unwrap(arg: &str) -> Option<(String, String)> {
    let inner = arg.strip_prefix(CTCP_DELIM)?.strip_suffix(CTCP_DELIM)?;
    let (tag, body) = inner.split_once(' ').unwrap_or((inner, ""));
    if tag.is_empty() || tag.contains(CTCP_DELIM) {
        return None;
    }
    Some((tag.to_ascii_uppercase(), body.trim().to_owned()))
}

/// Frame `body` as a CTCP payload with the given tag.
pub fn wrap(tag: &str, body: &str) -> String {
    if body.is_empty() {
        format!("{CTCP_DELIM}{tag}{CTCP_DELIM}")
    } else {
        format!("{CTCP_DELIM}{tag} {body}{CTCP_DELIM}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwrap_rejects_unframed() {
        assert_eq!(unwrap("ACTION hi"), None);
        assert_eq!(unwrap("\x01ACTION hi"), None);
        assert_eq!(unwrap("\x01\x01"), None);
        assert_eq!(unwrap("\x01"), None);
    }

    #[test]
    fn test_unwrap_trims_body() {
        assert_eq!(
            unwrap("\x01ping  12345 \x01"),
            Some(("PING".into(), "12345".into()))
        );
    }

    #[test]
    fn test_wrap_without_body() {
        assert_eq!(wrap("VERSION", ""), "\x01VERSION\x01");
    }
}
