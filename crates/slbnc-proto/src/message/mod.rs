//! The canonical IRC message type.

mod parse;
mod replay;
mod serialize;
pub mod tags;

pub use self::replay::{format_server_time, is_channel};

/// An IRCv3 message tag: key and optional value.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Tag(pub String, pub Option<String>);

/// A single IRC line.
///
/// The trailing argument is stored as the last element of `args`. When the
/// last argument carries a CTCP payload, the SOH framing and the CTCP tag are
/// removed from it and the tag is kept in `ctcp`.
#[derive(Clone, Debug, Default)]
pub struct Message {
    /// IRCv3 message tags, in wire order.
    pub tags: Vec<Tag>,
    /// Source of the message, without the leading `:`.
    pub prefix: Option<String>,
    /// Upper-cased command or three-digit numeric.
    pub command: String,
    /// Arguments, trailing argument last.
    pub args: Vec<String>,
    /// Upper-cased CTCP tag (`ACTION`, `VERSION`, ...) if the last argument
    /// was SOH-framed.
    pub ctcp: Option<String>,
    /// Whether the last argument was written with a `:` marker. Only affects
    /// serialization; two messages differing only here compare equal.
    pub trailing: bool,
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.tags == other.tags
            && self.prefix == other.prefix
            && self.command == other.command
            && self.args == other.args
            && self.ctcp == other.ctcp
    }
}

impl Eq for Message {}

impl Message {
    /// Create a message from a command and its arguments.
    pub fn new<I, S>(command: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.to_ascii_uppercase(),
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// `PRIVMSG target :text`
    pub fn privmsg(target: &str, text: &str) -> Self {
        let mut msg = Self::new("PRIVMSG", [target, text]);
        msg.trailing = true;
        msg
    }

    /// `NOTICE target :text`
    pub fn notice(target: &str, text: &str) -> Self {
        let mut msg = Self::new("NOTICE", [target, text]);
        msg.trailing = true;
        msg
    }

    /// Builder: set the prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Builder: force the last argument into trailing position.
    pub fn with_trailing(mut self) -> Self {
        self.trailing = true;
        self
    }

    /// Builder: set a CTCP tag on the last argument.
    pub fn with_ctcp(mut self, tag: &str) -> Self {
        self.ctcp = Some(tag.to_ascii_uppercase());
        self
    }

    /// Builder: add or replace a tag.
    pub fn with_tag(mut self, key: &str, value: Option<&str>) -> Self {
        self.set_tag(key, value);
        self
    }

    /// Add or replace a tag, keeping the position of an existing key.
    pub fn set_tag(&mut self, key: &str, value: Option<&str>) {
        let value = value.map(str::to_owned);
        match self.tags.iter_mut().find(|t| t.0 == key) {
            Some(tag) => tag.1 = value,
            None => self.tags.push(Tag(key.to_owned(), value)),
        }
    }

    /// Look up a tag. `Some(None)` means the tag is present without a value.
    pub fn tag(&self, key: &str) -> Option<Option<&str>> {
        self.tags
            .iter()
            .find(|t| t.0 == key)
            .map(|t| t.1.as_deref())
    }

    /// Remove every tag.
    pub fn strip_tags(&mut self) {
        self.tags.clear();
    }

    /// Argument at `idx`.
    pub fn arg(&self, idx: usize) -> Option<&str> {
        self.args.get(idx).map(String::as_str)
    }

    /// The last argument (the trailing one, when present).
    pub fn last_arg(&self) -> Option<&str> {
        self.args.last().map(String::as_str)
    }

    /// Whether the last argument carried a CTCP payload.
    pub fn is_ctcp(&self) -> bool {
        self.ctcp.is_some()
    }

    /// Whether this is a CTCP ACTION (`/me`).
    pub fn is_action(&self) -> bool {
        self.ctcp.as_deref() == Some("ACTION")
    }

    /// The command as a numeric reply code, if it is one.
    pub fn numeric(&self) -> Option<u16> {
        if self.command.len() == 3 && self.command.bytes().all(|b| b.is_ascii_digit()) {
            self.command.parse().ok()
        } else {
            None
        }
    }

    /// Whether the command matches `cmd`, ignoring case.
    pub fn is(&self, cmd: &str) -> bool {
        self.command.eq_ignore_ascii_case(cmd)
    }

    /// The nick portion of the prefix: everything before the first `!`,
    /// `~` or `@`.
    pub fn target_user(&self) -> Option<&str> {
        self.prefix
            .as_deref()
            .map(|p| p.split(['!', '~', '@']).next().unwrap_or(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_user() {
        let msg = Message::new("PRIVMSG", ["me", "hi"]).with_prefix("dude!~user@host");
        assert_eq!(msg.target_user(), Some("dude"));

        let msg = Message::new("PRIVMSG", ["me", "hi"]).with_prefix("irc.example.net");
        assert_eq!(msg.target_user(), Some("irc.example.net"));

        assert_eq!(Message::new("PING", ["x"]).target_user(), None);
    }

    #[test]
    fn test_set_tag_replaces_in_place() {
        let mut msg = Message::new("PING", ["x"])
            .with_tag("a", Some("1"))
            .with_tag("b", None);
        msg.set_tag("a", Some("2"));
        assert_eq!(msg.tags, vec![Tag("a".into(), Some("2".into())), Tag("b".into(), None)]);
        assert_eq!(msg.tag("b"), Some(None));
        assert_eq!(msg.tag("c"), None);
    }

    #[test]
    fn test_numeric() {
        assert_eq!(Message::new("376", ["nick", "End"]).numeric(), Some(376));
        assert_eq!(Message::new("PRIVMSG", ["#r", "x"]).numeric(), None);
    }

    #[test]
    fn test_trailing_flag_ignored_by_eq() {
        let a = Message::new("PRIVMSG", ["#r", "x"]);
        let b = a.clone().with_trailing();
        assert_eq!(a, b);
    }
}
