//! Rewrites applied when a stored or echoed message is delivered to a
//! client under the bounced nick.

use chrono::{DateTime, SecondsFormat, TimeDelta, TimeZone, Utc};
use std::fmt::Display;

use super::Message;

/// Whether `target` names a channel rather than a nick.
pub fn is_channel(target: &str) -> bool {
    target.starts_with(['#', '&', '+', '!'])
}

/// Render a timestamp the way the `time` tag carries it: ISO-8601, UTC,
/// millisecond precision.
pub fn format_server_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl Message {
    /// Copy of this message with a rendered timestamp in front of the last
    /// argument, for clients that cannot take a `time` tag.
    ///
    /// Messages at least a day older than `now` get the full date.
    pub fn with_timestamp<Tz>(&self, timestamp: &DateTime<Tz>, now: DateTime<Utc>) -> Message
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let mut msg = self.clone();
        let age = now.signed_duration_since(timestamp.with_timezone(&Utc));
        let format = if age >= TimeDelta::hours(24) {
            "%Y-%m-%d %H:%M:%S"
        } else {
            "%H:%M:%S"
        };
        if let Some(last) = msg.args.last_mut() {
            *last = format!("{}> {}", timestamp.format(format), last);
            msg.trailing = true;
        }
        msg
    }

    /// Builder: carry `t` in the `time` tag.
    pub fn with_server_time(mut self, t: DateTime<Utc>) -> Self {
        self.set_tag("time", Some(&format_server_time(t)));
        self
    }

    /// Rewrite a PRIVMSG so a client connected as `nick` attributes it
    /// correctly.
    ///
    /// A message with a prefix came from someone else: private messages are
    /// re-targeted at `nick`, channel messages are left alone. A message
    /// without a prefix was sent by the bounced user. In a channel it simply
    /// gets `nick` as prefix. In a query, clients cannot show a line from
    /// themselves in the peer's window, so the line is presented as coming
    /// from the peer with a `-> ` marker.
    pub fn readdress_to(&mut self, nick: &str) {
        let Some(target) = self.args.first().cloned() else {
            return;
        };
        let private = !is_channel(&target);

        match (&self.prefix, private) {
            (Some(_), true) => self.args[0] = nick.to_owned(),
            (Some(_), false) => {}
            (None, true) => {
                self.prefix = Some(target);
                self.args[0] = nick.to_owned();
                if let Some(last) = self.args.last_mut() {
                    *last = format!("-> {last}");
                }
                self.trailing = true;
            }
            (None, false) => self.prefix = Some(nick.to_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate};

    fn sample_time() -> DateTime<FixedOffset> {
        let naive = NaiveDate::from_ymd_opt(2001, 11, 29)
            .unwrap()
            .and_hms_opt(19, 33, 20)
            .unwrap();
        FixedOffset::east_opt(0)
            .unwrap()
            .from_local_datetime(&naive)
            .unwrap()
    }

    #[test]
    fn test_with_timestamp_old_message_shows_date() {
        let msg: Message = ":p COMMAND a b :body".parse().unwrap();
        let now = Utc::now();
        let stamped = msg.with_timestamp(&sample_time(), now);
        assert_eq!(stamped.args, vec!["a", "b", "2001-11-29 19:33:20> body"]);
        assert_eq!(stamped.to_string(), ":p COMMAND a b :2001-11-29 19:33:20> body");
        // The original is untouched.
        assert_eq!(msg.last_arg(), Some("body"));
    }

    #[test]
    fn test_with_timestamp_recent_message_shows_time_only() {
        let msg: Message = ":p COMMAND a b :body".parse().unwrap();
        let now = sample_time().with_timezone(&Utc) + TimeDelta::hours(3);
        let stamped = msg.with_timestamp(&sample_time(), now);
        assert_eq!(stamped.last_arg(), Some("19:33:20> body"));
    }

    #[test]
    fn test_with_server_time() {
        let t = sample_time().with_timezone(&Utc);
        let msg = Message::privmsg("#r", "hi").with_server_time(t);
        assert_eq!(msg.tag("time"), Some(Some("2001-11-29T19:33:20.000Z")));
        assert_eq!(msg.last_arg(), Some("hi"));
    }

    #[test]
    fn test_readdress_incoming_private_message() {
        let mut msg = Message::privmsg("oldnick", "hey").with_prefix("friend!f@h");
        msg.readdress_to("me");
        assert_eq!(msg.to_string(), ":friend!f@h PRIVMSG me :hey");
    }

    #[test]
    fn test_readdress_incoming_channel_message() {
        let mut msg = Message::privmsg("#room", "hey").with_prefix("friend!f@h");
        msg.readdress_to("me");
        assert_eq!(msg.to_string(), ":friend!f@h PRIVMSG #room :hey");
    }

    #[test]
    fn test_readdress_own_private_message() {
        let mut msg = Message::privmsg("friend", "hello there");
        msg.readdress_to("me");
        assert_eq!(msg.to_string(), ":friend PRIVMSG me :-> hello there");
    }

    #[test]
    fn test_readdress_own_channel_message() {
        let mut msg = Message::privmsg("#room", "hello");
        msg.readdress_to("me");
        assert_eq!(msg.to_string(), ":me PRIVMSG #room :hello");
    }

    #[test]
    fn test_is_channel() {
        assert!(is_channel("#rust"));
        assert!(is_channel("&local"));
        assert!(!is_channel("nick"));
    }
}
