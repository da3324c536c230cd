//! On-disk line format.
//!
//! ```text
//! 2013-07-10T10:10:36.000Z < dude!d@host: hello there
//! 2013-07-10T10:10:41.512Z < * dude!d@host: waves
//! 2013-07-10T10:11:02.031Z > hi dude
//! ```
//!
//! `<` lines came from someone else and carry their prefix; `>` lines were
//! sent by the bounced user. `* ` marks a CTCP ACTION. Files written by
//! older releases used a local-time `DD-MM-YYYY HH:MM:SS` stamp, which is
//! still accepted when reading.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use slbnc_proto::Message;
use slbnc_proto::message::format_server_time;

const LEGACY_FORMATS: &[&str] = &["%d-%m-%Y %H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// One parsed backlog line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: Message,
}

/// Render a PRIVMSG for storage. Incoming messages (with a prefix) are
/// attributed to their sender; prefix-less ones are the user's own.
pub fn format_line(msg: &Message, at: DateTime<Utc>) -> Option<String> {
    let text = msg.args.get(1..)?.last()?;
    let action = if msg.is_action() { "* " } else { "" };
    let ts = format_server_time(at);
    Some(match &msg.prefix {
        Some(prefix) => format!("{ts} < {action}{prefix}: {text}"),
        None => format!("{ts} > {action}{text}"),
    })
}

/// Parse a stored line back into a PRIVMSG addressed to `context`.
/// Returns `None` for anything unrecognisable.
pub fn parse_line(line: &str, context: &str) -> Option<LogEntry> {
    let (timestamp, rest) = parse_timestamp(line)?;

    let message = if let Some(body) = rest.strip_prefix("> ") {
        let (action, text) = strip_action(body);
        build(None, context, text, action)?
    } else if let Some(body) = rest.strip_prefix("< ") {
        let (action, body) = strip_action(body);
        let (sender, text) = body.split_once(": ")?;
        if sender.is_empty() || sender.contains(' ') {
            return None;
        }
        build(Some(sender), context, text, action)?
    } else {
        return None;
    };

    Some(LogEntry { timestamp, message })
}

/// Leading timestamp of a stored line and the remainder after it.
pub fn parse_timestamp(line: &str) -> Option<(DateTime<Utc>, &str)> {
    let (first, rest) = line.split_once(' ')?;

    if let Ok(t) = DateTime::parse_from_rfc3339(first) {
        return Some((t.with_timezone(&Utc), rest));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(first, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some((local_to_utc(naive)?, rest));
    }

    let (second, rest) = rest.split_once(' ')?;
    let stamp = format!("{first} {second}");
    LEGACY_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&stamp, fmt).ok())
        .and_then(local_to_utc)
        .map(|t| (t, rest))
}

fn local_to_utc(naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
}

fn strip_action(body: &str) -> (bool, &str) {
    match body.strip_prefix("* ") {
        Some(rest) => (true, rest),
        None => (false, body),
    }
}

fn build(prefix: Option<&str>, context: &str, text: &str, action: bool) -> Option<Message> {
    if text.is_empty() {
        return None;
    }
    let mut msg = Message::privmsg(context, text);
    msg.prefix = prefix.map(str::to_owned);
    if action {
        msg.ctcp = Some("ACTION".to_string());
    }
    Some(msg)
}

/// File name for a context.
pub fn context_file_name(context: &str) -> String {
    let mut name = escape_component(context);
    name.push_str(".log");
    name
}

/// `%`, `/`, `\` and `.` are percent-escaped so a hostile channel or
/// network name cannot escape its directory.
pub fn escape_component(raw: &str) -> String {
    let mut name = String::with_capacity(raw.len() + 4);
    for c in raw.chars() {
        match c {
            '%' => name.push_str("%25"),
            '/' => name.push_str("%2F"),
            '\\' => name.push_str("%5C"),
            '.' => name.push_str("%2E"),
            c => name.push(c),
        }
    }
    name
}

/// Inverse of [`context_file_name`]; `None` for files that are not logs.
pub fn context_from_file_name(file_name: &str) -> Option<String> {
    let stem = file_name.strip_suffix(".log")?;
    if stem.is_empty() {
        return None;
    }
    Some(
        stem.replace("%2F", "/")
            .replace("%5C", "\\")
            .replace("%2E", ".")
            .replace("%25", "%"),
    )
}
