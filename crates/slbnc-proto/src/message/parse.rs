//! Wire line → [`Message`].
//!
//! Grammar: `[@tags ][:prefix ]COMMAND[ args...][ :trailing]`.

use std::str::FromStr;

use super::tags::parse_tags;
use super::Message;
use crate::ctcp;
use crate::error::MessageParseError;

impl FromStr for Message {
    type Err = MessageParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Err(MessageParseError::EmptyMessage);
        }

        let mut rest = line;

        let tags = match rest.strip_prefix('@') {
            Some(after) => {
                let (raw, remaining) = after
                    .split_once(' ')
                    .ok_or(MessageParseError::UnterminatedTags)?;
                rest = remaining;
                parse_tags(raw)
            }
            None => Vec::new(),
        };

        let prefix = match rest.strip_prefix(':') {
            Some(after) => {
                let (prefix, remaining) = after
                    .split_once(' ')
                    .ok_or_else(|| MessageParseError::MissingCommand(line.to_owned()))?;
                rest = remaining;
                Some(prefix.to_owned())
            }
            None => None,
        };

        let (command, params) = rest.split_once(' ').unwrap_or((rest, ""));
        if command.is_empty() {
            return Err(MessageParseError::MissingCommand(line.to_owned()));
        }

        let (middle, trailing) = split_trailing(params);
        let mut args: Vec<String> = middle
            .split(' ')
            .filter(|a| !a.is_empty())
            .map(str::to_owned)
            .collect();
        if let Some(trailing) = trailing {
            args.push(trailing.to_owned());
        }

        let mut ctcp = None;
        if let Some(last) = args.last_mut() {
            if let Some((tag, body)) = ctcp::unwrap(last) {
                ctcp = Some(tag);
                *last = body;
            }
        }

        Ok(Message {
            tags,
            prefix,
            command: command.to_ascii_uppercase(),
            args,
            ctcp,
            trailing: trailing.is_some(),
        })
    }
}

/// Locate the trailing argument: the first `:` at position 0 or directly
/// after a space. A colon inside an argument (`#r ::)`) is left alone.
fn split_trailing(params: &str) -> (&str, Option<&str>) {
    let bytes = params.as_bytes();
    let found = bytes
        .iter()
        .enumerate()
        .position(|(i, &b)| b == b':' && (i == 0 || bytes[i - 1] == b' '));
    match found {
        Some(idx) => (&params[..idx], Some(&params[idx + 1..])),
        None => (params, None),
    }
}
