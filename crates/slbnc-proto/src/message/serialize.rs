//! [`Message`] → wire line.

use std::fmt::{self, Display, Formatter, Write};

use super::tags::escape_tag_value;
use super::Message;
use crate::ctcp;

impl Message {
    /// Whether the last argument has to be written after a `:` marker.
    fn needs_trailing(&self, last: &str) -> bool {
        self.trailing
            || self.ctcp.is_some()
            || last.is_empty()
            || last.starts_with(':')
            || last.contains(' ')
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if !self.tags.is_empty() {
            f.write_char('@')?;
            for (i, tag) in self.tags.iter().enumerate() {
                if i > 0 {
                    f.write_char(';')?;
                }
                f.write_str(&tag.0)?;
                if let Some(value) = &tag.1 {
                    f.write_char('=')?;
                    escape_tag_value(f, value)?;
                }
            }
            f.write_char(' ')?;
        }

        if let Some(prefix) = &self.prefix {
            write!(f, ":{prefix} ")?;
        }

        f.write_str(&self.command)?;

        if let Some((last, middle)) = self.args.split_last() {
            for arg in middle {
                write!(f, " {arg}")?;
            }
            f.write_char(' ')?;
            if self.needs_trailing(last) {
                f.write_char(':')?;
            }
            match &self.ctcp {
                Some(tag) => f.write_str(&ctcp::wrap(tag, last))?,
                None => f.write_str(last)?,
            }
        }

        Ok(())
    }
}
