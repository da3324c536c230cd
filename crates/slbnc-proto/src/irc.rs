//! IRC message codec for tokio.
//!
//! Wraps [`LineCodec`] and parses each line into a [`Message`]. A line that
//! fails to parse is yielded as an `Err` item rather than a stream error, so
//! a single malformed line never tears down the framed connection.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{self, MessageParseError};
use crate::line::LineCodec;
use crate::message::Message;

/// One decoded line: either a message or the reason it could not be parsed.
pub type ParseResult = Result<Message, MessageParseError>;

/// Tokio codec for encoding/decoding IRC messages.
#[derive(Default)]
pub struct IrcCodec {
    inner: LineCodec,
}

impl IrcCodec {
    /// Create a codec with the default line length limit.
    pub fn new() -> Self {
        Self {
            inner: LineCodec::new(),
        }
    }

    /// Create a new codec with custom max line length.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            inner: LineCodec::with_max_len(max_len),
        }
    }

    /// Truncate outgoing data at its first line ending so that a value
    /// containing CR or LF cannot smuggle a second command onto the wire.
    pub fn sanitize(mut data: String) -> String {
        if let Some(pos) = data.find(['\r', '\n']) {
            data.truncate(pos);
        }
        data
    }
}

impl Decoder for IrcCodec {
    type Item = ParseResult;
    type Error = error::ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> error::Result<Option<ParseResult>> {
        loop {
            match self.inner.decode(src)? {
                None => return Ok(None),
                // Blank keepalive lines are legal noise; skip them.
                Some(Ok(line)) if line.trim().is_empty() => continue,
                Some(Ok(line)) => return Ok(Some(line.parse::<Message>())),
                Some(Err(e)) => return Ok(Some(Err(e))),
            }
        }
    }
}

impl Encoder<Message> for IrcCodec {
    type Error = error::ProtocolError;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> error::Result<()> {
        self.inner.encode(Self::sanitize(msg.to_string()), dst)
    }
}

impl Encoder<String> for IrcCodec {
    type Error = error::ProtocolError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> error::Result<()> {
        self.inner.encode(Self::sanitize(line), dst)
    }
}
