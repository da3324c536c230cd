//! Line-based codec for tokio.
//!
//! Reads and writes newline-terminated lines. Input is decoded lossily as
//! UTF-8: upstream networks still carry latin-1 and worse, and a bouncer
//! must relay it rather than drop the connection.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{self, MessageParseError};

/// Default maximum line length: 512 bytes of message plus room for IRCv3 tags.
pub const DEFAULT_MAX_LEN: usize = 512 + 8191;

/// One decoded line, or why it was dropped.
pub type LineResult = Result<String, MessageParseError>;

/// Line-based codec that handles newline-terminated messages.
///
/// A line longer than the limit is dropped and reported as a
/// [`MessageParseError::MessageTooLong`] item; decoding resumes with the
/// next line.
pub struct LineCodec {
    /// Index of next byte to check for newline
    next_index: usize,
    /// Maximum line length
    max_len: usize,
    /// Bytes already thrown away from the current overlong line.
    discarded: usize,
}

impl LineCodec {
    /// Create a codec with [`DEFAULT_MAX_LEN`].
    pub fn new() -> Self {
        Self::with_max_len(DEFAULT_MAX_LEN)
    }

    /// Create a new codec with custom max line length.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            next_index: 0,
            max_len,
            discarded: 0,
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = LineResult;
    type Error = error::ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> error::Result<Option<LineResult>> {
        let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
            self.next_index = src.len();
            if src.len() > self.max_len {
                self.discarded += src.len();
                src.clear();
                self.next_index = 0;
            }
            return Ok(None);
        };

        let line = src.split_to(self.next_index + offset + 1);
        self.next_index = 0;
        let actual = line.len() + std::mem::take(&mut self.discarded);
        if actual > self.max_len {
            return Ok(Some(Err(MessageParseError::MessageTooLong {
                actual,
                limit: self.max_len,
            })));
        }

        let data = String::from_utf8_lossy(&line);
        Ok(Some(Ok(data.trim_end_matches(['\r', '\n']).to_owned())))
    }
}

impl Encoder<String> for LineCodec {
    type Error = error::ProtocolError;

    fn encode(&mut self, msg: String, dst: &mut BytesMut) -> error::Result<()> {
        dst.reserve(msg.len() + 2);
        dst.extend_from_slice(msg.as_bytes());
        dst.extend_from_slice(b"\r\n");
        Ok(())
    }
}
