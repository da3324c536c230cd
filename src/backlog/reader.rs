//! Reading a log file from the end towards the start.
//!
//! Backlog files grow without bound, and "what happened in the last hour"
//! only needs their tail. [`BackwardsReader`] pulls fixed-size blocks from
//! the end and hands out lines newest-first. A block boundary that falls
//! inside a line is handled by keeping the unconsumed head of the buffer and
//! prepending the next block to it before splitting again.

use std::io::{self, Read, Seek, SeekFrom};

pub struct BackwardsReader<R> {
    inner: R,
    block_size: usize,
    /// File bytes in `[buf_start, cursor)` not yet handed out.
    buf: Vec<u8>,
    buf_start: u64,
    /// Offset of the first byte of the line returned last.
    cursor: u64,
}

impl<R: Read + Seek> BackwardsReader<R> {
    pub fn new(mut inner: R, block_size: usize) -> io::Result<Self> {
        let end = inner.seek(SeekFrom::End(0))?;
        Ok(Self {
            inner,
            block_size: block_size.max(1),
            buf: Vec::new(),
            buf_start: end,
            cursor: end,
        })
    }

    /// Offset where the most recently returned line starts (the end of the
    /// file before any line was read).
    pub fn position(&self) -> u64 {
        self.cursor
    }

    /// The line before the current position, without its terminator.
    pub fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        loop {
            let search_end = match self.buf.last() {
                Some(b'\n') => self.buf.len() - 1,
                _ => self.buf.len(),
            };

            if let Some(nl) = self.buf[..search_end].iter().rposition(|&b| b == b'\n') {
                let line = self.buf[nl + 1..search_end].to_vec();
                let consumed = self.buf.len() - (nl + 1);
                self.buf.truncate(nl + 1);
                self.cursor -= consumed as u64;
                return Ok(Some(line));
            }

            if self.buf_start == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                let line = self.buf[..search_end].to_vec();
                self.cursor -= self.buf.len() as u64;
                self.buf.clear();
                return Ok(Some(line));
            }

            self.fill()?;
        }
    }

    /// Hand lines to `keep_going` newest-first until it returns `false` or
    /// the file is exhausted. Returns `true` when the callback stopped the
    /// scan; [`position`](Self::position) is then the start of the line it
    /// rejected.
    pub fn scan<F>(&mut self, mut keep_going: F) -> io::Result<bool>
    where
        F: FnMut(&[u8]) -> bool,
    {
        while let Some(line) = self.read_line()? {
            if !keep_going(&line) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Seek the underlying stream to [`position`](Self::position) and give
    /// it back, ready for forward reading.
    pub fn into_inner(mut self) -> io::Result<R> {
        self.inner.seek(SeekFrom::Start(self.cursor))?;
        Ok(self.inner)
    }

    fn fill(&mut self) -> io::Result<()> {
        let len = (self.block_size as u64).min(self.buf_start);
        let start = self.buf_start - len;
        self.inner.seek(SeekFrom::Start(start))?;

        let mut block = vec![0; len as usize];
        self.inner.read_exact(&mut block)?;
        block.extend_from_slice(&self.buf);

        self.buf = block;
        self.buf_start = start;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const DATA: &[u8] = b"line1\nline2\nline3\n";

    fn collect(block_size: usize) -> Vec<String> {
        let mut reader = BackwardsReader::new(Cursor::new(DATA), block_size).unwrap();
        let mut lines = Vec::new();
        while let Some(line) = reader.read_line().unwrap() {
            lines.push(String::from_utf8(line).unwrap());
        }
        assert_eq!(reader.position(), 0);
        lines
    }

    #[test]
    fn test_reads_backwards_with_small_and_odd_blocks() {
        for block_size in [2, 6, 7, 4096] {
            assert_eq!(collect(block_size), vec!["line3", "line2", "line1"], "block {block_size}");
        }
    }

    #[test]
    fn test_position_tracks_each_line_start() {
        let mut reader = BackwardsReader::new(Cursor::new(DATA), 2).unwrap();
        assert_eq!(reader.position(), DATA.len() as u64);
        reader.read_line().unwrap();
        assert_eq!(reader.position(), DATA.len() as u64 - 6);
        reader.read_line().unwrap();
        assert_eq!(reader.position(), DATA.len() as u64 - 12);
    }

    #[test]
    fn test_full_scan_restores_position_to_start() {
        let mut reader = BackwardsReader::new(Cursor::new(DATA), 2).unwrap();
        let mut seen = Vec::new();
        let stopped = reader
            .scan(|line| {
                seen.push(line.to_vec());
                true
            })
            .unwrap();
        assert!(!stopped);
        assert_eq!(seen, vec![b"line3".to_vec(), b"line2".to_vec(), b"line1".to_vec()]);

        let inner = reader.into_inner().unwrap();
        assert_eq!(inner.position(), 0);
    }

    #[test]
    fn test_aborted_scan_leaves_position_after_previous_line() {
        let mut reader = BackwardsReader::new(Cursor::new(DATA), 7).unwrap();
        let stopped = reader.scan(|line| line != b"line2").unwrap();
        assert!(stopped);

        let mut inner = reader.into_inner().unwrap();
        assert_eq!(inner.position(), 6);
        let mut rest = String::new();
        inner.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "line2\nline3\n");
    }

    #[test]
    fn test_missing_final_newline_and_blank_lines() {
        let mut reader = BackwardsReader::new(Cursor::new(&b"a\n\nb"[..]), 1).unwrap();
        let mut lines = Vec::new();
        while let Some(line) = reader.read_line().unwrap() {
            lines.push(String::from_utf8(line).unwrap());
        }
        assert_eq!(lines, vec!["b", "", "a"]);
    }

    #[test]
    fn test_empty_input() {
        let mut reader = BackwardsReader::new(Cursor::new(&b""[..]), 4).unwrap();
        assert!(reader.read_line().unwrap().is_none());
        assert_eq!(reader.position(), 0);
    }
}
