//! Blocking file operations on one session's backlog directory.
//!
//! Everything here does synchronous I/O and is only called from inside
//! `spawn_blocking` by the session's backlog worker.

use chrono::{DateTime, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::line::{context_file_name, context_from_file_name, parse_timestamp};
use super::reader::BackwardsReader;

/// Directory holding one session's context files.
#[derive(Debug, Clone)]
pub struct SessionDir {
    root: PathBuf,
}

impl SessionDir {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn context_path(&self, context: &str) -> PathBuf {
        self.root.join(context_file_name(context))
    }

    /// Append `line` to the context file, creating it if needed. Returns the
    /// file size before and after the write.
    pub fn append(&self, context: &str, line: &str) -> io::Result<(u64, u64)> {
        fs::create_dir_all(&self.root)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.context_path(context))?;
        let before = file.metadata()?.len();

        let mut record = Vec::with_capacity(line.len() + 1);
        record.extend_from_slice(line.as_bytes());
        record.push(b'\n');
        file.write_all(&record)?;

        Ok((before, before + record.len() as u64))
    }

    /// Current size of a context file; a missing file is empty.
    pub fn size(&self, context: &str) -> io::Result<u64> {
        match fs::metadata(self.context_path(context)) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Every context with a log file, sorted by name.
    pub fn contexts(&self) -> io::Result<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut contexts = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(ctx) = entry.file_name().to_str().and_then(context_from_file_name) {
                contexts.push(ctx);
            }
        }
        contexts.sort();
        Ok(contexts)
    }

    /// Lines from `offset` to the end of the file, plus the offset just past
    /// the last line read.
    pub fn read_from(&self, context: &str, offset: u64) -> io::Result<(Vec<String>, u64)> {
        let mut file = match File::open(self.context_path(context)) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), offset)),
            Err(e) => return Err(e),
        };
        file.seek(SeekFrom::Start(offset))?;
        let (lines, consumed) = read_lines(BufReader::new(file))?;
        Ok((lines, offset + consumed))
    }

    /// Lines stamped at or after `since`.
    ///
    /// Walks backward from the end until the first line older than `since`,
    /// then reads forward from just after it. Lines without a readable
    /// timestamp do not stop the walk.
    pub fn read_since(
        &self,
        context: &str,
        since: DateTime<Utc>,
        block_size: usize,
    ) -> io::Result<Vec<String>> {
        let file = match File::open(self.context_path(context)) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut reader = BackwardsReader::new(file, block_size)?;
        let stopped = reader.scan(|raw| {
            let line = String::from_utf8_lossy(raw);
            !matches!(parse_timestamp(&line), Some((ts, _)) if ts < since)
        })?;

        let mut forward = BufReader::new(reader.into_inner()?);
        if stopped {
            // Skip the boundary line itself; it is older than `since`.
            let mut skipped = Vec::new();
            forward.read_until(b'\n', &mut skipped)?;
        }
        Ok(read_lines(forward)?.0)
    }
}

fn read_lines<R: BufRead>(mut reader: R) -> io::Result<(Vec<String>, u64)> {
    let mut lines = Vec::new();
    let mut consumed = 0u64;
    let mut raw = Vec::new();
    loop {
        raw.clear();
        let n = reader.read_until(b'\n', &mut raw)?;
        if n == 0 {
            break;
        }
        consumed += n as u64;
        let line = String::from_utf8_lossy(&raw);
        lines.push(line.trim_end_matches(['\r', '\n']).to_owned());
    }
    Ok((lines, consumed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(2020, 1, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
            .and_utc()
    }

    fn dir() -> (tempfile::TempDir, SessionDir) {
        let tmp = tempfile::tempdir().unwrap();
        let dir = SessionDir::new(tmp.path().join("alice").join("libera"));
        (tmp, dir)
    }

    #[test]
    fn test_append_reports_sizes() {
        let (_tmp, dir) = dir();
        assert_eq!(dir.size("#r").unwrap(), 0);
        assert_eq!(dir.append("#r", "one").unwrap(), (0, 4));
        assert_eq!(dir.append("#r", "two").unwrap(), (4, 8));
        assert_eq!(dir.size("#r").unwrap(), 8);
    }

    #[test]
    fn test_contexts_lists_logs_only() {
        let (_tmp, dir) = dir();
        assert!(dir.contexts().unwrap().is_empty());
        dir.append("#b", "x").unwrap();
        dir.append("alice", "x").unwrap();
        dir.append("#a.b", "x").unwrap();
        fs::write(dir.path().join("README"), "hi").unwrap();
        assert_eq!(dir.contexts().unwrap(), vec!["#a.b", "#b", "alice"]);
    }

    #[test]
    fn test_read_from_offset() {
        let (_tmp, dir) = dir();
        dir.append("#r", "one").unwrap();
        let (_, mid) = dir.append("#r", "two").unwrap();
        dir.append("#r", "three").unwrap();

        let (lines, end) = dir.read_from("#r", 4).unwrap();
        assert_eq!(lines, vec!["two", "three"]);
        assert_eq!(end, dir.size("#r").unwrap());

        let (lines, end) = dir.read_from("#r", mid).unwrap();
        assert_eq!(lines, vec!["three"]);
        assert_eq!(end, mid + 6);

        assert_eq!(dir.read_from("#missing", 0).unwrap(), (vec![], 0));
    }

    #[test]
    fn test_read_since_stops_at_boundary() {
        let (_tmp, dir) = dir();
        for (h, text) in [(1, "a"), (2, "b"), (3, "c"), (4, "d")] {
            let line = format!("{} < x!x@x: {text}", at(h, 0).format("%Y-%m-%dT%H:%M:%SZ"));
            dir.append("#r", &line).unwrap();
        }
        dir.append("#r", "garbage without a stamp").unwrap();

        for block in [3, 16, 4096] {
            let lines = dir.read_since("#r", at(2, 30), block).unwrap();
            assert_eq!(lines.len(), 3, "block {block}");
            assert!(lines[0].ends_with(": c"));
            assert!(lines[1].ends_with(": d"));
            assert_eq!(lines[2], "garbage without a stamp");
        }

        let everything = dir.read_since("#r", at(0, 0), 8).unwrap();
        assert_eq!(everything.len(), 5);
        assert!(everything[0].ends_with(": a"));

        assert!(dir.read_since("#r", at(23, 0), 8).unwrap().len() == 1);
        assert!(dir.read_since("#missing", at(0, 0), 8).unwrap().is_empty());
    }
}
