//! Backlog storage configuration.

use serde::Deserialize;
use std::path::PathBuf;

use super::types::default_true;

/// Backlog storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BacklogConfig {
    /// Record and replay PRIVMSG history (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Root directory for log files (default: `<data_dir>/logs`).
    pub dir: Option<PathBuf>,
    /// Concurrent blocking file operations across all sessions (default: 4).
    #[serde(default = "default_io_workers")]
    pub io_workers: usize,
    /// Read size for backward scans, in bytes (default: 4096).
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    /// Replay at most this many lines per context on attach. Cursors still
    /// move to the end of the file.
    pub max_replay_lines: Option<usize>,
}

impl Default for BacklogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            io_workers: default_io_workers(),
            block_size: default_block_size(),
            max_replay_lines: None,
        }
    }
}

fn default_io_workers() -> usize {
    4
}

fn default_block_size() -> usize {
    4096
}
