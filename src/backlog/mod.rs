//! Per-context message history with per-device read cursors.
//!
//! Every session writes PRIVMSG traffic to one append-only file per
//! conversation context under `<dir>/<user>/<network>/`. Each device keeps a
//! byte offset into each file; attaching replays whatever lies between that
//! offset and the end of the file.
//!
//! File I/O is blocking and runs on the blocking pool, gated by a semaphore
//! shared across all sessions. Each session gets exactly one worker task, so
//! writes to a context are serialized and cursor updates never race appends.

mod cursor;
mod interceptor;
mod line;
mod offset;
mod reader;
mod store;
mod worker;

pub use cursor::{CursorStore, DbCursorStore};
pub use interceptor::{BacklogFactory, BacklogInterceptor, BacklogRequest};
pub use line::{LogEntry, format_line, parse_line, parse_timestamp};
pub use offset::parse_offset;
pub use reader::BackwardsReader;
pub use store::SessionDir;
pub use worker::BacklogHandle;

#[cfg(test)]
pub(crate) use cursor::memory::MemoryCursorStore;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::config::BacklogConfig;

/// Shared entry point to the backlog directory.
#[derive(Clone)]
pub struct BacklogStore {
    root: PathBuf,
    io: Arc<Semaphore>,
    block_size: usize,
    max_replay_lines: Option<usize>,
}

impl BacklogStore {
    pub fn new(root: PathBuf, config: &BacklogConfig) -> Self {
        Self {
            root,
            io: Arc::new(Semaphore::new(config.io_workers.max(1))),
            block_size: config.block_size.max(1),
            max_replay_lines: config.max_replay_lines,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for one user's session on one network.
    pub fn session_dir(&self, username: &str, network: &str) -> SessionDir {
        SessionDir::new(
            self.root
                .join(line::escape_component(username))
                .join(line::escape_component(&network.to_lowercase())),
        )
    }

    /// Start the worker that owns `dir`. It stops once every handle is dropped.
    pub fn spawn_worker(&self, dir: SessionDir, cursors: Arc<dyn CursorStore>) -> BacklogHandle {
        worker::spawn(self.clone(), dir, cursors)
    }

    /// Run blocking file work on the blocking pool, at most `io_workers` at
    /// a time.
    pub(crate) async fn blocking<F, T>(&self, f: F) -> io::Result<T>
    where
        F: FnOnce() -> io::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .io
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| io::Error::other("backlog I/O pool closed"))?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f()
        })
        .await
        .map_err(io::Error::other)?
    }
}
