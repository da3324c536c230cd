//! The per-session backlog worker.

use chrono::{DateTime, FixedOffset, Local, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::cursor::CursorStore;
use super::line::{LogEntry, parse_line};
use super::store::SessionDir;
use super::BacklogStore;
use crate::client::handle::ClientHandle;
use crate::error::{BouncerError, BouncerResult};

const JOB_QUEUE: usize = 1024;

pub(crate) enum Job {
    Write {
        context: String,
        line: String,
        devices: Vec<String>,
    },
    Attach {
        client: ClientHandle,
        nick: String,
    },
    ReplaySince {
        client: ClientHandle,
        nick: String,
        since: DateTime<Utc>,
        context: Option<String>,
    },
}

/// Queue into a session's backlog worker.
#[derive(Clone)]
pub struct BacklogHandle {
    tx: mpsc::Sender<Job>,
}

impl BacklogHandle {
    /// Append a rendered line to `context`. `devices` are the devices attached
    /// right now; their cursors follow the write if they were caught up.
    pub async fn write(&self, context: String, line: String, devices: Vec<String>) {
        self.submit(Job::Write {
            context,
            line,
            devices,
        })
        .await;
    }

    /// Replay everything `client`'s device missed.
    pub async fn attach(&self, client: ClientHandle, nick: String) {
        self.submit(Job::Attach { client, nick }).await;
    }

    /// Replay lines newer than `since`, from one context or all of them.
    pub async fn replay_since(
        &self,
        client: ClientHandle,
        nick: String,
        since: DateTime<Utc>,
        context: Option<String>,
    ) {
        self.submit(Job::ReplaySince {
            client,
            nick,
            since,
            context,
        })
        .await;
    }

    async fn submit(&self, job: Job) {
        if self.tx.send(job).await.is_err() {
            warn!("Backlog worker has stopped; dropping job");
        }
    }
}

pub(super) fn spawn(
    store: BacklogStore,
    dir: SessionDir,
    cursors: Arc<dyn CursorStore>,
) -> BacklogHandle {
    let (tx, rx) = mpsc::channel(JOB_QUEUE);
    let worker = Worker {
        store,
        dir,
        cursors,
    };
    tokio::spawn(worker.run(rx));
    BacklogHandle { tx }
}

struct Worker {
    store: BacklogStore,
    dir: SessionDir,
    cursors: Arc<dyn CursorStore>,
}

impl Worker {
    async fn run(self, mut rx: mpsc::Receiver<Job>) {
        while let Some(job) = rx.recv().await {
            match job {
                Job::Write {
                    context,
                    line,
                    devices,
                } => {
                    if let Err(e) = self.write(&context, line, devices).await {
                        warn!(context = %context, error = %e, code = e.error_code(), "Backlog write failed");
                    }
                }
                Job::Attach { client, nick } => {
                    if let Err(e) = self.attach(&client, &nick).await {
                        debug!(device = %client.device, error = %e, "Backlog replay stopped");
                    }
                }
                Job::ReplaySince {
                    client,
                    nick,
                    since,
                    context,
                } => {
                    if let Err(e) = self.replay_since(&client, &nick, since, context).await {
                        debug!(device = %client.device, error = %e, "Backlog replay stopped");
                    }
                }
            }
        }
        debug!(dir = %self.dir.path().display(), "Backlog worker finished");
    }

    async fn write(&self, context: &str, line: String, mut devices: Vec<String>) -> BouncerResult<()> {
        let dir = self.dir.clone();
        let ctx = context.to_owned();
        let (before, after) = self
            .store
            .blocking(move || dir.append(&ctx, &line))
            .await?;

        devices.sort();
        devices.dedup();
        for device in devices {
            let pos = self.cursors.position(&device, context).await?.unwrap_or(before);
            if pos >= before {
                self.cursors.set_position(&device, context, after).await?;
            }
        }
        Ok(())
    }

    async fn attach(&self, client: &ClientHandle, nick: &str) -> BouncerResult<()> {
        let fresh = self.cursors.register_device(&client.device).await?;
        let offset = self.cursors.utc_offset(&client.device).await?;
        let dir = self.dir.clone();
        let contexts = self.store.blocking(move || dir.contexts()).await?;

        for context in contexts {
            match self.attach_context(client, nick, offset, &context, fresh).await {
                Ok(()) => {}
                Err(BouncerError::SessionClosed) => return Err(BouncerError::SessionClosed),
                Err(e) => {
                    warn!(
                        context = %context,
                        device = %client.device,
                        error = %e,
                        code = e.error_code(),
                        "Skipping backlog replay for context"
                    );
                }
            }
        }
        Ok(())
    }

    async fn attach_context(
        &self,
        client: &ClientHandle,
        nick: &str,
        offset: Option<FixedOffset>,
        context: &str,
        fresh_device: bool,
    ) -> BouncerResult<()> {
        let dir = self.dir.clone();
        let ctx = context.to_owned();
        let size = self.store.blocking(move || dir.size(&ctx)).await?;

        let start = match self.cursors.position(&client.device, context).await? {
            Some(pos) => pos,
            None if fresh_device => {
                self.cursors.set_position(&client.device, context, size).await?;
                return Ok(());
            }
            None => 0,
        };
        if start >= size {
            return Ok(());
        }

        let dir = self.dir.clone();
        let ctx = context.to_owned();
        let (lines, end) = self
            .store
            .blocking(move || dir.read_from(&ctx, start))
            .await?;

        let mut entries = parse_all(&lines, context);
        if let Some(max) = self.store.max_replay_lines
            && entries.len() > max
        {
            entries.drain(..entries.len() - max);
        }

        debug!(
            context = %context,
            device = %client.device,
            lines = entries.len(),
            from = start,
            to = end,
            "Replaying missed backlog"
        );
        deliver(client, nick, offset, entries).await?;
        self.cursors.set_position(&client.device, context, end).await?;
        Ok(())
    }

    async fn replay_since(
        &self,
        client: &ClientHandle,
        nick: &str,
        since: DateTime<Utc>,
        context: Option<String>,
    ) -> BouncerResult<()> {
        let offset = self.cursors.utc_offset(&client.device).await?;
        let contexts = match context {
            Some(ctx) => vec![ctx],
            None => {
                let dir = self.dir.clone();
                self.store.blocking(move || dir.contexts()).await?
            }
        };

        for context in contexts {
            let dir = self.dir.clone();
            let ctx = context.clone();
            let block_size = self.store.block_size;
            let lines = match self
                .store
                .blocking(move || dir.read_since(&ctx, since, block_size))
                .await
            {
                Ok(lines) => lines,
                Err(e) => {
                    warn!(context = %context, error = %e, "Skipping backlog scan for context");
                    continue;
                }
            };
            deliver(client, nick, offset, parse_all(&lines, &context)).await?;
        }
        Ok(())
    }
}

fn parse_all(lines: &[String], context: &str) -> Vec<LogEntry> {
    lines.iter().filter_map(|l| parse_line(l, context)).collect()
}

/// Send entries to `client`, readdressed to `nick` and timestamped the way
/// the client can display. Plain-text stamps use `offset`, or local time.
async fn deliver(
    client: &ClientHandle,
    nick: &str,
    offset: Option<FixedOffset>,
    entries: Vec<LogEntry>,
) -> BouncerResult<()> {
    let now = Utc::now();
    for LogEntry {
        timestamp,
        mut message,
    } in entries
    {
        message.readdress_to(nick);
        let msg = match offset {
            _ if client.tag_capable() => message.with_server_time(timestamp),
            Some(offset) => message.with_timestamp(&timestamp.with_timezone(&offset), now),
            None => message.with_timestamp(&timestamp.with_timezone(&Local), now),
        };
        client.send(msg).await?;
    }
    Ok(())
}
