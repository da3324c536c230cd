//! Hooks the backlog into a session's message flow.

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeDelta, Utc};
use slbnc_proto::Message;
use slbnc_proto::message::format_server_time;
use std::sync::Arc;
use tracing::warn;

use super::cursor::{CursorStore, DbCursorStore};
use super::line::format_line;
use super::offset::parse_offset;
use super::worker::BacklogHandle;
use super::BacklogStore;
use crate::bouncer::interceptor::{
    Flow, InterceptorFactory, MessageInterceptor, SessionContext, SessionInfo,
};
use crate::client::handle::ClientHandle;
use crate::db::Database;

const MAX_HOURS: f64 = 24.0 * 365.0;

/// A parsed `backlog [context] [hours]` command.
#[derive(Debug, Clone, PartialEq)]
pub struct BacklogRequest {
    pub context: Option<String>,
    pub hours: f64,
}

impl BacklogRequest {
    /// Parse the words after the command name. A trailing number (optionally
    /// suffixed with `d` for days) is the window; anything before it is the
    /// context. Out-of-range windows fall back to one hour.
    pub fn parse(args: &[&str]) -> Self {
        let mut args = args.to_vec();
        let parsed = args.last().and_then(|s| parse_hours(s));
        if parsed.is_some() {
            args.pop();
        }
        let hours = parsed.unwrap_or(1.0);
        let hours = if hours <= 0.0 || hours >= MAX_HOURS {
            1.0
        } else {
            hours
        };
        Self {
            context: args.pop().map(str::to_owned),
            hours,
        }
    }

    pub fn since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - TimeDelta::milliseconds((self.hours * 3_600_000.0) as i64)
    }
}

fn parse_hours(raw: &str) -> Option<f64> {
    match raw.strip_suffix('d') {
        Some(days) => days.parse::<f64>().ok().map(|d| d * 24.0),
        None => raw.parse().ok(),
    }
}

/// Logs PRIVMSG traffic and replays it to attaching devices.
pub struct BacklogInterceptor {
    handle: BacklogHandle,
    cursors: Arc<dyn CursorStore>,
}

impl BacklogInterceptor {
    pub fn new(handle: BacklogHandle, cursors: Arc<dyn CursorStore>) -> Self {
        Self { handle, cursors }
    }

    /// `timezone [offset|local]`: show or set the offset used to stamp
    /// replayed lines on this device.
    async fn timezone(&self, device: &str, arg: Option<&str>) -> String {
        let result = match arg {
            None => self.cursors.utc_offset(device).await.map(|offset| match offset {
                Some(offset) => format!("Time zone: UTC{offset}"),
                None => format!(
                    "Time zone not set; using local time (UTC{})",
                    Local::now().offset()
                ),
            }),
            Some(arg) if arg.eq_ignore_ascii_case("local") => self
                .cursors
                .set_utc_offset(device, None)
                .await
                .map(|()| "Time zone cleared; using local time".to_owned()),
            Some(arg) => match parse_offset(arg) {
                Some(offset) => self
                    .cursors
                    .set_utc_offset(device, Some(offset))
                    .await
                    .map(|()| format!("Time zone set to UTC{offset}")),
                None => Ok(format!(
                    "Unknown time zone '{arg}'; use an offset such as +02:00, -0500 or UTC"
                )),
            },
        };
        result.unwrap_or_else(|e| {
            warn!(device, error = %e, "Failed to access device time zone");
            "Time zone unavailable right now".to_owned()
        })
    }
}

/// PRIVMSGs worth keeping: a target and text, and not a CTCP request.
fn loggable(msg: &Message) -> bool {
    msg.is("PRIVMSG") && msg.args.len() >= 2 && (!msg.is_ctcp() || msg.is_action())
}

#[async_trait]
impl MessageInterceptor for BacklogInterceptor {
    fn name(&self) -> &'static str {
        "backlog"
    }

    async fn on_server_message(&mut self, ctx: &SessionContext<'_>, msg: &mut Message) -> Flow {
        if !loggable(msg) {
            return Flow::Continue;
        }
        let now = Utc::now();
        if msg.tag("time").is_none() {
            msg.set_tag("time", Some(&format_server_time(now)));
        }

        let target = &msg.args[0];
        let context = if target.eq_ignore_ascii_case(ctx.nick) {
            match msg.target_user() {
                Some(sender) => sender.to_owned(),
                None => return Flow::Continue,
            }
        } else {
            target.clone()
        };

        if let Some(line) = format_line(msg, now) {
            self.handle.write(context, line, ctx.devices.to_vec()).await;
        }
        Flow::Continue
    }

    async fn on_client_message(
        &mut self,
        ctx: &SessionContext<'_>,
        client: &ClientHandle,
        msg: &mut Message,
    ) -> Flow {
        if !loggable(msg) {
            return Flow::Continue;
        }
        let target = msg.args[0].clone();

        if target
            .strip_prefix('-')
            .is_some_and(|name| name.eq_ignore_ascii_case(ctx.server_name))
        {
            let text = msg.last_arg().unwrap_or_default();
            let words: Vec<&str> = text.split_whitespace().collect();
            return match words.split_first() {
                Some((cmd, rest)) if cmd.eq_ignore_ascii_case("timezone") => {
                    let reply = self.timezone(&client.device, rest.first().copied()).await;
                    client.try_send(
                        Message::privmsg(ctx.nick, &reply).with_prefix(ctx.pseudo_prefix()),
                    );
                    Flow::Stop
                }
                Some((cmd, rest)) if cmd.eq_ignore_ascii_case("backlog") => {
                    let request = BacklogRequest::parse(rest);
                    self.handle
                        .replay_since(
                            client.clone(),
                            ctx.nick.to_owned(),
                            request.since(Utc::now()),
                            request.context,
                        )
                        .await;
                    Flow::Stop
                }
                _ => Flow::Continue,
            };
        }

        let mut own = msg.clone();
        own.prefix = None;
        if let Some(line) = format_line(&own, Utc::now()) {
            self.handle.write(target, line, ctx.devices.to_vec()).await;
        }
        Flow::Continue
    }

    async fn on_client_attached(&mut self, ctx: &SessionContext<'_>, client: &ClientHandle) {
        self.handle.attach(client.clone(), ctx.nick.to_owned()).await;
    }
}

/// Gives each session a backlog worker with database-backed cursors.
pub struct BacklogFactory {
    store: BacklogStore,
    db: Database,
}

impl BacklogFactory {
    pub fn new(store: BacklogStore, db: Database) -> Self {
        Self { store, db }
    }
}

impl InterceptorFactory for BacklogFactory {
    fn build(&self, session: &SessionInfo) -> Option<Box<dyn MessageInterceptor>> {
        let dir = self.store.session_dir(&session.username, &session.network);
        let cursors: Arc<dyn CursorStore> =
            Arc::new(DbCursorStore::new(self.db.clone(), session.network_user_id));
        let handle = self.store.spawn_worker(dir, Arc::clone(&cursors));
        Some(Box::new(BacklogInterceptor::new(handle, cursors)))
    }
}
