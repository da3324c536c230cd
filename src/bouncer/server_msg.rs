//! Messages from the upstream server.

use slbnc_proto::numeric::{
    ERR_NICKNAMEINUSE, ERR_NOMOTD, RPL_ENDOFMOTD, RPL_TOPIC, RPL_TOPICWHOTIME, is_welcome,
};
use slbnc_proto::{Message, parse_client_command};
use tracing::{info, trace, warn};

use super::actor::Bouncer;
use super::interceptor::{Flow, SessionContext};
use super::routing::Route;
use crate::upstream::LinkPhase;

impl Bouncer {
    pub(super) async fn server_msg(&mut self, mut msg: Message) {
        trace!(line = %msg, "from server");

        let devices = self.devices();
        let ctx = SessionContext {
            nick: &self.nick,
            server_name: &self.server_name,
            devices: &devices,
        };
        for interceptor in self.interceptors.iter_mut() {
            if interceptor.on_server_message(&ctx, &mut msg).await == Flow::Stop {
                return;
            }
        }

        if let Some(code) = msg.numeric() {
            self.server_numeric(code, msg).await;
            return;
        }

        match msg.command.as_str() {
            "PING" => {
                let token = msg.last_arg().unwrap_or_default().to_owned();
                let name = &self.server_name;
                let pong = Message::new("PONG", [format!("{name}!{name}"), token]).with_trailing();
                self.send_upstream(pong).await;
                return;
            }
            "PONG" => return,
            "JOIN" if self.from_self(&msg) => {
                if let Some(room) = msg.arg(0).map(str::to_owned)
                    && self.rooms.insert(&room)
                {
                    self.persist_room(&room, true).await;
                }
            }
            "PART" if self.from_self(&msg) => {
                if let Some(room) = msg.arg(0).map(str::to_owned)
                    && self.rooms.remove(&room)
                {
                    self.persist_room(&room, false).await;
                }
            }
            "KICK" => {
                let kicked_self = msg
                    .arg(1)
                    .is_some_and(|n| n.eq_ignore_ascii_case(&self.nick));
                if kicked_self
                    && let Some(room) = msg.arg(0).map(str::to_owned)
                    && self.rooms.remove(&room)
                {
                    self.persist_room(&room, false).await;
                }
            }
            "TOPIC" => {
                if let (Some(room), Some(topic)) = (msg.arg(0), msg.last_arg())
                    && let Some(entry) = self.rooms.get_mut(room)
                {
                    entry.topic = Some(topic.to_owned());
                    entry.topic_setter = msg.target_user().map(str::to_owned);
                    entry.topic_time = Some(chrono::Utc::now().timestamp().to_string());
                }
            }
            "NICK" if self.from_self(&msg) => {
                if let Some(nick) = msg.last_arg() {
                    info!(old = %self.nick, new = %nick, "Nick changed");
                    self.nick = nick.to_owned();
                }
            }
            _ => {}
        }

        self.broadcast(&msg, None);
    }

    async fn server_numeric(&mut self, code: u16, msg: Message) {
        if is_welcome(code) || code == ERR_NOMOTD {
            self.welcomes.push(msg);
            if code == RPL_ENDOFMOTD || code == ERR_NOMOTD {
                self.ready().await;
            }
            return;
        }

        match code {
            ERR_NICKNAMEINUSE => {
                let nick = format!("{}_", self.nick);
                warn!(taken = %self.nick, trying = %nick, "Nick in use");
                self.nick.clone_from(&nick);
                self.send_upstream(Message::new("NICK", [nick])).await;
                return;
            }
            RPL_TOPIC => {
                if let (Some(room), Some(topic)) = (msg.arg(1), msg.last_arg())
                    && let Some(entry) = self.rooms.get_mut(room)
                {
                    entry.topic = Some(topic.to_owned());
                }
            }
            RPL_TOPICWHOTIME => {
                if let Some(room) = msg.arg(1)
                    && let Some(entry) = self.rooms.get_mut(room)
                {
                    entry.topic_setter = msg.arg(2).map(str::to_owned);
                    entry.topic_time = msg.arg(3).map(str::to_owned);
                }
            }
            _ => {}
        }

        match self.pending.route(code) {
            Route::Only(id) => self.send_to(id, msg),
            Route::Broadcast => self.broadcast(&msg, None),
        }
    }

    /// End of MOTD: run at-connect commands, rejoin rooms, settle away
    /// status and let waiting clients in.
    async fn ready(&mut self) {
        if self.phase == LinkPhase::Ready {
            return;
        }
        self.phase = LinkPhase::Ready;
        info!(phase = %LinkPhase::Ready, nick = %self.nick, "Session ready");

        for line in self.at_connect.clone() {
            match parse_client_command(&line) {
                Ok(msg) => self.send_upstream(msg).await,
                Err(e) => warn!(command = %line, error = %e, "Skipping bad at-connect command"),
            }
        }
        for room in self.rooms.names() {
            self.send_upstream(Message::new("JOIN", [room])).await;
        }
        self.push_away().await;

        for (client, nick) in std::mem::take(&mut self.waiting) {
            self.say(&client, "Now connected.");
            self.activate(client, nick).await;
        }
    }

    fn from_self(&self, msg: &Message) -> bool {
        msg.target_user()
            .is_some_and(|n| n.eq_ignore_ascii_case(&self.nick))
    }

    async fn persist_room(&self, room: &str, joined: bool) {
        let rooms = self.db.rooms();
        let result = if joined {
            rooms.add(self.info.network_user_id, room).await
        } else {
            rooms.remove(self.info.network_user_id, room).await
        };
        if let Err(e) = result {
            warn!(room = %room, error = %e, "Failed to persist room membership");
        }
    }
}
