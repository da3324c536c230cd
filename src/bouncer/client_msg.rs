//! Messages from attached clients.

use slbnc_proto::Message;
use tracing::{debug, trace};

use super::actor::Bouncer;
use super::interceptor::{Flow, SessionContext};
use crate::client::handle::{ClientHandle, ConnId};

/// Commands a connected client can send to the pseudo identity.
const SESSION_HELP: &[&str] = &[
    "Commands:",
    "  help                       this list",
    "  backlog [context] [hours]  replay recent history (hours may end in 'd' for days)",
    "  timezone [offset|local]    show or set this device's offset for replay timestamps",
];

impl Bouncer {
    pub(super) async fn client_msg(&mut self, id: ConnId, mut msg: Message) {
        let Some(client) = self.find_client(id) else {
            debug!(conn_id = id, "Message from unknown client dropped");
            return;
        };
        trace!(conn_id = id, line = %msg, "from client");

        msg.prefix = None;
        msg.strip_tags();

        let devices = self.devices();
        let ctx = SessionContext {
            nick: &self.nick,
            server_name: &self.server_name,
            devices: &devices,
        };
        for interceptor in self.interceptors.iter_mut() {
            if interceptor.on_client_message(&ctx, &client, &mut msg).await == Flow::Stop {
                trace!(interceptor = interceptor.name(), "Client message consumed");
                return;
            }
        }

        match msg.command.as_str() {
            "PING" => {
                let token = msg.last_arg().unwrap_or_default();
                let name = &self.server_name;
                let pong = Message::new("PONG", [name.as_str(), token])
                    .with_prefix(format!("{name}!{name}"))
                    .with_trailing();
                client.try_send(pong);
                return;
            }
            "PONG" | "QUIT" | "CAP" | "PASS" | "USER" | "AUTHENTICATE" => return,
            "AWAY" => {
                self.away.set(id, msg.arg(0));
                self.push_away().await;
                return;
            }
            "NICK" => {
                if let Some(nick) = msg.arg(0) {
                    self.nick = nick.to_owned();
                }
            }
            "WHO" | "NAMES" => self.pending.flag(&msg.command, id),
            "PRIVMSG" if self.is_pseudo_target(&msg) => {
                self.console_reply(&client, &msg);
                return;
            }
            _ => {}
        }

        self.send_upstream(msg.clone()).await;

        if msg.is("PRIVMSG") && (!msg.is_ctcp() || msg.is_action()) {
            let mut echo = msg;
            echo.readdress_to(&self.nick);
            self.broadcast(&echo, Some(id));
        }
    }

    fn is_pseudo_target(&self, msg: &Message) -> bool {
        msg.arg(0)
            .and_then(|t| t.strip_prefix('-'))
            .is_some_and(|name| name.eq_ignore_ascii_case(&self.server_name))
    }

    fn console_reply(&self, client: &ClientHandle, msg: &Message) {
        let text = msg.last_arg().unwrap_or_default();
        let command = text.split_whitespace().next().unwrap_or("help");
        if command.eq_ignore_ascii_case("help") {
            for line in SESSION_HELP {
                self.say(client, line);
            }
        } else {
            self.say(client, &format!("Unknown command: {command}. Try 'help'."));
        }
    }
}
