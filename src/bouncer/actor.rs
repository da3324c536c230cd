//! The session actor and its event loop.

use slbnc_proto::Message;
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};

use super::away::AwayTracker;
use super::interceptor::{MessageInterceptor, SessionContext, SessionInfo, pseudo_prefix};
use super::rooms::{Rooms, simulated_join};
use super::routing::PendingReplies;
use super::{BouncerEvent, SessionStatus};
use crate::client::handle::{ClientHandle, ConnId};
use crate::db::Database;
use crate::upstream::{LinkPhase, UpstreamEvent, UpstreamParams};

/// Everything needed to start a session.
#[derive(Clone)]
pub struct BouncerParams {
    pub info: SessionInfo,
    /// Initial nick.
    pub nick: String,
    /// Name of the pseudo identity and the bouncer's own server name.
    pub server_name: String,
    /// Raw commands run once the session is ready, network's first.
    pub at_connect: Vec<String>,
    /// Persisted room names to rejoin.
    pub rooms: Vec<String>,
    pub db: Database,
    pub upstream: UpstreamParams,
}

pub(super) struct Bouncer {
    pub(super) info: SessionInfo,
    pub(super) server_name: String,
    pub(super) db: Database,
    pub(super) nick: String,
    pub(super) phase: LinkPhase,
    pub(super) upstream: Option<mpsc::Sender<Message>>,
    pub(super) clients: BTreeMap<ConnId, ClientHandle>,
    /// Attached before the session was ready, with the nick they used.
    pub(super) waiting: Vec<(ClientHandle, String)>,
    pub(super) away: AwayTracker,
    pub(super) rooms: Rooms,
    pub(super) welcomes: Vec<Message>,
    pub(super) pending: PendingReplies,
    pub(super) at_connect: Vec<String>,
    pub(super) interceptors: Vec<Box<dyn MessageInterceptor>>,
    connector: Option<JoinHandle<()>>,
}

impl Bouncer {
    pub(super) fn spawn(
        params: BouncerParams,
        interceptors: Vec<Box<dyn MessageInterceptor>>,
        events: mpsc::Receiver<BouncerEvent>,
        upstream: mpsc::Receiver<UpstreamEvent>,
        connector: Option<JoinHandle<()>>,
    ) {
        let span = info_span!(
            "session",
            user = %params.info.username,
            network = %params.info.network
        );
        let actor = Self {
            info: params.info,
            server_name: params.server_name,
            db: params.db,
            nick: params.nick,
            phase: LinkPhase::Idle,
            upstream: None,
            clients: BTreeMap::new(),
            waiting: Vec::new(),
            away: AwayTracker::default(),
            rooms: Rooms::from_names(params.rooms),
            welcomes: Vec::new(),
            pending: PendingReplies::default(),
            at_connect: params.at_connect,
            interceptors,
            connector,
        };
        tokio::spawn(actor.run(events, upstream).instrument(span));
    }

    async fn run(
        mut self,
        mut events: mpsc::Receiver<BouncerEvent>,
        mut upstream: mpsc::Receiver<UpstreamEvent>,
    ) {
        info!("Session started");
        loop {
            // Upstream lines already queued are handled before client events.
            tokio::select! {
                biased;
                Some(event) = upstream.recv() => self.handle_upstream(event).await,
                event = events.recv() => match event {
                    Some(BouncerEvent::Shutdown) | None => break,
                    Some(event) => self.handle_event(event).await,
                },
            }
        }

        self.close_all("The IRC session was closed.");
        if let Some(connector) = self.connector.take() {
            connector.abort();
        }
        info!("Session stopped");
    }

    async fn handle_event(&mut self, event: BouncerEvent) {
        match event {
            BouncerEvent::Attach { client, nick } => self.attach(client, nick).await,
            BouncerEvent::Detach(id) => self.detach(id).await,
            BouncerEvent::ClientMessage(id, msg) => self.client_msg(id, msg).await,
            BouncerEvent::Status(reply) => {
                let _ = reply.send(self.status());
            }
            BouncerEvent::Disconnect => {
                info!("Session disconnected by request");
                self.close_all("Disconnected by an administrator.");
                self.link_down();
            }
            BouncerEvent::Shutdown => {}
        }
    }

    async fn handle_upstream(&mut self, event: UpstreamEvent) {
        match event {
            UpstreamEvent::Connected(tx) => {
                self.upstream = Some(tx);
                self.phase = LinkPhase::Registering;
                self.welcomes.clear();
                self.pending.clear();
                self.away.reset();

                let name = &self.server_name;
                let user = &self.info.username;
                let register = Message::new(
                    "USER",
                    [
                        user.clone(),
                        "somehost".to_owned(),
                        name.clone(),
                        format!("{user}@{name}"),
                    ],
                )
                .with_trailing();
                self.send_upstream(register).await;
                self.send_upstream(Message::new("NICK", [self.nick.clone()])).await;
            }
            UpstreamEvent::Line(msg) => self.server_msg(msg).await,
            UpstreamEvent::Disconnected(reason) => {
                if self.phase != LinkPhase::Idle {
                    info!(%reason, "Upstream link lost; closing attached clients");
                }
                self.close_active("Lost connection to the IRC server.");
                self.link_down();
            }
        }
    }

    fn link_down(&mut self) {
        self.upstream = None;
        self.phase = LinkPhase::Idle;
        self.welcomes.clear();
        self.pending.clear();
    }

    async fn attach(&mut self, client: ClientHandle, nick: String) {
        debug!(conn_id = client.id, device = %client.device, "Client attaching");
        self.away.attach(client.id);

        if self.phase != LinkPhase::Ready {
            self.say(&client, "Connecting you to the IRC server. Please wait...");
            self.waiting.push((client, nick));
            return;
        }
        self.activate(client, nick).await;
    }

    /// Bring a client up to date with the session and start routing to it.
    pub(super) async fn activate(&mut self, client: ClientHandle, registered_nick: String) {
        let mut burst = Vec::new();
        if registered_nick != self.nick {
            burst.push(Message::new("NICK", [self.nick.clone()]).with_prefix(registered_nick));
        }
        for welcome in &self.welcomes {
            let mut msg = welcome.clone();
            if let Some(first) = msg.args.first_mut() {
                first.clone_from(&self.nick);
            }
            burst.push(msg);
        }
        let mut names = Vec::new();
        for (name, room) in self.rooms.iter() {
            burst.extend(simulated_join(&self.nick, &self.server_name, name, room));
            names.push(name.to_owned());
        }
        for msg in burst {
            if !client.try_send(msg) {
                warn!(conn_id = client.id, "Client queue full during attach");
                client.close(None);
                return;
            }
        }

        self.clients.insert(client.id, client.clone());
        for name in names {
            self.pending.flag("NAMES", client.id);
            self.send_upstream(Message::new("NAMES", [name])).await;
        }

        let devices = self.devices();
        let ctx = SessionContext {
            nick: &self.nick,
            server_name: &self.server_name,
            devices: &devices,
        };
        for interceptor in self.interceptors.iter_mut() {
            interceptor.on_client_attached(&ctx, &client).await;
        }

        info!(conn_id = client.id, device = %client.device, "Client attached");
        self.push_away().await;
    }

    async fn detach(&mut self, id: ConnId) {
        let was_active = self.clients.remove(&id).is_some();
        self.waiting.retain(|(c, _)| c.id != id);
        self.away.detach(id);
        if was_active {
            debug!(conn_id = id, "Client detached");
        }
        self.push_away().await;
    }

    /// Tell the upstream about a changed aggregate away status.
    pub(super) async fn push_away(&mut self) {
        if self.phase != LinkPhase::Ready {
            return;
        }
        if let Some(msg) = self.away.update() {
            self.send_upstream(msg).await;
        }
    }

    pub(super) async fn send_upstream(&self, msg: Message) {
        match &self.upstream {
            Some(tx) => {
                if tx.send(msg).await.is_err() {
                    debug!("Upstream link gone; dropping message");
                }
            }
            None => debug!(command = %msg.command, "No upstream link; dropping message"),
        }
    }

    /// Send to every active client except `skip`. A client whose queue is
    /// full is closed rather than allowed to stall the session.
    pub(super) fn broadcast(&mut self, msg: &Message, skip: Option<ConnId>) {
        let mut stalled = Vec::new();
        for (id, client) in &self.clients {
            if Some(*id) == skip {
                continue;
            }
            if !client.try_send(msg.clone()) && !client.is_closed() {
                stalled.push(*id);
            }
        }
        for id in stalled {
            if let Some(client) = self.clients.remove(&id) {
                warn!(conn_id = id, device = %client.device, "Client too slow; closing");
                client.close(Some("Client is not reading fast enough.".to_owned()));
                self.away.detach(id);
            }
        }
    }

    /// Send a routed reply to the client that asked for it, or to everyone
    /// once that client is gone.
    pub(super) fn send_to(&mut self, id: ConnId, msg: Message) {
        match self.clients.get(&id) {
            Some(client) => {
                client.try_send(msg);
            }
            None => self.broadcast(&msg, None),
        }
    }

    /// A PRIVMSG from the pseudo identity.
    pub(super) fn say(&self, client: &ClientHandle, text: &str) {
        let msg = Message::privmsg(&self.nick, text).with_prefix(pseudo_prefix(&self.server_name));
        client.try_send(msg);
    }

    pub(super) fn devices(&self) -> Vec<String> {
        self.clients.values().map(|c| c.device.clone()).collect()
    }

    pub(super) fn find_client(&self, id: ConnId) -> Option<ClientHandle> {
        self.clients.get(&id).cloned().or_else(|| {
            self.waiting
                .iter()
                .find(|(c, _)| c.id == id)
                .map(|(c, _)| c.clone())
        })
    }

    fn close_active(&mut self, reason: &str) {
        for (id, client) in std::mem::take(&mut self.clients) {
            client.close(Some(reason.to_owned()));
            self.away.detach(id);
        }
    }

    fn close_all(&mut self, reason: &str) {
        self.close_active(reason);
        for (client, _) in self.waiting.drain(..) {
            client.close(Some(reason.to_owned()));
            self.away.detach(client.id);
        }
    }

    fn status(&self) -> SessionStatus {
        let mut devices = self.devices();
        devices.extend(self.waiting.iter().map(|(c, _)| c.device.clone()));
        SessionStatus {
            username: self.info.username.clone(),
            network: self.info.network.clone(),
            nick: self.nick.clone(),
            phase: self.phase,
            devices,
            rooms: self.rooms.names(),
        }
    }
}
