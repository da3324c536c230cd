//! Session core: one actor per (user, network).
//!
//! The actor owns the upstream link, the attached clients, room membership
//! and away state. Clients and the upstream connector only talk to it through
//! its event queue, so all session state has a single writer.
//!
//! # Life of a session
//!
//! - The connector reports a transport; the actor registers with `USER` and
//!   `NICK` and buffers the welcome numerics.
//! - End of MOTD makes the session ready: at-connect commands run, rooms are
//!   rejoined, and clients that attached early are let in.
//! - Losing the link closes every attached client and the connector starts
//!   over.

mod actor;
mod away;
mod client_msg;
pub mod interceptor;
mod rooms;
mod routing;
mod server_msg;

pub use actor::BouncerParams;
pub use away::AwayTracker;
pub use interceptor::{Flow, InterceptorFactory, MessageInterceptor, SessionContext, SessionInfo};
pub use rooms::{Room, Rooms};
pub use routing::{PendingReplies, Route};

use slbnc_proto::Message;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::client::handle::{ClientHandle, ConnId};
use crate::error::{BouncerError, BouncerResult};
use crate::upstream::{LinkPhase, UpstreamEvent};

const EVENT_QUEUE: usize = 1024;

/// Requests into a session actor.
#[derive(Debug)]
pub enum BouncerEvent {
    /// A client finished authenticating. `nick` is what it registered with.
    Attach { client: ClientHandle, nick: String },
    Detach(ConnId),
    ClientMessage(ConnId, Message),
    Status(oneshot::Sender<SessionStatus>),
    /// Close every client and drop the upstream link; the connector
    /// reconnects on its own.
    Disconnect,
    Shutdown,
}

/// Snapshot of a session for the admin layer.
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub username: String,
    pub network: String,
    pub nick: String,
    pub phase: LinkPhase,
    pub devices: Vec<String>,
    pub rooms: Vec<String>,
}

/// Cloneable handle to a running session.
#[derive(Clone)]
pub struct BouncerHandle {
    tx: mpsc::Sender<BouncerEvent>,
    info: Arc<SessionInfo>,
}

impl BouncerHandle {
    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub async fn attach(&self, client: ClientHandle, nick: String) -> BouncerResult<()> {
        self.send(BouncerEvent::Attach { client, nick }).await
    }

    pub async fn detach(&self, id: ConnId) {
        let _ = self.send(BouncerEvent::Detach(id)).await;
    }

    pub async fn client_message(&self, id: ConnId, msg: Message) -> BouncerResult<()> {
        self.send(BouncerEvent::ClientMessage(id, msg)).await
    }

    pub async fn status(&self) -> BouncerResult<SessionStatus> {
        let (tx, rx) = oneshot::channel();
        self.send(BouncerEvent::Status(tx)).await?;
        rx.await.map_err(|_| BouncerError::SessionClosed)
    }

    pub async fn disconnect(&self) -> BouncerResult<()> {
        self.send(BouncerEvent::Disconnect).await
    }

    pub async fn shutdown(&self) {
        let _ = self.send(BouncerEvent::Shutdown).await;
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn send(&self, event: BouncerEvent) -> BouncerResult<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| BouncerError::SessionClosed)
    }
}

/// Start a session together with its upstream connector.
pub fn spawn(params: BouncerParams, interceptors: Vec<Box<dyn MessageInterceptor>>) -> BouncerHandle {
    let (up_tx, up_rx) = mpsc::channel(EVENT_QUEUE);
    let connector = crate::upstream::spawn(params.upstream.clone(), up_tx);
    start(params, interceptors, up_rx, Some(connector))
}

/// Start a session whose upstream events come from the caller.
pub fn spawn_with_link(
    params: BouncerParams,
    interceptors: Vec<Box<dyn MessageInterceptor>>,
) -> (BouncerHandle, mpsc::Sender<UpstreamEvent>) {
    let (up_tx, up_rx) = mpsc::channel(EVENT_QUEUE);
    (start(params, interceptors, up_rx, None), up_tx)
}

fn start(
    params: BouncerParams,
    interceptors: Vec<Box<dyn MessageInterceptor>>,
    upstream: mpsc::Receiver<UpstreamEvent>,
    connector: Option<tokio::task::JoinHandle<()>>,
) -> BouncerHandle {
    let (tx, rx) = mpsc::channel(EVENT_QUEUE);
    let info = Arc::new(params.info.clone());
    actor::Bouncer::spawn(params, interceptors, rx, upstream, connector);
    BouncerHandle { tx, info }
}
