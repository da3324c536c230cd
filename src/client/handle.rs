//! The session-facing side of a client connection.

use slbnc_proto::Message;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};

use crate::error::{BouncerError, BouncerResult};

/// Process-unique connection id.
pub type ConnId = u64;

/// Outbound queue depth per client.
pub const CLIENT_QUEUE: usize = 512;

/// Instructions for a client connection's writer.
#[derive(Debug)]
pub enum ClientCommand {
    Send(Message),
    /// Say `reason` from the pseudo identity (if any), send `ERROR`, close.
    Close(Option<String>),
}

/// Cheap, cloneable handle to one attached client.
#[derive(Clone)]
pub struct ClientHandle {
    pub id: ConnId,
    pub device: String,
    tx: mpsc::Sender<ClientCommand>,
    /// Raised when a close could not be queued.
    abort: Arc<watch::Sender<bool>>,
    tag_capable: Arc<AtomicBool>,
}

impl ClientHandle {
    pub fn new(id: ConnId, device: impl Into<String>, tx: mpsc::Sender<ClientCommand>) -> Self {
        Self {
            id,
            device: device.into(),
            tx,
            abort: Arc::new(watch::channel(false).0),
            tag_capable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Fires once the connection must drop without writing anything more.
    pub fn aborted(&self) -> watch::Receiver<bool> {
        self.abort.subscribe()
    }

    /// Whether the client negotiated a capability that carries tags.
    pub fn tag_capable(&self) -> bool {
        self.tag_capable.load(Ordering::Relaxed)
    }

    pub fn set_tag_capable(&self, capable: bool) {
        self.tag_capable.store(capable, Ordering::Relaxed);
    }

    /// Queue a message, waiting for room.
    pub async fn send(&self, msg: Message) -> BouncerResult<()> {
        self.tx
            .send(ClientCommand::Send(msg))
            .await
            .map_err(|_| BouncerError::SessionClosed)
    }

    /// Queue a message without waiting. Returns `false` if the client is
    /// gone or its queue is full.
    pub fn try_send(&self, msg: Message) -> bool {
        self.tx.try_send(ClientCommand::Send(msg)).is_ok()
    }

    /// Close after whatever is already queued. A client whose queue is full
    /// is not reading, so it is aborted instead.
    pub fn close(&self, reason: Option<String>) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(ClientCommand::Close(reason)) {
            self.abort.send_replace(true);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("id", &self.id)
            .field("device", &self.device)
            .field("tag_capable", &self.tag_capable())
            .finish()
    }
}

#[cfg(test)]
pub(crate) fn test_handle(id: ConnId, device: &str) -> (ClientHandle, mpsc::Receiver<ClientCommand>) {
    let (tx, rx) = mpsc::channel(CLIENT_QUEUE);
    (ClientHandle::new(id, device, tx), rx)
}
