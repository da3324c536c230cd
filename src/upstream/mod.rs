//! The link from a session to its IRC server.
//!
//! One connector task per session walks the link state machine:
//!
//! ```text
//! Idle -> Resolving -> Connecting -> TlsHandshake -> Registering -> Ready
//!   ^                                                                |
//!   +------------------------- link lost ----------------------------+
//! ```
//!
//! The connector only moves bytes. Registration and everything after it
//! belongs to the session, which receives [`UpstreamEvent`]s and writes
//! through the sender handed over in [`UpstreamEvent::Connected`].

mod backoff;
mod resolve;
mod stream;
mod tls;

pub use backoff::Backoff;
pub use resolve::{Candidate, Resolver, order_candidates};
pub use stream::UpstreamStream;

use futures_util::{SinkExt, StreamExt};
use slbnc_proto::{IrcCodec, Message};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;
use tokio_util::codec::Framed;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::db::Database;
use crate::error::BouncerError;

const OUTGOING_QUEUE: usize = 256;

/// Where a link is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPhase {
    Idle,
    Resolving,
    Connecting,
    TlsHandshake,
    Registering,
    Ready,
}

impl fmt::Display for LinkPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkPhase::Idle => "idle",
            LinkPhase::Resolving => "resolving",
            LinkPhase::Connecting => "connecting",
            LinkPhase::TlsHandshake => "tls-handshake",
            LinkPhase::Registering => "registering",
            LinkPhase::Ready => "ready",
        };
        f.write_str(name)
    }
}

/// What the connector reports to its session.
#[derive(Debug)]
pub enum UpstreamEvent {
    /// A transport is up; messages sent here go to the server. Dropping the
    /// sender drops the link.
    Connected(mpsc::Sender<Message>),
    Line(Message),
    Disconnected(String),
}

/// Everything a connector needs to know about its network.
#[derive(Clone)]
pub struct UpstreamParams {
    pub network_id: i64,
    pub network: String,
    pub db: Database,
    pub connect_timeout: Duration,
    pub reconnect_delay: Duration,
}

/// Start the connector. It runs until the session drops its event receiver.
pub fn spawn(params: UpstreamParams, events: mpsc::Sender<UpstreamEvent>) -> JoinHandle<()> {
    let span = info_span!("upstream", network = %params.network);
    tokio::spawn(Connector::new(params, events).run().instrument(span))
}

enum LinkEnd {
    Lost(String),
    SessionGone,
}

struct Connector {
    params: UpstreamParams,
    events: mpsc::Sender<UpstreamEvent>,
    resolver: Resolver,
    tls: Option<TlsConnector>,
}

impl Connector {
    fn new(params: UpstreamParams, events: mpsc::Sender<UpstreamEvent>) -> Self {
        let tls = match tls::connector() {
            Ok(connector) => Some(connector),
            Err(e) => {
                warn!(error = %e, "TLS unavailable; ssl hosts will be skipped");
                None
            }
        };
        Self {
            params,
            events,
            resolver: Resolver::new(),
            tls,
        }
    }

    async fn run(self) {
        let mut backoff = Backoff::new(self.params.reconnect_delay);
        loop {
            let wait = backoff.delay(Instant::now());
            if !wait.is_zero() {
                debug!(phase = %LinkPhase::Idle, wait_ms = wait.as_millis() as u64, "Waiting before reconnect");
                tokio::time::sleep(wait).await;
            }
            if self.events.is_closed() {
                return;
            }
            backoff.attempt(Instant::now());

            let Some((stream, candidate)) = self.establish().await else {
                continue;
            };

            info!(phase = %LinkPhase::Registering, addr = %candidate.addr, ssl = candidate.ssl, "Upstream connected");
            match self.pump(stream).await {
                LinkEnd::SessionGone => return,
                LinkEnd::Lost(reason) => {
                    info!(phase = %LinkPhase::Idle, %reason, "Upstream link lost");
                    if self
                        .events
                        .send(UpstreamEvent::Disconnected(reason))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
            }
        }
    }

    /// Resolve and try each candidate in turn.
    async fn establish(&self) -> Option<(UpstreamStream, Candidate)> {
        let hosts = match self.params.db.networks().hosts(self.params.network_id).await {
            Ok(hosts) => hosts,
            Err(e) => {
                warn!(error = %e, "Failed to load upstream hosts");
                return None;
            }
        };
        if hosts.is_empty() {
            warn!("No hosts configured");
            return None;
        }

        debug!(phase = %LinkPhase::Resolving, hosts = hosts.len(), "Resolving upstream hosts");
        let candidates = self.resolver.resolve(&hosts).await;

        for candidate in candidates {
            match self.connect(&candidate).await {
                Ok(stream) => return Some((stream, candidate)),
                Err(e) => {
                    debug!(addr = %candidate.addr, error = %e, "Connection attempt failed");
                }
            }
        }

        let err = BouncerError::UpstreamUnreachable(self.params.network.clone());
        warn!(error = %err, code = err.error_code(), "All upstream addresses failed");
        None
    }

    async fn connect(&self, candidate: &Candidate) -> std::io::Result<UpstreamStream> {
        debug!(phase = %LinkPhase::Connecting, addr = %candidate.addr, "Connecting");
        let tcp = tokio::time::timeout(
            self.params.connect_timeout,
            TcpStream::connect(candidate.addr),
        )
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"))??;
        let _ = tcp.set_nodelay(true);

        if !candidate.ssl {
            return Ok(UpstreamStream::Plain(tcp));
        }

        let connector = self
            .tls
            .as_ref()
            .ok_or_else(|| std::io::Error::other("TLS unavailable"))?;
        debug!(phase = %LinkPhase::TlsHandshake, host = %candidate.host, "Starting TLS");
        let tls = tokio::time::timeout(
            self.params.connect_timeout,
            tls::handshake(connector, &candidate.host, tcp),
        )
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "TLS handshake timed out"))??;
        Ok(UpstreamStream::Tls(Box::new(tls)))
    }

    /// Move lines both ways until either side goes away.
    ///
    /// Writes run on their own task so that a session blocked on a full
    /// outgoing queue never waits on this reader, which may itself be
    /// waiting for the session to take a line.
    async fn pump(&self, stream: UpstreamStream) -> LinkEnd {
        let (mut sink, mut lines) = Framed::new(stream, IrcCodec::new()).split();
        let (tx, mut outgoing) = mpsc::channel::<Message>(OUTGOING_QUEUE);
        if self.events.send(UpstreamEvent::Connected(tx)).await.is_err() {
            return LinkEnd::SessionGone;
        }

        let mut writer = tokio::spawn(
            async move {
                while let Some(msg) = outgoing.recv().await {
                    sink.send(msg).await?;
                }
                SinkExt::<Message>::close(&mut sink).await
            }
            .in_current_span(),
        );

        let end = loop {
            tokio::select! {
                frame = lines.next() => match frame {
                    Some(Ok(Ok(msg))) => {
                        if self.events.send(UpstreamEvent::Line(msg)).await.is_err() {
                            break LinkEnd::SessionGone;
                        }
                    }
                    Some(Ok(Err(e))) => {
                        warn!(error = %e, "Ignoring malformed line from server");
                    }
                    Some(Err(e)) => break LinkEnd::Lost(e.to_string()),
                    None => break LinkEnd::Lost("connection closed by server".to_owned()),
                },
                written = &mut writer => break match written {
                    Ok(Ok(())) => LinkEnd::Lost("link dropped by session".to_owned()),
                    Ok(Err(e)) => LinkEnd::Lost(e.to_string()),
                    Err(e) => LinkEnd::Lost(e.to_string()),
                },
            }
        };
        writer.abort();
        end
    }
}
