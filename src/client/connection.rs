//! One client connection, from the first line to the close.
//!
//! A single task owns the framed socket. It reads client lines, writes
//! whatever the session queues on the [`ClientHandle`], and runs the
//! keepalive timer:
//!
//! ```text
//!   socket ──lines──▶ ┌──────────────┐ ──events──▶ session actor
//!                     │  Connection  │
//!   socket ◀─writes── └──────▲───────┘ ◀─ClientCommand── session actor
//!                            │
//!                       keepalive
//! ```
//!
//! Registration is incremental: PASS, NICK, USER and SASL may arrive in
//! any order, and the connection is attached as soon as enough is known.

use futures_util::{FutureExt, SinkExt, StreamExt};
use slbnc_proto::{IrcCodec, Message, ProtocolError, numeric};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep_until};
use tokio_util::codec::Framed;
use tracing::{Span, debug, error, info, instrument, trace, warn};

use super::cap::{CAP_SASL, ClientCaps};
use super::console;
use super::handle::{CLIENT_QUEUE, ClientCommand, ClientHandle, ConnId};
use super::keepalive::{Keepalive, KeepaliveAction};
use super::login::{DEFAULT_DEVICE, Login};
use super::sasl::{SaslCredentials, SaslExchange, SaslStep, encode_challenge};
use crate::bouncer::BouncerHandle;
use crate::bouncer::interceptor::pseudo_prefix;
use crate::config::RegistrationMode;
use crate::db::{Role, User};
use crate::error::{BouncerError, BouncerResult};
use crate::registry::Registry;
use crate::security::SecureString;

enum State {
    /// Collecting PASS, NICK, USER and SASL.
    Auth,
    /// Unknown account under open registration, waiting for a password.
    Registration,
    Connected(BouncerHandle),
    Console,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Continue,
    Close,
}

/// A client connection handler.
pub struct Connection<S> {
    id: ConnId,
    addr: SocketAddr,
    registry: Arc<Registry>,
    framed: Framed<S, IrcCodec>,
    outgoing: mpsc::Receiver<ClientCommand>,
    aborted: watch::Receiver<bool>,
    handle: ClientHandle,
    state: State,
    caps: ClientCaps,
    /// Between `CAP LS`/`REQ` and `CAP END`.
    negotiating: bool,
    nick: Option<String>,
    login: Option<Login>,
    password: Option<SecureString>,
    user: Option<User>,
    sasl: Option<SaslExchange>,
    keepalive: Keepalive,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(id: ConnId, stream: S, addr: SocketAddr, registry: Arc<Registry>) -> Self {
        let (tx, outgoing) = mpsc::channel(CLIENT_QUEUE);
        let timeouts = registry.timeouts();
        let keepalive = Keepalive::new(timeouts.ping_interval(), timeouts.ping_timeout());
        let handle = ClientHandle::new(id, DEFAULT_DEVICE, tx);
        Self {
            id,
            addr,
            framed: Framed::new(stream, IrcCodec::new()),
            outgoing,
            aborted: handle.aborted(),
            handle,
            registry,
            state: State::Auth,
            caps: ClientCaps::default(),
            negotiating: false,
            nick: None,
            login: None,
            password: None,
            user: None,
            sasl: None,
            keepalive,
        }
    }

    /// Run the connection until either side closes it.
    #[instrument(
        skip(self),
        fields(conn_id = self.id, addr = %self.addr, login = tracing::field::Empty),
        name = "client"
    )]
    pub async fn run(mut self) {
        info!("Client connected");

        loop {
            let wake = self.keepalive.wake_at();
            let control = tokio::select! {
                frame = self.framed.next() => match frame {
                    Some(Ok(Ok(msg))) => self.failsafe(msg).await,
                    Some(Ok(Err(err))) => {
                        warn!(error = %err, "Skipping malformed line");
                        Control::Continue
                    }
                    Some(Err(err)) => {
                        debug!(error = %err, "Read failed");
                        Control::Close
                    }
                    None => Control::Close,
                },
                Some(command) = self.outgoing.recv() => self.outgoing_command(command).await,
                Ok(()) = self.aborted.wait_for(|aborted| *aborted).map(|r| r.map(drop)) => {
                    info!("Client not reading; dropping connection");
                    Control::Close
                }
                _ = wait_until(wake) => self.on_keepalive().await,
            };
            if control == Control::Close {
                break;
            }
        }

        if let State::Connected(bouncer) = &self.state {
            bouncer.detach(self.id).await;
        }
        // An aborted client is not reading; flushing would never finish.
        if !*self.aborted.borrow() {
            let _ = SinkExt::<Message>::close(&mut self.framed).await;
        }
        info!("Client disconnected");
    }

    /// Any error while handling one line closes this connection and nothing
    /// else.
    async fn failsafe(&mut self, msg: Message) -> Control {
        match self.handle_line(msg).await {
            Ok(control) => control,
            Err(err) => {
                match &err {
                    BouncerError::AuthenticationFailed(_) | BouncerError::UnknownTarget(_) => {
                        info!(error = %err, code = err.error_code(), "Client rejected");
                    }
                    _ => error!(error = %err, code = err.error_code(), "Client line failed"),
                }
                self.fail(&err.user_message()).await;
                Control::Close
            }
        }
    }

    async fn handle_line(&mut self, msg: Message) -> BouncerResult<Control> {
        trace!(line = %msg, "from client");
        let registry = Arc::clone(&self.registry);
        let command = msg.command.to_ascii_uppercase();

        if command.eq_ignore_ascii_case(registry.server_name()) {
            let text = msg.args.join(" ");
            return match self.state {
                State::Connected(_) => {
                    let target = format!("-{}", registry.server_name());
                    self.forward(Message::privmsg(&target, &text)).await
                }
                State::Auth => Ok(Control::Continue),
                _ => self.pseudo(&text).await,
            };
        }

        match command.as_str() {
            "PRIVMSG"
                if matches!(self.state, State::Registration | State::Console)
                    && self.is_pseudo_target(&msg) =>
            {
                let text = msg.last_arg().unwrap_or_default().to_owned();
                self.pseudo(&text).await
            }
            "PONG" => {
                self.keepalive.on_pong(Instant::now());
                Ok(Control::Continue)
            }
            "CAP" => self.cap(&msg).await,
            "PASS" if matches!(self.state, State::Auth) => {
                self.password = msg.arg(0).map(|p| SecureString::new(p.to_owned()));
                Ok(Control::Continue)
            }
            "AUTHENTICATE" if self.caps.has(CAP_SASL) => {
                if matches!(self.state, State::Auth) {
                    self.authenticate(&msg).await
                } else {
                    self.reply(numeric::ERR_SASLALREADY, &["Already authenticated"])
                        .await?;
                    Ok(Control::Continue)
                }
            }
            "NICK" if matches!(self.state, State::Auth) => {
                self.nick = msg.arg(0).map(str::to_owned);
                self.maybe_connect().await
            }
            "USER" if matches!(self.state, State::Auth) => {
                if self.login.is_none() {
                    self.login = msg.arg(0).map(Login::parse);
                }
                self.maybe_connect().await
            }
            "QUIT" => Ok(Control::Close),
            "PING" if !matches!(self.state, State::Connected(_)) => {
                let token = msg.last_arg().unwrap_or_default();
                self.send(Message::new("PONG", [token])).await?;
                Ok(Control::Continue)
            }
            _ => match self.state {
                State::Auth => {
                    self.fail("Protocol error. You must authenticate first.")
                        .await;
                    Ok(Control::Close)
                }
                State::Connected(_) => self.forward(msg).await,
                State::Registration | State::Console => {
                    self.say("You must connect to an IRC network to do that.")
                        .await?;
                    Ok(Control::Continue)
                }
            },
        }
    }

    async fn forward(&mut self, msg: Message) -> BouncerResult<Control> {
        if let State::Connected(bouncer) = &self.state {
            bouncer.client_message(self.id, msg).await?;
        }
        Ok(Control::Continue)
    }

    async fn cap(&mut self, msg: &Message) -> BouncerResult<Control> {
        let registry = Arc::clone(&self.registry);
        let caps = registry.caps();
        let sub = msg.arg(0).unwrap_or_default().to_ascii_uppercase();

        match sub.as_str() {
            "LS" => {
                self.negotiating = true;
                self.cap_reply("LS", &caps.ls()).await?;
            }
            "REQ" => {
                self.negotiating = true;
                let req = msg.arg(1).unwrap_or_default().to_owned();
                match self.caps.request(caps, &req) {
                    Ok(()) => {
                        self.handle.set_tag_capable(self.caps.tag_capable(caps));
                        self.cap_reply("ACK", &req).await?;
                    }
                    Err(err) => {
                        debug!(error = %err, "CAP REQ rejected");
                        self.cap_reply("NAK", &req).await?;
                    }
                }
            }
            "LIST" => {
                let list = self.caps.list();
                self.cap_reply("LIST", &list).await?;
            }
            "CLEAR" => {
                let acked = self.caps.clear();
                self.handle.set_tag_capable(false);
                self.cap_reply("ACK", &acked).await?;
            }
            "END" => {
                self.negotiating = false;
                if matches!(self.state, State::Auth) {
                    return self.maybe_connect().await;
                }
            }
            _ => {
                self.fail("Unrecognized CAP subcommand").await;
                return Ok(Control::Close);
            }
        }
        Ok(Control::Continue)
    }

    async fn cap_reply(&mut self, sub: &str, list: &str) -> Result<(), ProtocolError> {
        let nick = self.current_nick().to_owned();
        let msg = Message::new("CAP", [nick.as_str(), sub, list])
            .with_prefix(self.registry.server_name())
            .with_trailing();
        self.send(msg).await
    }

    async fn authenticate(&mut self, msg: &Message) -> BouncerResult<Control> {
        let registry = Arc::clone(&self.registry);
        let arg = msg.arg(0).unwrap_or_default();

        if arg == "*" {
            self.sasl = None;
            self.reply(numeric::ERR_SASLABORTED, &["SASL authentication aborted"])
                .await?;
            return Ok(Control::Continue);
        }

        let step = if let Some(exchange) = self.sasl.as_mut() {
            exchange.feed(arg)
        } else {
            match registry.sasl().start(arg) {
                Some(mut exchange) => {
                    let step = exchange.begin();
                    self.sasl = Some(exchange);
                    step.map(Some)
                }
                None => {
                    self.reply(numeric::ERR_SASLFAIL, &["SASL mechanism not supported"])
                        .await?;
                    return Ok(Control::Continue);
                }
            }
        };

        match step {
            Ok(None) => Ok(Control::Continue),
            Ok(Some(SaslStep::Challenge(challenge))) => {
                for chunk in encode_challenge(&challenge) {
                    self.send(Message::new("AUTHENTICATE", [chunk])).await?;
                }
                Ok(Control::Continue)
            }
            Ok(Some(SaslStep::Done(credentials))) => {
                self.sasl = None;
                self.sasl_login(credentials).await
            }
            Err(err) => {
                self.sasl = None;
                debug!(error = %err, "SASL exchange failed");
                self.reply(numeric::ERR_SASLFAIL, &["SASL authentication failed"])
                    .await?;
                Ok(Control::Continue)
            }
        }
    }

    async fn sasl_login(&mut self, credentials: SaslCredentials) -> BouncerResult<Control> {
        let registry = Arc::clone(&self.registry);
        let login = Login::parse(&credentials.authcid);
        let user = registry
            .authenticator()
            .authenticate(&login.account, &credentials.password)
            .await?;

        let Some(user) = user else {
            info!(account = %login.account, "SASL authentication failed");
            self.reply(numeric::ERR_SASLFAIL, &["SASL authentication failed"])
                .await?;
            return Ok(Control::Continue);
        };

        self.reply(numeric::RPL_LOGGEDIN, &["You are now logged in"])
            .await?;
        self.reply(numeric::RPL_SASLSUCCESS, &["SASL authentication successful"])
            .await?;
        self.user = Some(user);
        self.login = Some(login);
        self.maybe_connect().await
    }

    /// Attach once a nick, a login string and credentials are all known.
    async fn maybe_connect(&mut self) -> BouncerResult<Control> {
        if self.nick.is_none() {
            return Ok(Control::Continue);
        }
        let Some(login) = self.login.clone() else {
            return Ok(Control::Continue);
        };
        let registry = Arc::clone(&self.registry);

        if self.user.is_none()
            && let Some(password) = self.password.take()
        {
            let user = registry
                .authenticator()
                .authenticate(&login.account, &password)
                .await?;
            let user = user.ok_or_else(|| BouncerError::AuthenticationFailed(login.account.clone()))?;
            self.user = Some(user);
        }

        if let Some(user) = self.user.clone() {
            Span::current().record("login", login.label().as_str());
            return match login.network.clone() {
                Some(network) => self.connect_session(&user, &login, &network).await,
                None => self.connect_console().await,
            };
        }

        // No credentials yet. A client still negotiating may be about to
        // use SASL.
        if self.negotiating || self.caps.has(CAP_SASL) {
            return Ok(Control::Continue);
        }

        let exists = registry
            .db()
            .users()
            .find_by_name(&login.account)
            .await?
            .is_some();
        let mode = registry.registration_mode().await?;
        match (exists, mode) {
            (true, RegistrationMode::Open) => {
                self.fail("If you are trying to register for a new account, this username is already taken. Please select another.")
                    .await;
                Ok(Control::Close)
            }
            (true, RegistrationMode::Closed) => {
                self.fail("No password given. Make sure to set your password in your IRC client config, and connect again.")
                    .await;
                Ok(Control::Close)
            }
            (false, RegistrationMode::Closed) => Err(BouncerError::AuthenticationFailed(login.account)),
            (false, RegistrationMode::Open) => self.begin_registration(&login.account).await,
        }
    }

    async fn connect_session(
        &mut self,
        user: &User,
        login: &Login,
        network: &str,
    ) -> BouncerResult<Control> {
        let registry = Arc::clone(&self.registry);
        let bouncer = registry.find_bouncer(user, network).await?;

        info!(user = %login.account, network, device = %login.device, "Attaching to session");
        self.handle.device = login.device.clone();
        let nick = self.nick.clone().unwrap_or_else(|| user.username.clone());
        bouncer.attach(self.handle.clone(), nick).await?;
        self.state = State::Connected(bouncer);
        self.keepalive.start(Instant::now());
        Ok(Control::Continue)
    }

    async fn connect_console(&mut self) -> BouncerResult<Control> {
        info!("Opening admin console");
        let name = self.registry.server_name().to_owned();
        self.reply(
            numeric::RPL_WELCOME,
            &[&format!("Welcome to the {name} admin console")],
        )
        .await?;
        self.reply(numeric::RPL_ENDOFMOTD, &["End"]).await?;
        self.state = State::Console;
        Ok(Control::Continue)
    }

    async fn begin_registration(&mut self, account: &str) -> BouncerResult<Control> {
        let name = self.registry.server_name().to_owned();
        info!(account, "Starting account registration");
        self.state = State::Registration;
        for line in [
            format!("Welcome to {name}, {account}. If you already have an account and were trying to connect, please check your username, as it wasn't recognized."),
            "Otherwise, follow these instructions to create an account.".to_owned(),
            " ".to_owned(),
            "You need to set an initial password for your account. Enter your password now:".to_owned(),
        ] {
            self.say(&line).await?;
        }
        Ok(Control::Continue)
    }

    /// Text addressed to the pseudo identity outside of a session.
    async fn pseudo(&mut self, text: &str) -> BouncerResult<Control> {
        let registry = Arc::clone(&self.registry);
        match self.state {
            State::Registration => {
                let Some(account) = self.login.as_ref().map(|l| l.account.clone()) else {
                    return Ok(Control::Continue);
                };
                if text.trim().is_empty() {
                    self.say("Please enter a non-empty password.").await?;
                    return Ok(Control::Continue);
                }
                match registry.db().users().create(&account, Some(text), Role::User).await {
                    Ok(user) => {
                        info!(account = %user.username, "Account created");
                        self.say("Your account has been created.").await?;
                        self.user = Some(user);
                        self.state = State::Auth;
                        self.maybe_connect().await
                    }
                    Err(err) => {
                        warn!(error = %err, "Account creation failed");
                        let name = registry.server_name();
                        self.fail(&format!("There was an error creating your user account. Please try again, or contact the {name} admin."))
                            .await;
                        Ok(Control::Close)
                    }
                }
            }
            State::Console => {
                let Some(user) = self.user.clone() else {
                    return Ok(Control::Continue);
                };
                for line in console::execute(&registry, &user, text).await {
                    self.say(&line).await?;
                }
                Ok(Control::Continue)
            }
            State::Auth | State::Connected(_) => Ok(Control::Continue),
        }
    }

    async fn outgoing_command(&mut self, command: ClientCommand) -> Control {
        match command {
            ClientCommand::Send(msg) => match self.send(msg).await {
                Ok(()) => Control::Continue,
                Err(err) => {
                    debug!(error = %err, "Write failed");
                    Control::Close
                }
            },
            ClientCommand::Close(reason) => {
                if let Some(reason) = reason {
                    self.fail(&reason).await;
                }
                Control::Close
            }
        }
    }

    async fn on_keepalive(&mut self) -> Control {
        match self.keepalive.on_timer(Instant::now()) {
            KeepaliveAction::Idle => Control::Continue,
            KeepaliveAction::SendPing => {
                let ping = Message::new("PING", [self.registry.server_name()]);
                match self.send(ping).await {
                    Ok(()) => Control::Continue,
                    Err(_) => Control::Close,
                }
            }
            KeepaliveAction::TimedOut => {
                info!("PING timeout, closing connection");
                Control::Close
            }
        }
    }

    fn is_pseudo_target(&self, msg: &Message) -> bool {
        msg.arg(0)
            .and_then(|t| t.strip_prefix('-'))
            .is_some_and(|name| name.eq_ignore_ascii_case(self.registry.server_name()))
    }

    fn current_nick(&self) -> &str {
        self.nick.as_deref().unwrap_or("*")
    }

    /// Report `reason` from the pseudo identity and send `ERROR`. Write
    /// failures are ignored since the connection is closing anyway.
    async fn fail(&mut self, reason: &str) {
        info!(reason, "Closing client");
        let _ = self.say(reason).await;
        let _ = self.send(Message::new("ERROR", [reason]).with_trailing()).await;
    }

    async fn say(&mut self, text: &str) -> Result<(), ProtocolError> {
        let msg = Message::privmsg(self.current_nick(), text)
            .with_prefix(pseudo_prefix(self.registry.server_name()));
        self.send(msg).await
    }

    /// A numeric from the bouncer to this client.
    async fn reply(&mut self, code: u16, args: &[&str]) -> Result<(), ProtocolError> {
        let nick = self.current_nick().to_owned();
        let code = format!("{code:03}");
        let msg = Message::new(&code, std::iter::once(nick.as_str()).chain(args.iter().copied()))
            .with_prefix(self.registry.server_name())
            .with_trailing();
        self.send(msg).await
    }

    async fn send(&mut self, mut msg: Message) -> Result<(), ProtocolError> {
        if !self.handle.tag_capable() {
            msg.strip_tags();
        }
        self.track_nick(&msg);
        trace!(line = %msg, "to client");
        tokio::select! {
            result = self.framed.send(msg) => result,
            Ok(_) = self.aborted.wait_for(|aborted| *aborted) => {
                Err(std::io::Error::other("aborted by session").into())
            }
        }
    }

    /// Follow nick changes the session reports for this client.
    fn track_nick(&mut self, msg: &Message) {
        if !msg.is("NICK") {
            return;
        }
        let ours = match (msg.target_user(), self.nick.as_deref()) {
            (Some(from), Some(nick)) => from.eq_ignore_ascii_case(nick),
            _ => false,
        };
        if ours && let Some(new) = msg.arg(0) {
            self.nick = Some(new.to_owned());
        }
    }
}

async fn wait_until(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
