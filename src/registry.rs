//! The registry: live sessions and listeners built from the store.
//!
//! On start every stored listen address gets a listener and every stored
//! account/network pairing gets a session. The admin operations below write
//! through the store first and then apply the change to the running process.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::backlog::{BacklogFactory, BacklogStore};
use crate::bouncer::{self, BouncerHandle, BouncerParams, InterceptorFactory, SessionInfo, SessionStatus};
use crate::client::handle::ConnId;
use crate::client::{CapabilityRegistry, SaslRegistry};
use crate::config::{Config, HostSpec, RegistrationMode, TimeoutsConfig, TlsConfig};
use crate::db::{Database, DbError, ListenAddress, Network, NetworkUser, SettingsRepository, User};
use crate::error::{BouncerError, BouncerResult};
use crate::network::Gateway;
use crate::security::{Authenticator, StoredPasswordAuthenticator};
use crate::upstream::UpstreamParams;

/// Sessions are keyed by account id and lowercase network name.
type SessionKey = (i64, String);

fn session_key(user_id: i64, network: &str) -> SessionKey {
    (user_id, network.to_lowercase())
}

pub struct Registry {
    db: Database,
    server_name: String,
    timeouts: TimeoutsConfig,
    tls: TlsConfig,
    authenticator: Arc<dyn Authenticator>,
    caps: CapabilityRegistry,
    sasl: SaslRegistry,
    interceptors: Vec<Arc<dyn InterceptorFactory>>,
    sessions: DashMap<SessionKey, BouncerHandle>,
    /// Accept loops by listen address id.
    listeners: Mutex<HashMap<i64, JoinHandle<()>>>,
    next_conn: AtomicU64,
}

impl Registry {
    pub fn new(config: &Config, db: Database) -> Arc<Self> {
        let mut interceptors: Vec<Arc<dyn InterceptorFactory>> = Vec::new();
        if config.backlog.enabled {
            let store = BacklogStore::new(config.backlog_dir(), &config.backlog);
            interceptors.push(Arc::new(BacklogFactory::new(store, db.clone())));
        }

        Arc::new(Self {
            authenticator: Arc::new(StoredPasswordAuthenticator::new(db.clone())),
            db,
            server_name: config.server.name.clone(),
            timeouts: config.timeouts.clone(),
            tls: config.tls_config(),
            caps: CapabilityRegistry::standard(),
            sasl: SaslRegistry::standard(),
            interceptors,
            sessions: DashMap::new(),
            listeners: Mutex::new(HashMap::new()),
            next_conn: AtomicU64::new(1),
        })
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn timeouts(&self) -> &TimeoutsConfig {
        &self.timeouts
    }

    pub fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }

    pub fn caps(&self) -> &CapabilityRegistry {
        &self.caps
    }

    pub fn sasl(&self) -> &SaslRegistry {
        &self.sasl
    }

    pub fn next_conn_id(&self) -> ConnId {
        self.next_conn.fetch_add(1, Ordering::Relaxed)
    }

    /// Current `user_registration` setting.
    pub async fn registration_mode(&self) -> Result<RegistrationMode, DbError> {
        let value = self
            .db
            .settings()
            .get(SettingsRepository::USER_REGISTRATION)
            .await?;
        Ok(value
            .map(|v| RegistrationMode::from_setting(&v))
            .unwrap_or_default())
    }

    /// Start every stored listener and session.
    pub async fn start(self: &Arc<Self>) -> Result<(), DbError> {
        for listen in self.db.listen_addresses().list().await? {
            self.start_listener(&listen).await;
        }

        let pairings = self.db.network_users().list().await?;
        info!(count = pairings.len(), "Starting sessions");
        for pairing in pairings {
            if let Err(e) = self.start_pairing(&pairing).await {
                error!(network_user = pairing.id, error = %e, "Failed to start session");
            }
        }
        Ok(())
    }

    /// Stop every listener and session.
    pub async fn shutdown(&self) {
        for (_, listener) in self.listeners.lock().drain() {
            listener.abort();
        }
        let handles: Vec<BouncerHandle> = self.sessions.iter().map(|e| e.value().clone()).collect();
        self.sessions.clear();
        for handle in handles {
            handle.shutdown().await;
        }
    }

    /// Session for `user` on `network`, starting it if needed.
    ///
    /// A network the account can see but has no pairing for (a public one,
    /// or its own) gets a pairing on the fly.
    pub async fn find_bouncer(&self, user: &User, network: &str) -> BouncerResult<BouncerHandle> {
        if let Some(handle) = self.live_session(user.id, network) {
            return Ok(handle);
        }

        let Some(net) = self.db.networks().find_for_user(user.id, network).await? else {
            return Err(BouncerError::UnknownTarget(network.to_owned()));
        };

        let pairing = match self.db.network_users().find(user.id, net.id).await? {
            Some(pairing) => pairing,
            None => {
                info!(user = %user.username, network = %net.name, "Auto-provisioning network user");
                match self.db.network_users().create(user.id, net.id, None).await {
                    Ok(pairing) => pairing,
                    // Lost a race with another connection of the same account.
                    Err(DbError::NetworkExists(_)) => self
                        .db
                        .network_users()
                        .find(user.id, net.id)
                        .await?
                        .ok_or_else(|| BouncerError::UnknownTarget(network.to_owned()))?,
                    Err(e) => return Err(e.into()),
                }
            }
        };

        let params = self.session_params(user, &net, &pairing).await?;
        Ok(self.launch(params))
    }

    /// Snapshot of every running session, sorted by account and network.
    pub async fn list_sessions(&self) -> Vec<SessionStatus> {
        let handles: Vec<BouncerHandle> = self.sessions.iter().map(|e| e.value().clone()).collect();
        let mut statuses = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Ok(status) = handle.status().await {
                statuses.push(status);
            }
        }
        statuses.sort_by(|a, b| (&a.username, &a.network).cmp(&(&b.username, &b.network)));
        statuses
    }

    /// Close a session's clients and make it reconnect. `Ok(false)` when no
    /// such session is running.
    pub async fn force_disconnect(&self, username: &str, network: &str) -> BouncerResult<bool> {
        let Some(user) = self.db.users().find_by_name(username).await? else {
            return Ok(false);
        };
        let Some(handle) = self.live_session(user.id, network) else {
            return Ok(false);
        };
        info!(user = %user.username, network, "Force-disconnecting session");
        handle.disconnect().await?;
        Ok(true)
    }

    pub async fn list_listen_addresses(&self) -> Result<Vec<ListenAddress>, DbError> {
        self.db.listen_addresses().list().await
    }

    pub async fn add_listen_address(
        self: &Arc<Self>,
        address: &str,
        port: u16,
        ssl: bool,
    ) -> BouncerResult<ListenAddress> {
        let listen = self.db.listen_addresses().add(address, port, ssl).await?;
        self.start_listener(&listen).await;
        Ok(listen)
    }

    pub async fn remove_listen_address(&self, address: &str, port: u16) -> BouncerResult<bool> {
        let Some(listen) = self.db.listen_addresses().remove(address, port).await? else {
            return Ok(false);
        };
        if let Some(listener) = self.listeners.lock().remove(&listen.id) {
            listener.abort();
            info!(address = %listen, "Listener stopped");
        }
        Ok(true)
    }

    pub async fn list_networks(&self) -> Result<Vec<Network>, DbError> {
        self.db.networks().list().await
    }

    /// Create a network. An owned network is paired with its owner and the
    /// session starts right away; a public one waits for its first client.
    pub async fn add_network(
        &self,
        owner: Option<&str>,
        name: &str,
        hosts: &[HostSpec],
        at_connect: &[String],
    ) -> BouncerResult<Network> {
        let owner = match owner {
            Some(username) => Some(self.find_user(username).await?),
            None => None,
        };
        let network = self
            .db
            .networks()
            .create(owner.as_ref().map(|u| u.id), name, at_connect)
            .await?;
        for host in hosts {
            self.db
                .networks()
                .add_host(network.id, &host.address, host.port, host.ssl)
                .await?;
        }
        info!(network = %network.name, public = network.is_public(), "Network added");

        if let Some(user) = owner {
            let pairing = self.db.network_users().create(user.id, network.id, None).await?;
            let params = self.session_params(&user, &network, &pairing).await?;
            self.launch(params);
        }
        Ok(network)
    }

    /// Delete a network and stop every session on it. `owner` selects a
    /// private network; `None` selects the public one.
    pub async fn remove_network(&self, owner: Option<&str>, name: &str) -> BouncerResult<bool> {
        let network = match owner {
            Some(username) => {
                let user = self.find_user(username).await?;
                self.db
                    .networks()
                    .find_for_user(user.id, name)
                    .await?
                    .filter(|n| n.user_id == Some(user.id))
            }
            None => self.db.networks().find_public(name).await?,
        };
        let Some(network) = network else {
            return Ok(false);
        };

        for pairing in self.db.network_users().list_for_network(network.id).await? {
            self.stop_session(pairing.user_id, &network.name).await;
        }
        let deleted = self.db.networks().delete(network.id).await?;
        info!(network = %network.name, "Network removed");
        Ok(deleted)
    }

    /// Pair an account with a network it can see and start the session.
    pub async fn add_network_user(&self, username: &str, network: &str) -> BouncerResult<BouncerHandle> {
        let user = self.find_user(username).await?;
        let Some(net) = self.db.networks().find_for_user(user.id, network).await? else {
            return Err(BouncerError::UnknownTarget(network.to_owned()));
        };
        let pairing = self.db.network_users().create(user.id, net.id, None).await?;
        let params = self.session_params(&user, &net, &pairing).await?;
        Ok(self.launch(params))
    }

    /// Remove a pairing and stop its session.
    pub async fn remove_network_user(&self, username: &str, network: &str) -> BouncerResult<bool> {
        let user = self.find_user(username).await?;
        let Some(net) = self.db.networks().find_for_user(user.id, network).await? else {
            return Ok(false);
        };
        let Some(pairing) = self.db.network_users().find(user.id, net.id).await? else {
            return Ok(false);
        };
        self.stop_session(user.id, &net.name).await;
        Ok(self.db.network_users().delete(pairing.id).await?)
    }

    async fn find_user(&self, username: &str) -> Result<User, DbError> {
        self.db
            .users()
            .find_by_name(username)
            .await?
            .ok_or_else(|| DbError::UserNotFound(username.to_owned()))
    }

    fn live_session(&self, user_id: i64, network: &str) -> Option<BouncerHandle> {
        self.sessions
            .get(&session_key(user_id, network))
            .map(|e| e.value().clone())
            .filter(|h| !h.is_closed())
    }

    async fn stop_session(&self, user_id: i64, network: &str) {
        if let Some((_, handle)) = self.sessions.remove(&session_key(user_id, network)) {
            info!(user_id, network, "Stopping session");
            handle.shutdown().await;
        }
    }

    async fn start_pairing(&self, pairing: &NetworkUser) -> BouncerResult<BouncerHandle> {
        let user = self
            .db
            .users()
            .find_by_id(pairing.user_id)
            .await?
            .ok_or_else(|| DbError::UserNotFound(pairing.user_id.to_string()))?;
        let network = self
            .db
            .networks()
            .find_by_id(pairing.network_id)
            .await?
            .ok_or_else(|| DbError::NetworkNotFound(pairing.network_id.to_string()))?;
        let params = self.session_params(&user, &network, pairing).await?;
        Ok(self.launch(params))
    }

    async fn session_params(
        &self,
        user: &User,
        network: &Network,
        pairing: &NetworkUser,
    ) -> Result<BouncerParams, DbError> {
        let rooms = self.db.rooms().list(pairing.id).await?;
        let at_connect = network
            .at_connect
            .iter()
            .chain(&pairing.at_connect)
            .cloned()
            .collect();

        Ok(BouncerParams {
            info: SessionInfo {
                user_id: user.id,
                username: user.username.clone(),
                network: network.name.clone(),
                network_user_id: pairing.id,
            },
            nick: pairing.nick.clone().unwrap_or_else(|| user.username.clone()),
            server_name: self.server_name.clone(),
            at_connect,
            rooms,
            db: self.db.clone(),
            upstream: UpstreamParams {
                network_id: network.id,
                network: network.name.clone(),
                db: self.db.clone(),
                connect_timeout: self.timeouts.connect_timeout(),
                reconnect_delay: self.timeouts.reconnect_delay(),
            },
        })
    }

    /// Spawn the session unless a live one already holds the key.
    fn launch(&self, params: BouncerParams) -> BouncerHandle {
        let key = session_key(params.info.user_id, &params.info.network);
        match self.sessions.entry(key) {
            Entry::Occupied(entry) if !entry.get().is_closed() => entry.get().clone(),
            entry => {
                let interceptors = self
                    .interceptors
                    .iter()
                    .filter_map(|factory| factory.build(&params.info))
                    .collect();
                info!(user = %params.info.username, network = %params.info.network, "Session started");
                let handle = bouncer::spawn(params, interceptors);
                entry.insert(handle.clone());
                handle
            }
        }
    }

    async fn start_listener(self: &Arc<Self>, listen: &ListenAddress) {
        match Gateway::bind(listen, &self.tls, Arc::clone(self)).await {
            Ok(gateway) => {
                let task = tokio::spawn(gateway.serve());
                if let Some(old) = self.listeners.lock().insert(listen.id, task) {
                    warn!(address = %listen, "Replacing running listener");
                    old.abort();
                }
            }
            Err(e) => error!(address = %listen, error = %e, "Failed to start listener"),
        }
    }
}
