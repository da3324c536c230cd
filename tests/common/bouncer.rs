//! Test bouncer.
//!
//! Runs a registry over an in-memory database with backlog files in a
//! temporary directory, served by one plaintext gateway on loopback.

use slbnc::Registry;
use slbnc::config::{Config, HostSpec};
use slbnc::db::{Database, Role};
use slbnc::network::Gateway;
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, sleep};

use super::client::TestClient;

pub struct TestBouncer {
    pub registry: Arc<Registry>,
    addr: SocketAddr,
    gateway: JoinHandle<()>,
    _backlog: TempDir,
}

impl TestBouncer {
    pub async fn start() -> anyhow::Result<Self> {
        let backlog = tempfile::tempdir()?;
        let mut config = Config::default();
        config.backlog.dir = Some(backlog.path().to_path_buf());
        config.timeouts.reconnect_delay = 1;
        config.timeouts.connect_timeout = 5;

        let db = Database::new(":memory:").await?;
        let registry = Registry::new(&config, db);

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let gateway = Gateway::new(listener, None, Arc::clone(&registry));
        let addr = gateway.local_addr()?;
        let gateway = tokio::spawn(gateway.serve());

        Ok(Self {
            registry,
            addr,
            gateway,
            _backlog: backlog,
        })
    }

    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    pub async fn add_user(&self, username: &str, password: &str, role: Role) -> anyhow::Result<()> {
        self.registry
            .db()
            .users()
            .create(username, Some(password), role)
            .await?;
        Ok(())
    }

    /// Create a private network for `owner` pointing at `upstream`. The
    /// session starts connecting immediately.
    pub async fn add_network(
        &self,
        owner: &str,
        name: &str,
        upstream: SocketAddr,
    ) -> anyhow::Result<()> {
        let host = HostSpec {
            address: upstream.ip().to_string(),
            port: upstream.port(),
            ssl: false,
        };
        self.registry
            .add_network(Some(owner), name, &[host], &[])
            .await?;
        Ok(())
    }

    /// Connect a client and log in with PASS/NICK/USER.
    pub async fn login(&self, login: &str, nick: &str, password: &str) -> anyhow::Result<TestClient> {
        let mut client = TestClient::connect(&self.address()).await?;
        client.login(login, nick, password).await?;
        Ok(client)
    }

    /// Poll until the session's attached devices match `devices` exactly.
    pub async fn wait_for_devices(
        &self,
        username: &str,
        network: &str,
        devices: &[&str],
    ) -> anyhow::Result<()> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let sessions = self.registry.list_sessions().await;
            let current = sessions
                .iter()
                .find(|s| s.username == username && s.network == network)
                .map(|s| {
                    let mut d: Vec<&str> = s.devices.iter().map(String::as_str).collect();
                    d.sort_unstable();
                    d
                });
            let mut wanted = devices.to_vec();
            wanted.sort_unstable();
            if current.as_deref() == Some(wanted.as_slice()) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                anyhow::bail!("devices are {current:?}, wanted {wanted:?}");
            }
            sleep(Duration::from_millis(20)).await;
        }
    }
}

impl Drop for TestBouncer {
    fn drop(&mut self) {
        self.gateway.abort();
    }
}
