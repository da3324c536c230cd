//! Scripted upstream IRC server.
//!
//! Accepts the bouncer's link and walks it through registration; after that
//! the test drives the link line by line.

use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::time::{Duration, timeout};

use super::client::TestClient;

pub const SERVER: &str = "irc.test";

pub struct FakeUpstream {
    listener: TcpListener,
}

impl FakeUpstream {
    pub async fn bind() -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        Ok(Self { listener })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept the next link without registering it.
    pub async fn accept(&self) -> anyhow::Result<TestClient> {
        let (stream, _) = timeout(Duration::from_secs(5), self.listener.accept()).await??;
        Ok(TestClient::from_stream(stream))
    }

    /// Accept the next link, wait for its NICK and send a short welcome.
    /// Returns the link and the nick it registered with.
    pub async fn accept_registered(&self) -> anyhow::Result<(TestClient, String)> {
        let mut link = self.accept().await?;
        let lines = link.recv_until(|m| m.is("NICK")).await?;
        let nick = lines
            .last()
            .and_then(|m| m.arg(0))
            .map(str::to_owned)
            .ok_or_else(|| anyhow::anyhow!("NICK without a nickname"))?;

        link.send_raw(&format!(":{SERVER} 001 {nick} :Welcome to the test network {nick}"))
            .await?;
        link.send_raw(&format!(":{SERVER} 002 {nick} :Your host is {SERVER}"))
            .await?;
        link.send_raw(&format!(":{SERVER} 376 {nick} :End of /MOTD command."))
            .await?;
        Ok((link, nick))
    }
}
