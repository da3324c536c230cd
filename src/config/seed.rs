//! Bootstrap accounts and networks.
//!
//! These are written to the store on startup when missing, so a fresh
//! install can be brought up from the config file alone. Existing rows are
//! never modified.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

use super::Config;
use crate::db::{Database, DbError, Role, SettingsRepository};

/// A bootstrap account.
#[derive(Debug, Clone, Deserialize)]
pub struct UserSeed {
    pub username: String,
    /// Plain-text password, hashed before it is stored.
    pub password: String,
    #[serde(default)]
    pub role: Role,
}

/// A bootstrap network.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkSeed {
    pub name: String,
    /// Owning account. Networks without an owner are public: any account can
    /// attach to them by name.
    pub owner: Option<String>,
    #[serde(default)]
    pub hosts: Vec<HostSpec>,
    /// Client-style commands sent after every successful registration.
    #[serde(default)]
    pub at_connect: Vec<String>,
}

/// `host[:port][:ssl]`, with IPv6 literals in brackets.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct HostSpec {
    pub address: String,
    pub port: u16,
    pub ssl: bool,
}

impl HostSpec {
    pub const DEFAULT_PORT: u16 = 6667;
}

impl FromStr for HostSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (address, rest) = match s.strip_prefix('[') {
            Some(after) => {
                let (addr, rest) = after
                    .split_once(']')
                    .ok_or_else(|| format!("unterminated IPv6 literal in {s:?}"))?;
                (addr, rest.strip_prefix(':').unwrap_or(rest))
            }
            None => s.split_once(':').unwrap_or((s, "")),
        };
        if address.is_empty() {
            return Err(format!("missing host in {s:?}"));
        }

        let mut port = Self::DEFAULT_PORT;
        let mut ssl = false;
        for part in rest.split(':').filter(|p| !p.is_empty()) {
            if part.eq_ignore_ascii_case("ssl") || part.eq_ignore_ascii_case("tls") {
                ssl = true;
            } else {
                port = part
                    .parse()
                    .map_err(|_| format!("invalid port {part:?} in {s:?}"))?;
            }
        }

        Ok(Self {
            address: address.to_owned(),
            port,
            ssl,
        })
    }
}

impl TryFrom<String> for HostSpec {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for HostSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.address.contains(':') {
            write!(f, "[{}]:{}", self.address, self.port)?;
        } else {
            write!(f, "{}:{}", self.address, self.port)?;
        }
        if self.ssl {
            f.write_str(":ssl")?;
        }
        Ok(())
    }
}

/// Write the configured settings, listeners, accounts and networks that the
/// store does not have yet.
pub async fn apply(config: &Config, db: &Database) -> Result<(), DbError> {
    db.settings()
        .set_default(
            SettingsRepository::USER_REGISTRATION,
            config.registration.mode.as_str(),
        )
        .await?;

    let stored = db.listen_addresses().list().await?;
    for listen in &config.listen {
        if !stored
            .iter()
            .any(|l| l.address == listen.address && l.port == listen.port)
        {
            let added = db
                .listen_addresses()
                .add(&listen.address, listen.port, listen.ssl)
                .await?;
            info!(address = %added, "Seeded listen address");
        }
    }

    for seed in &config.users {
        if db.users().find_by_name(&seed.username.to_lowercase()).await?.is_none() {
            let user = db
                .users()
                .create(&seed.username, Some(&seed.password), seed.role)
                .await?;
            info!(user = %user.username, role = %user.role, "Seeded account");
        }
    }

    for seed in &config.networks {
        let owner = match &seed.owner {
            Some(name) => match db.users().find_by_name(&name.to_lowercase()).await? {
                Some(user) => Some(user),
                None => {
                    warn!(network = %seed.name, owner = %name, "Skipping network seed: unknown owner");
                    continue;
                }
            },
            None => None,
        };

        let existing = match &owner {
            Some(user) => db
                .networks()
                .find_for_user(user.id, &seed.name)
                .await?
                .filter(|n| n.user_id == Some(user.id)),
            None => db.networks().find_public(&seed.name).await?,
        };
        if existing.is_some() {
            continue;
        }

        let network = db
            .networks()
            .create(owner.as_ref().map(|u| u.id), &seed.name, &seed.at_connect)
            .await?;
        for host in &seed.hosts {
            db.networks()
                .add_host(network.id, &host.address, host.port, host.ssl)
                .await?;
        }
        // The owner of a private network is always connected to it.
        if let Some(user) = &owner {
            db.network_users().create(user.id, network.id, None).await?;
        }
        info!(network = %network.name, public = network.is_public(), "Seeded network");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_spec_forms() {
        assert_eq!(
            "irc.libera.chat:6697:ssl".parse::<HostSpec>().unwrap(),
            HostSpec {
                address: "irc.libera.chat".into(),
                port: 6697,
                ssl: true
            }
        );
        assert_eq!(
            "irc.example.net".parse::<HostSpec>().unwrap().port,
            HostSpec::DEFAULT_PORT
        );
        let v6: HostSpec = "[2001:db8::1]:7000".parse().unwrap();
        assert_eq!(v6.address, "2001:db8::1");
        assert_eq!(v6.port, 7000);
        assert!(!v6.ssl);
        assert_eq!(v6.to_string(), "[2001:db8::1]:7000");
    }

    #[test]
    fn test_host_spec_errors() {
        assert!("".parse::<HostSpec>().is_err());
        assert!("host:notaport".parse::<HostSpec>().is_err());
        assert!("[::1".parse::<HostSpec>().is_err());
    }

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let config: Config = toml::from_str(
            r#"
            [[listen]]
            address = "127.0.0.1"
            port = 6667

            [[users]]
            username = "Alice"
            password = "pw"

            [[networks]]
            name = "libera"
            owner = "alice"
            hosts = ["irc.libera.chat:6697:ssl"]

            [[networks]]
            name = "oftc"
            hosts = ["irc.oftc.net"]

            [[networks]]
            name = "ghost"
            owner = "nobody"
            "#,
        )
        .unwrap();
        let db = crate::db::test_db().await;

        apply(&config, &db).await.unwrap();
        apply(&config, &db).await.unwrap();

        assert_eq!(db.listen_addresses().list().await.unwrap().len(), 1);
        let alice = db.users().verify("alice", "pw").await.unwrap().unwrap();
        let libera = db.networks().find_for_user(alice.id, "libera").await.unwrap().unwrap();
        assert_eq!(db.networks().hosts(libera.id).await.unwrap().len(), 1);
        assert!(db.network_users().find(alice.id, libera.id).await.unwrap().is_some());
        assert!(db.networks().find_public("oftc").await.unwrap().is_some());
        assert_eq!(db.networks().list().await.unwrap().len(), 2);
        assert_eq!(
            db.settings()
                .get(SettingsRepository::USER_REGISTRATION)
                .await
                .unwrap()
                .as_deref(),
            Some("closed")
        );
    }
}
