//! Core configuration types and loading.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use super::backlog::BacklogConfig;
use super::listen::{ListenConfig, TlsConfig};
use super::seed::{NetworkSeed, UserSeed};
use super::validation::{self, ValidationError};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {}", format_errors(.0))]
    Invalid(Vec<ValidationError>),
}

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Bouncer configuration.
///
/// Every section is optional; an empty file yields a bouncer with no
/// listeners that can be configured at runtime through the console.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Bouncer identity and data directory.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Listen addresses, merged into the stored set on startup.
    #[serde(default)]
    pub listen: Vec<ListenConfig>,
    /// Certificate used by SSL listeners.
    pub tls: Option<TlsConfig>,
    /// Keepalive and reconnect timing.
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    /// Backlog storage.
    #[serde(default)]
    pub backlog: BacklogConfig,
    /// Self-service account creation.
    #[serde(default)]
    pub registration: RegistrationConfig,
    /// Bootstrap accounts.
    #[serde(default)]
    pub users: Vec<UserSeed>,
    /// Bootstrap networks.
    #[serde(default)]
    pub networks: Vec<NetworkSeed>,
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        validation::validate(&config).map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Database location, defaulting to `<data_dir>/slbnc.db`.
    pub fn database_path(&self) -> String {
        match &self.database.path {
            Some(path) => path.clone(),
            None => self
                .server
                .data_dir
                .join("slbnc.db")
                .to_string_lossy()
                .into_owned(),
        }
    }

    /// Backlog root, defaulting to `<data_dir>/logs`.
    pub fn backlog_dir(&self) -> PathBuf {
        self.backlog
            .dir
            .clone()
            .unwrap_or_else(|| self.server.data_dir.join("logs"))
    }

    /// The configured certificate, or where a generated one lives.
    pub fn tls_config(&self) -> TlsConfig {
        self.tls.clone().unwrap_or_else(|| {
            let dir = self.server.data_dir.join("tls");
            TlsConfig {
                cert_path: dir.join("cert.pem").to_string_lossy().into_owned(),
                key_path: dir.join("key.pem").to_string_lossy().into_owned(),
            }
        })
    }
}

/// Bouncer identity.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Name used for the pseudo user (`-<name>`), PING tokens and the
    /// upstream USER line.
    #[serde(default = "default_name")]
    pub name: String,
    /// Directory holding the database and backlog by default.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_name() -> String {
    "slbnc".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

/// Database configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file, or `:memory:`.
    pub path: Option<String>,
}

/// Keepalive and reconnect timing, in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutsConfig {
    /// Idle time before a client is sent PING (default: 60).
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    /// Time a client has to answer that PING (default: 10).
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
    /// Minimum spacing between upstream connection attempts (default: 5).
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay: u64,
    /// Upper bound on a single upstream TCP connect (default: 30).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
}

impl TimeoutsConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            ping_interval: default_ping_interval(),
            ping_timeout: default_ping_timeout(),
            reconnect_delay: default_reconnect_delay(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

fn default_ping_interval() -> u64 {
    60
}

fn default_ping_timeout() -> u64 {
    10
}

fn default_reconnect_delay() -> u64 {
    5
}

fn default_connect_timeout() -> u64 {
    30
}

/// Whether unknown usernames may create an account by connecting.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationMode {
    #[default]
    Closed,
    Open,
}

impl RegistrationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
        }
    }

    /// Parse a stored setting value; anything unrecognised is closed.
    pub fn from_setting(value: &str) -> Self {
        if value.eq_ignore_ascii_case("open") {
            Self::Open
        } else {
            Self::Closed
        }
    }
}

/// Self-service registration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationConfig {
    /// Initial value of the `user_registration` setting. Only written when
    /// the setting has never been stored.
    #[serde(default)]
    pub mode: RegistrationMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.name, "slbnc");
        assert_eq!(config.timeouts.ping_interval(), Duration::from_secs(60));
        assert_eq!(config.timeouts.ping_timeout(), Duration::from_secs(10));
        assert_eq!(config.timeouts.reconnect_delay(), Duration::from_secs(5));
        assert!(config.backlog.enabled);
        assert_eq!(config.registration.mode, RegistrationMode::Closed);
        assert_eq!(config.backlog_dir(), PathBuf::from("data").join("logs"));
        assert!(config.database_path().ends_with("slbnc.db"));
        assert!(config.tls_config().cert_path.ends_with("cert.pem"));
    }

    #[test]
    fn test_full_config() {
        let config: Config = toml::from_str(
            r#"
            [server]
            name = "bnc"
            data_dir = "/var/lib/bnc"

            [database]
            path = ":memory:"

            [[listen]]
            address = "0.0.0.0"
            port = 6697
            ssl = true

            [tls]
            cert_path = "cert.pem"
            key_path = "key.pem"

            [timeouts]
            ping_interval = 30

            [backlog]
            io_workers = 2
            max_replay_lines = 500

            [registration]
            mode = "open"

            [[users]]
            username = "alice"
            password = "hunter2"
            role = "admin"

            [[networks]]
            name = "libera"
            hosts = ["irc.libera.chat:6697:ssl"]
            at_connect = ["/msg NickServ identify hunter2"]
            "#,
        )
        .unwrap();

        assert_eq!(config.server.name, "bnc");
        assert_eq!(config.database_path(), ":memory:");
        assert_eq!(config.listen.len(), 1);
        assert!(config.listen[0].ssl);
        assert_eq!(config.timeouts.ping_interval, 30);
        assert_eq!(config.timeouts.ping_timeout, 10);
        assert_eq!(config.backlog.io_workers, 2);
        assert_eq!(config.backlog.max_replay_lines, Some(500));
        assert_eq!(config.registration.mode, RegistrationMode::Open);
        assert_eq!(config.users[0].username, "alice");
        assert_eq!(config.networks[0].hosts[0].port, 6697);
        assert!(config.networks[0].owner.is_none());
    }

    #[test]
    fn test_registration_mode_from_setting() {
        assert_eq!(RegistrationMode::from_setting("OPEN"), RegistrationMode::Open);
        assert_eq!(RegistrationMode::from_setting("verify"), RegistrationMode::Closed);
    }
}

pub(super) fn default_true() -> bool {
    true
}
