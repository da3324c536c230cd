//! Listener configuration.

use serde::Deserialize;

/// One client-facing listener.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ListenConfig {
    /// Address to bind to (e.g., "0.0.0.0" or "::").
    pub address: String,
    /// Port to bind to.
    pub port: u16,
    /// Whether connections are wrapped in TLS.
    #[serde(default)]
    pub ssl: bool,
}

/// Certificate for SSL listeners.
#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    /// Path to certificate chain (PEM format).
    pub cert_path: String,
    /// Path to private key file (PEM format).
    pub key_path: String,
}
