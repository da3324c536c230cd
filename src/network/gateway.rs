//! Gateway - TCP/TLS listener that accepts incoming connections.
//!
//! The Gateway binds one listen address and spawns a client Connection task
//! for each incoming client, wrapping it in TLS first when the address is
//! marked ssl. SSL listeners without a certificate on disk get a generated
//! self-signed one.

use rcgen::{CertificateParams, KeyPair, SanType};
use rustls_pemfile::{certs, private_key};
use std::io::{self, BufReader, Cursor};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::crypto::aws_lc_rs;
use tokio_rustls::rustls::pki_types::CertificateDer;
use tokio_rustls::rustls::{self, ServerConfig};
use tracing::{debug, error, info, instrument, warn};

use crate::client::Connection;
use crate::config::TlsConfig;
use crate::db::ListenAddress;
use crate::registry::Registry;

/// Back off briefly when accept fails (usually fd exhaustion).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("certificate generation failed: {0}")]
    CertGen(#[from] rcgen::Error),
    #[error("no certificates found in {0}")]
    NoCertificates(String),
    #[error("no private key found in {0}")]
    NoPrivateKey(String),
    #[error("tls error: {0}")]
    Tls(#[from] rustls::Error),
}

/// The Gateway accepts incoming TCP/TLS connections and spawns handlers.
pub struct Gateway {
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    registry: Arc<Registry>,
}

impl Gateway {
    /// Bind a stored listen address.
    pub async fn bind(
        listen: &ListenAddress,
        tls: &TlsConfig,
        registry: Arc<Registry>,
    ) -> Result<Self, GatewayError> {
        let acceptor = if listen.ssl {
            ensure_certificate(tls, registry.server_name())?;
            Some(load_tls(tls)?)
        } else {
            None
        };
        let listener = TcpListener::bind((listen.address.as_str(), listen.port)).await?;
        info!(address = %listen, "Listener bound");
        Ok(Self::new(listener, acceptor, registry))
    }

    /// Serve an already bound listener.
    pub fn new(listener: TcpListener, acceptor: Option<TlsAcceptor>, registry: Arc<Registry>) -> Self {
        Self {
            listener,
            acceptor,
            registry,
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// [`run`](Self::run) as a boxed future. Listeners are started from
    /// console commands that run inside a connection accepted here, so the
    /// spawned type has to be named for the compiler to prove it `Send`.
    pub fn serve(self) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(self.run())
    }

    /// Accept connections until the task is aborted.
    #[instrument(skip(self), name = "gateway", fields(tls = self.acceptor.is_some()))]
    pub async fn run(self) {
        loop {
            let (stream, addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };
            if let Err(e) = stream.set_nodelay(true) {
                debug!(%addr, error = %e, "Failed to set TCP_NODELAY");
            }

            let registry = Arc::clone(&self.registry);
            let id = registry.next_conn_id();
            match &self.acceptor {
                Some(acceptor) => {
                    let acceptor = acceptor.clone();
                    tokio::spawn(async move {
                        match acceptor.accept(stream).await {
                            Ok(tls) => Connection::new(id, tls, addr, registry).run().await,
                            Err(e) => warn!(%addr, error = %e, "TLS handshake failed"),
                        }
                    });
                }
                None => {
                    tokio::spawn(Connection::new(id, stream, addr, registry).run());
                }
            }
        }
    }
}

/// Load the PEM certificate chain and key into a TLS acceptor.
pub fn load_tls(config: &TlsConfig) -> Result<TlsAcceptor, GatewayError> {
    let cert_file = std::fs::read(&config.cert_path)?;
    let cert_reader = &mut BufReader::new(Cursor::new(cert_file));
    let certs: Vec<CertificateDer<'static>> = certs(cert_reader).collect::<Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(GatewayError::NoCertificates(config.cert_path.clone()));
    }

    let key_file = std::fs::read(&config.key_path)?;
    let key_reader = &mut BufReader::new(Cursor::new(key_file));
    let key = private_key(key_reader)?
        .ok_or_else(|| GatewayError::NoPrivateKey(config.key_path.clone()))?;

    let tls_config = ServerConfig::builder_with_provider(Arc::new(aws_lc_rs::default_provider()))
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    Ok(TlsAcceptor::from(Arc::new(tls_config)))
}

/// Write a self-signed certificate for `hostname` when neither PEM file
/// exists yet. A lone certificate or key is left for `load_tls` to reject.
pub fn ensure_certificate(config: &TlsConfig, hostname: &str) -> Result<(), GatewayError> {
    let cert_path = Path::new(&config.cert_path);
    let key_path = Path::new(&config.key_path);
    if cert_path.exists() || key_path.exists() {
        return Ok(());
    }

    info!(%hostname, cert = %config.cert_path, "Generating self-signed TLS certificate");
    let key_pair = KeyPair::generate()?;
    let mut params = CertificateParams::new(vec![hostname.to_owned(), "localhost".to_owned()])?;
    params
        .subject_alt_names
        .push(SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST)));
    params
        .subject_alt_names
        .push(SanType::IpAddress(IpAddr::V6(Ipv6Addr::LOCALHOST)));
    let cert = params.self_signed(&key_pair)?;

    for path in [cert_path, key_path] {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(cert_path, cert.pem())?;
    std::fs::write(key_path, key_pair.serialize_pem())?;
    Ok(())
}
