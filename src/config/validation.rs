//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use std::path::Path;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("server.name is required")]
    MissingServerName,
    #[error("server.name must not contain spaces")]
    InvalidServerName,
    #[error("timeouts.{0} must be greater than zero")]
    ZeroTimeout(&'static str),
    #[error("backlog.io_workers must be greater than zero")]
    NoIoWorkers,
    #[error("backlog.block_size must be greater than zero")]
    ZeroBlockSize,
    #[error("tls.cert_path does not exist: {0}")]
    TlsCertNotFound(String),
    #[error("tls.key_path does not exist: {0}")]
    TlsKeyNotFound(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.name.is_empty() {
        errors.push(ValidationError::MissingServerName);
    } else if config.server.name.contains(' ') {
        errors.push(ValidationError::InvalidServerName);
    }

    if config.timeouts.ping_interval == 0 {
        errors.push(ValidationError::ZeroTimeout("ping_interval"));
    }
    if config.timeouts.ping_timeout == 0 {
        errors.push(ValidationError::ZeroTimeout("ping_timeout"));
    }
    if config.backlog.io_workers == 0 {
        errors.push(ValidationError::NoIoWorkers);
    }
    if config.backlog.block_size == 0 {
        errors.push(ValidationError::ZeroBlockSize);
    }

    // Without a [tls] section SSL listeners get a generated certificate.
    if let Some(tls) = &config.tls {
        if !Path::new(&tls.cert_path).exists() {
            errors.push(ValidationError::TlsCertNotFound(tls.cert_path.clone()));
        }
        if !Path::new(&tls.key_path).exists() {
            errors.push(ValidationError::TlsKeyNotFound(tls.key_path.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ListenConfig, TlsConfig};

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = Config::default();
        config.timeouts.ping_interval = 0;
        config.backlog.io_workers = 0;
        config.tls = Some(TlsConfig {
            cert_path: "/nonexistent/cert.pem".into(),
            key_path: "/nonexistent/key.pem".into(),
        });

        let errors = validate(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(matches!(errors[2], ValidationError::TlsCertNotFound(_)));
    }

    #[test]
    fn test_ssl_listener_without_tls_section_is_valid() {
        let mut config = Config::default();
        config.listen.push(ListenConfig {
            address: "::".into(),
            port: 6697,
            ssl: true,
        });
        assert!(validate(&config).is_ok());
    }
}
