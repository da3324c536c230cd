//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Core config struct definitions (Config, ServerConfig, TimeoutsConfig)
//! - [`listen`]: Listener and TLS configuration
//! - [`backlog`]: Backlog storage configuration
//! - [`seed`]: Bootstrap users and networks written to the store at startup
//! - [`validation`]: Startup sanity checks

mod backlog;
mod listen;
mod seed;
mod types;
mod validation;

pub use backlog::BacklogConfig;
pub use listen::{ListenConfig, TlsConfig};
pub use seed::{HostSpec, NetworkSeed, UserSeed, apply as apply_seeds};
pub use types::{
    Config, ConfigError, DatabaseConfig, RegistrationConfig, RegistrationMode, ServerConfig,
    TimeoutsConfig,
};
pub use validation::{ValidationError, validate};
