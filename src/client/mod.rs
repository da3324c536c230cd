//! Downstream IRC clients.
//!
//! - [`connection`]: the per-connection task and its login state machine
//! - [`handle`]: what a session holds to talk to an attached client
//! - [`cap`]: capability negotiation
//! - [`sasl`]: SASL mechanisms
//! - [`console`]: admin console commands
//! - [`login`]: the `account@network:device` login string
//! - [`keepalive`]: ping/pong liveness

pub mod cap;
pub mod connection;
pub mod console;
pub mod handle;
pub mod keepalive;
pub mod login;
pub mod sasl;

pub use cap::{CapabilityRegistry, ClientCaps};
pub use connection::Connection;
pub use handle::{ClientCommand, ClientHandle, ConnId};
pub use login::Login;
pub use sasl::{SaslMechanism, SaslRegistry};
