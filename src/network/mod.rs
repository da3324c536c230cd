//! Client-facing listeners.
//!
//! Each stored listen address gets one [`Gateway`] task that accepts
//! connections and spawns a [`crate::client::Connection`] for each.

mod gateway;

pub use gateway::{Gateway, GatewayError, ensure_certificate, load_tls};
