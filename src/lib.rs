//! slbnc - Straylight bouncer
//!
//! A multi-device IRC bouncer: one persistent upstream link per account and
//! network, shared by any number of attached clients, with per-device
//! backlog replay.
//!
//! The binary in `main.rs` wires these together; the library is exposed so
//! integration tests can run a complete bouncer in-process.

pub mod backlog;
pub mod bouncer;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod network;
pub mod registry;
pub mod security;
pub mod upstream;

pub use error::{BouncerError, BouncerResult};
pub use registry::Registry;
