//! Integration test common infrastructure.
//!
//! Provides a bouncer running on loopback, a scripted upstream IRC server
//! for it to connect to, and a line-oriented client for both ends.

pub mod bouncer;
pub mod client;
pub mod upstream;

#[allow(unused_imports)]
pub use bouncer::TestBouncer;
#[allow(unused_imports)]
pub use client::TestClient;
#[allow(unused_imports)]
pub use upstream::FakeUpstream;
