//! One-shot client for a home-automation hub's WebSocket API.
//!
//! A session connects ([`transport`]), upgrades the stream ([`handshake`]),
//! authenticates with a bearer token, sends one command, and waits for the
//! reply tagged with the same id ([`session`]). Frame encoding lives in the
//! `frames` crate.

pub mod config;
pub mod connection;
pub mod error;
pub mod handshake;
pub mod session;
pub mod transport;

pub use config::{Endpoint, SessionConfig, Timeouts};
pub use error::Error;
pub use session::{CommandRequest, run};
