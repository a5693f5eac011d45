//! Atoms Token Relay Library Crate
//!
//! Exchanges a caller's agent id and API key for a short-lived conversation
//! token on the upstream API. The `relay` binary is a thin wrapper around this
//! library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod upstream;
