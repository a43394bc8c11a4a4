//! Chat relay: a bounded in-memory message log behind a WebSocket fan-out.
//!
//! The binary in `main.rs` wires configuration, logging, and shutdown
//! around [`routes::app`].

pub mod config;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
