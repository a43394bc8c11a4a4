//! Chat relay client.
//!
//! SYSTEM CONTEXT
//! ==============
//! A `ChatController` owns one connection to the relay through a
//! [`transport::Transport`], mirrors the relay's log into a bounded local
//! history, and gates outgoing messages through the content filter and the
//! admission policy. When no relay can be reached in a production
//! deployment it drops into static mode, where sends stay local.
//!
//! Rendering is delegated to a [`render::Renderer`] supplied by the caller.

pub mod admission;
pub mod api;
pub mod config;
pub mod controller;
pub mod fallback;
pub mod filter;
pub mod history;
pub mod render;
pub mod transport;

pub use config::ClientConfig;
pub use controller::{ChatController, ConnectionState, SendError, SendOutcome};
pub use render::{Renderer, Status};
