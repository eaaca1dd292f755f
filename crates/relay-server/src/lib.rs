//! # relay-server
//!
//! Server side of the Relay long-poll chat: configuration, the connection
//! accept loop, request dispatch onto a shared [`relay_core::ChatService`],
//! metrics, and the admin HTTP endpoint.

pub mod config;
pub mod handlers;
pub mod metrics;

pub use config::Config;
pub use handlers::{run_server, AppState};
