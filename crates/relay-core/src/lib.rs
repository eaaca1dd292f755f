//! # relay-core
//!
//! Message distribution for the Relay chat server.
//!
//! This crate provides the moving parts behind the three client calls:
//!
//! - **Registry** - client ID to display name, IDs never reused
//! - **History** - append-only log of every sequenced message
//! - **Inbox** - bounded, lossy per-client queue drained by long-poll
//! - **Distributor** - the single task that sequences and fans out messages
//! - **ChatService** - the owned aggregate exposing `register`, `send`, `wait`
//!
//! ## Architecture
//!
//! ```text
//!  send ──▶ ┌──────────────┐     ┌─────────────┐ ──▶ History
//!           │ Inbound Queue│────▶│ Distributor │
//!  register▶└──────────────┘     └─────────────┘ ──▶ Inbox (per client) ──▶ wait
//! ```

pub mod distributor;
pub mod history;
pub mod inbox;
pub mod message;
pub mod registry;
pub mod service;

pub use history::{History, HistorySnapshot};
pub use inbox::{Inbox, InboxFull, WaitState};
pub use message::{Message, SYSTEM_SENDER};
pub use registry::{ClientId, ClientRecord, Registry};
pub use service::{ChatService, Registration, RelayConfig, RelayError, RelayStats, WaitOutcome};
