//! # relay-transport
//!
//! Transport abstraction layer for the Relay chat server.
//!
//! - **TCP** - length-prefixed frames on a raw stream (default)
//! - **WebSocket** - the same frames inside binary WebSocket messages
//!
//! All transports implement the `Transport` and `Connection` traits,
//! allowing the server and client to be protocol-agnostic.
//!
//! ```rust,ignore
//! use relay_transport::{Connection, Transport};
//!
//! async fn handle_connection(mut conn: Box<dyn Connection>) {
//!     while let Ok(Some(frame)) = conn.recv().await {
//!         // Process frame
//!     }
//! }
//! ```

pub mod tcp;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use tcp::{TcpConfig, TcpConnection, TcpTransport};
pub use traits::{Connection, ConnectionId, Transport, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConfig, WebSocketConnection, WebSocketTransport};
