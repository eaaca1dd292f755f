//! # relay-protocol
//!
//! Wire protocol definitions for the Relay long-poll chat server.
//!
//! Clients talk to the server with three calls, each a request frame answered
//! by exactly one response frame carrying the same request ID:
//!
//! - `Register` → `Registered` (client ID plus a history snapshot)
//! - `Send` → `Ack` or `Error`
//! - `Wait` → `Deliver`, `Timeout` or `Error`
//!
//! ## Example
//!
//! ```rust
//! use relay_protocol::{codec, Frame};
//!
//! let frame = Frame::send(1, "C1", "hello");
//!
//! let encoded = codec::encode(&frame).unwrap();
//! let decoded = codec::decode(&encoded).unwrap();
//! assert_eq!(frame, decoded);
//! ```

pub mod codec;
pub mod frames;
pub mod version;

pub use codec::{decode, encode, ProtocolError};
pub use frames::{error_codes, ChatMessage, Frame, FrameType};
pub use version::{Version, PROTOCOL_VERSION};
