//! Frame types for the Relay protocol.
//!
//! Every request frame carries a caller-chosen `id` which the server echoes in
//! the matching response, so several calls can be in flight on one
//! connection at once (typically one `Wait` plus any number of `Send`s).

use serde::{Deserialize, Serialize};

use crate::version::Version;

/// Frame type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum FrameType {
    Register = 0x01,
    Registered = 0x02,
    Send = 0x03,
    Ack = 0x04,
    Wait = 0x05,
    Deliver = 0x06,
    Timeout = 0x07,
    Error = 0x08,
    Ping = 0x09,
    Pong = 0x0A,
    Hello = 0x0B,
    Welcome = 0x0C,
}

impl From<FrameType> for u8 {
    fn from(ft: FrameType) -> u8 {
        ft as u8
    }
}

impl TryFrom<u8> for FrameType {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, <Self as TryFrom<u8>>::Error> {
        match value {
            0x01 => Ok(FrameType::Register),
            0x02 => Ok(FrameType::Registered),
            0x03 => Ok(FrameType::Send),
            0x04 => Ok(FrameType::Ack),
            0x05 => Ok(FrameType::Wait),
            0x06 => Ok(FrameType::Deliver),
            0x07 => Ok(FrameType::Timeout),
            0x08 => Ok(FrameType::Error),
            0x09 => Ok(FrameType::Ping),
            0x0A => Ok(FrameType::Pong),
            0x0B => Ok(FrameType::Hello),
            0x0C => Ok(FrameType::Welcome),
            _ => Err("Invalid frame type"),
        }
    }
}

/// Error codes carried by [`Frame::Error`].
pub mod error_codes {
    /// The client ID is not registered.
    pub const UNKNOWN_CLIENT: u16 = 1001;
    /// The server did not expect this frame.
    pub const UNEXPECTED_FRAME: u16 = 1002;
    /// The client speaks an incompatible protocol version.
    pub const INCOMPATIBLE_VERSION: u16 = 1003;
    /// Anything else.
    pub const INTERNAL: u16 = 1500;
}

/// A chat message as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Display name of the sender (`SYSTEM` for server notices).
    pub from: String,
    /// Message body.
    pub text: String,
}

impl ChatMessage {
    /// Create a new chat message.
    #[must_use]
    pub fn new(from: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            text: text.into(),
        }
    }
}

/// A protocol frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    /// Register a new client under a display name.
    #[serde(rename = "register")]
    Register {
        /// Request ID.
        id: u64,
        /// Display name. Any string is accepted, including the empty one.
        name: String,
    },

    /// Registration succeeded.
    #[serde(rename = "registered")]
    Registered {
        /// ID of the register request.
        id: u64,
        /// Assigned client identifier.
        client_id: String,
        /// Echoed display name.
        name: String,
        /// Point-in-time copy of the chat history.
        history: Vec<ChatMessage>,
    },

    /// Send a text message on behalf of a client.
    #[serde(rename = "send")]
    Send {
        /// Request ID.
        id: u64,
        /// Sender client identifier.
        client_id: String,
        /// Message body.
        text: String,
    },

    /// Acknowledgment of a request that carries no other result.
    #[serde(rename = "ack")]
    Ack {
        /// ID of the acknowledged request.
        id: u64,
    },

    /// Long-poll for the next message addressed to a client.
    #[serde(rename = "wait")]
    Wait {
        /// Request ID.
        id: u64,
        /// Waiting client identifier.
        client_id: String,
    },

    /// A message delivered in answer to a `wait`.
    #[serde(rename = "deliver")]
    Deliver {
        /// ID of the wait request.
        id: u64,
        /// The delivered message.
        message: ChatMessage,
    },

    /// The long-poll deadline elapsed without a message. Reissue the wait.
    #[serde(rename = "timeout")]
    Timeout {
        /// ID of the wait request.
        id: u64,
    },

    /// Error response.
    #[serde(rename = "error")]
    Error {
        /// ID of the failed request (0 if not applicable).
        id: u64,
        /// Error code, see [`error_codes`].
        code: u16,
        /// Human-readable error message.
        message: String,
    },

    /// Keepalive ping.
    #[serde(rename = "ping")]
    Ping {
        /// Optional timestamp.
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Keepalive pong.
    #[serde(rename = "pong")]
    Pong {
        /// Echoed timestamp from ping.
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Optional version handshake sent by the client.
    #[serde(rename = "hello")]
    Hello {
        /// Client protocol version.
        version: Version,
    },

    /// Server answer to `hello`.
    #[serde(rename = "welcome")]
    Welcome {
        /// Server protocol version.
        version: Version,
        /// Server-side long-poll deadline in milliseconds.
        wait_timeout_ms: u64,
    },
}

impl Frame {
    /// Get the frame type.
    #[must_use]
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Register { .. } => FrameType::Register,
            Frame::Registered { .. } => FrameType::Registered,
            Frame::Send { .. } => FrameType::Send,
            Frame::Ack { .. } => FrameType::Ack,
            Frame::Wait { .. } => FrameType::Wait,
            Frame::Deliver { .. } => FrameType::Deliver,
            Frame::Timeout { .. } => FrameType::Timeout,
            Frame::Error { .. } => FrameType::Error,
            Frame::Ping { .. } => FrameType::Ping,
            Frame::Pong { .. } => FrameType::Pong,
            Frame::Hello { .. } => FrameType::Hello,
            Frame::Welcome { .. } => FrameType::Welcome,
        }
    }

    /// The request ID a response frame answers, if any.
    ///
    /// Keepalive and handshake frames are not correlated and return `None`.
    #[must_use]
    pub fn request_id(&self) -> Option<u64> {
        match self {
            Frame::Register { id, .. }
            | Frame::Registered { id, .. }
            | Frame::Send { id, .. }
            | Frame::Ack { id }
            | Frame::Wait { id, .. }
            | Frame::Deliver { id, .. }
            | Frame::Timeout { id }
            | Frame::Error { id, .. } => Some(*id),
            Frame::Ping { .. } | Frame::Pong { .. } | Frame::Hello { .. } | Frame::Welcome { .. } => {
                None
            }
        }
    }

    /// Create a new Register frame.
    #[must_use]
    pub fn register(id: u64, name: impl Into<String>) -> Self {
        Frame::Register {
            id,
            name: name.into(),
        }
    }

    /// Create a new Registered frame.
    #[must_use]
    pub fn registered(
        id: u64,
        client_id: impl Into<String>,
        name: impl Into<String>,
        history: Vec<ChatMessage>,
    ) -> Self {
        Frame::Registered {
            id,
            client_id: client_id.into(),
            name: name.into(),
            history,
        }
    }

    /// Create a new Send frame.
    #[must_use]
    pub fn send(id: u64, client_id: impl Into<String>, text: impl Into<String>) -> Self {
        Frame::Send {
            id,
            client_id: client_id.into(),
            text: text.into(),
        }
    }

    /// Create a new Ack frame.
    #[must_use]
    pub fn ack(id: u64) -> Self {
        Frame::Ack { id }
    }

    /// Create a new Wait frame.
    #[must_use]
    pub fn wait(id: u64, client_id: impl Into<String>) -> Self {
        Frame::Wait {
            id,
            client_id: client_id.into(),
        }
    }

    /// Create a new Deliver frame.
    #[must_use]
    pub fn deliver(id: u64, message: ChatMessage) -> Self {
        Frame::Deliver { id, message }
    }

    /// Create a new Timeout frame.
    #[must_use]
    pub fn timeout(id: u64) -> Self {
        Frame::Timeout { id }
    }

    /// Create a new Error frame.
    #[must_use]
    pub fn error(id: u64, code: u16, message: impl Into<String>) -> Self {
        Frame::Error {
            id,
            code,
            message: message.into(),
        }
    }

    /// Create a new Ping frame.
    #[must_use]
    pub fn ping() -> Self {
        Frame::Ping { timestamp: None }
    }

    /// Create a new Pong frame.
    #[must_use]
    pub fn pong(timestamp: Option<u64>) -> Self {
        Frame::Pong { timestamp }
    }

    /// Create a new Hello frame for the given version.
    #[must_use]
    pub fn hello(version: Version) -> Self {
        Frame::Hello { version }
    }

    /// Create a new Welcome frame.
    #[must_use]
    pub fn welcome(version: Version, wait_timeout_ms: u64) -> Self {
        Frame::Welcome {
            version,
            wait_timeout_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_type() {
        let register = Frame::register(1, "alice");
        assert_eq!(register.frame_type(), FrameType::Register);

        let deliver = Frame::deliver(2, ChatMessage::new("alice", "hi"));
        assert_eq!(deliver.frame_type(), FrameType::Deliver);
    }

    #[test]
    fn test_frame_type_conversion() {
        assert_eq!(FrameType::try_from(0x05), Ok(FrameType::Wait));
        assert_eq!(u8::from(FrameType::Timeout), 0x07);
        assert!(FrameType::try_from(0x00).is_err());
        assert!(FrameType::try_from(0x0D).is_err());
    }

    #[test]
    fn test_request_id() {
        assert_eq!(Frame::wait(7, "C1").request_id(), Some(7));
        assert_eq!(Frame::timeout(7).request_id(), Some(7));
        assert_eq!(Frame::ping().request_id(), None);
        assert_eq!(Frame::hello(Version::default()).request_id(), None);
    }
}
