//! Codec for encoding and decoding Relay frames.
//!
//! This module provides MessagePack-based serialization with length-prefixed framing.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::frames::Frame;

/// Maximum frame size (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Length prefix size in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {size} exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// Not enough data to decode frame.
    #[error("Incomplete frame: need {0} more bytes")]
    Incomplete(usize),

    /// MessagePack encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack decoding error.
    #[error("Decoding error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Encode a frame to bytes.
///
/// The encoded format is:
/// - 4 bytes: Big-endian length prefix
/// - N bytes: MessagePack-encoded frame
///
/// # Errors
///
/// Returns an error if the frame is too large or encoding fails.
pub fn encode(frame: &Frame) -> Result<Bytes, ProtocolError> {
    let mut buf = BytesMut::new();
    encode_into(frame, &mut buf)?;
    Ok(buf.freeze())
}

/// Encode a frame into an existing buffer.
///
/// # Errors
///
/// Returns an error if the frame is too large or encoding fails.
pub fn encode_into(frame: &Frame, buf: &mut BytesMut) -> Result<(), ProtocolError> {
    let payload = rmp_serde::to_vec_named(frame)?;

    if payload.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    buf.reserve(LENGTH_PREFIX_SIZE + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(&payload);

    Ok(())
}

/// Decode a single frame from a complete byte slice.
///
/// # Errors
///
/// Returns an error if the data is incomplete, too large, or invalid.
pub fn decode(data: &[u8]) -> Result<Frame, ProtocolError> {
    if data.len() < LENGTH_PREFIX_SIZE {
        return Err(ProtocolError::Incomplete(LENGTH_PREFIX_SIZE - data.len()));
    }

    let length = read_length(data, MAX_FRAME_SIZE)?;
    let total_size = LENGTH_PREFIX_SIZE + length;
    if data.len() < total_size {
        return Err(ProtocolError::Incomplete(total_size - data.len()));
    }

    let frame = rmp_serde::from_slice(&data[LENGTH_PREFIX_SIZE..total_size])?;
    Ok(frame)
}

/// Try to decode a frame from a buffer, advancing it if successful.
///
/// Returns `Ok(Some(frame))` if a complete frame was decoded,
/// `Ok(None)` if more data is needed, or `Err` on protocol error.
///
/// # Errors
///
/// Returns an error if the frame is too large or invalid.
pub fn decode_from(buf: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
    FrameCodec::default().decode_from(buf)
}

fn read_length(data: &[u8], max: usize) -> Result<usize, ProtocolError> {
    let length = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if length > max {
        return Err(ProtocolError::FrameTooLarge { size: length, max });
    }
    Ok(length)
}

/// Streaming codec with a configurable inbound frame limit.
///
/// Transports use this to reject oversized frames as soon as the length prefix
/// is read, before buffering the payload.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

impl FrameCodec {
    /// Create a codec accepting frames up to `max_frame_size` bytes.
    ///
    /// The limit is capped at [`MAX_FRAME_SIZE`].
    #[must_use]
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            max_frame_size: max_frame_size.min(MAX_FRAME_SIZE),
        }
    }

    /// The inbound frame limit.
    #[must_use]
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Encode a frame to bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode(&self, frame: &Frame) -> Result<Bytes, ProtocolError> {
        encode(frame)
    }

    /// Try to decode a frame from a buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is too large or invalid.
    pub fn decode_from(&self, buf: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
        if buf.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let length = read_length(buf, self.max_frame_size)?;
        let total_size = LENGTH_PREFIX_SIZE + length;
        if buf.len() < total_size {
            buf.reserve(total_size - buf.len());
            return Ok(None);
        }

        buf.advance(LENGTH_PREFIX_SIZE);
        let payload = buf.split_to(length);
        let frame = rmp_serde::from_slice(&payload)?;

        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::ChatMessage;
    use crate::version::PROTOCOL_VERSION;

    #[test]
    fn test_encode_decode_roundtrip() {
        let frames = vec![
            Frame::register(1, ""),
            Frame::registered(
                1,
                "C2",
                "bob",
                vec![ChatMessage::new("SYSTEM", "alice joined the chat")],
            ),
            Frame::send(2, "C2", "hi there"),
            Frame::deliver(3, ChatMessage::new("alice", "hi")),
            Frame::timeout(3),
            Frame::error(4, 1001, "unknown client ID: C9"),
            Frame::welcome(PROTOCOL_VERSION, 5000),
        ];

        for frame in frames {
            let encoded = encode(&frame).unwrap();
            let decoded = decode(&encoded).unwrap();
            assert_eq!(frame, decoded);
        }
    }

    #[test]
    fn test_decode_incomplete() {
        let encoded = encode(&Frame::wait(1, "C1")).unwrap();

        match decode(&encoded[..5]) {
            Err(ProtocolError::Incomplete(_)) => {}
            other => panic!("Expected Incomplete error, got {:?}", other),
        }
    }

    #[test]
    fn test_frame_too_large() {
        let frame = Frame::send(1, "C1", "x".repeat(MAX_FRAME_SIZE + 1));

        match encode(&frame) {
            Err(ProtocolError::FrameTooLarge { .. }) => {}
            other => panic!("Expected FrameTooLarge error, got {:?}", other),
        }
    }

    #[test]
    fn test_codec_limit_rejects_on_prefix() {
        let codec = FrameCodec::new(16);
        let mut buf = BytesMut::new();
        encode_into(&Frame::send(1, "C1", "a message longer than sixteen bytes"), &mut buf).unwrap();

        // Only the prefix is needed to reject the frame.
        buf.truncate(LENGTH_PREFIX_SIZE);
        assert!(matches!(
            codec.decode_from(&mut buf),
            Err(ProtocolError::FrameTooLarge { max: 16, .. })
        ));
    }

    #[test]
    fn test_streaming_decode() {
        let frame1 = Frame::wait(1, "C1");
        let frame2 = Frame::send(2, "C1", "hello");

        let mut buf = BytesMut::new();
        encode_into(&frame1, &mut buf).unwrap();
        encode_into(&frame2, &mut buf).unwrap();

        // A partial trailing frame stays buffered.
        let tail = encode(&Frame::ack(3)).unwrap();
        buf.extend_from_slice(&tail[..3]);

        assert_eq!(decode_from(&mut buf).unwrap(), Some(frame1));
        assert_eq!(decode_from(&mut buf).unwrap(), Some(frame2));
        assert_eq!(decode_from(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), 3);
    }
}
