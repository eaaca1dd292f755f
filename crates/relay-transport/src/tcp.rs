//! Raw TCP transport.
//!
//! Frames are written back to back on the stream, each with its 4-byte
//! length prefix.

use async_trait::async_trait;
use bytes::BytesMut;
use relay_protocol::codec::{self, FrameCodec};
use relay_protocol::Frame;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{debug, info};

use crate::traits::{Connection, ConnectionId, Transport, TransportError};

/// TCP transport configuration.
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum inbound frame size in bytes.
    pub max_frame_size: usize,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 1234)),
            max_frame_size: 64 * 1024, // 64 KB
        }
    }
}

/// TCP transport.
pub struct TcpTransport {
    listener: TcpListener,
    config: TcpConfig,
}

impl TcpTransport {
    /// Create a new TCP transport.
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the address fails.
    pub async fn new(config: TcpConfig) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(config.bind_addr).await?;

        info!("TCP transport listening on {}", config.bind_addr);

        Ok(Self { listener, config })
    }

    /// Create a new TCP transport with the default frame limit.
    ///
    /// # Errors
    ///
    /// Returns an error if binding fails.
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        Self::new(TcpConfig {
            bind_addr: addr,
            ..Default::default()
        })
        .await
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn accept(&self) -> Result<Box<dyn Connection>, TransportError> {
        let (stream, addr) = self.listener.accept().await?;

        debug!("Accepted TCP connection from {}", addr);

        let conn = TcpConnection::new(stream, addr, self.config.max_frame_size);
        Ok(Box::new(conn))
    }

    fn name(&self) -> &'static str {
        "tcp"
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }
}

/// A TCP connection carrying length-prefixed frames.
pub struct TcpConnection {
    id: ConnectionId,
    stream: TcpStream,
    remote_addr: SocketAddr,
    is_open: bool,
    read_buffer: BytesMut,
    codec: FrameCodec,
}

impl TcpConnection {
    fn new(stream: TcpStream, remote_addr: SocketAddr, max_frame_size: usize) -> Self {
        Self {
            id: ConnectionId::generate(),
            stream,
            remote_addr,
            is_open: true,
            read_buffer: BytesMut::with_capacity(4096),
            codec: FrameCodec::new(max_frame_size),
        }
    }

    /// Connect to a server.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let remote_addr = stream.peer_addr()?;
        Ok(Self::new(stream, remote_addr, codec::MAX_FRAME_SIZE))
    }
}

#[async_trait]
impl Connection for TcpConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        loop {
            if let Some(frame) = self.codec.decode_from(&mut self.read_buffer)? {
                return Ok(Some(frame));
            }

            // `read_buf` is cancel-safe: bytes are only appended once read.
            let n = self.stream.read_buf(&mut self.read_buffer).await?;
            if n == 0 {
                self.is_open = false;
                if self.read_buffer.is_empty() {
                    debug!(connection = %self.id, "TCP stream ended");
                    return Ok(None);
                }
                return Err(TransportError::ReceiveFailed(format!(
                    "stream ended inside a frame ({} bytes buffered)",
                    self.read_buffer.len()
                )));
            }
        }
    }

    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        if !self.is_open {
            return Err(TransportError::ConnectionClosed);
        }

        let data = codec::encode(&frame)?;
        self.stream
            .write_all(&data)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.is_open {
            return Ok(());
        }
        self.is_open = false;
        self.stream.shutdown().await?;
        Ok(())
    }

    fn remote_addr(&self) -> Option<String> {
        Some(self.remote_addr.to_string())
    }

    fn is_open(&self) -> bool {
        self.is_open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcp_config_default() {
        let config = TcpConfig::default();
        assert_eq!(config.bind_addr.port(), 1234);
        assert_eq!(config.max_frame_size, 64 * 1024);
    }

    #[tokio::test]
    async fn test_frames_cross_the_wire() {
        let transport = TcpTransport::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = transport.local_addr().unwrap();

        let mut client = TcpConnection::connect(addr).await.unwrap();
        let mut server = transport.accept().await.unwrap();

        client.send(Frame::register(1, "alice")).await.unwrap();
        client.send(Frame::wait(2, "C1")).await.unwrap();

        assert_eq!(server.recv().await.unwrap(), Some(Frame::register(1, "alice")));
        assert_eq!(server.recv().await.unwrap(), Some(Frame::wait(2, "C1")));

        server.send(Frame::timeout(2)).await.unwrap();
        assert_eq!(client.recv().await.unwrap(), Some(Frame::timeout(2)));

        client.close().await.unwrap();
        assert_eq!(server.recv().await.unwrap(), None);
        assert!(!server.is_open());
    }

    #[tokio::test]
    async fn test_oversized_frame_is_rejected() {
        let transport = TcpTransport::new(TcpConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            max_frame_size: 32,
        })
        .await
        .unwrap();
        let addr = transport.local_addr().unwrap();

        let mut client = TcpConnection::connect(addr).await.unwrap();
        let mut server = transport.accept().await.unwrap();

        client
            .send(Frame::send(1, "C1", "x".repeat(100)))
            .await
            .unwrap();
        assert!(matches!(
            server.recv().await,
            Err(TransportError::Protocol(_))
        ));
    }
}
