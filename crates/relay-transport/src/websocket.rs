//! WebSocket transport implementation.
//!
//! Each binary WebSocket message carries one or more length-prefixed frames,
//! exactly as on the raw TCP transport.

use async_trait::async_trait;
use bytes::BytesMut;
use futures_util::{SinkExt, StreamExt};
use relay_protocol::codec::{self, FrameCodec};
use relay_protocol::Frame;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
    accept_async, connect_async,
    tungstenite::{Error as WsError, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::traits::{Connection, ConnectionId, Transport, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport configuration.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum inbound frame size in bytes.
    pub max_frame_size: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 1234)),
            max_frame_size: 64 * 1024, // 64 KB
        }
    }
}

/// WebSocket transport.
pub struct WebSocketTransport {
    listener: TcpListener,
    config: WebSocketConfig,
}

impl WebSocketTransport {
    /// Create a new WebSocket transport.
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the address fails.
    pub async fn new(config: WebSocketConfig) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(config.bind_addr).await?;

        info!("WebSocket transport listening on {}", config.bind_addr);

        Ok(Self { listener, config })
    }

    /// Create a new WebSocket transport with the default frame limit.
    ///
    /// # Errors
    ///
    /// Returns an error if binding fails.
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        Self::new(WebSocketConfig {
            bind_addr: addr,
            ..Default::default()
        })
        .await
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn accept(&self) -> Result<Box<dyn Connection>, TransportError> {
        let (stream, addr) = self.listener.accept().await?;

        debug!("Accepted TCP connection from {}", addr);

        let ws_stream = accept_async(MaybeTlsStream::Plain(stream))
            .await
            .map_err(|e| {
                error!("WebSocket handshake failed: {}", e);
                TransportError::Other(format!("WebSocket handshake failed: {}", e))
            })?;

        debug!("WebSocket handshake completed with {}", addr);

        let conn = WebSocketConnection::new(ws_stream, addr, self.config.max_frame_size);
        Ok(Box::new(conn))
    }

    fn name(&self) -> &'static str {
        "websocket"
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }
}

/// A WebSocket connection.
pub struct WebSocketConnection {
    id: ConnectionId,
    stream: WsStream,
    remote_addr: SocketAddr,
    is_open: bool,
    read_buffer: BytesMut,
    codec: FrameCodec,
}

impl WebSocketConnection {
    fn new(stream: WsStream, remote_addr: SocketAddr, max_frame_size: usize) -> Self {
        Self {
            id: ConnectionId::generate(),
            stream,
            remote_addr,
            is_open: true,
            read_buffer: BytesMut::with_capacity(4096),
            codec: FrameCodec::new(max_frame_size),
        }
    }

    /// Connect to a server, e.g. `ws://127.0.0.1:1234`.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP connection or the handshake fails.
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let (ws_stream, _response) = connect_async(url)
            .await
            .map_err(|e| TransportError::Other(format!("WebSocket connect failed: {}", e)))?;

        let remote_addr = match ws_stream.get_ref() {
            MaybeTlsStream::Plain(tcp) => tcp.peer_addr()?,
            _ => return Err(TransportError::Other("unsupported stream type".to_string())),
        };

        Ok(Self::new(ws_stream, remote_addr, codec::MAX_FRAME_SIZE))
    }
}

#[async_trait]
impl Connection for WebSocketConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        // First, try to decode from the existing buffer
        if let Some(frame) = self.codec.decode_from(&mut self.read_buffer)? {
            return Ok(Some(frame));
        }

        loop {
            // `next` is cancel-safe; the buffer only grows once a message is in.
            match self.stream.next().await {
                Some(Ok(Message::Binary(data))) => {
                    self.read_buffer.extend_from_slice(&data);

                    if let Some(frame) = self.codec.decode_from(&mut self.read_buffer)? {
                        return Ok(Some(frame));
                    }
                }
                Some(Ok(Message::Text(_))) => {
                    warn!(connection = %self.id, "Ignoring text message");
                }
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = self.stream.send(Message::Pong(data)).await {
                        warn!("Failed to send pong: {}", e);
                    }
                }
                Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                Some(Ok(Message::Close(_))) | Some(Err(WsError::ConnectionClosed)) | None => {
                    debug!(connection = %self.id, "WebSocket closed");
                    self.is_open = false;
                    return Ok(None);
                }
                Some(Err(e)) => {
                    error!("WebSocket error: {}", e);
                    self.is_open = false;
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
            }
        }
    }

    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        if !self.is_open {
            return Err(TransportError::ConnectionClosed);
        }

        let data = codec::encode(&frame)?;
        self.stream
            .send(Message::Binary(data.to_vec()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.is_open {
            return Ok(()); // Already closed
        }
        self.is_open = false;

        self.stream
            .close(None)
            .await
            .map_err(|e| TransportError::Other(format!("Failed to close: {}", e)))
    }

    fn remote_addr(&self) -> Option<String> {
        Some(self.remote_addr.to_string())
    }

    fn is_open(&self) -> bool {
        self.is_open
    }
}
