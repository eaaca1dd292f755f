//! # relay-client
//!
//! Async client for the Relay chat server.
//!
//! One [`RelayClient`] owns one connection. Calls may be issued concurrently
//! from several tasks: each request gets its own ID and a driver task routes
//! every response back to the call that is waiting for it. The usual pattern
//! is one task looping on [`RelayClient::wait`] while another sends.
//!
//! ```rust,ignore
//! let client = RelayClient::connect("127.0.0.1:1234").await?;
//! let me = client.register("alice").await?;
//! client.send(&me.client_id, "hello").await?;
//! loop {
//!     match client.wait(&me.client_id).await? {
//!         WaitResult::Message(msg) => println!("[{}] {}", msg.from, msg.text),
//!         WaitResult::Timeout => continue,
//!     }
//! }
//! ```

use dashmap::DashMap;
use relay_protocol::{error_codes, ChatMessage, Frame, FrameType, Version, PROTOCOL_VERSION};
use relay_transport::{Connection, TcpConnection, TransportError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::ToSocketAddrs;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The connection is gone.
    #[error("Disconnected from server")]
    Disconnected,

    /// The server answered with an error frame.
    #[error("Server error {code}: {message}")]
    Server { code: u16, message: String },

    /// The server answered with a frame that does not fit the request.
    #[error("Unexpected response: {0:?}")]
    Unexpected(FrameType),

    /// The server speaks a different major protocol version.
    #[error("Incompatible server protocol {0}")]
    IncompatibleVersion(Version),
}

impl ClientError {
    /// Whether the server rejected the client ID as unregistered.
    #[must_use]
    pub fn is_unknown_client(&self) -> bool {
        matches!(self, ClientError::Server { code, .. } if *code == error_codes::UNKNOWN_CLIENT)
    }
}

/// A successful registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registered {
    /// Assigned client ID.
    pub client_id: String,
    /// Echoed display name.
    pub name: String,
    /// History at registration time.
    pub history: Vec<ChatMessage>,
}

/// Result of one long-poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitResult {
    /// A message arrived.
    Message(ChatMessage),
    /// The server deadline passed without a message; wait again.
    Timeout,
}

type Pending = DashMap<u64, oneshot::Sender<Frame>>;

/// A connection to a Relay server.
pub struct RelayClient {
    outgoing: mpsc::UnboundedSender<Frame>,
    pending: Arc<Pending>,
    next_id: AtomicU64,
    server_wait_timeout: Duration,
}

impl RelayClient {
    /// Connect over TCP and perform the version handshake.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or handshake fails.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let conn = TcpConnection::connect(addr).await?;
        Self::from_connection(Box::new(conn)).await
    }

    /// Connect over WebSocket (e.g. `ws://127.0.0.1:1234`) and perform the
    /// version handshake.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or handshake fails.
    pub async fn connect_websocket(url: &str) -> Result<Self, ClientError> {
        let conn = relay_transport::WebSocketConnection::connect(url).await?;
        Self::from_connection(Box::new(conn)).await
    }

    /// Take over an established connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the handshake fails.
    pub async fn from_connection(mut conn: Box<dyn Connection>) -> Result<Self, ClientError> {
        let server_wait_timeout = handshake(conn.as_mut()).await?;

        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let pending = Arc::new(Pending::new());
        tokio::spawn(drive(conn, outgoing_rx, Arc::clone(&pending)));

        Ok(Self {
            outgoing,
            pending,
            next_id: AtomicU64::new(1),
            server_wait_timeout,
        })
    }

    /// The long-poll deadline announced by the server.
    #[must_use]
    pub fn server_wait_timeout(&self) -> Duration {
        self.server_wait_timeout
    }

    /// Register under `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails.
    pub async fn register(&self, name: &str) -> Result<Registered, ClientError> {
        match self.call(|id| Frame::register(id, name)).await? {
            Frame::Registered {
                client_id,
                name,
                history,
                ..
            } => Ok(Registered {
                client_id,
                name,
                history,
            }),
            other => Err(ClientError::Unexpected(other.frame_type())),
        }
    }

    /// Send a message as `client_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the client ID is unknown or the call fails.
    pub async fn send(&self, client_id: &str, text: &str) -> Result<(), ClientError> {
        match self.call(|id| Frame::send(id, client_id, text)).await? {
            Frame::Ack { .. } => Ok(()),
            other => Err(ClientError::Unexpected(other.frame_type())),
        }
    }

    /// Long-poll for the next message addressed to `client_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the client ID is unknown or the call fails.
    pub async fn wait(&self, client_id: &str) -> Result<WaitResult, ClientError> {
        match self.call(|id| Frame::wait(id, client_id)).await? {
            Frame::Deliver { message, .. } => Ok(WaitResult::Message(message)),
            Frame::Timeout { .. } => Ok(WaitResult::Timeout),
            other => Err(ClientError::Unexpected(other.frame_type())),
        }
    }

    async fn call(&self, request: impl FnOnce(u64) -> Frame) -> Result<Frame, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        if self.outgoing.send(request(id)).is_err() {
            self.pending.remove(&id);
            return Err(ClientError::Disconnected);
        }

        match rx.await.map_err(|_| ClientError::Disconnected)? {
            Frame::Error { code, message, .. } => Err(ClientError::Server { code, message }),
            frame => Ok(frame),
        }
    }
}

async fn handshake(conn: &mut dyn Connection) -> Result<Duration, ClientError> {
    conn.send(Frame::hello(PROTOCOL_VERSION)).await?;

    match conn.recv().await? {
        Some(Frame::Welcome {
            version,
            wait_timeout_ms,
        }) => {
            if !version.is_compatible_with(&PROTOCOL_VERSION) {
                return Err(ClientError::IncompatibleVersion(version));
            }
            debug!(server_version = %version, wait_timeout_ms, "Handshake complete");
            Ok(Duration::from_millis(wait_timeout_ms))
        }
        Some(Frame::Error { code, message, .. }) => Err(ClientError::Server { code, message }),
        Some(other) => Err(ClientError::Unexpected(other.frame_type())),
        None => Err(ClientError::Disconnected),
    }
}

/// Own the connection: write queued requests, route responses by ID.
async fn drive(
    mut conn: Box<dyn Connection>,
    mut outgoing: mpsc::UnboundedReceiver<Frame>,
    pending: Arc<Pending>,
) {
    loop {
        tokio::select! {
            request = outgoing.recv() => {
                let Some(frame) = request else {
                    // Client dropped.
                    let _ = conn.close().await;
                    break;
                };
                if let Err(e) = conn.send(frame).await {
                    warn!(error = %e, "Failed to send request");
                    break;
                }
            }

            incoming = conn.recv() => {
                match incoming {
                    Ok(Some(Frame::Ping { timestamp })) => {
                        if conn.send(Frame::pong(timestamp)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Some(frame)) => route(frame, &pending),
                    Ok(None) => {
                        debug!("Server closed the connection");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Transport error");
                        break;
                    }
                }
            }
        }
    }

    // Wake every caller still waiting with `Disconnected`.
    pending.clear();
}

fn route(frame: Frame, pending: &Pending) {
    match frame.request_id() {
        Some(id) => match pending.remove(&id) {
            Some((_, tx)) => {
                // The caller may have stopped waiting.
                let _ = tx.send(frame);
            }
            None => debug!(id, "Response for unknown request"),
        },
        None => debug!(frame_type = ?frame.frame_type(), "Ignoring uncorrelated frame"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_transport::{TcpTransport, Transport};

    /// A scripted server: answers the handshake, then hands the connection
    /// to `script`.
    async fn scripted_server<F, Fut>(script: F) -> std::net::SocketAddr
    where
        F: FnOnce(Box<dyn Connection>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let transport = TcpTransport::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = transport.local_addr().unwrap();
        tokio::spawn(async move {
            let mut conn = transport.accept().await.unwrap();
            match conn.recv().await.unwrap() {
                Some(Frame::Hello { .. }) => {}
                other => panic!("expected hello, got {other:?}"),
            }
            conn.send(Frame::welcome(PROTOCOL_VERSION, 5000)).await.unwrap();
            script(conn).await;
        });
        addr
    }

    #[tokio::test]
    async fn test_handshake_reports_server_timeout() {
        let addr = scripted_server(|_conn| async {}).await;
        let client = RelayClient::connect(addr).await.unwrap();
        assert_eq!(client.server_wait_timeout(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_responses_routed_out_of_order() {
        let addr = scripted_server(|mut conn| async move {
            let first = conn.recv().await.unwrap().unwrap();
            let second = conn.recv().await.unwrap().unwrap();
            let (Frame::Wait { id: wait_id, .. }, Frame::Send { id: send_id, .. }) =
                (first, second)
            else {
                panic!("expected wait then send");
            };
            // Answer the send before the wait.
            conn.send(Frame::ack(send_id)).await.unwrap();
            conn.send(Frame::deliver(wait_id, ChatMessage::new("bob", "yo")))
                .await
                .unwrap();
            let _ = conn.recv().await;
        })
        .await;

        let client = Arc::new(RelayClient::connect(addr).await.unwrap());
        let waiter = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.wait("C1").await })
        };
        // Let the wait go out first.
        tokio::time::sleep(Duration::from_millis(20)).await;
        client.send("C1", "hi").await.unwrap();

        let result = waiter.await.unwrap().unwrap();
        assert_eq!(result, WaitResult::Message(ChatMessage::new("bob", "yo")));
    }

    #[tokio::test]
    async fn test_server_error_maps_to_client_error() {
        let addr = scripted_server(|mut conn| async move {
            if let Some(Frame::Wait { id, client_id }) = conn.recv().await.unwrap() {
                conn.send(Frame::error(
                    id,
                    error_codes::UNKNOWN_CLIENT,
                    format!("Unknown client ID: {client_id}"),
                ))
                .await
                .unwrap();
            }
            let _ = conn.recv().await;
        })
        .await;

        let client = RelayClient::connect(addr).await.unwrap();
        let err = client.wait("C7").await.unwrap_err();
        assert!(err.is_unknown_client());
    }

    #[tokio::test]
    async fn test_disconnect_fails_pending_calls() {
        let addr = scripted_server(|mut conn| async move {
            // Read the wait, then hang up without answering.
            let _ = conn.recv().await;
            let _ = conn.close().await;
        })
        .await;

        let client = RelayClient::connect(addr).await.unwrap();
        assert!(matches!(
            client.wait("C1").await,
            Err(ClientError::Disconnected)
        ));
    }
}
