//! Connection handlers for the Relay server.
//!
//! This module handles the connection lifecycle and request dispatch.

use crate::config::{Config, TransportKind};
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::{Context, Result};
use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use dashmap::DashMap;
use relay_core::{ChatService, ClientId, RelayError, WaitOutcome};
use relay_protocol::{error_codes, Frame, PROTOCOL_VERSION};
use relay_transport::{
    Connection, ConnectionId, TcpConfig, TcpTransport, Transport, WebSocketConfig,
    WebSocketTransport,
};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The chat service.
    pub service: ChatService,
    /// Server configuration.
    pub config: Config,
    /// Clients registered through each open connection.
    pub connections: DashMap<ConnectionId, Vec<ClientId>>,
}

impl AppState {
    /// Create new app state. Starts the distributor.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            service: ChatService::with_config(config.relay_config()),
            config,
            connections: DashMap::new(),
        }
    }
}

/// Run the relay server until the process is killed.
///
/// # Errors
///
/// Returns an error if the transport cannot be bound.
pub async fn run_server(config: Config) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone()));

    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
        tokio::spawn(report_stats(
            Arc::downgrade(&state),
            Duration::from_millis(config.metrics.report_interval_ms.max(1)),
        ));
    }

    if config.admin.enabled {
        let addr = config.admin_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind admin endpoint on {}", addr))?;
        info!("Admin endpoint: http://{}/health", addr);
        let app = admin_router(Arc::clone(&state));
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Admin endpoint failed: {}", e);
            }
        });
    }

    let transport = bind_transport(&config).await?;
    info!(
        "Relay server listening on {} ({})",
        config.bind_addr()?,
        transport.name()
    );

    serve(transport, state).await;
    Ok(())
}

/// Bind the transport selected in the configuration.
///
/// # Errors
///
/// Returns an error if the address is invalid or cannot be bound.
pub async fn bind_transport(config: &Config) -> Result<Box<dyn Transport>> {
    let bind_addr = config.bind_addr()?;
    let max_frame_size = config.transport.max_frame_size;

    let transport: Box<dyn Transport> = match config.transport.kind {
        TransportKind::Tcp => Box::new(
            TcpTransport::new(TcpConfig {
                bind_addr,
                max_frame_size,
            })
            .await?,
        ),
        TransportKind::Websocket => Box::new(
            WebSocketTransport::new(WebSocketConfig {
                bind_addr,
                max_frame_size,
            })
            .await?,
        ),
    };
    Ok(transport)
}

/// Accept connections forever, one task per connection.
pub async fn serve(transport: Box<dyn Transport>, state: Arc<AppState>) {
    loop {
        match transport.accept().await {
            Ok(conn) => {
                tokio::spawn(handle_connection(conn, Arc::clone(&state)));
            }
            Err(e) => {
                warn!(error = %e, "Accept error");
                metrics::record_error("accept");
            }
        }
    }
}

/// Build the admin HTTP router.
pub fn admin_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .with_state(state)
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let running = state.service.stats().distributor_running;
    Json(serde_json::json!({
        "status": if running { "ok" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Statistics handler.
async fn stats_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "relay": state.service.stats(),
        "connections": state.connections.len(),
    }))
}

async fn report_stats(state: Weak<AppState>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let Some(state) = state.upgrade() else {
            break;
        };
        metrics::record_stats(&state.service.stats());
    }
}

/// Handle one connection until the peer goes away.
///
/// Each request runs in its own task so a pending long-poll never holds up
/// other calls on the same connection. Responses come back over a channel and
/// are written in completion order.
pub async fn handle_connection(mut conn: Box<dyn Connection>, state: Arc<AppState>) {
    let _metrics_guard = ConnectionMetricsGuard::new();
    let connection_id = conn.id().clone();
    state.connections.insert(connection_id.clone(), Vec::new());

    debug!(
        connection = %connection_id,
        remote = conn.remote_addr().as_deref().unwrap_or("unknown"),
        "Connected"
    );

    let (resp_tx, mut resp_rx) = mpsc::unbounded_channel::<Frame>();
    let mut calls = JoinSet::new();

    loop {
        tokio::select! {
            biased;

            Some(frame) = resp_rx.recv() => {
                if let Err(e) = conn.send(frame).await {
                    warn!(connection = %connection_id, error = %e, "Failed to send response");
                    metrics::record_error("transport");
                    break;
                }
            }

            Some(_) = calls.join_next(), if !calls.is_empty() => {}

            incoming = conn.recv() => {
                match incoming {
                    Ok(Some(frame)) => {
                        dispatch(frame, &connection_id, &state, &resp_tx, &mut calls);
                    }
                    Ok(None) => {
                        debug!(connection = %connection_id, "Connection closed by peer");
                        break;
                    }
                    Err(e) => {
                        warn!(connection = %connection_id, error = %e, "Transport error");
                        metrics::record_error("transport");
                        break;
                    }
                }
            }
        }
    }

    // Outstanding calls die with the connection.
    calls.shutdown().await;

    if let Some((_, clients)) = state.connections.remove(&connection_id) {
        debug!(connection = %connection_id, clients = ?clients, "Disconnected");
    }
}

/// Route a request frame to the chat service.
fn dispatch(
    frame: Frame,
    connection_id: &ConnectionId,
    state: &Arc<AppState>,
    resp_tx: &mpsc::UnboundedSender<Frame>,
    calls: &mut JoinSet<()>,
) {
    match frame {
        Frame::Register { id, name } => {
            let state = Arc::clone(state);
            let tx = resp_tx.clone();
            let connection_id = connection_id.clone();
            calls.spawn(async move {
                let start = Instant::now();
                let response = match state.service.register(name).await {
                    Ok(reg) => {
                        if let Some(mut clients) = state.connections.get_mut(&connection_id) {
                            clients.push(reg.client_id.clone());
                        }
                        Frame::registered(id, reg.client_id, reg.name, reg.history.into_vec())
                    }
                    Err(e) => error_frame(id, &e),
                };
                metrics::record_request("register", start.elapsed().as_secs_f64());
                let _ = tx.send(response);
            });
        }

        Frame::Send {
            id,
            client_id,
            text,
        } => {
            let state = Arc::clone(state);
            let tx = resp_tx.clone();
            calls.spawn(async move {
                let start = Instant::now();
                let response = match state.service.send(&client_id, text).await {
                    Ok(()) => Frame::ack(id),
                    Err(e) => error_frame(id, &e),
                };
                metrics::record_request("send", start.elapsed().as_secs_f64());
                let _ = tx.send(response);
            });
        }

        Frame::Wait { id, client_id } => {
            let state = Arc::clone(state);
            let tx = resp_tx.clone();
            calls.spawn(async move {
                let start = Instant::now();
                let response = match state.service.wait(&client_id).await {
                    Ok(WaitOutcome::Delivered(message)) => {
                        metrics::record_wait("delivered");
                        Frame::deliver(id, message)
                    }
                    Ok(WaitOutcome::TimedOut) => {
                        metrics::record_wait("timeout");
                        Frame::timeout(id)
                    }
                    Err(e) => error_frame(id, &e),
                };
                metrics::record_request("wait", start.elapsed().as_secs_f64());
                let _ = tx.send(response);
            });
        }

        Frame::Ping { timestamp } => {
            let _ = resp_tx.send(Frame::pong(timestamp));
        }

        Frame::Pong { .. } => {}

        Frame::Hello { version } => {
            let response = if version.is_compatible_with(&PROTOCOL_VERSION) {
                let wait_ms = state.service.config().wait_timeout.as_millis() as u64;
                Frame::welcome(PROTOCOL_VERSION, wait_ms)
            } else {
                warn!(connection = %connection_id, client_version = %version, "Incompatible protocol version");
                Frame::error(
                    0,
                    error_codes::INCOMPATIBLE_VERSION,
                    format!("Server speaks protocol {}", PROTOCOL_VERSION),
                )
            };
            let _ = resp_tx.send(response);
        }

        other => {
            warn!(connection = %connection_id, frame_type = ?other.frame_type(), "Unexpected frame type");
            metrics::record_error("unexpected_frame");
            let _ = resp_tx.send(Frame::error(
                other.request_id().unwrap_or(0),
                error_codes::UNEXPECTED_FRAME,
                "Unexpected frame",
            ));
        }
    }
}

fn error_frame(id: u64, error: &RelayError) -> Frame {
    let code = match error {
        RelayError::UnknownClient(_) => error_codes::UNKNOWN_CLIENT,
        RelayError::DistributorStopped => {
            metrics::record_error("distributor");
            error_codes::INTERNAL
        }
    };
    Frame::error(id, code, error.to_string())
}
