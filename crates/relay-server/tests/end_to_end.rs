//! Client and server talking over a real TCP socket.

use relay_client::{RelayClient, WaitResult};
use relay_protocol::ChatMessage;
use relay_server::{handlers, AppState, Config};
use relay_transport::{TcpTransport, Transport};
use std::sync::Arc;
use std::time::Duration;

async fn start_server(wait_timeout_ms: u64) -> (std::net::SocketAddr, Arc<AppState>) {
    let mut config = Config::default();
    config.relay.wait_timeout_ms = wait_timeout_ms;
    config.admin.enabled = false;
    config.metrics.enabled = false;

    let transport = TcpTransport::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = transport.local_addr().unwrap();
    let state = Arc::new(AppState::new(config));
    tokio::spawn(handlers::serve(Box::new(transport), Arc::clone(&state)));
    (addr, state)
}

/// Wait until a message arrives, skipping timeouts.
async fn next_message(client: &RelayClient, client_id: &str) -> ChatMessage {
    loop {
        match client.wait(client_id).await.unwrap() {
            WaitResult::Message(msg) => return msg,
            WaitResult::Timeout => continue,
        }
    }
}

#[tokio::test]
async fn test_chat_scenario() {
    let (addr, _state) = start_server(2_000).await;

    let alice = RelayClient::connect(addr).await.unwrap();
    let bob = RelayClient::connect(addr).await.unwrap();

    let a = alice.register("Alice").await.unwrap();
    assert_eq!(a.client_id, "C1");
    assert!(a.history.is_empty());

    let b = bob.register("Bob").await.unwrap();
    assert_eq!(b.client_id, "C2");
    assert_eq!(
        b.history,
        vec![ChatMessage::new("SYSTEM", "Alice joined the chat")]
    );

    // Alice is told about herself, then about Bob.
    assert_eq!(
        next_message(&alice, "C1").await,
        ChatMessage::new("SYSTEM", "Alice joined the chat")
    );
    assert_eq!(
        next_message(&alice, "C1").await,
        ChatMessage::new("SYSTEM", "Bob joined the chat")
    );

    alice.send("C1", "hi").await.unwrap();
    assert_eq!(
        next_message(&bob, "C2").await,
        ChatMessage::new("SYSTEM", "Bob joined the chat")
    );
    assert_eq!(next_message(&bob, "C2").await, ChatMessage::new("Alice", "hi"));
    // The sender gets its own message back.
    assert_eq!(
        next_message(&alice, "C1").await,
        ChatMessage::new("Alice", "hi")
    );
}

#[tokio::test]
async fn test_unknown_client_is_rejected() {
    let (addr, _state) = start_server(2_000).await;
    let client = RelayClient::connect(addr).await.unwrap();

    assert!(client.send("C42", "hello").await.unwrap_err().is_unknown_client());
    assert!(client.wait("C42").await.unwrap_err().is_unknown_client());
}

#[tokio::test]
async fn test_wait_times_out() {
    let (addr, _state) = start_server(100).await;
    let client = RelayClient::connect(addr).await.unwrap();
    assert_eq!(client.server_wait_timeout(), Duration::from_millis(100));

    let me = client.register("Solo").await.unwrap();
    assert_eq!(
        next_message(&client, &me.client_id).await.text,
        "Solo joined the chat"
    );
    assert_eq!(client.wait(&me.client_id).await.unwrap(), WaitResult::Timeout);
}

#[tokio::test]
async fn test_wait_and_send_share_a_connection() {
    let (addr, state) = start_server(5_000).await;
    let client = Arc::new(RelayClient::connect(addr).await.unwrap());
    let me = client.register("Carol").await.unwrap();
    next_message(&client, &me.client_id).await;

    let waiter = {
        let client = Arc::clone(&client);
        let id = me.client_id.clone();
        tokio::spawn(async move { client.wait(&id).await })
    };

    // The send must complete while the wait is still pending.
    tokio::time::timeout(Duration::from_secs(1), client.send(&me.client_id, "ping"))
        .await
        .expect("send blocked behind wait")
        .unwrap();

    assert_eq!(
        waiter.await.unwrap().unwrap(),
        WaitResult::Message(ChatMessage::new("Carol", "ping"))
    );
    assert_eq!(state.service.history().len(), 2);
}

#[tokio::test]
async fn test_disconnect_releases_connection_entry() {
    let (addr, state) = start_server(2_000).await;

    let client = RelayClient::connect(addr).await.unwrap();
    client.register("Dave").await.unwrap();
    assert_eq!(state.connections.len(), 1);

    drop(client);
    for _ in 0..100 {
        if state.connections.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(state.connections.is_empty());
    // The registration outlives the connection.
    assert!(state.service.client("C1").is_some());
}
