//! Interactive terminal chat for the Relay server.

use anyhow::{Context, Result};
use clap::Parser;
use relay_client::{ClientError, RelayClient, WaitResult};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Log filter when `RUST_LOG` is unset. Anything chattier than warnings would
/// interleave with the conversation on the terminal.
const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Parser, Debug)]
#[command(name = "relay-chat", version, about = "Chat through a Relay server")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:1234")]
    server: String,

    /// Display name (prompted for if omitted)
    #[arg(short, long)]
    name: Option<String>,

    /// Connect over WebSocket instead of TCP
    #[arg(long)]
    websocket: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let client = if args.websocket {
        RelayClient::connect_websocket(&format!("ws://{}", args.server)).await
    } else {
        RelayClient::connect(args.server.as_str()).await
    }
    .with_context(|| format!("Failed to connect to {}", args.server))?;
    let client = Arc::new(client);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let name = match args.name {
        Some(name) => name,
        None => {
            prompt("Enter your name: ")?;
            lines.next_line().await?.unwrap_or_default().trim().to_string()
        }
    };
    anyhow::ensure!(!name.is_empty(), "A name is required");

    let me = client.register(&name).await.context("Registration failed")?;
    println!("Connected as {} (ID: {})", me.name, me.client_id);
    println!("-------- history --------");
    for msg in &me.history {
        println!("[{}] {}", msg.from, msg.text);
    }
    println!("-------------------------");

    let receiver = {
        let client = Arc::clone(&client);
        let client_id = me.client_id.clone();
        let name = me.name.clone();
        tokio::spawn(async move {
            loop {
                match client.wait(&client_id).await {
                    // Our own messages come back too; the terminal already shows them.
                    Ok(WaitResult::Message(msg)) if msg.from == name => {}
                    Ok(WaitResult::Message(msg)) => {
                        println!("\r[{}] {}", msg.from, msg.text);
                        let _ = prompt("> ");
                    }
                    Ok(WaitResult::Timeout) => {}
                    Err(ClientError::Disconnected) => {
                        eprintln!("\rDisconnected from server");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Wait failed");
                        tokio::time::sleep(Duration::from_millis(500)).await;
                    }
                }
            }
        })
    };

    loop {
        prompt("> ")?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let text = line.trim();
        if text == "exit" {
            break;
        }
        if text.is_empty() {
            continue;
        }
        if let Err(e) = client.send(&me.client_id, text).await {
            eprintln!("Send failed: {}", e);
            if matches!(e, ClientError::Disconnected) {
                break;
            }
        }
    }

    receiver.abort();
    println!("Goodbye");
    Ok(())
}

fn prompt(text: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    stdout.write_all(text.as_bytes())?;
    stdout.flush()
}
