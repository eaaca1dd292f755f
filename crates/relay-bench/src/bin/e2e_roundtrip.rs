//! End-to-end round-trip benchmark against a running Relay server.
//!
//! Each client registers, then repeatedly sends a message and long-polls until
//! its own message comes back. Start the server first: `cargo run --release --bin relay`.
//!
//! Usage: `e2e_roundtrip [clients] [server-addr]`

use relay_client::{RelayClient, WaitResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Barrier;

const WARMUP_SECS: u64 = 2;
const BENCH_SECS: u64 = 10;

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    let num_clients: usize = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(8);
    let server = args
        .get(2)
        .cloned()
        .unwrap_or_else(|| "127.0.0.1:1234".to_string());

    println!("Relay end-to-end round-trip benchmark");
    println!("  Server: {}, clients: {}", server, num_clients);
    println!("  Warmup: {}s, measurement: {}s", WARMUP_SECS, BENCH_SECS);
    println!();

    let round_trips = Arc::new(AtomicU64::new(0));
    let barrier = Arc::new(Barrier::new(num_clients + 1));

    let mut handles = Vec::new();
    for n in 0..num_clients {
        let round_trips = Arc::clone(&round_trips);
        let barrier = Arc::clone(&barrier);
        let server = server.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = run_client(n, &server, round_trips, barrier).await {
                eprintln!("Client {} error: {}", n, e);
            }
        }));
    }

    barrier.wait().await;
    println!("All {} clients registered", num_clients);

    tokio::time::sleep(Duration::from_secs(WARMUP_SECS)).await;
    round_trips.store(0, Ordering::SeqCst);
    let start = Instant::now();
    tokio::time::sleep(Duration::from_secs(BENCH_SECS)).await;

    let elapsed = start.elapsed();
    let total = round_trips.load(Ordering::SeqCst);
    let per_sec = total as f64 / elapsed.as_secs_f64();

    println!();
    println!("Results");
    println!("  Duration:     {:>10.2}s", elapsed.as_secs_f64());
    println!("  Round trips:  {:>10}", total);
    println!("  Throughput:   {:>10.0} rt/s", per_sec);
    println!("  Per client:   {:>10.0} rt/s", per_sec / num_clients as f64);
    if total > 0 {
        println!(
            "  Mean latency: {:>10.3}ms",
            elapsed.as_secs_f64() * 1000.0 * num_clients as f64 / total as f64
        );
    }

    for handle in handles {
        handle.abort();
    }
}

async fn run_client(
    n: usize,
    server: &str,
    round_trips: Arc<AtomicU64>,
    barrier: Arc<Barrier>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let client = RelayClient::connect(server).await?;
    let name = format!("bench-{}", n);
    let me = client.register(&name).await?;

    barrier.wait().await;

    let mut seq = 0u64;
    'send: loop {
        seq += 1;
        let text = seq.to_string();
        client.send(&me.client_id, &text).await?;

        // Other clients' traffic and dropped deliveries are skipped.
        loop {
            match client.wait(&me.client_id).await? {
                WaitResult::Message(msg) if msg.from == name && msg.text == text => break,
                WaitResult::Message(_) => {}
                // Our message was dropped from a full inbox.
                WaitResult::Timeout => continue 'send,
            }
        }
        round_trips.fetch_add(1, Ordering::Relaxed);
    }
}
