//! Log streaming server example
//!
//! Serves `/ws/logs?bot=<channel>` and publishes a line to every channel each second.
//!
//! Run with: cargo run --example log_server

use logtail_stream::server::{router, LogHub};
use std::sync::Arc;
use std::time::Duration;

const CHANNELS: [&str; 2] = ["alpha_early", "alpha_trend"];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let hub = Arc::new(LogHub::default());
    let app = router(Arc::clone(&hub));

    let publisher = Arc::clone(&hub);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        let mut tick = 0u64;
        loop {
            ticker.tick().await;
            tick += 1;
            for channel in CHANNELS {
                publisher.publish(channel, format!("{} tick {}", channel, tick));
            }
        }
    });

    println!("Serving logs on ws://127.0.0.1:8000/ws/logs?bot=<channel>");
    let listener = tokio::net::TcpListener::bind("127.0.0.1:8000").await?;
    axum::serve(listener, app).await?;
    Ok(())
}
