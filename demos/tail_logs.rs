//! Log tailing client example
//!
//! Follows one channel (or several, merged) and prints every record and state change.
//!
//! Run with: cargo run --example tail_logs -- alpha_early [alpha_trend ...]

use futures::StreamExt;
use logtail_stream::{ChannelStreamClient, Source, StreamConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut channels: Vec<String> = std::env::args().skip(1).collect();
    if channels.is_empty() {
        channels.push("alpha_early".to_string());
    }

    let client = ChannelStreamClient::websocket(StreamConfig::from_env())?;
    let mut entries = client.entries();
    let mut state = client.watch_state();

    if channels.len() == 1 {
        client.subscribe(channels.remove(0));
    } else {
        client.subscribe_merged(channels.iter().map(|c| Source::labelled(c.as_str(), c.as_str())));
    }

    loop {
        tokio::select! {
            entry = entries.next() => match entry {
                Some(entry) => println!("{:>6}  {}", entry.seq, entry.text),
                None => break,
            },
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("-- {}", *state.borrow_and_update());
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.unsubscribe();
    Ok(())
}
