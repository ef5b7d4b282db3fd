//! End-to-end behaviour of the client against a scripted connector.
//!
//! These tests run on a paused clock: whenever every task is idle the runtime jumps
//! straight to the next timer, so backoff delays can be asserted exactly without
//! waiting for them.

use crate::testing::{MockConnector, MockHandle};
use crate::{ChannelStreamClient, ConnectionState, LogEntry, Source, StreamConfig};
use futures::StreamExt;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tokio_test::{assert_err, assert_ok};

fn client_with(config: StreamConfig) -> (ChannelStreamClient, MockHandle) {
    let (connector, handle) = MockConnector::new();
    let client = ChannelStreamClient::new(connector, config).unwrap();
    (client, handle)
}

fn client() -> (ChannelStreamClient, MockHandle) {
    client_with(StreamConfig::default())
}

async fn wait_state(client: &ChannelStreamClient, want: ConnectionState) {
    let mut rx = client.watch_state();
    assert_ok!(rx.wait_for(|s| *s == want).await);
}

fn assert_elapsed(since: Instant, expected: Duration) {
    let elapsed = since.elapsed();
    assert!(
        elapsed >= expected && elapsed < expected + Duration::from_millis(50),
        "expected ~{:?}, got {:?}",
        expected,
        elapsed
    );
}

fn texts(entries: Vec<LogEntry>) -> Vec<String> {
    entries.into_iter().map(|e| e.text).collect()
}

#[tokio::test(start_paused = true)]
async fn test_records_are_buffered_in_order() {
    let (client, mut handle) = client();
    let mut entries = client.entries();

    client.subscribe("x");
    let link = handle.next_attempt().await.unwrap().accept();
    wait_state(&client, ConnectionState::Open).await;

    for i in 1..=3 {
        link.send(format!("line {}", i));
    }
    for i in 1..=3 {
        let entry = entries.next().await.unwrap();
        assert_eq!(entry, LogEntry::new(i, format!("line {}", i)));
    }
    assert_eq!(texts(client.current_buffer()), vec!["line 1", "line 2", "line 3"]);
}

#[tokio::test(start_paused = true)]
async fn test_close_reconnects_after_backoff() {
    let (client, mut handle) = client();

    client.subscribe("x");
    let link = handle.next_attempt().await.unwrap().accept();
    wait_state(&client, ConnectionState::Open).await;

    link.close();
    wait_state(&client, ConnectionState::Reconnecting).await;
    let closed_at = Instant::now();

    let attempt = handle.next_attempt().await.unwrap();
    assert_eq!(attempt.channel().as_str(), "x");
    assert_eq!(client.current_state(), ConnectionState::Connecting);
    assert_elapsed(closed_at, Duration::from_secs(1));

    // that attempt fails as well: the next wait doubles
    attempt.refuse();
    wait_state(&client, ConnectionState::Reconnecting).await;
    let failed_at = Instant::now();

    let _attempt = handle.next_attempt().await.unwrap();
    assert_elapsed(failed_at, Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_consecutive_failures_follow_capped_sequence() {
    let (client, mut handle) = client();
    client.subscribe("x");

    let mut attempt = handle.next_attempt().await.unwrap();
    let mut waits = Vec::new();
    for _ in 0..7 {
        attempt.refuse();
        wait_state(&client, ConnectionState::Reconnecting).await;
        let failed_at = Instant::now();
        attempt = handle.next_attempt().await.unwrap();
        waits.push(failed_at.elapsed().as_secs());
    }
    assert_eq!(waits, vec![1, 2, 4, 8, 16, 30, 30]);
}

#[tokio::test(start_paused = true)]
async fn test_open_resets_backoff() {
    let (client, mut handle) = client();
    client.subscribe("x");

    handle.next_attempt().await.unwrap().refuse();
    handle.next_attempt().await.unwrap().refuse();
    let link = handle.next_attempt().await.unwrap().accept();
    wait_state(&client, ConnectionState::Open).await;

    link.fail("connection reset");
    wait_state(&client, ConnectionState::Reconnecting).await;
    let dropped_at = Instant::now();

    let _attempt = handle.next_attempt().await.unwrap();
    assert_elapsed(dropped_at, Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_switch_while_reconnecting_cancels_old_timer() {
    let (client, mut handle) = client();
    let mut entries = client.entries();

    client.subscribe("a");
    let link_a = handle.next_attempt().await.unwrap().accept();
    wait_state(&client, ConnectionState::Open).await;
    link_a.close();
    wait_state(&client, ConnectionState::Reconnecting).await;

    client.subscribe("b");
    assert_eq!(client.current_state(), ConnectionState::Connecting);
    let attempt_b = handle.next_attempt().await.unwrap();
    assert_eq!(attempt_b.channel().as_str(), "b");

    let link_b = attempt_b.accept();
    wait_state(&client, ConnectionState::Open).await;

    // a's one-second timer would have fired long before this
    assert_err!(timeout(Duration::from_secs(120), handle.next_attempt()).await);

    link_b.send("fresh");
    assert_eq!(entries.next().await.unwrap().text, "fresh");

    let history: Vec<String> = handle.history().iter().map(|c| c.to_string()).collect();
    assert_eq!(history, vec!["a", "b"]);
}

#[tokio::test(start_paused = true)]
async fn test_late_records_from_old_session_are_ignored() {
    let (client, mut handle) = client();
    let mut entries = client.entries();

    client.subscribe("a");
    let link_a = handle.next_attempt().await.unwrap().accept();
    wait_state(&client, ConnectionState::Open).await;
    link_a.send("a1");
    assert_eq!(entries.next().await.unwrap().text, "a1");

    client.subscribe("b");
    assert!(client.current_buffer().is_empty());
    link_a.send("late");

    let link_b = handle.next_attempt().await.unwrap().accept();
    wait_state(&client, ConnectionState::Open).await;
    link_b.send("b1");

    assert_eq!(entries.next().await.unwrap(), LogEntry::new(1, "b1"));
    assert_eq!(texts(client.current_buffer()), vec!["b1"]);
    assert_ok!(timeout(Duration::from_secs(1), link_a.closed()).await);
}

#[tokio::test(start_paused = true)]
async fn test_switch_before_first_open() {
    let (client, mut handle) = client();

    client.subscribe("a");
    let attempt_a = handle.next_attempt().await.unwrap();
    client.subscribe("b");
    let attempt_b = handle.next_attempt().await.unwrap();
    assert_eq!(attempt_b.channel().as_str(), "b");

    // a's attempt resolving now has no observable effect
    let link_a = attempt_a.accept();
    link_a.send("ghost");
    tokio::task::yield_now().await;
    assert_eq!(client.current_state(), ConnectionState::Connecting);

    let link_b = attempt_b.accept();
    wait_state(&client, ConnectionState::Open).await;
    let mut entries = client.entries();
    link_b.send("real");
    assert_eq!(entries.next().await.unwrap().text, "real");

    assert_eq!(texts(client.current_buffer()), vec!["real"]);
    assert_eq!(client.channels().len(), 1);
    assert_eq!(client.channels()[0].as_str(), "b");
    assert_ok!(timeout(Duration::from_secs(1), link_a.closed()).await);
}

#[tokio::test(start_paused = true)]
async fn test_switch_before_first_open_with_failing_old_attempt() {
    let (client, mut handle) = client();

    client.subscribe("a");
    let attempt_a = handle.next_attempt().await.unwrap();
    client.subscribe("b");
    let attempt_b = handle.next_attempt().await.unwrap();

    attempt_a.refuse();
    tokio::task::yield_now().await;
    assert_eq!(client.current_state(), ConnectionState::Connecting);

    let _link_b = attempt_b.accept();
    wait_state(&client, ConnectionState::Open).await;

    // no retry for a gets scheduled
    assert_err!(timeout(Duration::from_secs(120), handle.next_attempt()).await);
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribe_goes_idle() {
    let (client, mut handle) = client();

    client.subscribe("x");
    let link = handle.next_attempt().await.unwrap().accept();
    wait_state(&client, ConnectionState::Open).await;
    link.send("one");
    link.close();
    wait_state(&client, ConnectionState::Reconnecting).await;

    client.unsubscribe();
    assert_eq!(client.current_state(), ConnectionState::Idle);
    assert!(client.current_buffer().is_empty());
    assert_eq!(*client.watch_state().borrow(), ConnectionState::Idle);

    assert_err!(timeout(Duration::from_secs(120), handle.next_attempt()).await);
}

#[tokio::test(start_paused = true)]
async fn test_drop_closes_connection() {
    let (client, mut handle) = client();

    client.subscribe("x");
    let link = handle.next_attempt().await.unwrap().accept();
    wait_state(&client, ConnectionState::Open).await;

    drop(client);
    assert_ok!(timeout(Duration::from_secs(1), link.closed()).await);

    // the connector went away with the client; either way no attempt is made
    let next = timeout(Duration::from_secs(120), handle.next_attempt()).await;
    assert!(!matches!(next, Ok(Some(_))));
}

#[tokio::test(start_paused = true)]
async fn test_connect_timeout_counts_as_failure() {
    let config = StreamConfig {
        connect_timeout_ms: 5_000,
        ..Default::default()
    };
    let (client, mut handle) = client_with(config);
    let started = Instant::now();

    client.subscribe("x");
    let _stalled = handle.next_attempt().await.unwrap();
    let _next = handle.next_attempt().await.unwrap();

    // five seconds stuck connecting, then the first one-second backoff
    assert_elapsed(started, Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn test_clear_logs_keeps_streaming() {
    let (client, mut handle) = client();
    let mut entries = client.entries();

    client.subscribe("x");
    let link = handle.next_attempt().await.unwrap().accept();
    wait_state(&client, ConnectionState::Open).await;

    link.send("before");
    entries.next().await.unwrap();
    client.clear_logs();
    assert!(client.current_buffer().is_empty());
    assert_eq!(client.current_state(), ConnectionState::Open);

    link.send("after");
    assert_eq!(entries.next().await.unwrap(), LogEntry::new(2, "after"));
    assert_eq!(texts(client.current_buffer()), vec!["after"]);
}

#[tokio::test(start_paused = true)]
async fn test_buffer_keeps_latest_entries() {
    let (client, mut handle) = client();
    let entries = client.entries();

    client.subscribe("x");
    let link = handle.next_attempt().await.unwrap().accept();
    wait_state(&client, ConnectionState::Open).await;

    for i in 1..=501 {
        link.send(format!("e{}", i));
    }
    let last = entries.skip(500).next().await.unwrap();
    assert_eq!(last.text, "e501");

    let buffer = client.current_buffer();
    assert_eq!(buffer.len(), 500);
    assert_eq!(buffer.first().unwrap().text, "e2");
    assert_eq!(buffer.last().unwrap().text, "e501");
}

#[tokio::test(start_paused = true)]
async fn test_merged_session() {
    let (client, mut handle) = client();
    let mut entries = client.entries();

    client.subscribe_merged([
        Source::labelled("alpha_early", "Alpha Early"),
        Source::labelled("alpha_trend", "Alpha Trend"),
    ]);

    let first = handle.next_attempt().await.unwrap();
    let second = handle.next_attempt().await.unwrap();
    let (early, trend) = if first.channel().as_str() == "alpha_early" {
        (first.accept(), second.accept())
    } else {
        (second.accept(), first.accept())
    };
    wait_state(&client, ConnectionState::Open).await;

    trend.send("breakout");
    assert_eq!(entries.next().await.unwrap().text, "Alpha Trend: breakout");
    early.send("volume spike");
    assert_eq!(entries.next().await.unwrap().text, "Alpha Early: volume spike");

    early.close();
    wait_state(&client, ConnectionState::Reconnecting).await;
    let dropped_at = Instant::now();

    let retry = handle.next_attempt().await.unwrap();
    assert_eq!(retry.channel().as_str(), "alpha_early");
    assert_elapsed(dropped_at, Duration::from_secs(1));
    assert_eq!(client.current_state(), ConnectionState::Connecting);

    // the healthy source keeps delivering meanwhile
    trend.send("still here");
    assert_eq!(entries.next().await.unwrap().text, "Alpha Trend: still here");

    let _early = retry.accept();
    wait_state(&client, ConnectionState::Open).await;
}
