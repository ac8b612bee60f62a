mod common;

use common::{spawn_ws_server, wait_until, WsScript, VALID_TRANSACTION};
use pulse_monitor_lib::monitor::stream::StreamClient;
use pulse_monitor_lib::monitor::types::{ConnectionState, MonitorEvent};
use std::time::Duration;
use tokio::sync::mpsc;

const RECONNECT_DELAY: Duration = Duration::from_millis(200);

#[tokio::test]
async fn reconnects_once_per_close_and_never_sooner_than_the_delay() {
    let server = spawn_ws_server(WsScript::SendThenClose(vec![
        VALID_TRANSACTION.to_string(),
    ]))
    .await;
    let (events, _receiver) = mpsc::channel(256);
    let mut client = StreamClient::new(server.endpoint(), RECONNECT_DELAY, 100, events);

    client.connect();
    let reconnected = wait_until(Duration::from_secs(3), || server.accepted().len() >= 3).await;
    client.teardown().await;
    assert!(reconnected, "server should have seen three connections");

    let accepted = server.accepted();
    for pair in accepted.windows(2) {
        let gap = pair[1].duration_since(pair[0]);
        assert!(
            gap >= RECONNECT_DELAY,
            "reconnect after {gap:?}, expected at least {RECONNECT_DELAY:?}"
        );
    }

    // One attempt per closed connection, no stacked timers.
    assert_eq!(client.counters().connect_attempts() as usize, accepted.len());
    assert!(client.counters().received() >= 2);
}

#[tokio::test]
async fn teardown_cancels_pending_reconnect() {
    let server = spawn_ws_server(WsScript::SendThenClose(Vec::new())).await;
    let (events, _receiver) = mpsc::channel(256);
    let mut client = StreamClient::new(server.endpoint(), RECONNECT_DELAY, 100, events);

    client.connect();
    assert!(wait_until(Duration::from_secs(2), || server.accepted().len() == 1).await);
    client.teardown().await;

    tokio::time::sleep(RECONNECT_DELAY * 2).await;
    assert_eq!(server.accepted().len(), 1);
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn malformed_frames_are_counted_and_valid_ones_kept() {
    let server = spawn_ws_server(WsScript::SendThenHold(vec![
        "not json at all".to_string(),
        VALID_TRANSACTION.to_string(),
        r#"{"id":"tx-2"}"#.to_string(),
    ]))
    .await;
    let (events, _receiver) = mpsc::channel(256);
    let mut client = StreamClient::new(server.endpoint(), RECONNECT_DELAY, 100, events);

    client.connect();
    let counters = client.counters();
    let settled = wait_until(Duration::from_secs(2), || {
        counters.received() == 1 && counters.dropped_malformed() == 2
    })
    .await;
    let recent = client.recent_transactions();
    client.teardown().await;

    assert!(settled);
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].id, "tx-1");
    assert!(recent[0].is_anomaly());
}

#[tokio::test]
async fn connection_states_are_announced_in_order() {
    let server = spawn_ws_server(WsScript::SendThenHold(Vec::new())).await;
    let (events, mut receiver) = mpsc::channel(256);
    let mut client = StreamClient::new(server.endpoint(), RECONNECT_DELAY, 100, events);

    client.connect();
    let mut states = Vec::new();
    while states.len() < 2 {
        match tokio::time::timeout(Duration::from_secs(2), receiver.recv()).await {
            Ok(Some(MonitorEvent::Connection(state))) => states.push(state),
            Ok(Some(_)) => {}
            _ => break,
        }
    }
    client.teardown().await;

    assert_eq!(
        states,
        vec![ConnectionState::Connecting, ConnectionState::Connected]
    );
}

#[tokio::test]
async fn teardown_is_bounded_when_peer_stops_reading() {
    let server = spawn_ws_server(WsScript::FloodPings).await;
    let (events, _receiver) = mpsc::channel(256);
    let mut client = StreamClient::new(server.endpoint(), RECONNECT_DELAY, 100, events);

    client.connect();
    let connected = wait_until(Duration::from_secs(2), || {
        client.state() == ConnectionState::Connected
    })
    .await;
    assert!(connected);
    tokio::time::sleep(Duration::from_millis(500)).await;

    let finished = tokio::time::timeout(Duration::from_secs(3), client.teardown()).await;

    assert!(finished.is_ok(), "teardown should not wait on a peer that never reads");
    assert_eq!(client.state(), ConnectionState::Disconnected);
}
