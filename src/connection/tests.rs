//! Tests for the connection handle
//!
//! These drive a full session over an in-memory transport and check what a
//! consumer of [`Connection`] observes.

#![cfg(test)]

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;

use super::*;
use crate::sync::{Frame, WireMessage};
use crate::test_utils::{EPS_BYTES, StaticSnapshots, health_bytes, sample_dictionaries, snapshot_of};

async fn connect(
    snapshots: StaticSnapshots,
) -> (mpsc::Sender<Result<Frame>>, Connection) {
    let (frames, transport) = crate::provider::ChannelTransport::new(16);
    let connection = Connection::connect(transport, snapshots, sample_dictionaries(), SyncConfig::default())
        .await
        .unwrap();
    (frames, connection)
}

fn delta(voltage: i64, counter: u32) -> Frame {
    Frame::Text(format!(
        r#"{{"packet": "EPS", "data": {{"voltage": {voltage}}}, "dntoeus": {{"voltage": {:.2}}}, "counter": {counter}}}"#,
        voltage as f64 / 100.0
    ))
}

#[tokio::test(start_paused = true)]
async fn connect_waits_for_first_snapshot() {
    let (_frames, connection) = connect(StaticSnapshots::new(snapshot_of("EPS", 1200, 0))).await;

    assert_eq!(connection.state(), SyncState::Streaming);
    let eps = connection.latest("EPS").await.unwrap().unwrap();
    assert_eq!(eps.raw_value("voltage"), Some(&Value::Int(1200)));
    assert!(connection.latest("HEALTH").await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn deltas_flow_to_subscribers_and_history() {
    let (frames, connection) = connect(StaticSnapshots::new(snapshot_of("EPS", 1200, 0))).await;
    let mut updates = connection.packet_events("EPS");

    frames.send(Ok(delta(1250, 1))).await.unwrap();
    frames.send(Ok(delta(1300, 2))).await.unwrap();

    let first = updates.next().await.unwrap();
    assert_eq!(first.value("voltage"), Some(&Value::Float(12.5)));
    let second = updates.next().await.unwrap();
    assert_eq!(second.value("voltage"), Some(&Value::Float(13.0)));

    let previous = connection.history("EPS", 1).await.unwrap().unwrap();
    assert_eq!(previous.raw_value("voltage"), Some(&Value::Int(1250)));
}

#[tokio::test(start_paused = true)]
async fn counter_gap_triggers_a_second_snapshot() {
    let snapshots = Arc::new(StaticSnapshots::new(snapshot_of("EPS", 1200, 0)));
    let (frames, transport) = crate::provider::ChannelTransport::new(16);
    let connection =
        Connection::connect(transport, Arc::clone(&snapshots), sample_dictionaries(), SyncConfig::default())
            .await
            .unwrap();
    assert_eq!(snapshots.requests(), 1);

    let mut updates = connection.packet_events("EPS");
    frames.send(Ok(delta(1300, 5))).await.unwrap();

    // Resync reseeds from the snapshot, dropping the out-of-order value
    let eps = updates.next().await.unwrap();
    assert_eq!(eps.raw_value("voltage"), Some(&Value::Int(1200)));
    assert_eq!(snapshots.requests(), 2);
    assert_eq!(connection.state(), SyncState::Streaming);
}

#[tokio::test(start_paused = true)]
async fn binary_frames_decode_through_the_dictionary() {
    let (frames, connection) = connect(StaticSnapshots::new(snapshot_of("EPS", 0, 0))).await;
    let mut updates = connection.packet_events("HEALTH");

    let frame = WireMessage::encode_packet(2, &health_bytes(1, 513, 0, 90.0));
    frames.send(Ok(Frame::Binary(frame))).await.unwrap();

    let health = updates.next().await.unwrap();
    assert_eq!(health.value("last_cmd").map(Value::display_string), Some("NO_OP".to_string()));
    assert_eq!(health.value("temp"), Some(&Value::Str("HOT".into())));
    assert_eq!(connection.limit_status("EPS", "voltage", &Value::Float(9.5)), LimitStatus::Error);
}

#[tokio::test(start_paused = true)]
async fn dictionary_helpers_need_no_session_round_trip() {
    let (_frames, connection) = connect(StaticSnapshots::new(snapshot_of("EPS", 0, 0))).await;

    assert_eq!(
        connection.decode_field("EPS", "voltage", &EPS_BYTES).unwrap(),
        Some(Value::UInt(1200))
    );
    assert!(connection.decode_field("EPS", "voltage", &EPS_BYTES[..1]).unwrap().is_none());
    assert!(matches!(
        connection.decode_field("NOPE", "voltage", &EPS_BYTES),
        Err(DownlinkError::PacketNotFound { .. })
    ));

    let mut args = vec![3u8];
    args.extend_from_slice(b"ROM\0");
    assert_eq!(connection.format_event_message(513, &args), Some("boot 3 of ROM".to_string()));
    assert_eq!(connection.format_event_message(513, &[]), Some("Booted".to_string()));
    assert_eq!(connection.format_event_message(9, &args), None);
}

#[tokio::test(start_paused = true)]
async fn remote_close_is_observable() {
    let (frames, connection) = connect(StaticSnapshots::new(snapshot_of("EPS", 0, 0))).await;
    let mut events = connection.events();

    drop(frames);
    assert_eq!(events.next().await, Some(TelemetryEvent::Close));
    let mut states = connection.state_updates();
    assert_eq!(states.next().await, Some(SyncState::Closed));

    // The last known state is still queryable
    assert!(connection.latest("EPS").await.unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn dropping_the_connection_closes_the_event_stream() {
    let (_frames, connection) = connect(StaticSnapshots::new(snapshot_of("EPS", 0, 0))).await;
    let mut batches = connection.coalesced_events(Duration::from_secs(1));

    connection.shutdown();
    let batch = batches.next().await.unwrap();
    assert_eq!(batch, vec![TelemetryEvent::Close]);
    assert!(batches.next().await.is_none());
}

fn assert_unpin<T: Unpin>(_: &T) {}

#[tokio::test(start_paused = true)]
async fn event_streams_need_no_pinning() {
    let (frames, connection) = connect(StaticSnapshots::new(snapshot_of("EPS", 1200, 0))).await;
    let events = connection.events();
    let updates = connection.packet_events("EPS");
    let batches = connection.coalesced_events(Duration::from_millis(100));
    assert_unpin(&events);
    assert_unpin(&updates);
    assert_unpin(&batches);
    assert_unpin(&connection.state_updates());

    frames.send(Ok(delta(1250, 1))).await.unwrap();
    let mut updates = updates;
    assert_eq!(updates.next().await.unwrap().raw_value("voltage"), Some(&Value::Int(1250)));
}
