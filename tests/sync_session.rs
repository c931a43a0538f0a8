//! End-to-end sync sessions over an in-memory transport.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;

use downlink::provider::{ChannelTransport, SnapshotSource};
use downlink::sync::{Frame, Snapshot, WireMessage};
use downlink::{
    Dictionaries, Downlink, DownlinkError, Result, SyncConfig, SyncState, TelemetryDictionary,
    TelemetryEvent, Value,
};

const TELEMETRY: &str = r#"{
    "POWER": {"uid": 3, "fields": {
        "bus_v": {"type": "MSB_U16", "bytes": [0, 1], "dntoeu": {"equation": "raw.bus_v * 0.01", "units": "V"}},
        "load": {"type": "U8", "bytes": 2}
    }},
    "ADCS": {"uid": 4, "fields": {
        "mode": {"type": "U8", "bytes": 0, "enum": {"0": "SAFE", "1": "POINT"}}
    }}
}"#;

/// Serves queued snapshots in order, repeating the last one.
struct QueuedSnapshots {
    queue: Mutex<Vec<Snapshot>>,
}

impl QueuedSnapshots {
    fn new(snapshots: &[&str]) -> Self {
        let mut queue: Vec<Snapshot> = snapshots.iter().map(|s| Snapshot::parse_json(s).unwrap()).collect();
        queue.reverse();
        Self { queue: Mutex::new(queue) }
    }
}

#[async_trait]
impl SnapshotSource for QueuedSnapshots {
    async fn fetch_snapshot(&self) -> Result<Snapshot> {
        let mut queue = self.queue.lock().unwrap();
        match queue.len() {
            0 => Err(DownlinkError::snapshot_failed("no snapshot queued")),
            1 => Ok(queue[0].clone()),
            _ => Ok(queue.pop().unwrap()),
        }
    }
}

async fn start(
    snapshots: QueuedSnapshots,
) -> (mpsc::Sender<Result<Frame>>, downlink::Connection) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let (frames, transport) = ChannelTransport::new(32);
    let dictionaries = Dictionaries::new(TelemetryDictionary::parse_json(TELEMETRY).unwrap());
    let config = SyncConfig::default().with_stale_interval(Duration::from_secs(3));
    let connection = Downlink::connect(transport, snapshots, dictionaries, config).await.unwrap();
    (frames, connection)
}

fn text(json: &str) -> Result<Frame> {
    Ok(Frame::Text(json.to_string()))
}

#[tokio::test(start_paused = true)]
async fn session_follows_deltas_binary_frames_and_resyncs() {
    let (frames, connection) = start(QueuedSnapshots::new(&[
        r#"{"states": {"POWER": {"raw": {"bus_v": 2800, "load": 10}, "dntoeu": {"bus_v": 28.0}}}, "counters": {"POWER": 100}}"#,
        r#"{"states": {"POWER": {"raw": {"bus_v": 2790, "load": 12}, "dntoeu": {"bus_v": 27.9}}}, "counters": {"POWER": 200}}"#,
    ]))
    .await;
    assert_eq!(connection.state(), SyncState::Streaming);

    let mut power = connection.packet_events("POWER");
    let mut adcs = connection.packet_events("ADCS");

    // In-sequence delta touches only `load`
    frames.send(text(r#"{"packet": "POWER", "data": {"load": 11}, "counter": 101}"#)).await.unwrap();
    let state = power.next().await.unwrap();
    assert_eq!(state.raw_value("load"), Some(&Value::Int(11)));
    assert_eq!(state.value("bus_v"), Some(&Value::Float(28.0)));

    // Full packet bytes for a packet the snapshot never mentioned
    frames.send(Ok(Frame::Binary(WireMessage::encode_packet(4, &[1])))).await.unwrap();
    let state = adcs.next().await.unwrap();
    assert_eq!(state.value("mode"), Some(&Value::Str("POINT".into())));
    assert_eq!(state.last_counter, None);

    // Probes change nothing, a skipped counter forces a resync
    frames.send(Ok(Frame::Binary(vec![0, 0, 0, 0, 0]))).await.unwrap();
    frames.send(text(r#"{"packet": "POWER", "data": {"load": 99}, "counter": 150}"#)).await.unwrap();
    let state = power.next().await.unwrap();
    assert_eq!(state.raw_value("load"), Some(&Value::Int(12)));
    assert_eq!(state.last_counter.map(|c| c.value()), Some(200));

    // Snapshots replace the whole store
    assert!(connection.latest("ADCS").await.unwrap().is_none());

    let history: Vec<_> = futures::future::join_all((0..3).map(|n| connection.history("POWER", n)))
        .await
        .into_iter()
        .map(|state| state.unwrap().and_then(|s| s.raw_value("load").cloned()))
        .collect();
    assert_eq!(history, vec![Some(Value::Int(12)), Some(Value::Int(11)), Some(Value::Int(10))]);
}

#[tokio::test(start_paused = true)]
async fn silence_goes_stale_and_traffic_recovers() {
    let (frames, connection) = start(QueuedSnapshots::new(&[
        r#"{"states": {"POWER": {"raw": {"bus_v": 2800}}}, "counters": {"POWER": 2147483647}}"#,
    ]))
    .await;
    let mut events = connection.events();

    tokio::time::sleep(Duration::from_secs(7)).await;
    assert_eq!(connection.state(), SyncState::Stale);
    assert_eq!(events.next().await, Some(TelemetryEvent::Stale { count: 1 }));
    assert_eq!(events.next().await, Some(TelemetryEvent::Stale { count: 2 }));

    // Counter wraps from 2^31 - 1 to 0
    frames.send(text(r#"{"packet": "POWER", "data": {"bus_v": 2810}, "counter": 0}"#)).await.unwrap();
    let event = events.next().await.unwrap();
    assert_eq!(event.packet_name(), Some("POWER"));
    assert_eq!(connection.state(), SyncState::Streaming);
}

#[tokio::test(start_paused = true)]
async fn connect_fails_when_transport_closes_first() {
    let (frames, transport) = ChannelTransport::new(1);
    drop(frames);

    let dictionaries = Dictionaries::new(TelemetryDictionary::parse_json(TELEMETRY).unwrap());
    let result = Downlink::connect(
        transport,
        QueuedSnapshots::new(&[]),
        dictionaries,
        SyncConfig::default(),
    )
    .await;
    assert!(matches!(result, Err(DownlinkError::Connection { .. })));
}
