//! Driver spawns and runs the sync session task

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::SyncConfig;
use crate::dictionary::TelemetryDictionary;
use crate::provider::{SnapshotSource, Transport};
use crate::state::PacketState;
use crate::sync::{
    BroadcastSink, EventSink, SyncClient, SyncCommand, SyncInput, SyncState, TelemetryEvent, WireMessage,
};
use crate::types::TypeRegistry;

/// Questions answered from inside the session task.
#[derive(Debug)]
pub enum Query {
    Latest { packet: String, reply: oneshot::Sender<Option<Arc<PacketState>>> },
    History { packet: String, n: usize, reply: oneshot::Sender<Option<Arc<PacketState>>> },
}

/// Result of spawning the session task
pub struct DriverChannels {
    /// Sender for queries against the cached state
    pub queries: mpsc::Sender<Query>,
    /// Receiver for session state changes
    pub state: watch::Receiver<SyncState>,
    /// Cancellation token for graceful shutdown
    pub cancel: CancellationToken,
}

/// Everything the session task needs besides its transport.
pub struct DriverContext<S> {
    pub snapshots: Arc<S>,
    pub dictionary: Arc<TelemetryDictionary>,
    pub registry: Arc<TypeRegistry>,
    pub config: SyncConfig,
    pub events: broadcast::Sender<TelemetryEvent>,
}

/// Driver spawns and manages the session task
///
/// One task owns the transport and the [`SyncClient`]. Frames, snapshot
/// completions, stale timer firings and queries are all consumed by a single
/// `select!` loop, so the packet store is only ever touched from one place.
/// Snapshot fetches run in short-lived spawned tasks and report back tagged
/// with their request generation.
pub struct Driver;

impl Driver {
    const QUERY_BUFFER: usize = 32;

    /// Spawn the session task for an already connected transport
    pub fn spawn<T, S>(transport: T, context: DriverContext<S>) -> DriverChannels
    where
        T: Transport,
        S: SnapshotSource,
    {
        let (query_tx, query_rx) = mpsc::channel(Self::QUERY_BUFFER);
        let (state_tx, state_rx) = watch::channel(SyncState::Disconnected);
        let cancel = CancellationToken::new();
        let cancel_session = cancel.clone();

        tokio::spawn(async move {
            Self::session_task(transport, context, query_rx, state_tx, cancel_session).await;
        });

        DriverChannels { queries: query_tx, state: state_rx, cancel }
    }

    async fn session_task<T, S>(
        mut transport: T,
        context: DriverContext<S>,
        mut query_rx: mpsc::Receiver<Query>,
        state_tx: watch::Sender<SyncState>,
        cancel: CancellationToken,
    ) where
        T: Transport,
        S: SnapshotSource,
    {
        info!("Sync session task started");
        let DriverContext { snapshots, dictionary, registry, config, events } = context;
        let max_errors = config.max_transport_errors.max(1);
        let stale_interval = config.stale_interval;
        let snapshot_timeout = config.snapshot_timeout;

        let mut client = SyncClient::new(dictionary, registry, config, BroadcastSink::new(events));
        let (snapshot_tx, mut snapshot_rx) = mpsc::channel::<SyncInput>(4);

        let stale = tokio::time::sleep(stale_interval);
        tokio::pin!(stale);
        let mut stale_armed = false;

        let backoff = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(backoff);
        let mut backing_off = false;

        let mut transport_open = true;
        let mut frame_count = 0u64;
        let mut error_count = 0u32;

        let mut input = Some(SyncInput::Connected);
        loop {
            if let Some(input) = input.take() {
                for command in client.step(input) {
                    match command {
                        SyncCommand::RequestSnapshot { generation } => {
                            Self::spawn_snapshot_fetch(
                                Arc::clone(&snapshots),
                                generation,
                                snapshot_timeout,
                                snapshot_tx.clone(),
                                cancel.clone(),
                            );
                        }
                        SyncCommand::ArmStaleTimer(interval) => {
                            stale.as_mut().reset(Instant::now() + interval);
                            stale_armed = true;
                        }
                        SyncCommand::DisarmStaleTimer => stale_armed = false,
                    }
                }
                state_tx.send_if_modified(|state| {
                    let changed = *state != client.state();
                    *state = client.state();
                    changed
                });
            }

            input = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Sync session cancelled");
                    break;
                }
                result = transport.next_frame(), if transport_open && !backing_off => match result {
                    Ok(Some(frame)) => {
                        frame_count += 1;
                        error_count = 0;
                        match WireMessage::decode(&frame) {
                            Ok(message) => Some(SyncInput::Message(message)),
                            Err(e) => {
                                warn!("Dropping undecodable frame {}: {}", frame_count, e);
                                None
                            }
                        }
                    }
                    Ok(None) => {
                        info!("Transport closed after {} frames", frame_count);
                        transport_open = false;
                        Some(SyncInput::Closed)
                    }
                    Err(e) => {
                        error_count += 1;
                        error!("Transport error ({}/{}): {}", error_count, max_errors, e);

                        if error_count >= max_errors {
                            error!("Too many transport errors, closing session");
                            transport_open = false;
                            Some(SyncInput::Closed)
                        } else {
                            // Exponential backoff: 100ms, 200ms, 400ms, ...
                            let delay = Duration::from_millis(50 * (1 << error_count.min(5)));
                            backoff.as_mut().reset(Instant::now() + delay);
                            backing_off = true;
                            None
                        }
                    }
                },
                () = &mut backoff, if backing_off => {
                    backing_off = false;
                    None
                }
                Some(result) = snapshot_rx.recv() => Some(result),
                () = &mut stale, if stale_armed => {
                    stale_armed = false;
                    Some(SyncInput::StaleTimeout)
                }
                query = query_rx.recv() => match query {
                    Some(query) => {
                        Self::answer(&client, query);
                        None
                    }
                    None => {
                        debug!("All connection handles dropped, shutting down");
                        break;
                    }
                },
            };
        }

        if client.state() != SyncState::Closed {
            client.step(SyncInput::Closed);
            state_tx.send_replace(client.state());
        }
        info!("Sync session task ended (processed {} frames)", frame_count);
    }

    fn answer<S: EventSink>(client: &SyncClient<S>, query: Query) {
        trace!(?query, "answering query");
        // A dropped reply receiver means the caller gave up waiting
        match query {
            Query::Latest { packet, reply } => {
                let _ = reply.send(client.latest(&packet));
            }
            Query::History { packet, n, reply } => {
                let _ = reply.send(client.history(&packet, n));
            }
        }
    }

    fn spawn_snapshot_fetch<S>(
        snapshots: Arc<S>,
        generation: u64,
        timeout: Duration,
        results: mpsc::Sender<SyncInput>,
        cancel: CancellationToken,
    ) where
        S: SnapshotSource,
    {
        debug!(generation, "fetching snapshot");
        tokio::spawn(async move {
            let input = tokio::select! {
                _ = cancel.cancelled() => return,
                result = tokio::time::timeout(timeout, snapshots.fetch_snapshot()) => match result {
                    Ok(Ok(snapshot)) => SyncInput::SnapshotArrived { generation, snapshot },
                    Ok(Err(e)) => {
                        warn!(generation, error = %e, "snapshot fetch failed");
                        SyncInput::SnapshotFailed { generation, reason: e.to_string() }
                    }
                    Err(_) => {
                        warn!(generation, ?timeout, "snapshot fetch timed out");
                        SyncInput::SnapshotFailed { generation, reason: format!("timed out after {timeout:?}") }
                    }
                },
            };
            let _ = results.send(input).await;
        });
    }
}
