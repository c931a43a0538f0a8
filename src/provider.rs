//! Transport and snapshot seams

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::Result;
use crate::sync::{Frame, Snapshot};

/// The realtime channel a session reads frames from.
///
/// A transport is handed over already connected. The driver calls
/// [`next_frame`](Transport::next_frame) inside a `select!`, so
/// implementations must be cancel-safe: dropping the future before it
/// completes must not lose a frame.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Wait for the next frame.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` - a frame arrived
    /// - `Ok(None)` - the remote side closed the channel
    /// - `Err(e)` - a read failed; the driver retries with backoff
    async fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Where full snapshots come from, usually a request/response endpoint next
/// to the realtime channel.
#[async_trait]
pub trait SnapshotSource: Send + Sync + 'static {
    async fn fetch_snapshot(&self) -> Result<Snapshot>;
}

#[async_trait]
impl<S: SnapshotSource + ?Sized> SnapshotSource for Arc<S> {
    async fn fetch_snapshot(&self) -> Result<Snapshot> {
        (**self).fetch_snapshot().await
    }
}

/// Transport fed from an in-process channel.
///
/// Useful for bridging a websocket task that already lives elsewhere, and
/// for tests.
#[derive(Debug)]
pub struct ChannelTransport {
    frames: mpsc::Receiver<Result<Frame>>,
}

impl ChannelTransport {
    /// A transport plus the sender that feeds it. Dropping the sender closes
    /// the transport.
    pub fn new(buffer: usize) -> (mpsc::Sender<Result<Frame>>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self { frames: rx })
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        // mpsc::Receiver::recv is cancel-safe
        self.frames.recv().await.transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DownlinkError;

    #[tokio::test]
    async fn channel_transport_yields_frames_errors_then_end() {
        let (tx, mut transport) = ChannelTransport::new(4);
        tx.send(Ok(Frame::Text("{}".into()))).await.unwrap();
        tx.send(Err(DownlinkError::connection_failed("reset"))).await.unwrap();
        drop(tx);

        assert_eq!(transport.next_frame().await.unwrap(), Some(Frame::Text("{}".into())));
        assert!(transport.next_frame().await.is_err());
        assert_eq!(transport.next_frame().await.unwrap(), None);
    }
}
