//! Renderer-paced event batching

use std::collections::HashMap;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{Stream, ready};
use pin_project_lite::pin_project;
use tokio::time::{Interval, MissedTickBehavior, interval};

use crate::sync::TelemetryEvent;

/// Extension trait to batch a stream of [`TelemetryEvent`]s
pub trait CoalesceExt: Stream<Item = TelemetryEvent> {
    /// Emit at most one batch per `period`.
    ///
    /// Within a batch only the latest packet event per packet name is kept,
    /// in the position of that packet's first event. Lifecycle events are
    /// kept as they arrived. Empty periods emit nothing.
    fn coalesce(self, period: Duration) -> Coalesce<Self>
    where
        Self: Sized,
    {
        Coalesce::new(self, period)
    }
}

impl<T: Stream<Item = TelemetryEvent>> CoalesceExt for T {}

#[derive(Debug, Default)]
struct Batch {
    events: Vec<TelemetryEvent>,
    packets: HashMap<String, usize>,
}

impl Batch {
    fn push(&mut self, event: TelemetryEvent) {
        if let Some(name) = event.packet_name() {
            if let Some(&slot) = self.packets.get(name) {
                self.events[slot] = event;
                return;
            }
            self.packets.insert(name.to_string(), self.events.len());
        }
        self.events.push(event);
    }

    fn take(&mut self) -> Option<Vec<TelemetryEvent>> {
        if self.events.is_empty() {
            return None;
        }
        self.packets.clear();
        Some(std::mem::take(&mut self.events))
    }
}

pin_project! {
    /// A stream combinator that batches events per period
    pub struct Coalesce<S> {
        #[pin]
        stream: S,
        interval: Interval,
        batch: Batch,
        done: bool,
    }
}

impl<S> Coalesce<S> {
    pub fn new(stream: S, period: Duration) -> Self {
        let mut interval = interval(period.max(Duration::from_millis(1)));
        // A slow renderer gets fewer batches, not a burst
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { stream, interval, batch: Batch::default(), done: false }
    }
}

impl<S: Stream<Item = TelemetryEvent>> Stream for Coalesce<S> {
    type Item = Vec<TelemetryEvent>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        while !*this.done {
            match this.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(event)) => this.batch.push(event),
                Poll::Ready(None) => *this.done = true,
                Poll::Pending => break,
            }
        }

        // Flush whatever is left once the source ends
        if *this.done {
            return Poll::Ready(this.batch.take());
        }

        loop {
            ready!(this.interval.poll_tick(cx));
            if let Some(batch) = this.batch.take() {
                return Poll::Ready(Some(batch));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::StreamExt;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::ReceiverStream;

    use super::*;
    use crate::state::PacketState;
    use crate::test_utils::int_values;

    fn packet(name: &str, value: i64) -> TelemetryEvent {
        TelemetryEvent::Packet {
            name: name.to_string(),
            state: Arc::new(PacketState::new(name, int_values(&[("a", value)]), Default::default(), None)),
        }
    }

    fn value_of(event: &TelemetryEvent) -> Option<i64> {
        match event {
            TelemetryEvent::Packet { state, .. } => state.raw_value("a").and_then(|v| v.as_i64()),
            _ => None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_latest_packet_event_per_name() {
        let events = futures::stream::iter(vec![
            TelemetryEvent::Open,
            packet("EPS", 1),
            packet("HEALTH", 1),
            packet("EPS", 2),
        ]);
        let batches: Vec<_> = events.coalesce(Duration::from_secs(1)).collect().await;

        assert_eq!(batches.len(), 1);
        let batch = &batches[0];
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0], TelemetryEvent::Open);
        assert_eq!(batch[1].packet_name(), Some("EPS"));
        assert_eq!(value_of(&batch[1]), Some(2));
        assert_eq!(batch[2].packet_name(), Some("HEALTH"));
    }

    #[tokio::test(start_paused = true)]
    async fn emits_one_batch_per_period() {
        let (tx, rx) = mpsc::channel(16);
        let mut batches = ReceiverStream::new(rx).coalesce(Duration::from_secs(1));

        tx.send(packet("EPS", 1)).await.unwrap();
        let first = batches.next().await.unwrap();
        assert_eq!(first.len(), 1);

        tx.send(packet("EPS", 2)).await.unwrap();
        tx.send(packet("EPS", 3)).await.unwrap();
        let second = batches.next().await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(value_of(&second[0]), Some(3));

        drop(tx);
        assert!(batches.next().await.is_none());
    }
}
