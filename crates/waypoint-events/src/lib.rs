use tokio::sync::broadcast;
use tracing::trace;
use waypoint_types::EventEnvelope;

/// Capacity of the broadcast channel. Sized well above a single run's
/// event volume between checkpoints (spec.md §4.3's round cap keeps any
/// one reconciliation pass small); a slow subscriber that falls behind
/// this far sees `Lagged` and resyncs from the checkpoint tail rather
/// than blocking publishers.
const CHANNEL_CAPACITY: usize = 4096;

/// Global fan-out for `EventEnvelope`s across every run. One channel,
/// not one per run: ordering is only guaranteed within a run (spec.md
/// §4.5), so subscribers filter by `run_id` rather than the bus
/// partitioning traffic itself — mirrors `tandem-core::event_bus::EventBus`
/// generalized from a single-process `EngineEvent` to the multi-run
/// `EventEnvelope`.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    /// Publishes an event. No-op if nobody is subscribed — per
    /// spec.md's durability fence, the checkpoint write must already
    /// have happened before this is called, so a dropped live event is
    /// always recoverable from the checkpoint tail.
    pub fn publish(&self, event: EventEnvelope) {
        trace!(event_id = %event.event_id, kind = ?event.kind, "publishing event");
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
