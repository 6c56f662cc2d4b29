use tokio::sync::broadcast;

use crate::types::rate::DerivedRate;

/// Best-effort fan-out of freshly computed rows. Delivery is never retried
/// and never surfaced to readers; a sink with no subscribers is fine.
#[derive(Clone)]
pub struct RateBroadcaster {
    tx: broadcast::Sender<DerivedRate>,
}

impl RateBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        RateBroadcaster { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DerivedRate> {
        self.tx.subscribe()
    }

    pub fn publish(&self, row: DerivedRate) {
        // Err means no live subscribers; swallowed by design of the sink.
        let _ = self.tx.send(row);
    }
}

impl Default for RateBroadcaster {
    fn default() -> Self {
        RateBroadcaster::new(64)
    }
}
