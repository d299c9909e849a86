use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::trace;

use pinboard_types::events::TableChange;

/// Capacity of the change broadcast. A subscriber that falls further behind
/// sees `Lagged` and should treat it as "something changed".
const CHANGE_BUFFER: usize = 1024;

/// Fans table-change notifications out to every realtime subscriber.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    broadcast_tx: broadcast::Sender<TableChange>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            inner: Arc::new(DispatcherInner { broadcast_tx }),
        }
    }

    /// Subscribe to table changes. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<TableChange> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Publish a change to all subscribers. Having none is not an error.
    pub fn publish(&self, change: TableChange) {
        trace!("publish {:?} on {}", change.kind, change.table);
        let _ = self.inner.broadcast_tx.send(change);
    }

    /// Number of live receivers, realtime connections included.
    pub fn subscriber_count(&self) -> usize {
        self.inner.broadcast_tx.receiver_count()
    }
}
