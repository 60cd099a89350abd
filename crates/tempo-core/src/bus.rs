//! Change-notification bus.
//!
//! A thin wrapper over `tokio::sync::broadcast` with best-effort fan-out:
//! events are delivered at-least-once to currently-subscribed listeners,
//! and publishing never fails, even with no listeners attached.

use crate::session::event::ChangeEvent;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 64;

/// Fan-out publisher for [`ChangeEvent`]s.
///
/// Cloning the bus is cheap; all clones publish into the same channel.
/// Subscribers own their receiver and drop it to unsubscribe.
#[derive(Debug, Clone)]
pub struct ChangeBus {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeBus {
    /// Creates a bus with the default buffer capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a bus buffering up to `capacity` undelivered events per
    /// subscriber. Slow subscribers that fall further behind observe a
    /// lagged error and miss events; that is acceptable because
    /// collaborators re-pull state rather than replaying payloads.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publishes an event to all current subscribers.
    ///
    /// A send error only means nobody is listening; it is ignored.
    pub fn publish(&self, event: ChangeEvent) {
        let _ = self.tx.send(event);
    }

    /// Registers a new subscriber.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    /// Number of currently attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}
