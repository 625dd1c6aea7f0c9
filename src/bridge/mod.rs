/*!
 * Event Bridge
 * Channel-scoped, fire-and-forget delivery of job events
 *
 * Each channel is a tokio broadcast channel created on first use. Delivery is
 * at-most-once with no replay: a subscriber sees only events published after
 * it subscribed, and a lagging subscriber skips what it missed.
 */

mod events;

pub use events::{ChannelId, ExitSummary, JobEvent, RunOutcome, WorkerExit};

use crate::core::limits::DEFAULT_EVENT_CAPACITY;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

/// Publishes job events to per-channel subscribers
#[derive(Clone)]
pub struct EventBridge {
    channels: Arc<DashMap<ChannelId, broadcast::Sender<JobEvent>>>,
    capacity: usize,
}

impl EventBridge {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    fn sender(&self, channel: &ChannelId) -> broadcast::Sender<JobEvent> {
        self.channels
            .entry(channel.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Deliver `event` to current subscribers of `channel`
    pub fn publish(&self, channel: &ChannelId, event: JobEvent) {
        let name = event.name();
        // No subscribers is not an error
        let delivered = self.sender(channel).send(event).unwrap_or(0);
        trace!(channel = %channel, event = name, delivered, "Event published");
    }

    /// Receive every event published on `channel` from now on
    pub fn subscribe(&self, channel: &ChannelId) -> broadcast::Receiver<JobEvent> {
        self.sender(channel).subscribe()
    }

    pub fn subscriber_count(&self, channel: &ChannelId) -> usize {
        self.channels
            .get(channel)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// Drop `channel`; its subscribers see the stream end
    pub fn close(&self, channel: &ChannelId) {
        self.channels.remove(channel);
    }
}

impl Default for EventBridge {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
