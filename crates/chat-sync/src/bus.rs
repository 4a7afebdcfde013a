//! Per-channel broadcast registry.

use std::collections::HashMap;

use tokio::sync::{broadcast, Mutex};
use tracing::debug;

/// Lazily created fan-out channels, keyed by channel id.
///
/// A channel comes into existence on first subscribe and is pruned again
/// once a publish finds no receivers left, so the registry only holds
/// channels somebody is watching.
#[derive(Debug)]
pub struct Bus<T> {
    capacity: usize,
    channels: Mutex<HashMap<String, broadcast::Sender<T>>>,
}

impl<T: Clone> Bus<T> {
    /// Create a bus whose channels buffer up to `capacity` events per
    /// subscriber. A capacity of zero is clamped to one slot.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Attach a receiver to a channel, creating the channel on first use.
    pub async fn subscribe(&self, channel_id: &str) -> broadcast::Receiver<T> {
        let mut channels = self.channels.lock().await;
        match channels.get(channel_id) {
            Some(tx) => tx.subscribe(),
            None => {
                let (tx, rx) = broadcast::channel(self.capacity);
                channels.insert(channel_id.to_string(), tx);
                debug!("Opened channel {}", channel_id);
                rx
            }
        }
    }

    /// Publish an event to a channel's subscribers.
    ///
    /// Returns the number of receivers the event reached. Publishing to a
    /// channel nobody watches is a no-op; a channel whose last receiver
    /// has gone away is pruned here.
    pub async fn publish(&self, channel_id: &str, event: T) -> usize {
        let mut channels = self.channels.lock().await;
        match channels.get(channel_id).map(|tx| tx.send(event)) {
            Some(Ok(count)) => count,
            Some(Err(_)) => {
                channels.remove(channel_id);
                debug!("Pruned idle channel {}", channel_id);
                0
            }
            None => 0,
        }
    }

    /// Number of channels currently open.
    pub async fn channel_count(&self) -> usize {
        let channels = self.channels.lock().await;
        channels.len()
    }
}
