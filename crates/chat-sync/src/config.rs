//! Configuration types for chat-sync.

/// Default per-subscriber buffer for room and group event channels.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Default per-subscriber buffer for typing channels. Typing traffic is
/// disposable, so the buffer is kept small.
const DEFAULT_TYPING_CAPACITY: usize = 64;

/// Configuration for the live chat layer.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Per-subscriber event buffer for room and group channels. A
    /// subscriber that falls further behind observes a lag error.
    pub channel_capacity: usize,
    /// Per-subscriber event buffer for typing channels.
    pub typing_capacity: usize,
}

impl SyncConfig {
    /// Create a configuration with the given event channel capacity.
    /// Capacities of zero are clamped to one slot when the channels are
    /// built.
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            channel_capacity,
            typing_capacity: DEFAULT_TYPING_CAPACITY,
        }
    }

    /// Set the typing channel capacity.
    pub fn with_typing_capacity(mut self, capacity: usize) -> Self {
        self.typing_capacity = capacity;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}
