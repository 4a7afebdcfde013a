//! In-memory typing presence.

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;

use crate::bus::Bus;
use crate::events::TypingEvent;
use crate::subscription::Subscription;

/// Typing state per channel, with live fan-out to subscribers.
///
/// State is process-local and ephemeral: it resets on restart, which is
/// all a typing flag is worth. Every `set_typing` call is forwarded
/// verbatim; rapid toggles are not deduplicated, so callers that care
/// debounce before calling.
#[derive(Debug)]
pub struct TypingTracker {
    state: RwLock<HashMap<String, HashSet<String>>>,
    bus: Bus<TypingEvent>,
}

impl TypingTracker {
    /// Create a tracker whose channels buffer up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: RwLock::new(HashMap::new()),
            bus: Bus::new(capacity),
        }
    }

    /// Record a user's typing flag on a channel and broadcast the change.
    ///
    /// `typing = false` removes the entry; subscribers observe the removal
    /// as a false flag, so stop-typing and never-typed look the same.
    pub async fn set_typing(&self, channel_id: &str, user_id: &str, typing: bool) {
        {
            let mut state = self.state.write().await;
            if typing {
                state
                    .entry(channel_id.to_string())
                    .or_default()
                    .insert(user_id.to_string());
            } else if let Some(users) = state.get_mut(channel_id) {
                users.remove(user_id);
                if users.is_empty() {
                    state.remove(channel_id);
                }
            }
        }

        self.bus
            .publish(
                channel_id,
                TypingEvent {
                    channel_id: channel_id.to_string(),
                    user_id: user_id.to_string(),
                    typing,
                },
            )
            .await;
    }

    /// Users currently typing on a channel, sorted by id.
    pub async fn typing_users(&self, channel_id: &str) -> Vec<String> {
        let state = self.state.read().await;
        let mut users: Vec<String> = state
            .get(channel_id)
            .map(|users| users.iter().cloned().collect())
            .unwrap_or_default();
        users.sort();
        users
    }

    /// Subscribe to typing changes on a channel.
    pub async fn subscribe(&self, channel_id: &str) -> Subscription<TypingEvent> {
        Subscription::new(channel_id, self.bus.subscribe(channel_id).await)
    }
}
