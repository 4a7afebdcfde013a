//! Notification seam for inbound messages.

use async_trait::async_trait;

use crate::error::Result;

/// Trait for notifying a user about a message addressed to them.
///
/// Abstracted to support different transports (push services, tests,
/// etc.). Notification failures never fail the send that triggered them;
/// the service logs and moves on.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Notify `recipient` about new activity on a channel.
    ///
    /// # Arguments
    /// * `recipient` - User to notify
    /// * `channel_id` - Room or group the message landed in
    /// * `preview` - Short preview text (body or kind placeholder)
    async fn notify(&self, recipient: &str, channel_id: &str, preview: &str) -> Result<()>;
}

/// Notifier that logs deliveries instead of sending anything.
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, recipient: &str, channel_id: &str, preview: &str) -> Result<()> {
        tracing::info!("Notify {} on {}: {}", recipient, channel_id, preview);
        Ok(())
    }
}
