//! Subscription handles for live event streams.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::Stream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

use crate::error::SyncError;

/// A live subscription to one channel's events.
///
/// The handle owns its receiver: dropping it detaches from the channel,
/// and a channel with no receivers left is pruned by the bus. A subscriber
/// that falls behind the channel buffer observes a single
/// [`SyncError::Lagged`] item telling it how many events were skipped, and
/// should re-fetch from the store before continuing.
pub struct Subscription<T> {
    channel_id: String,
    inner: BroadcastStream<T>,
}

impl<T: 'static + Clone + Send> Subscription<T> {
    pub(crate) fn new(channel_id: impl Into<String>, rx: broadcast::Receiver<T>) -> Self {
        Self {
            channel_id: channel_id.into(),
            inner: BroadcastStream::new(rx),
        }
    }

    /// The channel this subscription is attached to.
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }
}

impl<T: 'static + Clone + Send> Stream for Subscription<T> {
    type Item = Result<T, SyncError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(event))) => Poll::Ready(Some(Ok(event))),
            Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                warn!(
                    "Subscriber on {} lagged, skipped {} events",
                    self.channel_id, skipped
                );
                Poll::Ready(Some(Err(SyncError::Lagged { skipped })))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}
