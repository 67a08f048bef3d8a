//! Realtime fan-out of events to clients watching a channel.

use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Buffered events per channel before slow subscribers start lagging.
const CHANNEL_CAPACITY: usize = 64;

pub const NEW_COMMENT: &str = "new-comment";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Notification {
    pub event: String,
    pub data: serde_json::Value,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("failed to publish to {channel}: {reason}")]
    Publish { channel: String, reason: String },
}

pub fn channel_for_post(post_id: i64) -> String {
    format!("post-{}", post_id)
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, channel: &str, notification: Notification) -> Result<(), NotifyError>;

    /// Stream of everything published to `channel` from now on.
    fn subscribe(&self, channel: &str) -> BoxStream<'static, Notification>;
}

type Channels = Mutex<HashMap<String, broadcast::Sender<Notification>>>;

fn lock(channels: &Channels) -> MutexGuard<'_, HashMap<String, broadcast::Sender<Notification>>> {
    channels.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-process notifier backed by one broadcast channel per topic.
///
/// A channel lives only while someone is subscribed to it.
#[derive(Default)]
pub struct BroadcastNotifier {
    channels: Arc<Channels>,
}

impl BroadcastNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<String, broadcast::Sender<Notification>>> {
        lock(&self.channels)
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn publish(&self, channel: &str, notification: Notification) -> Result<(), NotifyError> {
        let mut channels = self.channels();
        let Some(sender) = channels.get(channel) else {
            return Ok(());
        };

        if sender.send(notification).is_err() {
            channels.remove(channel);
        }
        Ok(())
    }

    fn subscribe(&self, channel: &str) -> BoxStream<'static, Notification> {
        let receiver = {
            let mut channels = self.channels();
            channels.retain(|_, sender| sender.receiver_count() > 0);
            channels
                .entry(channel.to_string())
                .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
                .subscribe()
        };

        let name = channel.to_string();
        let events = BroadcastStream::new(receiver)
            .filter_map(move |item| {
                let out = match item {
                    Ok(n) => Some(n),
                    Err(e) => {
                        tracing::warn!("Subscriber on {} fell behind: {}", name, e);
                        None
                    }
                };
                async move { out }
            })
            .boxed();

        Subscription {
            events: Some(events),
            channel: channel.to_string(),
            channels: Arc::clone(&self.channels),
        }
        .boxed()
    }
}

/// Subscriber stream that forgets its channel once the last receiver is gone.
struct Subscription {
    events: Option<BoxStream<'static, Notification>>,
    channel: String,
    channels: Arc<Channels>,
}

impl Stream for Subscription {
    type Item = Notification;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.get_mut().events.as_mut() {
            Some(events) => events.poll_next_unpin(cx),
            None => Poll::Ready(None),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Release our receiver first so the count below excludes it.
        drop(self.events.take());

        let mut channels = lock(&self.channels);
        if channels
            .get(&self.channel)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            channels.remove(&self.channel);
        }
    }
}
