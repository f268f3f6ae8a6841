//! In-process pub/sub hub for real-time streaming.
//!
//! Topic-keyed broadcast channels that feed the SSE endpoint. Topics are
//! opaque strings; the relay decides what goes where.
//!
//! Producers:
//!   hub.publish("matchmaking", json!({"type": "match_created", ...}));
//!
//! Consumers:
//!   let rx = hub.subscribe("group:0190...");

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

/// Topic carrying every matchmaking event.
pub const MATCHMAKING_TOPIC: &str = "matchmaking";

/// Topic carrying events that concern one group.
pub fn group_topic(group_id: impl std::fmt::Display) -> String {
    format!("group:{}", group_id)
}

/// Thread-safe, cloneable. Payloads are `serde_json::Value`.
///
/// Publishing is synchronous so event-bus handlers can forward into it
/// without a runtime.
#[derive(Clone)]
pub struct StreamHub {
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<serde_json::Value>>>>,
    capacity: usize,
}

impl StreamHub {
    /// Default capacity: 256 messages per channel.
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity,
        }
    }

    /// Publish to a topic. No-op if no subscribers.
    pub fn publish(&self, topic: &str, value: serde_json::Value) {
        let channels = self.channels.read().unwrap_or_else(|e| e.into_inner());
        if let Some(tx) = channels.get(topic) {
            // Ignore send errors (no active receivers)
            let _ = tx.send(value);
        }
    }

    /// Subscribe to a topic. Creates the channel if it doesn't exist.
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<serde_json::Value> {
        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        let tx = channels
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        tx.subscribe()
    }

    /// Subscribe as a stream. The topic is released when the stream drops.
    pub fn stream(&self, topic: &str) -> TopicStream {
        TopicStream {
            inner: Some(BroadcastStream::new(self.subscribe(topic))),
            hub: self.clone(),
            topic: topic.to_string(),
        }
    }

    /// Remove `topic` if it has no subscribers left.
    pub fn release(&self, topic: &str) {
        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        if channels
            .get(topic)
            .is_some_and(|tx| tx.receiver_count() == 0)
        {
            channels.remove(topic);
        }
    }

    fn channel_count(&self) -> usize {
        self.channels.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Broadcast subscription that hands its topic back to the hub on drop.
pub struct TopicStream {
    inner: Option<BroadcastStream<serde_json::Value>>,
    hub: StreamHub,
    topic: String,
}

impl Stream for TopicStream {
    type Item = Result<serde_json::Value, BroadcastStreamRecvError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.inner.as_mut() {
            Some(inner) => Pin::new(inner).poll_next(cx),
            None => Poll::Ready(None),
        }
    }
}

impl Drop for TopicStream {
    fn drop(&mut self) {
        // The receiver must be gone before the count is checked.
        self.inner.take();
        self.hub.release(&self.topic);
    }
}

impl Default for StreamHub {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StreamHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHub")
            .field("channels", &self.channel_count())
            .field("capacity", &self.capacity)
            .finish()
    }
}
