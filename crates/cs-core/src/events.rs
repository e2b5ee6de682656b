//! Per-media live status events.
//!
//! [`EventBus`] keeps one bounded channel per subscriber, keyed by media id.
//! Publishing never blocks: a subscriber whose buffer is full simply misses
//! the event and is expected to fall back to polling the stored state.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::ids::MediaId;
use crate::media::{Codec, MediaStatus, VariantStatus};

/// Default per-subscriber buffer size.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 16;

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// What an [`Event`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// The media's overall status.
    Status,
    /// One codec output changed state.
    Variant,
}

/// An ephemeral notification scoped to one media.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<Codec>,
}

impl Event {
    pub fn status(status: MediaStatus, message: Option<String>) -> Self {
        Self {
            kind: EventKind::Status,
            status: status.to_string(),
            message,
            codec: None,
        }
    }

    pub fn variant(codec: Codec, status: VariantStatus, message: Option<String>) -> Self {
        Self {
            kind: EventKind::Variant,
            status: status.to_string(),
            message,
            codec: Some(codec),
        }
    }

    /// Whether this announces a terminal media status.
    pub fn is_final(&self) -> bool {
        self.kind == EventKind::Status
            && (self.status == MediaStatus::Done.as_str()
                || self.status == MediaStatus::Failed.as_str())
    }
}

// ---------------------------------------------------------------------------
// EventPublisher
// ---------------------------------------------------------------------------

/// Sink for media events. Implementations must not block.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, media_id: &MediaId, event: Event);
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// A live feed of events for one media.
///
/// The feed ends (`recv` returns `None`) once the subscription is passed to
/// [`EventBus::unsubscribe`] and any buffered events have been read.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    media_id: MediaId,
    rx: mpsc::Receiver<Event>,
}

impl Subscription {
    pub fn media_id(&self) -> &MediaId {
        &self.media_id
    }

    /// Wait for the next event.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Take a buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<Event>,
}

/// In-process fan-out of media events.
pub struct EventBus {
    subscribers: RwLock<HashMap<MediaId, Vec<Subscriber>>>,
    buffer: usize,
    next_id: AtomicU64,
    dropped: AtomicU64,
}

impl EventBus {
    /// Create a bus whose subscribers each buffer up to `buffer` events.
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            buffer: buffer.max(1),
            next_id: AtomicU64::new(1),
            dropped: AtomicU64::new(0),
        }
    }

    /// Start receiving events for `media_id`.
    pub fn subscribe(&self, media_id: &MediaId) -> Subscription {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .write()
            .entry(media_id.clone())
            .or_default()
            .push(Subscriber { id, tx });
        tracing::debug!(media_id = %media_id, subscriber = id, "Event subscriber added");
        Subscription {
            id,
            media_id: media_id.clone(),
            rx,
        }
    }

    /// Detach a subscription. Its feed is closed; events already buffered
    /// can still be drained.
    pub fn unsubscribe(&self, subscription: &Subscription) {
        let mut subs = self.subscribers.write();
        if let Some(list) = subs.get_mut(&subscription.media_id) {
            list.retain(|s| s.id != subscription.id);
            if list.is_empty() {
                subs.remove(&subscription.media_id);
            }
        }
    }

    /// Number of live subscribers for a media.
    pub fn subscriber_count(&self, media_id: &MediaId) -> usize {
        self.subscribers
            .read()
            .get(media_id)
            .map_or(0, |list| list.len())
    }

    /// Total events dropped because a subscriber's buffer was full.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Remove subscribers whose receiving side has gone away.
    fn prune_closed(&self, media_id: &MediaId) {
        let mut subs = self.subscribers.write();
        if let Some(list) = subs.get_mut(media_id) {
            list.retain(|s| !s.tx.is_closed());
            if list.is_empty() {
                subs.remove(media_id);
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_BUFFER)
    }
}

impl EventPublisher for EventBus {
    fn publish(&self, media_id: &MediaId, event: Event) {
        let mut saw_closed = false;
        {
            let subs = self.subscribers.read();
            let Some(list) = subs.get(media_id) else {
                return;
            };
            for sub in list {
                match sub.tx.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(
                            media_id = %media_id,
                            subscriber = sub.id,
                            "Subscriber buffer full, dropping event"
                        );
                    }
                    Err(TrySendError::Closed(_)) => saw_closed = true,
                }
            }
        }
        if saw_closed {
            self.prune_closed(media_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mid(s: &str) -> MediaId {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn subscriber_receives_only_its_media() {
        let bus = EventBus::default();
        let a = mid("AAAAAAAA");
        let b = mid("BBBBBBBB");
        let mut sub_a = bus.subscribe(&a);
        let mut sub_b = bus.subscribe(&b);

        bus.publish(&a, Event::status(MediaStatus::Processing, None));

        let ev = sub_a.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::Status);
        assert_eq!(ev.status, "processing");
        assert!(sub_b.try_recv().is_none());
    }

    #[tokio::test]
    async fn every_subscriber_gets_a_copy() {
        let bus = EventBus::default();
        let id = mid("AAAAAAAA");
        let mut one = bus.subscribe(&id);
        let mut two = bus.subscribe(&id);
        assert_eq!(bus.subscriber_count(&id), 2);

        bus.publish(&id, Event::status(MediaStatus::Done, None));
        assert!(one.recv().await.unwrap().is_final());
        assert!(two.recv().await.unwrap().is_final());
    }

    #[test]
    fn full_buffer_drops_without_blocking() {
        let bus = EventBus::new(2);
        let id = mid("AAAAAAAA");
        let mut sub = bus.subscribe(&id);

        for _ in 0..5 {
            bus.publish(&id, Event::status(MediaStatus::Processing, None));
        }
        assert_eq!(bus.dropped_events(), 3);
        assert!(sub.try_recv().is_some());
        assert!(sub.try_recv().is_some());
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn unsubscribe_closes_feed_after_drain() {
        let bus = EventBus::default();
        let id = mid("AAAAAAAA");
        let mut sub = bus.subscribe(&id);
        bus.publish(&id, Event::status(MediaStatus::Processing, None));

        bus.unsubscribe(&sub);
        assert_eq!(bus.subscriber_count(&id), 0);
        assert!(sub.recv().await.is_some());
        assert!(sub.recv().await.is_none());

        // Publishing with nobody listening is a no-op.
        bus.publish(&id, Event::status(MediaStatus::Done, None));
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let bus = EventBus::default();
        let id = mid("AAAAAAAA");
        let keep = bus.subscribe(&id);
        drop(bus.subscribe(&id));
        assert_eq!(bus.subscriber_count(&id), 2);

        bus.publish(&id, Event::status(MediaStatus::Processing, None));
        assert_eq!(bus.subscriber_count(&id), 1);
        drop(keep);
    }

    #[test]
    fn event_serialization() {
        let ev = Event::variant(Codec::Av1, VariantStatus::Failed, Some("boom".into()));
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "variant");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["codec"], "av1");
        assert_eq!(json["message"], "boom");

        let json = serde_json::to_value(Event::status(MediaStatus::Done, None)).unwrap();
        assert!(json.get("message").is_none());
        assert!(json.get("codec").is_none());
    }
}
