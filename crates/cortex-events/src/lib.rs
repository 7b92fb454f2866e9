//! The Event Bus (C9): a single typed in-process pub/sub channel used to
//! fan control-plane activity (downloads, engine lifecycle, installs) out to
//! the `GET /events` SSE endpoint.
//!
//! Built the way the teacher workspace builds its in-memory streaming
//! backend: `tokio::sync::broadcast` for fan-out, `dashmap::DashMap` for the
//! bookkeeping table that sits alongside it. Unlike that backend this bus
//! carries one typed `Event` enum rather than arbitrary topic bytes, so
//! there is no topic/consumer-group indirection to reproduce.
//!
//! Subscribers that fall behind do not block producers: `broadcast`'s
//! fixed-capacity ring buffer drops the oldest unread message instead, and
//! [`Subscription::recv`] surfaces that as [`RecvOutcome::Dropped`] carrying
//! the number of events the subscriber missed.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Default capacity of the broadcast ring buffer, mirroring the teacher's
/// per-topic notification channel default.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// A control-plane occurrence, serialized as the `data:` payload of an SSE
/// frame on `GET /events`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    DownloadStarted {
        task_id: String,
        at: DateTime<Utc>,
    },
    DownloadProgress {
        task_id: String,
        item: String,
        bytes_downloaded: u64,
        total_bytes: u64,
    },
    DownloadFinished {
        task_id: String,
        success: bool,
        at: DateTime<Utc>,
    },
    EngineLoaded {
        family: String,
        variant: String,
    },
    EngineUnloaded {
        family: String,
    },
    ModelInstalled {
        family: String,
        variant: String,
        file_name: String,
    },
}

/// What a subscriber observes on its next poll: a delivered event, a gap in
/// delivery, or bus shutdown.
#[derive(Debug)]
pub enum RecvOutcome {
    Event(Event),
    /// The subscriber's channel lagged and `n` events were dropped before
    /// this point; none of them will be redelivered.
    Dropped(u64),
    Closed,
}

/// The shared bus. Cheap to clone (an `Arc` around the broadcast sender and
/// the drop-count table).
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

struct Inner {
    sender: broadcast::Sender<Event>,
    next_subscriber_id: AtomicU64,
    dropped_by_subscriber: DashMap<u64, AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(Inner {
                sender,
                next_subscriber_id: AtomicU64::new(0),
                dropped_by_subscriber: DashMap::new(),
            }),
        }
    }

    /// Publishes an event to every current subscriber. A publish with no
    /// subscribers is a no-op, not an error.
    pub fn publish(&self, event: Event) {
        let _ = self.inner.sender.send(event);
    }

    /// Opens a new subscription. Each subscription gets its own ring-buffer
    /// position and its own independent lag counter.
    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        self.inner.dropped_by_subscriber.insert(id, AtomicU64::new(0));
        Subscription {
            id,
            bus: self.inner.clone(),
            receiver: self.inner.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Subscription {
    id: u64,
    bus: Arc<Inner>,
    receiver: broadcast::Receiver<Event>,
}

impl Subscription {
    /// Awaits the next outcome: a delivered event, a lag notification, or
    /// bus shutdown. Never returns `Err` — all three outcomes are modeled
    /// as plain values so SSE handlers can match without a `Result`.
    pub async fn recv(&mut self) -> RecvOutcome {
        match self.receiver.recv().await {
            Ok(event) => RecvOutcome::Event(event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                if let Some(counter) = self.bus.dropped_by_subscriber.get(&self.id) {
                    counter.fetch_add(n, Ordering::Relaxed);
                }
                RecvOutcome::Dropped(n)
            }
            Err(broadcast::error::RecvError::Closed) => RecvOutcome::Closed,
        }
    }

    /// Total events dropped on this subscription since it was opened.
    pub fn total_dropped(&self) -> u64 {
        self.bus
            .dropped_by_subscriber
            .get(&self.id)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.dropped_by_subscriber.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> Event {
        Event::EngineLoaded {
            family: "llama-cpp".to_string(),
            variant: "linux-amd64-avx2".to_string(),
        }
    }

    #[tokio::test]
    async fn publish_then_recv_delivers_in_order() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        bus.publish(sample_event());
        bus.publish(Event::EngineUnloaded {
            family: "llama-cpp".to_string(),
        });

        match sub.recv().await {
            RecvOutcome::Event(Event::EngineLoaded { family, .. }) => {
                assert_eq!(family, "llama-cpp")
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        match sub.recv().await {
            RecvOutcome::Event(Event::EngineUnloaded { family }) => assert_eq!(family, "llama-cpp"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn lagging_subscriber_sees_dropped_count() {
        let bus = EventBus::with_capacity(2);
        let mut sub = bus.subscribe();
        for _ in 0..5 {
            bus.publish(sample_event());
        }

        let mut dropped_total = 0u64;
        loop {
            match sub.recv().await {
                RecvOutcome::Dropped(n) => {
                    dropped_total += n;
                    break;
                }
                RecvOutcome::Event(_) => continue,
                RecvOutcome::Closed => panic!("bus closed unexpectedly"),
            }
        }
        assert!(dropped_total > 0);
        assert_eq!(sub.total_dropped(), dropped_total);
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_is_not_an_error() {
        let bus = EventBus::new();
        bus.publish(sample_event());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn subscriber_count_reflects_open_subscriptions() {
        let bus = EventBus::new();
        let sub1 = bus.subscribe();
        let sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
        drop(sub1);
        drop(sub2);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
