//! Fan-out of events to every registered subscriber channel.

use dashmap::DashMap;
use futures::future::join_all;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::channel::{ChannelId, DeliveryError, MpscChannel, SubscriberChannel};
use super::frame::EventFrame;
use super::subscription::Subscription;

/// Callback invoked for every channel evicted after a failed delivery.
pub type FailureHook = Arc<dyn Fn(&DeliveryFailure) + Send + Sync>;

/// A delivery that failed and caused its channel to be evicted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    /// The evicted channel
    pub channel: ChannelId,
    /// What the channel reported
    pub error: DeliveryError,
}

/// Point-in-time broadcaster counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastStats {
    /// Publish calls that produced a frame
    pub published: u64,
    /// Successful per-channel deliveries
    pub delivered: u64,
    /// Channels removed after a failed delivery
    pub evicted: u64,
    /// Channels currently registered
    pub subscribers: usize,
}

/// Shared registry state.
pub(crate) struct Registry {
    channels: DashMap<ChannelId, Arc<dyn SubscriberChannel>>,
    failure_hook: Option<FailureHook>,
    published: AtomicU64,
    delivered: AtomicU64,
    evicted: AtomicU64,
}

impl Registry {
    fn new(failure_hook: Option<FailureHook>) -> Self {
        Self {
            channels: DashMap::new(),
            failure_hook,
            published: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    pub(crate) fn remove(&self, id: &ChannelId) -> bool {
        let removed = self.channels.remove(id).is_some();
        if removed {
            debug!(channel = %id, subscribers = self.channels.len(), "Unregistered subscriber");
        }
        removed
    }
}

/// Pushes the same event to every registered subscriber channel.
///
/// Cloning is cheap; clones share one registry. Delivery is best effort:
/// a channel that fails a write is dropped from the registry and never
/// retried, and the failure is not reported to the publisher.
#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<Registry>,
}

impl Broadcaster {
    /// Create a broadcaster with no failure hook.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Registry::new(None)),
        }
    }

    /// Create a broadcaster that reports every eviction to `hook`.
    pub fn with_failure_hook(hook: FailureHook) -> Self {
        Self {
            inner: Arc::new(Registry::new(Some(hook))),
        }
    }

    /// Add a channel to the registry.
    ///
    /// Registering an id that is already present keeps the existing entry.
    pub fn register(&self, channel: Arc<dyn SubscriberChannel>) {
        let id = channel.id();
        self.inner.channels.entry(id).or_insert(channel);
        debug!(channel = %id, subscribers = self.inner.channels.len(), "Registered subscriber");
    }

    /// Remove a channel if present. Returns whether anything was removed.
    pub fn unregister(&self, id: &ChannelId) -> bool {
        self.inner.remove(id)
    }

    /// Create an in-process channel, register it and return its receiver.
    ///
    /// The channel is unregistered when the returned [`Subscription`] is
    /// dropped.
    pub fn subscribe(&self, capacity: usize) -> (Subscription, mpsc::Receiver<EventFrame>) {
        let (channel, receiver) = MpscChannel::new(capacity);
        let id = channel.id();
        self.register(Arc::new(channel));
        (Subscription::new(id, Arc::downgrade(&self.inner)), receiver)
    }

    /// Serialize `payload` as JSON and deliver it to every subscriber.
    pub async fn publish<T: Serialize + ?Sized>(&self, payload: &T) {
        match EventFrame::json(payload) {
            Ok(frame) => self.publish_frame(frame).await,
            Err(e) => warn!(error = %e, "Dropping event that failed to serialize"),
        }
    }

    /// Deliver a prepared frame to every subscriber.
    ///
    /// Fan-out runs over a snapshot of the registry taken at call time, so
    /// channels registered mid-publish are picked up by the next call.
    pub async fn publish_frame(&self, frame: EventFrame) {
        let snapshot: Vec<Arc<dyn SubscriberChannel>> = self
            .inner
            .channels
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        self.inner.published.fetch_add(1, Ordering::Relaxed);
        trace!(subscribers = snapshot.len(), "Publishing event");

        let frame = &frame;
        let results = join_all(snapshot.into_iter().map(|channel| async move {
            let result = channel.deliver(frame).await;
            (channel, result)
        }))
        .await;

        for (channel, result) in results {
            match result {
                Ok(()) => {
                    self.inner.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(error) => self.evict(channel, error),
            }
        }
    }

    /// Drop a channel that failed delivery, unless it was already removed
    /// or replaced concurrently.
    fn evict(&self, channel: Arc<dyn SubscriberChannel>, error: DeliveryError) {
        let id = channel.id();
        let removed = self
            .inner
            .channels
            .remove_if(&id, |_, current| Arc::ptr_eq(current, &channel));

        if removed.is_none() {
            return;
        }

        channel.close();
        self.inner.evicted.fetch_add(1, Ordering::Relaxed);
        warn!(channel = %id, error = %error, "Evicted subscriber after failed delivery");

        if let Some(hook) = &self.inner.failure_hook {
            hook(&DeliveryFailure { channel: id, error });
        }
    }

    /// Remove and close every channel. Returns how many were closed.
    pub fn close_all(&self) -> usize {
        let ids: Vec<ChannelId> = self.inner.channels.iter().map(|entry| *entry.key()).collect();

        let mut closed = 0;
        for id in ids {
            if let Some((_, channel)) = self.inner.channels.remove(&id) {
                channel.close();
                closed += 1;
            }
        }

        debug!(closed = closed, "Closed all subscribers");
        closed
    }

    /// Whether `id` is currently registered.
    pub fn contains(&self, id: &ChannelId) -> bool {
        self.inner.channels.contains_key(id)
    }

    /// Number of registered channels.
    pub fn subscriber_count(&self) -> usize {
        self.inner.channels.len()
    }

    /// Current counters.
    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            published: self.inner.published.load(Ordering::Relaxed),
            delivered: self.inner.delivered.load(Ordering::Relaxed),
            evicted: self.inner.evicted.load(Ordering::Relaxed),
            subscribers: self.inner.channels.len(),
        }
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcaster")
            .field("subscribers", &self.subscriber_count())
            .field("failure_hook", &self.inner.failure_hook.is_some())
            .finish()
    }
}
