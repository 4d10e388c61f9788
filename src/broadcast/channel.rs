//! Subscriber channel abstraction.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use super::frame::EventFrame;

/// Identity of a registered channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(Uuid);

impl ChannelId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChannelId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a frame could not be handed to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The receiving side has gone away.
    #[error("channel closed")]
    Closed,
    /// The subscriber is not draining its buffer.
    #[error("channel buffer full")]
    Full,
    /// Transport-specific failure.
    #[error("delivery failed: {0}")]
    Transport(String),
}

/// One connected client's ability to receive pushed events.
///
/// The broadcaster keeps channels behind `Arc` and only writes to and
/// closes them; the underlying connection belongs to whoever registered
/// the channel.
#[async_trait]
pub trait SubscriberChannel: Send + Sync {
    /// Stable identity used for registration and removal.
    fn id(&self) -> ChannelId;

    /// Hand one frame to the subscriber.
    async fn deliver(&self, frame: &EventFrame) -> Result<(), DeliveryError>;

    /// Called once when the broadcaster drops the channel after a failure
    /// or on shutdown.
    fn close(&self) {}
}

/// Channel backed by a bounded tokio mpsc queue.
///
/// Delivery never waits: a full queue or a dropped receiver is reported
/// as a failure.
pub struct MpscChannel {
    id: ChannelId,
    sender: mpsc::Sender<EventFrame>,
}

impl MpscChannel {
    /// Create a channel and the receiver its frames arrive on.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<EventFrame>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let channel = Self {
            id: ChannelId::new(),
            sender,
        };
        (channel, receiver)
    }
}

#[async_trait]
impl SubscriberChannel for MpscChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    async fn deliver(&self, frame: &EventFrame) -> Result<(), DeliveryError> {
        self.sender.try_send(frame.clone()).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

impl fmt::Debug for MpscChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MpscChannel")
            .field("id", &self.id)
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}
