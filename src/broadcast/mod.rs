//! Server-push event fan-out to connected subscribers.

mod broadcaster;
mod channel;
mod frame;
mod subscription;

pub use broadcaster::{BroadcastStats, Broadcaster, DeliveryFailure, FailureHook};
pub use channel::{ChannelId, DeliveryError, MpscChannel, SubscriberChannel};
pub use frame::EventFrame;
pub use subscription::Subscription;
