//! Registration guard for in-process subscribers.

use std::sync::Weak;

use super::broadcaster::Registry;
use super::channel::ChannelId;

/// Keeps a channel registered for as long as it is alive.
///
/// Dropping the guard unregisters the channel. It holds only a weak
/// reference, so it never keeps the broadcaster alive on its own.
#[derive(Debug)]
pub struct Subscription {
    id: ChannelId,
    registry: Weak<Registry>,
}

impl Subscription {
    pub(crate) fn new(id: ChannelId, registry: Weak<Registry>) -> Self {
        Self { id, registry }
    }

    /// The registered channel's id.
    pub fn id(&self) -> ChannelId {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.id);
        }
    }
}
