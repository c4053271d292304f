//! Per-connection subscription set.
//!
//! Tracks which channels a WebSocket client is subscribed to and provides
//! server-side publication filtering. Channels are kept sorted so the
//! presence update always reports them in a stable order.

use std::collections::BTreeSet;

/// Set of channels a single connection is subscribed to.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    channels: BTreeSet<String>,
}

impl SubscriptionSet {
    /// Creates a new empty subscription set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a channel. Returns `false` if it was already present.
    pub fn subscribe(&mut self, channel: &str) -> bool {
        self.channels.insert(channel.to_string())
    }

    /// Removes a channel. Returns `false` if it was not present.
    pub fn unsubscribe(&mut self, channel: &str) -> bool {
        self.channels.remove(channel)
    }

    /// Returns `true` if publications of `channel` should be forwarded.
    #[must_use]
    pub fn contains(&self, channel: &str) -> bool {
        self.channels.contains(channel)
    }

    /// Returns the subscribed channels, sorted and unique.
    #[must_use]
    pub fn channels(&self) -> Vec<String> {
        self.channels.iter().cloned().collect()
    }

    /// Iterates over the subscribed channels in order.
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.channels.iter()
    }

    /// Returns the number of subscribed channels.
    #[must_use]
    pub fn count(&self) -> usize {
        self.channels.len()
    }

    /// Returns `true` if no channel is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
