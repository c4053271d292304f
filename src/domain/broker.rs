//! In-process broadcast broker for channel publications.
//!
//! [`Broker`] wraps a [`tokio::sync::broadcast`] channel. Every accepted
//! publication is sent through it, and every WebSocket session subscribes
//! once and filters by its own channel set.

use tokio::sync::broadcast;

use super::{ChannelPublication, Publication};

/// Broadcast fan-out for [`ChannelPublication`]s.
///
/// When the ring buffer is full, the oldest publications are dropped for
/// lagging receivers.
#[derive(Debug, Clone)]
pub struct Broker {
    sender: broadcast::Sender<ChannelPublication>,
}

impl Broker {
    /// Creates a new `Broker` with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes into a channel.
    ///
    /// Returns the number of sessions the publication was handed to. With
    /// no live sessions the publication is dropped.
    pub fn publish(&self, channel: &str, publication: Publication) -> usize {
        let delivered = self
            .sender
            .send(ChannelPublication {
                channel: channel.to_string(),
                publication,
            })
            .unwrap_or(0);
        tracing::trace!(channel, delivered, "publication fanned out");
        delivered
    }

    /// Creates a receiver for all future publications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelPublication> {
        self.sender.subscribe()
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
