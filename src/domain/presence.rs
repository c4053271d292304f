//! In-memory channel presence storage.
//!
//! [`PresenceRegistry`] maps each channel to the clients currently
//! subscribed to it. Sessions upsert their entries on subscribe and on
//! every periodic presence update, and remove them on unsubscribe and
//! teardown.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use super::{ClientId, ClientInfo};

/// A single presence record.
#[derive(Debug, Clone, Serialize)]
pub struct PresenceEntry {
    /// Client metadata.
    #[serde(flatten)]
    pub info: ClientInfo,
    /// Last time the owning session confirmed this entry.
    pub updated_at: DateTime<Utc>,
}

/// Channel → client presence map.
///
/// A single `RwLock` guards the whole map: reads of different channels run
/// concurrently, updates are short and serialized.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    channels: RwLock<HashMap<String, HashMap<ClientId, PresenceEntry>>>,
}

impl PresenceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or refreshes the entry of `info.client` in `channel`.
    pub async fn upsert(&self, channel: &str, info: ClientInfo) {
        let mut map = self.channels.write().await;
        map.entry(channel.to_string()).or_default().insert(
            info.client,
            PresenceEntry {
                info,
                updated_at: Utc::now(),
            },
        );
    }

    /// Removes a client from one channel. Returns `true` if it was present.
    pub async fn remove(&self, channel: &str, client: ClientId) -> bool {
        let mut map = self.channels.write().await;
        let Some(members) = map.get_mut(channel) else {
            return false;
        };
        let removed = members.remove(&client).is_some();
        if members.is_empty() {
            map.remove(channel);
        }
        removed
    }

    /// Removes a client from every listed channel.
    pub async fn remove_client<'a>(
        &self,
        client: ClientId,
        channels: impl IntoIterator<Item = &'a String>,
    ) {
        let mut map = self.channels.write().await;
        for channel in channels {
            if let Some(members) = map.get_mut(channel) {
                members.remove(&client);
                if members.is_empty() {
                    map.remove(channel);
                }
            }
        }
    }

    /// Returns the presence entries of a channel, ordered by user then client.
    pub async fn members(&self, channel: &str) -> Vec<PresenceEntry> {
        let map = self.channels.read().await;
        let mut entries: Vec<PresenceEntry> = map
            .get(channel)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default();
        entries.sort_by(|a, b| {
            a.info
                .user
                .cmp(&b.info.user)
                .then(a.info.client.cmp(&b.info.client))
        });
        entries
    }

    /// Returns the number of channels with at least one member.
    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }
}
