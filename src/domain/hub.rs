//! Registry of connected clients.
//!
//! [`Hub`] tracks every session that completed its connect handshake so
//! the REST API can list clients and force disconnects, and so shutdown
//! can close them all.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::{ClientId, ClientInfo};
use crate::error::GatewayError;
use crate::mediator::{Client, Disconnect};

/// Central store of connected clients.
///
/// Disconnecting through the hub only marks the client closed and cancels
/// its scopes; the owning session performs the actual teardown.
#[derive(Debug, Default)]
pub struct Hub {
    clients: RwLock<HashMap<ClientId, Arc<Client>>>,
}

impl Hub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connected client.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] if a client with the same
    /// ID is already registered.
    pub async fn insert(&self, client: Arc<Client>) -> Result<ClientId, GatewayError> {
        let id = client.id();
        let mut map = self.clients.write().await;
        if map.contains_key(&id) {
            return Err(GatewayError::InvalidRequest(format!(
                "client {id} already registered"
            )));
        }
        map.insert(id, client);
        Ok(id)
    }

    /// Returns the client with the given ID.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ClientNotFound`] if no such client is
    /// connected.
    pub async fn get(&self, id: ClientId) -> Result<Arc<Client>, GatewayError> {
        let map = self.clients.read().await;
        map.get(&id)
            .cloned()
            .ok_or(GatewayError::ClientNotFound(*id.as_uuid()))
    }

    /// Unregisters a client, returning it if it was present.
    pub async fn remove(&self, id: ClientId) -> Option<Arc<Client>> {
        self.clients.write().await.remove(&id)
    }

    /// Forces a client to disconnect.
    ///
    /// Returns `true` if this call closed the client, `false` if it was
    /// already closing.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ClientNotFound`] if no such client is
    /// connected.
    pub async fn disconnect(
        &self,
        id: ClientId,
        disconnect: Disconnect,
    ) -> Result<bool, GatewayError> {
        let client = self.get(id).await?;
        let closed = client.disconnect(disconnect);
        tracing::info!(client = %id, closed, "forced disconnect requested");
        Ok(closed)
    }

    /// Disconnects every registered client. Returns how many were closed.
    pub async fn disconnect_all(&self, disconnect: &Disconnect) -> usize {
        let map = self.clients.read().await;
        map.values()
            .filter(|client| client.disconnect(disconnect.clone()))
            .count()
    }

    /// Returns metadata of all clients, optionally filtered by user, ordered
    /// by user then client ID.
    pub async fn list(&self, user_filter: Option<&str>) -> Vec<ClientInfo> {
        let map = self.clients.read().await;
        let mut infos: Vec<ClientInfo> = map
            .values()
            .filter(|client| user_filter.is_none_or(|user| client.user() == user))
            .map(|client| client.client_info())
            .collect();
        infos.sort_by(|a, b| a.user.cmp(&b.user).then(a.client.cmp(&b.client)));
        infos
    }

    /// Returns the number of connected clients.
    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Returns `true` if no client is connected.
    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn client(user: &str) -> Arc<Client> {
        let (client, _rx) = Client::new(ClientId::new(), user, None);
        Arc::new(client)
    }

    #[tokio::test]
    async fn insert_and_get() {
        let hub = Hub::new();
        let alice = client("alice");
        let id = alice.id();

        tokio_test::assert_ok!(hub.insert(Arc::clone(&alice)).await);
        let Ok(fetched) = hub.get(id).await else {
            panic!("client should be registered");
        };
        assert_eq!(fetched.user(), "alice");
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let hub = Hub::new();
        let alice = client("alice");
        let _ = hub.insert(Arc::clone(&alice)).await;
        assert!(hub.insert(alice).await.is_err());
    }

    #[tokio::test]
    async fn get_unknown_returns_not_found() {
        let hub = Hub::new();
        let Err(err) = hub.get(ClientId::new()).await else {
            panic!("expected error");
        };
        assert!(matches!(err, GatewayError::ClientNotFound(_)));
    }

    #[tokio::test]
    async fn disconnect_marks_client_closed_once() {
        let hub = Hub::new();
        let alice = client("alice");
        let id = alice.id();
        let _ = hub.insert(Arc::clone(&alice)).await;

        assert!(matches!(hub.disconnect(id, Disconnect::force()).await, Ok(true)));
        assert!(matches!(hub.disconnect(id, Disconnect::force()).await, Ok(false)));
        assert!(alice.is_closed());
    }

    #[tokio::test]
    async fn list_filters_and_sorts() {
        let hub = Hub::new();
        for user in ["carol", "alice", "bob", "alice"] {
            let _ = hub.insert(client(user)).await;
        }
        let users: Vec<String> = hub.list(None).await.into_iter().map(|i| i.user).collect();
        assert_eq!(users, vec!["alice", "alice", "bob", "carol"]);
        assert_eq!(hub.list(Some("alice")).await.len(), 2);
        assert_eq!(hub.len().await, 4);
    }

    #[tokio::test]
    async fn disconnect_all_and_remove() {
        let hub = Hub::new();
        let alice = client("alice");
        let bob = client("bob");
        let _ = hub.insert(Arc::clone(&alice)).await;
        let _ = hub.insert(Arc::clone(&bob)).await;

        assert_eq!(hub.disconnect_all(&Disconnect::shutdown()).await, 2);
        assert!(alice.is_closed() && bob.is_closed());

        assert!(hub.remove(alice.id()).await.is_some());
        assert!(hub.remove(alice.id()).await.is_none());
        assert!(!hub.is_empty().await);
    }
}
