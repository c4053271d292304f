//! Client reference handed to hooks, and the cancellable invocation scope.
//!
//! A [`Client`] is owned by its WebSocket session (behind an `Arc`) and
//! lent to hooks by reference for the duration of one invocation. It
//! grants two capabilities back into the connection: pushing a message
//! ([`Client::send`]) and terminating it ([`Client::disconnect`]).
//! Termination is idempotent: the first recorded [`Disconnect`] wins.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{OnceLock, PoisonError, RwLock};

use tokio::sync::{Mutex, MutexGuard, mpsc};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use super::Disconnect;
use crate::domain::{ClientId, ClientInfo, Raw};
use crate::error::GatewayError;

/// Cooperative cancellation signal passed to every handler invocation.
///
/// Cancellation is advisory: a handler may ignore it, in which case the
/// mediator stops waiting after the configured grace period.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    token: CancellationToken,
}

impl Scope {
    /// Creates a scope that is never cancelled unless [`Scope::token`] is
    /// cancelled explicitly.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` once the connection has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves when the connection is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Returns the underlying token, e.g. to derive child tokens for
    /// spawned work.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Handle to a single authenticated connection.
#[derive(Debug)]
pub struct Client {
    id: ClientId,
    user: String,
    info: RwLock<Option<Raw>>,
    outbound: mpsc::UnboundedSender<Raw>,
    cancel: CancellationToken,
    closed: OnceLock<Disconnect>,
    disconnect_notified: AtomicBool,
    turn: Mutex<()>,
}

impl Client {
    /// Creates a client and the receiving end of its push queue.
    ///
    /// The session drains the receiver and writes each payload to the
    /// socket as a `message` frame.
    #[must_use]
    pub fn new(
        id: ClientId,
        user: impl Into<String>,
        info: Option<Raw>,
    ) -> (Self, mpsc::UnboundedReceiver<Raw>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let client = Self {
            id,
            user: user.into(),
            info: RwLock::new(info),
            outbound,
            cancel: CancellationToken::new(),
            closed: OnceLock::new(),
            disconnect_notified: AtomicBool::new(false),
            turn: Mutex::new(()),
        };
        (client, rx)
    }

    /// Returns the connection identifier.
    #[must_use]
    pub const fn id(&self) -> ClientId {
        self.id
    }

    /// Returns the user this connection authenticated as.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Returns the current opaque connection info.
    #[must_use]
    pub fn info(&self) -> Option<Raw> {
        self.info
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_info(&self, info: Option<Raw>) {
        *self.info.write().unwrap_or_else(PoisonError::into_inner) = info;
    }

    /// Returns the public metadata of this connection.
    #[must_use]
    pub fn client_info(&self) -> ClientInfo {
        ClientInfo {
            client: self.id,
            user: self.user.clone(),
            info: self.info(),
        }
    }

    /// Queues an asynchronous push message for this connection.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ClientClosed`] if the connection is closed
    /// or its session is gone.
    pub fn send(&self, data: Raw) -> Result<(), GatewayError> {
        if self.is_closed() {
            return Err(GatewayError::ClientClosed(*self.id.as_uuid()));
        }
        self.outbound
            .send(data)
            .map_err(|_| GatewayError::ClientClosed(*self.id.as_uuid()))
    }

    /// Terminates the connection.
    ///
    /// Records `disconnect` unless one was recorded already and cancels
    /// every in-flight handler scope. Returns `true` if this call was the
    /// one that closed the connection.
    pub fn disconnect(&self, disconnect: Disconnect) -> bool {
        let won = self.closed.set(disconnect).is_ok();
        self.cancel.cancel();
        if won {
            tracing::debug!(client = %self.id, "client marked closed");
        }
        won
    }

    /// Terminates the connection and returns the disconnect that is in
    /// effect, which is `disconnect` only if the client was still open.
    pub fn close_with(&self, disconnect: Disconnect) -> Disconnect {
        let fallback = disconnect.clone();
        self.disconnect(disconnect);
        self.closed.get().cloned().unwrap_or(fallback)
    }

    /// Returns the disconnect that closed this connection, if any.
    #[must_use]
    pub fn closed_reason(&self) -> Option<&Disconnect> {
        self.closed.get()
    }

    /// Returns `true` once the connection has been terminated.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.get().is_some()
    }

    /// Creates a cancellation scope tied to this connection's lifetime.
    #[must_use]
    pub fn scope(&self) -> Scope {
        Scope {
            token: self.cancel.child_token(),
        }
    }

    /// Resolves when the connection is terminated.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    pub(crate) fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Waits for this connection's dispatch turn. Waiters are served in
    /// FIFO order.
    pub(crate) async fn turn(&self) -> MutexGuard<'_, ()> {
        self.turn.lock().await
    }

    /// Returns `true` exactly once, for the first caller.
    pub(crate) fn claim_disconnect_notification(&self) -> bool {
        !self.disconnect_notified.swap(true, Ordering::AcqRel)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn client() -> (Client, mpsc::UnboundedReceiver<Raw>) {
        Client::new(ClientId::new(), "alice", None)
    }

    #[tokio::test]
    async fn send_queues_push_message() {
        let (client, mut rx) = client();
        tokio_test::assert_ok!(client.send(Raw::from("1")));
        let Some(data) = rx.recv().await else {
            panic!("expected queued message");
        };
        assert_eq!(data.as_bytes(), b"1");
    }

    #[test]
    fn send_after_close_fails() {
        let (client, _rx) = client();
        client.disconnect(Disconnect::normal());
        tokio_test::assert_err!(client.send(Raw::from("1")));
    }

    #[test]
    fn first_disconnect_wins() {
        let (client, _rx) = client();
        assert!(client.disconnect(Disconnect::force()));
        assert!(!client.disconnect(Disconnect::server_error()));
        assert_eq!(client.closed_reason(), Some(&Disconnect::force()));
        assert_eq!(client.close_with(Disconnect::expired()), Disconnect::force());
    }

    #[test]
    fn disconnect_cancels_scopes() {
        let (client, _rx) = client();
        let scope = client.scope();
        assert!(!scope.is_cancelled());
        client.disconnect(Disconnect::normal());
        assert!(scope.is_cancelled());
    }

    #[test]
    fn disconnect_notification_is_claimed_once() {
        let (client, _rx) = client();
        assert!(client.claim_disconnect_notification());
        assert!(!client.claim_disconnect_notification());
    }

    #[test]
    fn client_info_reflects_updates() {
        let (client, _rx) = client();
        assert_eq!(client.client_info().info, None);
        client.set_info(Some(Raw::from("{\"tier\":1}")));
        assert_eq!(client.client_info().info, Some(Raw::from("{\"tier\":1}")));
        assert_eq!(client.client_info().user, "alice");
    }
}
