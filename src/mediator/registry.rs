//! Hook registry: nine independently optional handler slots.
//!
//! Business logic implements any subset of the handler traits and is
//! registered once at startup through the builder methods of
//! [`HookRegistry`]. The registry is then moved into the
//! [`super::Mediator`] and never mutated again. An empty slot is not an
//! error; the mediator applies that event's default policy instead.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::context::{
    ConnectContext, DisconnectContext, EventKind, MessageContext, PresenceContext,
    PublishContext, RefreshContext, RpcContext, SubscribeContext, UnsubscribeContext,
};
use super::reply::{
    ConnectReply, DisconnectReply, MessageReply, PresenceReply, PublishReply, RefreshReply,
    RpcReply, SubscribeReply, UnsubscribeReply,
};
use super::Scope;

/// Decides whether a connection is established.
#[async_trait]
pub trait ConnectHandler: Send + Sync {
    /// Called when a client connects.
    async fn on_connect(&self, scope: Scope, ctx: ConnectContext<'_>) -> ConnectReply;
}

/// Observes connection teardown.
#[async_trait]
pub trait DisconnectHandler: Send + Sync {
    /// Called once after a client disconnected.
    async fn on_disconnect(&self, scope: Scope, ctx: DisconnectContext<'_>) -> DisconnectReply;
}

/// Decides whether a subscription is allowed.
#[async_trait]
pub trait SubscribeHandler: Send + Sync {
    /// Called when a client subscribes to a channel.
    async fn on_subscribe(&self, scope: Scope, ctx: SubscribeContext<'_>) -> SubscribeReply;
}

/// Observes unsubscriptions.
#[async_trait]
pub trait UnsubscribeHandler: Send + Sync {
    /// Called after a client left a channel.
    async fn on_unsubscribe(&self, scope: Scope, ctx: UnsubscribeContext<'_>) -> UnsubscribeReply;
}

/// Decides whether a client publication is fanned out.
#[async_trait]
pub trait PublishHandler: Send + Sync {
    /// Called when a client publishes into a channel.
    async fn on_publish(&self, scope: Scope, ctx: PublishContext<'_>) -> PublishReply;
}

/// Observes periodic presence updates.
#[async_trait]
pub trait PresenceHandler: Send + Sync {
    /// Called on every periodic presence update of a subscribed client.
    async fn on_presence(&self, scope: Scope, ctx: PresenceContext<'_>) -> PresenceReply;
}

/// Extends connection credentials.
#[async_trait]
pub trait RefreshHandler: Send + Sync {
    /// Called when the connection's credentials reach their deadline.
    async fn on_refresh(&self, scope: Scope, ctx: RefreshContext<'_>) -> RefreshReply;
}

/// Answers custom RPC calls.
#[async_trait]
pub trait RpcHandler: Send + Sync {
    /// Called for every RPC call.
    async fn on_rpc(&self, scope: Scope, ctx: RpcContext<'_>) -> RpcReply;
}

/// Receives asynchronous client messages.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Called for every asynchronous message.
    async fn on_message(&self, scope: Scope, ctx: MessageContext<'_>) -> MessageReply;
}

/// Capability table of business-logic hooks.
#[derive(Clone, Default)]
pub struct HookRegistry {
    pub(crate) connect: Option<Arc<dyn ConnectHandler>>,
    pub(crate) disconnect: Option<Arc<dyn DisconnectHandler>>,
    pub(crate) subscribe: Option<Arc<dyn SubscribeHandler>>,
    pub(crate) unsubscribe: Option<Arc<dyn UnsubscribeHandler>>,
    pub(crate) publish: Option<Arc<dyn PublishHandler>>,
    pub(crate) presence: Option<Arc<dyn PresenceHandler>>,
    pub(crate) refresh: Option<Arc<dyn RefreshHandler>>,
    pub(crate) rpc: Option<Arc<dyn RpcHandler>>,
    pub(crate) message: Option<Arc<dyn MessageHandler>>,
}

impl HookRegistry {
    /// Creates a registry with every slot empty.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the connect hook.
    #[must_use]
    pub fn on_connect(mut self, handler: Arc<dyn ConnectHandler>) -> Self {
        self.connect = Some(handler);
        self
    }

    /// Registers the disconnect hook.
    #[must_use]
    pub fn on_disconnect(mut self, handler: Arc<dyn DisconnectHandler>) -> Self {
        self.disconnect = Some(handler);
        self
    }

    /// Registers the subscribe hook.
    #[must_use]
    pub fn on_subscribe(mut self, handler: Arc<dyn SubscribeHandler>) -> Self {
        self.subscribe = Some(handler);
        self
    }

    /// Registers the unsubscribe hook.
    #[must_use]
    pub fn on_unsubscribe(mut self, handler: Arc<dyn UnsubscribeHandler>) -> Self {
        self.unsubscribe = Some(handler);
        self
    }

    /// Registers the publish hook.
    #[must_use]
    pub fn on_publish(mut self, handler: Arc<dyn PublishHandler>) -> Self {
        self.publish = Some(handler);
        self
    }

    /// Registers the presence hook.
    #[must_use]
    pub fn on_presence(mut self, handler: Arc<dyn PresenceHandler>) -> Self {
        self.presence = Some(handler);
        self
    }

    /// Registers the refresh hook.
    #[must_use]
    pub fn on_refresh(mut self, handler: Arc<dyn RefreshHandler>) -> Self {
        self.refresh = Some(handler);
        self
    }

    /// Registers the RPC hook.
    #[must_use]
    pub fn on_rpc(mut self, handler: Arc<dyn RpcHandler>) -> Self {
        self.rpc = Some(handler);
        self
    }

    /// Registers the message hook.
    #[must_use]
    pub fn on_message(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.message = Some(handler);
        self
    }

    /// Returns the event kinds that have a hook registered.
    #[must_use]
    pub fn registered(&self) -> Vec<EventKind> {
        [
            (EventKind::Connect, self.connect.is_some()),
            (EventKind::Disconnect, self.disconnect.is_some()),
            (EventKind::Subscribe, self.subscribe.is_some()),
            (EventKind::Unsubscribe, self.unsubscribe.is_some()),
            (EventKind::Publish, self.publish.is_some()),
            (EventKind::Presence, self.presence.is_some()),
            (EventKind::Refresh, self.refresh.is_some()),
            (EventKind::Rpc, self.rpc.is_some()),
            (EventKind::Message, self.message.is_some()),
        ]
        .into_iter()
        .filter_map(|(kind, present)| present.then_some(kind))
        .collect()
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("registered", &self.registered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mediator::ClientError;

    struct Deny;

    #[async_trait]
    impl SubscribeHandler for Deny {
        async fn on_subscribe(&self, _scope: Scope, _ctx: SubscribeContext<'_>) -> SubscribeReply {
            SubscribeReply::reject(ClientError::permission_denied())
        }
    }

    #[async_trait]
    impl RpcHandler for Deny {
        async fn on_rpc(&self, _scope: Scope, _ctx: RpcContext<'_>) -> RpcReply {
            RpcReply::default()
        }
    }

    #[test]
    fn empty_registry_has_no_hooks() {
        assert!(HookRegistry::new().registered().is_empty());
    }

    #[test]
    fn one_handler_can_fill_several_slots() {
        let deny = Arc::new(Deny);
        let registry = HookRegistry::new()
            .on_subscribe(Arc::clone(&deny) as Arc<dyn SubscribeHandler>)
            .on_rpc(deny);
        assert_eq!(
            registry.registered(),
            vec![EventKind::Subscribe, EventKind::Rpc]
        );
        assert!(format!("{registry:?}").contains("Subscribe"));
    }
}
