//! Per-event contexts describing what happened.
//!
//! Every context borrows the [`Client`] and the event data from the
//! session for the length of a single invocation, so a context can never
//! outlive the handler call it was built for. Building one performs no
//! I/O and touches no session state.

use std::fmt;

use super::{Client, Disconnect};
use crate::domain::{Publication, Raw};

/// The nine event kinds surfaced to hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Client connects.
    Connect,
    /// Client disconnected.
    Disconnect,
    /// Client subscribes to a channel.
    Subscribe,
    /// Client unsubscribes from a channel.
    Unsubscribe,
    /// Client publishes into a channel.
    Publish,
    /// Periodic presence update.
    Presence,
    /// Connection credentials reached their deadline.
    Refresh,
    /// Client issued an RPC call.
    Rpc,
    /// Client sent an asynchronous message.
    Message,
}

impl EventKind {
    /// Returns the event kind as a static string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::Publish => "publish",
            Self::Presence => "presence",
            Self::Refresh => "refresh",
            Self::Rpc => "rpc",
            Self::Message => "message",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accessors shared by all event contexts.
pub trait EventContext {
    /// The kind of event this context describes.
    const KIND: EventKind;

    /// The connection that produced the event.
    fn client(&self) -> &Client;
}

/// Context of a connect event.
#[derive(Debug, Clone, Copy)]
pub struct ConnectContext<'a> {
    /// Connecting client.
    pub client: &'a Client,
}

/// Context of a disconnect event.
#[derive(Debug, Clone, Copy)]
pub struct DisconnectContext<'a> {
    /// Disconnected client.
    pub client: &'a Client,
    /// The disconnect that was applied.
    pub disconnect: &'a Disconnect,
}

/// Context of a subscribe event.
#[derive(Debug, Clone, Copy)]
pub struct SubscribeContext<'a> {
    /// Subscribing client.
    pub client: &'a Client,
    /// Channel being subscribed to.
    pub channel: &'a str,
}

/// Context of an unsubscribe event.
#[derive(Debug, Clone, Copy)]
pub struct UnsubscribeContext<'a> {
    /// Unsubscribing client.
    pub client: &'a Client,
    /// Channel being left.
    pub channel: &'a str,
}

/// Context of a publish event.
#[derive(Debug, Clone, Copy)]
pub struct PublishContext<'a> {
    /// Publishing client.
    pub client: &'a Client,
    /// Target channel.
    pub channel: &'a str,
    /// Publication about to be written.
    pub publication: &'a Publication,
}

/// Context of a periodic presence update.
#[derive(Debug, Clone, Copy)]
pub struct PresenceContext<'a> {
    /// Polled client.
    pub client: &'a Client,
    /// Channels the client is subscribed to: non-empty, sorted, unique.
    pub channels: &'a [String],
}

/// Context of a credential refresh.
#[derive(Debug, Clone, Copy)]
pub struct RefreshContext<'a> {
    /// Client whose credentials reached their deadline.
    pub client: &'a Client,
}

/// Context of an RPC call.
#[derive(Debug, Clone, Copy)]
pub struct RpcContext<'a> {
    /// Calling client.
    pub client: &'a Client,
    /// Opaque request payload.
    pub data: &'a Raw,
}

/// Context of an asynchronous client message.
#[derive(Debug, Clone, Copy)]
pub struct MessageContext<'a> {
    /// Sending client.
    pub client: &'a Client,
    /// Opaque message payload.
    pub data: &'a Raw,
}

macro_rules! impl_event_context {
    ($($ty:ident => $kind:ident),+ $(,)?) => {
        $(
            impl EventContext for $ty<'_> {
                const KIND: EventKind = EventKind::$kind;

                fn client(&self) -> &Client {
                    self.client
                }
            }
        )+
    };
}

impl_event_context! {
    ConnectContext => Connect,
    DisconnectContext => Disconnect,
    SubscribeContext => Subscribe,
    UnsubscribeContext => Unsubscribe,
    PublishContext => Publish,
    PresenceContext => Presence,
    RefreshContext => Refresh,
    RpcContext => Rpc,
    MessageContext => Message,
}
