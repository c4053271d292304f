//! Event mediation layer between client sessions and business logic.
//!
//! The session runtime reports lifecycle events (connect, subscribe,
//! publish, RPC, ...) to the [`Mediator`], which hands an immutable
//! context to the matching hook from the [`HookRegistry`] and turns the
//! hook's reply into a [`Verdict`]: proceed, reject with a
//! [`ClientError`], or terminate the connection with a [`Disconnect`].
//!
//! ```text
//! ws session ──event──▶ Mediator ──(Scope, Context)──▶ hook
//!      ▲                   │                             │
//!      └──── Verdict ◀── interpret ◀─────── Reply ◀──────┘
//! ```

pub mod client;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod registry;
pub mod reply;

pub use client::{Client, Scope};
pub use context::{
    ConnectContext, DisconnectContext, EventContext, EventKind, MessageContext, PresenceContext,
    PublishContext, RefreshContext, RpcContext, SubscribeContext, UnsubscribeContext,
};
pub use dispatch::{Mediator, MediatorConfig};
pub use error::{ClientError, Disconnect, HandlerFault};
pub use registry::{
    ConnectHandler, DisconnectHandler, HookRegistry, MessageHandler, PresenceHandler,
    PublishHandler, RefreshHandler, RpcHandler, SubscribeHandler, UnsubscribeHandler,
};
pub use reply::{
    ConnectReply, CredentialUpdate, DisconnectReply, MessageReply, PresenceReply, PublishReply,
    RefreshReply, Reply, RpcReply, SubscribeReply, Termination, UnsubscribeReply, Verdict,
};
