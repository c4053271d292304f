//! The mediator: dispatches events to hooks and settles their verdicts.
//!
//! Every dispatch follows the same path:
//! take the client's turn → refuse if the client is already closed →
//! apply the default policy if the slot is empty → otherwise invoke the
//! handler under a guard → interpret the reply → mark the client closed
//! if the verdict terminates it.
//!
//! The guard catches panics, enforces the optional invocation timeout,
//! and stops waiting for a handler that keeps running longer than the
//! cancellation grace period after its connection was cancelled. All three
//! become [`HandlerFault`]s, which terminate the connection with
//! [`Disconnect::server_error`].

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use chrono::Utc;
use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;

use super::context::{
    ConnectContext, DisconnectContext, EventKind, MessageContext, PresenceContext,
    PublishContext, RefreshContext, RpcContext, SubscribeContext, UnsubscribeContext,
};
use super::reply::{CredentialUpdate, Reply, Termination, Verdict};
use super::{Client, ClientError, Disconnect, HandlerFault, HookRegistry, Scope};
use crate::config::GatewayConfig;
use crate::domain::{Publication, Raw};

/// Default grace period granted to a handler after cancellation.
pub const DEFAULT_CANCEL_GRACE: Duration = Duration::from_secs(5);

/// Invocation limits applied to every handler call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediatorConfig {
    /// Upper bound for a single handler invocation; `None` means unbounded.
    pub handler_timeout: Option<Duration>,
    /// How long a cancelled handler may keep running before it is abandoned.
    pub cancel_grace: Duration,
}

impl Default for MediatorConfig {
    fn default() -> Self {
        Self {
            handler_timeout: None,
            cancel_grace: DEFAULT_CANCEL_GRACE,
        }
    }
}

impl From<&GatewayConfig> for MediatorConfig {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            handler_timeout: (config.hook_timeout_ms > 0)
                .then(|| Duration::from_millis(config.hook_timeout_ms)),
            cancel_grace: Duration::from_millis(config.hook_cancel_grace_ms),
        }
    }
}

/// Result of trying to invoke a hook.
enum Invocation<R> {
    /// The client was closed before its turn came.
    Closed(Disconnect),
    /// No hook is registered for this event.
    Unregistered,
    /// The hook replied.
    Replied(R),
    /// The hook failed.
    Faulted(HandlerFault),
}

/// Event mediator shared by all sessions.
///
/// Immutable after construction; concurrent dispatches for different
/// clients never contend on anything owned by the mediator.
#[derive(Debug, Default)]
pub struct Mediator {
    hooks: HookRegistry,
    config: MediatorConfig,
}

impl Mediator {
    /// Creates a mediator over the given hooks.
    #[must_use]
    pub fn new(hooks: HookRegistry, config: MediatorConfig) -> Self {
        tracing::info!(
            hooks = ?hooks.registered(),
            handler_timeout = ?config.handler_timeout,
            cancel_grace = ?config.cancel_grace,
            "event mediator ready"
        );
        Self { hooks, config }
    }

    /// Returns the registered hooks.
    #[must_use]
    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    /// Dispatches a connect event. Default: accept.
    pub async fn connect(&self, client: &Client) -> Verdict {
        let call = self.hooks.connect.as_deref().map(|h| {
            move |scope: Scope| h.on_connect(scope, ConnectContext { client })
        });
        let invocation = self.invoke(client, EventKind::Connect, call).await;
        self.settle(client, EventKind::Connect, invocation, Verdict::Proceed(()))
    }

    /// Dispatches a disconnect notification.
    ///
    /// Fires at most once per client, after it has been closed. The handler
    /// gets a fresh scope but is abandoned after the cancellation grace
    /// period. Faults are logged; teardown proceeds regardless.
    pub async fn disconnect(&self, client: &Client, disconnect: &Disconnect) {
        let _turn = client.turn().await;
        if !client.claim_disconnect_notification() {
            return;
        }
        let Some(handler) = self.hooks.disconnect.as_deref() else {
            return;
        };
        tracing::debug!(client = %client.id(), event = %EventKind::Disconnect, "invoking hook");
        let expired = CancellationToken::new();
        expired.cancel();
        let call = handler.on_disconnect(Scope::new(), DisconnectContext { client, disconnect });
        if let Err(fault) = self.guard(&expired, call).await {
            tracing::error!(
                client = %client.id(),
                event = %EventKind::Disconnect,
                %fault,
                "hook failed during teardown"
            );
        }
    }

    /// Dispatches a subscribe event. Default: accept.
    pub async fn subscribe(&self, client: &Client, channel: &str) -> Verdict {
        let call = self.hooks.subscribe.as_deref().map(|h| {
            move |scope: Scope| h.on_subscribe(scope, SubscribeContext { client, channel })
        });
        let invocation = self.invoke(client, EventKind::Subscribe, call).await;
        self.settle(client, EventKind::Subscribe, invocation, Verdict::Proceed(()))
    }

    /// Dispatches an unsubscribe notification. Default: no side effect.
    pub async fn unsubscribe(&self, client: &Client, channel: &str) -> Verdict {
        let call = self.hooks.unsubscribe.as_deref().map(|h| {
            move |scope: Scope| h.on_unsubscribe(scope, UnsubscribeContext { client, channel })
        });
        let invocation = self.invoke(client, EventKind::Unsubscribe, call).await;
        self.settle(client, EventKind::Unsubscribe, invocation, Verdict::Proceed(()))
    }

    /// Dispatches a publish event. Default: allow unchanged.
    pub async fn publish(
        &self,
        client: &Client,
        channel: &str,
        publication: &Publication,
    ) -> Verdict {
        let call = self.hooks.publish.as_deref().map(|h| {
            move |scope: Scope| {
                h.on_publish(
                    scope,
                    PublishContext {
                        client,
                        channel,
                        publication,
                    },
                )
            }
        });
        let invocation = self.invoke(client, EventKind::Publish, call).await;
        self.settle(client, EventKind::Publish, invocation, Verdict::Proceed(()))
    }

    /// Dispatches a periodic presence update. Default: no side effect.
    pub async fn presence(&self, client: &Client, channels: &[String]) -> Verdict {
        let call = self.hooks.presence.as_deref().map(|h| {
            move |scope: Scope| h.on_presence(scope, PresenceContext { client, channels })
        });
        let invocation = self.invoke(client, EventKind::Presence, call).await;
        self.settle(client, EventKind::Presence, invocation, Verdict::Proceed(()))
    }

    /// Dispatches a credential refresh. Default: credentials never expire.
    ///
    /// An extension that carries info replaces the client's info before the
    /// verdict is returned.
    pub async fn refresh(&self, client: &Client) -> Verdict<CredentialUpdate> {
        let call = self.hooks.refresh.as_deref().map(|h| {
            move |scope: Scope| h.on_refresh(scope, RefreshContext { client })
        });
        let invocation = self.invoke(client, EventKind::Refresh, call).await;
        let now = Utc::now();
        let invocation = match invocation {
            Invocation::Replied(reply) => Invocation::Replied(Interpreted(reply.interpret_at(now))),
            Invocation::Closed(d) => Invocation::Closed(d),
            Invocation::Unregistered => Invocation::Unregistered,
            Invocation::Faulted(f) => Invocation::Faulted(f),
        };
        let verdict = self.settle(
            client,
            EventKind::Refresh,
            invocation,
            Verdict::Proceed(CredentialUpdate::NoExpiry),
        );
        if let Verdict::Proceed(CredentialUpdate::Extend {
            info: Some(info), ..
        }) = &verdict
        {
            client.set_info(Some(info.clone()));
        }
        verdict
    }

    /// Dispatches an RPC call. Default: reject with "not implemented".
    pub async fn rpc(&self, client: &Client, data: &Raw) -> Verdict<Raw> {
        let call = self.hooks.rpc.as_deref().map(|h| {
            move |scope: Scope| h.on_rpc(scope, RpcContext { client, data })
        });
        let invocation = self.invoke(client, EventKind::Rpc, call).await;
        self.settle(
            client,
            EventKind::Rpc,
            invocation,
            Verdict::Reject(ClientError::not_implemented()),
        )
    }

    /// Dispatches an asynchronous client message. Default: no side effect.
    pub async fn message(&self, client: &Client, data: &Raw) -> Verdict {
        let call = self.hooks.message.as_deref().map(|h| {
            move |scope: Scope| h.on_message(scope, MessageContext { client, data })
        });
        let invocation = self.invoke(client, EventKind::Message, call).await;
        self.settle(client, EventKind::Message, invocation, Verdict::Proceed(()))
    }

    async fn invoke<R, F, Fut>(
        &self,
        client: &Client,
        kind: EventKind,
        call: Option<F>,
    ) -> Invocation<R>
    where
        F: FnOnce(Scope) -> Fut,
        Fut: Future<Output = R>,
    {
        let _turn = client.turn().await;
        if let Some(disconnect) = client.closed_reason() {
            tracing::debug!(client = %client.id(), event = %kind, "client closed, hook skipped");
            return Invocation::Closed(disconnect.clone());
        }
        let Some(call) = call else {
            return Invocation::Unregistered;
        };
        tracing::debug!(client = %client.id(), event = %kind, "invoking hook");
        match self.guard(client.cancellation_token(), call(client.scope())).await {
            Ok(reply) => Invocation::Replied(reply),
            Err(fault) => Invocation::Faulted(fault),
        }
    }

    /// Awaits a handler future, converting panics, timeouts and ignored
    /// cancellation into faults. `watch` is the token whose cancellation
    /// starts the grace period.
    async fn guard<R>(
        &self,
        watch: &CancellationToken,
        call: impl Future<Output = R>,
    ) -> Result<R, HandlerFault> {
        let grace = self.config.cancel_grace;
        let limit = self.config.handler_timeout;

        let abandoned = async {
            watch.cancelled().await;
            tokio::time::sleep(grace).await;
        };
        let timed_out = async {
            match limit {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            result = AssertUnwindSafe(call).catch_unwind() => {
                result.map_err(|payload| HandlerFault::Panicked(panic_message(payload.as_ref())))
            }
            () = abandoned => Err(HandlerFault::Abandoned(grace)),
            () = timed_out => Err(HandlerFault::TimedOut(limit.unwrap_or_default())),
        }
    }

    fn settle<R, T>(
        &self,
        client: &Client,
        kind: EventKind,
        invocation: Invocation<R>,
        default: Verdict<T>,
    ) -> Verdict<T>
    where
        R: Reply<Output = T>,
    {
        let verdict = match invocation {
            Invocation::Closed(disconnect) => {
                return Verdict::Terminate(Termination::new(disconnect));
            }
            Invocation::Unregistered => default,
            Invocation::Replied(reply) => reply.into_verdict(),
            Invocation::Faulted(fault) => {
                tracing::error!(client = %client.id(), event = %kind, %fault, "hook failed");
                Verdict::Terminate(Termination::new(Disconnect::server_error()))
            }
        };

        // Closed from outside while the hook was running.
        let verdict = match (verdict, client.closed_reason()) {
            (Verdict::Terminate(termination), _) => Verdict::Terminate(termination),
            (_, Some(disconnect)) => Verdict::Terminate(Termination::new(disconnect.clone())),
            (verdict, None) => verdict,
        };

        match verdict {
            Verdict::Terminate(Termination { disconnect, error }) => {
                let disconnect = client.close_with(disconnect);
                tracing::info!(
                    client = %client.id(),
                    event = %kind,
                    code = disconnect.code,
                    reason = %disconnect.reason,
                    "hook terminated connection"
                );
                Verdict::Terminate(Termination { disconnect, error })
            }
            Verdict::Reject(error) => {
                tracing::debug!(client = %client.id(), event = %kind, code = error.code, "hook rejected");
                Verdict::Reject(error)
            }
            proceed @ Verdict::Proceed(_) => proceed,
        }
    }
}

/// A verdict that was interpreted before settling, e.g. because it needed
/// the current time.
struct Interpreted<T>(Verdict<T>);

impl<T> Reply for Interpreted<T> {
    type Output = T;

    fn into_verdict(self) -> Verdict<T> {
        self.0
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
