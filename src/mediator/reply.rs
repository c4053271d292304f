//! Hook replies and their interpretation into runtime verdicts.
//!
//! Each reply type carries only the fields its event can act on. The
//! [`Reply`] trait turns a reply into a [`Verdict`], the single net effect
//! of a dispatch: proceed, reject with a business error, or terminate the
//! connection. A disconnect instruction always wins over an error in the
//! same reply; the error then rides along in [`Termination::error`] so the
//! session can still write it before closing.

use chrono::{DateTime, Utc};

use super::{ClientError, Disconnect};
use crate::domain::Raw;

/// Net effect of one event dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict<T = ()> {
    /// Continue the operation, with the event's output.
    Proceed(T),
    /// Abort the operation and report the error; the connection stays open.
    Reject(ClientError),
    /// Abort the operation and terminate the connection.
    Terminate(Termination),
}

/// Details of a terminating verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Termination {
    /// Disconnect sent to the peer.
    pub disconnect: Disconnect,
    /// Error from the same reply, written before the disconnect.
    pub error: Option<ClientError>,
}

impl Termination {
    /// Termination without an accompanying error.
    #[must_use]
    pub const fn new(disconnect: Disconnect) -> Self {
        Self {
            disconnect,
            error: None,
        }
    }
}

impl<T> Verdict<T> {
    /// Returns `true` for [`Verdict::Proceed`].
    #[must_use]
    pub const fn is_proceed(&self) -> bool {
        matches!(self, Self::Proceed(_))
    }

    /// Returns `true` for [`Verdict::Terminate`].
    #[must_use]
    pub const fn is_terminate(&self) -> bool {
        matches!(self, Self::Terminate(_))
    }

    /// Maps the output of a proceeding verdict.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Verdict<U> {
        match self {
            Self::Proceed(value) => Verdict::Proceed(f(value)),
            Self::Reject(error) => Verdict::Reject(error),
            Self::Terminate(termination) => Verdict::Terminate(termination),
        }
    }
}

/// Interpretation of a hook reply.
pub trait Reply {
    /// Output carried by a proceeding verdict.
    type Output;

    /// Converts the reply into the runtime action it requests.
    fn into_verdict(self) -> Verdict<Self::Output>;
}

fn judge<T>(error: Option<ClientError>, disconnect: Option<Disconnect>, output: T) -> Verdict<T> {
    match (disconnect, error) {
        (Some(disconnect), error) => Verdict::Terminate(Termination { disconnect, error }),
        (None, Some(error)) => Verdict::Reject(error),
        (None, None) => Verdict::Proceed(output),
    }
}

macro_rules! gate_reply {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq)]
        pub struct $name {
            /// Business error rejecting the operation.
            pub error: Option<ClientError>,
            /// Disconnect terminating the connection.
            pub disconnect: Option<Disconnect>,
        }

        impl $name {
            /// Lets the operation proceed.
            #[must_use]
            pub fn accept() -> Self {
                Self::default()
            }

            /// Rejects the operation with a business error.
            #[must_use]
            pub fn reject(error: ClientError) -> Self {
                Self {
                    error: Some(error),
                    disconnect: None,
                }
            }

            /// Rejects the operation and terminates the connection.
            #[must_use]
            pub fn disconnect(disconnect: Disconnect) -> Self {
                Self {
                    error: None,
                    disconnect: Some(disconnect),
                }
            }
        }

        impl Reply for $name {
            type Output = ();

            fn into_verdict(self) -> Verdict {
                judge(self.error, self.disconnect, ())
            }
        }
    };
}

gate_reply!(
    /// Reply to a connect event. Without error or disconnect the session is
    /// established.
    ConnectReply
);

gate_reply!(
    /// Reply to a subscribe event. Without error or disconnect the
    /// subscription is added.
    SubscribeReply
);

gate_reply!(
    /// Reply to a publish event. Without error or disconnect the publication
    /// goes to the broker unchanged.
    PublishReply
);

/// Reply to a disconnect notification. Carries nothing: teardown is
/// already in progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisconnectReply;

/// Reply to an unsubscribe notification. Carries nothing: the channel is
/// removed regardless.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnsubscribeReply;

impl Reply for DisconnectReply {
    type Output = ();

    fn into_verdict(self) -> Verdict {
        Verdict::Proceed(())
    }
}

impl Reply for UnsubscribeReply {
    type Output = ();

    fn into_verdict(self) -> Verdict {
        Verdict::Proceed(())
    }
}

/// Reply to a periodic presence update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceReply {
    /// Disconnect terminating the connection.
    pub disconnect: Option<Disconnect>,
}

impl Reply for PresenceReply {
    type Output = ();

    fn into_verdict(self) -> Verdict {
        judge(None, self.disconnect, ())
    }
}

/// Reply to an asynchronous client message. No response is ever sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageReply {
    /// Disconnect terminating the connection.
    pub disconnect: Option<Disconnect>,
}

impl Reply for MessageReply {
    type Output = ();

    fn into_verdict(self) -> Verdict {
        judge(None, self.disconnect, ())
    }
}

/// Reply to an RPC call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RpcReply {
    /// Business error returned to the caller instead of data.
    pub error: Option<ClientError>,
    /// Disconnect terminating the connection.
    pub disconnect: Option<Disconnect>,
    /// Response payload, returned byte for byte.
    pub data: Raw,
}

impl RpcReply {
    /// Responds with `data`.
    #[must_use]
    pub fn data(data: Raw) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    /// Responds with a business error.
    #[must_use]
    pub fn reject(error: ClientError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }
}

impl Reply for RpcReply {
    type Output = Raw;

    fn into_verdict(self) -> Verdict<Raw> {
        judge(self.error, self.disconnect, self.data)
    }
}

/// Reply to a credential refresh.
///
/// `expire_at` is a unix timestamp in seconds. Zero means "do not
/// extend"; `info`, if given with a future `expire_at`, replaces the
/// connection info.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReply {
    /// New credential deadline (unix seconds), or zero.
    pub expire_at: i64,
    /// Replacement connection info.
    pub info: Option<Raw>,
}

/// What a refresh does to the connection's credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialUpdate {
    /// Move the deadline and optionally replace the connection info.
    Extend {
        /// New deadline.
        expire_at: DateTime<Utc>,
        /// Replacement connection info.
        info: Option<Raw>,
    },
    /// Keep the current deadline.
    Unchanged,
    /// Drop the deadline; credentials stay valid for the connection's life.
    NoExpiry,
}

impl RefreshReply {
    /// Extends credentials until `expire_at`.
    #[must_use]
    pub fn extend(expire_at: DateTime<Utc>, info: Option<Raw>) -> Self {
        Self {
            expire_at: expire_at.timestamp(),
            info,
        }
    }

    /// Interprets the reply relative to `now`.
    ///
    /// A non-zero deadline that is not after `now` terminates the connection
    /// with [`Disconnect::expired`].
    #[must_use]
    pub fn interpret_at(self, now: DateTime<Utc>) -> Verdict<CredentialUpdate> {
        if self.expire_at == 0 {
            return Verdict::Proceed(CredentialUpdate::Unchanged);
        }
        match DateTime::<Utc>::from_timestamp(self.expire_at, 0) {
            Some(expire_at) if expire_at > now => Verdict::Proceed(CredentialUpdate::Extend {
                expire_at,
                info: self.info,
            }),
            _ => Verdict::Terminate(Termination::new(Disconnect::expired())),
        }
    }
}
