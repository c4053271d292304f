//! Error values that flow through hook replies.
//!
//! [`ClientError`] is a modeled, client-visible rejection. [`Disconnect`]
//! is a modeled, fatal instruction that ends the connection.
//! [`HandlerFault`] is not modeled by hooks at all: it describes a handler
//! that panicked, overran its time budget, or ignored cancellation, and
//! is always converted into [`Disconnect::server_error`].

use std::time::Duration;

use serde::Serialize;

/// Business error reported to the triggering client.
///
/// # Codes
///
/// | Code | Meaning              |
/// |------|----------------------|
/// | 100  | internal error       |
/// | 101  | unauthorized         |
/// | 102  | unknown channel      |
/// | 103  | permission denied    |
/// | 104  | method not found     |
/// | 105  | already subscribed   |
/// | 106  | limit exceeded       |
/// | 107  | bad request          |
/// | 108  | not implemented      |
/// | 109  | token expired        |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct ClientError {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable message.
    pub message: String,
}

impl ClientError {
    /// Creates an error with an arbitrary code and message.
    #[must_use]
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Internal server error (100).
    #[must_use]
    pub fn internal() -> Self {
        Self::new(100, "internal server error")
    }

    /// Unauthorized (101).
    #[must_use]
    pub fn unauthorized() -> Self {
        Self::new(101, "unauthorized")
    }

    /// Unknown channel (102).
    #[must_use]
    pub fn unknown_channel() -> Self {
        Self::new(102, "unknown channel")
    }

    /// Permission denied (103).
    #[must_use]
    pub fn permission_denied() -> Self {
        Self::new(103, "permission denied")
    }

    /// Method not found (104).
    #[must_use]
    pub fn method_not_found() -> Self {
        Self::new(104, "method not found")
    }

    /// Already subscribed (105).
    #[must_use]
    pub fn already_subscribed() -> Self {
        Self::new(105, "already subscribed")
    }

    /// Limit exceeded (106).
    #[must_use]
    pub fn limit_exceeded() -> Self {
        Self::new(106, "limit exceeded")
    }

    /// Bad request (107).
    #[must_use]
    pub fn bad_request() -> Self {
        Self::new(107, "bad request")
    }

    /// Not implemented (108). Answer to RPC calls when no RPC hook is registered.
    #[must_use]
    pub fn not_implemented() -> Self {
        Self::new(108, "not implemented")
    }

    /// Token expired (109). Credentials presented at connect are already
    /// past their deadline.
    #[must_use]
    pub fn token_expired() -> Self {
        Self::new(109, "token expired")
    }
}

/// Fatal instruction that terminates a connection.
///
/// Both code and reason are forwarded to the peer before the socket is
/// closed. Codes live in the 3000–4999 range reserved for applications
/// by RFC 6455 so they can double as WebSocket close codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("disconnect {code}: {reason}")]
pub struct Disconnect {
    /// Close code.
    pub code: u16,
    /// Human-readable reason.
    pub reason: String,
}

impl Disconnect {
    /// Close codes a disconnect may carry.
    pub const CODES: std::ops::RangeInclusive<u16> = 3000..=4999;

    /// Creates a disconnect with an arbitrary code and reason.
    #[must_use]
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Normal closure, e.g. the peer went away (3000).
    #[must_use]
    pub fn normal() -> Self {
        Self::new(3000, "normal")
    }

    /// Server is shutting down (3001).
    #[must_use]
    pub fn shutdown() -> Self {
        Self::new(3001, "shutdown")
    }

    /// Credentials were rejected (3002).
    #[must_use]
    pub fn invalid_token() -> Self {
        Self::new(3002, "invalid token")
    }

    /// Client sent something it must not (3003).
    #[must_use]
    pub fn bad_request() -> Self {
        Self::new(3003, "bad request")
    }

    /// Internal failure, including handler faults (3004).
    #[must_use]
    pub fn server_error() -> Self {
        Self::new(3004, "internal server error")
    }

    /// Credentials expired and were not extended (3005).
    #[must_use]
    pub fn expired() -> Self {
        Self::new(3005, "expired")
    }

    /// Forced by an administrator (3006).
    #[must_use]
    pub fn force() -> Self {
        Self::new(3006, "force disconnect")
    }
}

/// Failure of handler code caught at the invocation boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerFault {
    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// The handler exceeded the configured invocation timeout.
    #[error("handler timed out after {0:?}")]
    TimedOut(Duration),

    /// The connection was cancelled and the handler kept running past the
    /// grace period.
    #[error("handler ignored cancellation for {0:?}")]
    Abandoned(Duration),
}
