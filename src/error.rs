//! Structured error carried inside `result` and `nosub` replies.
//!
//! Handlers return [`DdpError`] to report application failures. The value is
//! serialized verbatim into the reply, so clients always see a stable
//! `error` code plus human-readable `reason` and `message` strings rather
//! than a raw failure payload.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type tag used when an error is constructed generically.
pub const SERVER_ERROR: &str = "Server.Error";
/// Error type tag used for method lookup failures.
pub const METHOD_ERROR: &str = "Method.Error";

/// Stable code reported when a method name is not registered.
pub const UNKNOWN_METHOD: &str = "unknown-method";
/// Stable code reported when a publication or subscription id is unknown.
pub const UNKNOWN_SUBSCRIPTION: &str = "unknown-subscription";

/// Application-level error reported to the client.
///
/// Values are immutable once built; use the constructors to create them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{error}: {reason}")]
pub struct DdpError {
    #[serde(rename = "errorType", default, skip_serializing_if = "String::is_empty")]
    error_type: String,
    error: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    message: String,
}

impl DdpError {
    /// Build an error tagged with [`SERVER_ERROR`].
    ///
    /// ```
    /// use ddpframe::error::DdpError;
    ///
    /// let err = DdpError::new("not-allowed", "Access denied", "Access denied [403]");
    /// assert_eq!(err.error_type(), "Server.Error");
    /// assert_eq!(err.error(), "not-allowed");
    /// ```
    #[must_use]
    pub fn new(
        error: impl Into<String>,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::with_type(SERVER_ERROR, error, reason, message)
    }

    /// Build an error with an explicit type tag.
    #[must_use]
    pub fn with_type(
        error_type: impl Into<String>,
        error: impl Into<String>,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error_type: error_type.into(),
            error: error.into(),
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// Error sent when no handler is registered for `method`.
    #[must_use]
    pub fn unknown_method(method: &str) -> Self {
        Self::with_type(
            METHOD_ERROR,
            UNKNOWN_METHOD,
            format!("Method '{method}' not found"),
            format!("Method '{method}' not found [{UNKNOWN_METHOD}]"),
        )
    }

    /// Error sent when no publication is registered under `name`.
    #[must_use]
    pub fn unknown_subscription(name: &str) -> Self {
        Self::new(
            UNKNOWN_SUBSCRIPTION,
            format!("Subscription '{name}' not found"),
            format!("Subscription '{name}' not found [{UNKNOWN_SUBSCRIPTION}]"),
        )
    }

    /// Error sent when `unsub` names a subscription id that is not open.
    #[must_use]
    pub fn unknown_subscription_id(id: &str) -> Self {
        Self::new(
            UNKNOWN_SUBSCRIPTION,
            format!("Subscription ID '{id}' not found"),
            format!("Subscription ID '{id}' not found [{UNKNOWN_SUBSCRIPTION}]"),
        )
    }

    #[must_use]
    pub fn error_type(&self) -> &str { &self.error_type }

    #[must_use]
    pub fn error(&self) -> &str { &self.error }

    #[must_use]
    pub fn reason(&self) -> &str { &self.reason }

    #[must_use]
    pub fn message(&self) -> &str { &self.message }
}
