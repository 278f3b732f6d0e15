//! Handle given to publication handlers.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::{merge::SubscriptionKey, message::Fields, session::ConnectionId};

/// Why a publication push was not accepted.
#[non_exhaustive]
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The subscription was stopped by `unsub`, a handler error, or teardown.
    #[error("subscription stopped")]
    Stopped,
    /// The connection has gone away.
    #[error("connection closed")]
    Closed,
}

/// One publication event awaiting the connection's inbound task.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum PublicationEvent {
    Ready,
    Added {
        collection: String,
        id: String,
        fields: Fields,
    },
    Changed {
        collection: String,
        id: String,
        fields: Fields,
        cleared: Vec<String>,
    },
    Removed {
        collection: String,
        id: String,
    },
}

/// A publication event tagged with the subscription that produced it.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct SubscriptionCommand {
    pub(crate) sub_id: String,
    pub(crate) key: SubscriptionKey,
    pub(crate) event: PublicationEvent,
}

struct Inner {
    id: String,
    key: SubscriptionKey,
    name: String,
    params: Vec<Value>,
    connection: ConnectionId,
    session: String,
    commands: mpsc::UnboundedSender<SubscriptionCommand>,
    ready: AtomicBool,
    stopped: AtomicBool,
}

/// Live subscription as seen by its publication handler.
///
/// Cheap to clone and safe to move into background tasks. Every push is
/// handed to the connection, which merges it with other subscriptions'
/// data before anything reaches the client. Pushes after the subscription
/// has stopped return [`SubscriptionError::Stopped`].
#[derive(Clone)]
pub struct SubscriptionContext {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SubscriptionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionContext")
            .field("id", &self.inner.id)
            .field("key", &self.inner.key)
            .field("name", &self.inner.name)
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

impl SubscriptionContext {
    pub(crate) fn new(
        id: String,
        key: SubscriptionKey,
        name: String,
        params: Vec<Value>,
        connection: ConnectionId,
        session: String,
        commands: mpsc::UnboundedSender<SubscriptionCommand>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                key,
                name,
                params,
                connection,
                session,
                commands,
                ready: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// Client-chosen subscription id.
    #[must_use]
    pub fn id(&self) -> &str { &self.inner.id }

    /// Connection-local key used by the merge box.
    #[must_use]
    pub fn key(&self) -> SubscriptionKey { self.inner.key }

    /// Publication name.
    #[must_use]
    pub fn name(&self) -> &str { &self.inner.name }

    #[must_use]
    pub fn params(&self) -> &[Value] { &self.inner.params }

    /// Positional parameter, if present.
    #[must_use]
    pub fn param(&self, index: usize) -> Option<&Value> { self.inner.params.get(index) }

    #[must_use]
    pub fn connection_id(&self) -> ConnectionId { self.inner.connection }

    #[must_use]
    pub fn session_id(&self) -> &str { &self.inner.session }

    /// Returns `true` once [`ready`](Self::ready) has been called.
    #[must_use]
    pub fn is_ready(&self) -> bool { self.inner.ready.load(Ordering::Acquire) }

    /// Returns `true` once the subscription has stopped. Long-running
    /// publications should poll this and exit.
    #[must_use]
    pub fn is_stopped(&self) -> bool { self.inner.stopped.load(Ordering::Acquire) }

    pub(crate) fn stop(&self) { self.inner.stopped.store(true, Ordering::Release); }

    /// Tell the client the initial data set is complete.
    ///
    /// Sends `ready` on every call.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError`] if the subscription or connection has
    /// stopped.
    pub fn ready(&self) -> Result<(), SubscriptionError> {
        self.send(PublicationEvent::Ready)?;
        self.inner.ready.store(true, Ordering::Release);
        Ok(())
    }

    /// Publish a document, or more fields of one.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError`] if the subscription or connection has
    /// stopped.
    pub fn added(
        &self,
        collection: impl Into<String>,
        id: impl Into<String>,
        fields: Fields,
    ) -> Result<(), SubscriptionError> {
        self.send(PublicationEvent::Added {
            collection: collection.into(),
            id: id.into(),
            fields,
        })
    }

    /// Update and clear fields of a published document.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError`] if the subscription or connection has
    /// stopped.
    pub fn changed(
        &self,
        collection: impl Into<String>,
        id: impl Into<String>,
        fields: Fields,
        cleared: Vec<String>,
    ) -> Result<(), SubscriptionError> {
        self.send(PublicationEvent::Changed {
            collection: collection.into(),
            id: id.into(),
            fields,
            cleared,
        })
    }

    /// Stop publishing a document.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError`] if the subscription or connection has
    /// stopped.
    pub fn removed(
        &self,
        collection: impl Into<String>,
        id: impl Into<String>,
    ) -> Result<(), SubscriptionError> {
        self.send(PublicationEvent::Removed {
            collection: collection.into(),
            id: id.into(),
        })
    }

    fn send(&self, event: PublicationEvent) -> Result<(), SubscriptionError> {
        if self.is_stopped() {
            log::debug!(
                "push ignored for stopped subscription: id={}, name={}",
                self.inner.id,
                self.inner.name
            );
            return Err(SubscriptionError::Stopped);
        }
        self.inner
            .commands
            .send(SubscriptionCommand {
                sub_id: self.inner.id.clone(),
                key: self.inner.key,
                event,
            })
            .map_err(|_| SubscriptionError::Closed)
    }
}
