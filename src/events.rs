//! Connection lifecycle notifications.
//!
//! The session registry owns an [`EventNotifier`] and fires a
//! [`LifecycleEvent`] whenever a connection joins or leaves. Listeners run on
//! the registry's control loop, one at a time, so they should return quickly
//! and hand longer work to a spawned task.

use std::{fmt, sync::Arc};

use crate::{panic, session::ConnectionId};

/// What happened to a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleEventKind {
    Connected,
    Disconnected,
}

/// A connection joined or left the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub kind: LifecycleEventKind,
    pub connection: ConnectionId,
    /// Live connections after the event was applied.
    pub session_count: usize,
}

/// Callback invoked for lifecycle events.
pub type Listener = Arc<dyn Fn(&LifecycleEvent) + Send + Sync>;

/// Typed listener lists, one per event kind.
#[derive(Clone, Default)]
pub struct EventNotifier {
    connected: Vec<Listener>,
    disconnected: Vec<Listener>,
}

impl fmt::Debug for EventNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventNotifier")
            .field("connected", &self.connected.len())
            .field("disconnected", &self.disconnected.len())
            .finish()
    }
}

impl EventNotifier {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Register `listener` for events of `kind`.
    pub fn on<F>(&mut self, kind: LifecycleEventKind, listener: F)
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.listeners_mut(kind).push(Arc::new(listener));
    }

    /// Number of listeners registered for `kind`.
    #[must_use]
    pub fn listener_count(&self, kind: LifecycleEventKind) -> usize {
        match kind {
            LifecycleEventKind::Connected => self.connected.len(),
            LifecycleEventKind::Disconnected => self.disconnected.len(),
        }
    }

    /// Deliver `event` to every listener of its kind, in registration order.
    ///
    /// A panicking listener is logged and skipped.
    pub fn notify(&self, event: &LifecycleEvent) {
        let listeners = match event.kind {
            LifecycleEventKind::Connected => &self.connected,
            LifecycleEventKind::Disconnected => &self.disconnected,
        };
        for listener in listeners {
            if let Err(panic) = panic::catch(|| listener(event)) {
                tracing::error!(
                    connection = %event.connection,
                    kind = ?event.kind,
                    %panic,
                    "lifecycle listener panicked"
                );
            }
        }
    }

    fn listeners_mut(&mut self, kind: LifecycleEventKind) -> &mut Vec<Listener> {
        match kind {
            LifecycleEventKind::Connected => &mut self.connected,
            LifecycleEventKind::Disconnected => &mut self.disconnected,
        }
    }
}
