//! Server-wide registry of live connections.
//!
//! The registry is an actor: one control loop owns the set of connections
//! and applies `register` and `unregister` commands in arrival order.
//! Connections talk to it through a cloneable [`RegistryHandle`].

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};

use derive_more::{Display, From, Into};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::events::{EventNotifier, LifecycleEvent, LifecycleEventKind};

/// Identifier assigned to a connection when it is accepted.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, PartialOrd, Ord, From, Into)]
#[display("{_0}")]
pub struct ConnectionId(u64);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

impl ConnectionId {
    /// Create a [`ConnectionId`] with the provided value.
    #[must_use]
    pub const fn new(id: u64) -> Self { Self(id) }

    /// Allocate the next process-wide identifier.
    #[must_use]
    pub fn next() -> Self { Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)) }

    #[must_use]
    pub const fn as_u64(self) -> u64 { self.0 }
}

struct Registration {
    id: ConnectionId,
    shutdown: CancellationToken,
}

enum Query {
    SessionCount(oneshot::Sender<usize>),
}

/// Cloneable handle for sending commands to the registry loop.
#[derive(Clone, Debug)]
pub struct RegistryHandle {
    register_tx: mpsc::UnboundedSender<Registration>,
    unregister_tx: mpsc::UnboundedSender<ConnectionId>,
    query_tx: mpsc::UnboundedSender<Query>,
    shutdown: CancellationToken,
}

impl RegistryHandle {
    /// Add a connection. Cancelling `shutdown` is how the registry closes it.
    ///
    /// Returns `false` if the registry has stopped or is stopping. The
    /// caller is expected to close the connection itself in that case.
    pub fn register(&self, id: ConnectionId, shutdown: CancellationToken) -> bool {
        if self.shutdown.is_cancelled() {
            return false;
        }
        self.register_tx
            .send(Registration { id, shutdown })
            .is_ok()
    }

    /// Remove a connection. Unknown ids are ignored by the loop.
    pub fn unregister(&self, id: ConnectionId) {
        if self.unregister_tx.send(id).is_err() {
            log::debug!("unregister after registry stopped: id={id}");
        }
    }

    /// Number of live connections, or `None` if the registry has stopped.
    pub async fn session_count(&self) -> Option<usize> {
        let (tx, rx) = oneshot::channel();
        self.query_tx.send(Query::SessionCount(tx)).ok()?;
        rx.await.ok()
    }

    /// Stop the control loop, closing every registered connection.
    pub fn shutdown(&self) { self.shutdown.cancel(); }
}

/// Control loop owning the live connection set.
pub struct SessionRegistry {
    register_rx: mpsc::UnboundedReceiver<Registration>,
    unregister_rx: mpsc::UnboundedReceiver<ConnectionId>,
    query_rx: mpsc::UnboundedReceiver<Query>,
    shutdown: CancellationToken,
    members: HashMap<ConnectionId, CancellationToken>,
    notifier: EventNotifier,
}

impl SessionRegistry {
    /// Create a registry and the handle used to drive it.
    #[must_use]
    pub fn new(notifier: EventNotifier) -> (Self, RegistryHandle) {
        let (register_tx, register_rx) = mpsc::unbounded_channel();
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        let (query_tx, query_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        (
            Self {
                register_rx,
                unregister_rx,
                query_rx,
                shutdown: shutdown.clone(),
                members: HashMap::new(),
                notifier,
            },
            RegistryHandle {
                register_tx,
                unregister_tx,
                query_tx,
                shutdown,
            },
        )
    }

    /// Create a registry and run it on a new task.
    #[must_use]
    pub fn spawn(notifier: EventNotifier) -> (RegistryHandle, JoinHandle<()>) {
        let (registry, handle) = Self::new(notifier);
        (handle, tokio::spawn(registry.run()))
    }

    /// Process commands until shutdown or until every handle is dropped.
    ///
    /// Registrations are preferred over unregistrations so a connection that
    /// leaves right after joining is always seen joining first.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => break,
                Some(reg) = self.register_rx.recv() => self.register(reg),
                Some(id) = self.unregister_rx.recv() => self.unregister(id),
                Some(query) = self.query_rx.recv() => self.answer(query),
                else => break,
            }
        }
        for (id, token) in self.members.drain() {
            log::debug!("closing connection on registry shutdown: id={id}");
            token.cancel();
        }
        // Registrations still queued never joined; close them too.
        self.register_rx.close();
        while let Ok(reg) = self.register_rx.try_recv() {
            log::debug!("closing connection registered during shutdown: id={}", reg.id);
            reg.shutdown.cancel();
        }
        log::info!("session registry stopped");
    }

    fn register(&mut self, reg: Registration) {
        if self.members.contains_key(&reg.id) {
            log::warn!("connection registered twice: id={}", reg.id);
            return;
        }
        self.members.insert(reg.id, reg.shutdown);
        log::info!(
            "connection registered: id={}, sessions={}",
            reg.id,
            self.members.len()
        );
        self.emit(LifecycleEventKind::Connected, reg.id);
    }

    fn unregister(&mut self, id: ConnectionId) {
        let Some(token) = self.members.remove(&id) else {
            return;
        };
        token.cancel();
        log::info!(
            "connection unregistered: id={id}, sessions={}",
            self.members.len()
        );
        self.emit(LifecycleEventKind::Disconnected, id);
    }

    fn answer(&self, query: Query) {
        match query {
            Query::SessionCount(reply) => {
                let _ = reply.send(self.members.len());
            }
        }
    }

    fn emit(&self, kind: LifecycleEventKind, connection: ConnectionId) {
        self.notifier.notify(&LifecycleEvent {
            kind,
            connection,
            session_count: self.members.len(),
        });
    }
}
