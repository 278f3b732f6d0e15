//! Connection actor: the protocol state machine for one client.
//!
//! Each connection runs two tasks. The inbound task reads frames, drives the
//! handshake, dispatches methods and subscriptions and owns the merge box.
//! The outbound task in [`writer`] drains the push queue to the transport and
//! sends keep-alive pings. Publication handlers never touch connection state
//! directly: their pushes arrive as commands on a channel that only the
//! inbound task reads, interleaved with inbound frames.

mod counter;
mod dispatch;
mod error;
mod state;
mod writer;

use std::{net::SocketAddr, sync::Arc};

pub use counter::active_connection_count;
use counter::ActiveConnection;
pub use error::SessionError;
use log::{info, warn};
use state::SessionState;
use tokio::{sync::mpsc, time::Instant};
use tokio_util::sync::CancellationToken;

use crate::{
    app::AppState,
    context::SubscriptionCommand,
    message::Message,
    metrics,
    push::{PushHandle, PushQueue},
    session::{ConnectionId, RegistryHandle},
    transport::{Transport, TransportReader},
};

/// Keeps a connection registered for as long as it is alive.
struct Registration {
    registry: RegistryHandle,
    id: ConnectionId,
}

impl Registration {
    fn new(registry: RegistryHandle, id: ConnectionId, shutdown: CancellationToken) -> Self {
        if !registry.register(id, shutdown.clone()) {
            warn!("session registry unavailable, closing: id={id}");
            shutdown.cancel();
        }
        Self { registry, id }
    }
}

impl Drop for Registration {
    fn drop(&mut self) { self.registry.unregister(self.id); }
}

/// Serves one client over a split transport.
pub struct ConnectionActor<T> {
    transport: T,
    app: Arc<AppState>,
    registry: RegistryHandle,
    id: ConnectionId,
    peer: Option<SocketAddr>,
}

impl<T: Transport> ConnectionActor<T> {
    /// Create an actor for `transport` with a fresh [`ConnectionId`].
    #[must_use]
    pub fn new(transport: T, app: Arc<AppState>, registry: RegistryHandle) -> Self {
        Self {
            transport,
            app,
            registry,
            id: ConnectionId::next(),
            peer: None,
        }
    }

    /// Record the remote address for logging.
    #[must_use]
    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    #[must_use]
    pub fn id(&self) -> ConnectionId { self.id }

    /// Run the connection until the client leaves or a fatal error occurs.
    ///
    /// The connection is registered for the duration of the call and
    /// unregistered exactly once on the way out. Frames queued before the
    /// end, such as a `failed` reply, are flushed before the transport
    /// closes.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] describing why the connection failed. A
    /// clean close by the client or the registry is `Ok`.
    pub async fn run(self) -> Result<(), SessionError> {
        let Self {
            transport,
            app,
            registry,
            id,
            peer,
        } = self;
        let cfg = *app.session_config();
        let (queue, push) = PushQueue::builder()
            .capacity(cfg.outbound_capacity)
            .policy(cfg.push_policy)
            .build()?;

        let shutdown = CancellationToken::new();
        let active = ActiveConnection::new();
        info!(
            "connection opened: ddpframe_active_connections={}, id={id}, peer={peer:?}",
            active_connection_count()
        );
        let registration = Registration::new(registry, id, shutdown.clone());

        let (reader, writer) = transport.split();
        let writer_task = tokio::spawn(writer::run(
            writer,
            queue,
            Arc::clone(&app),
            shutdown.clone(),
            id,
        ));

        let (commands_tx, commands) = mpsc::unbounded_channel();
        let mut inbound = Inbound {
            id,
            app,
            push,
            commands_tx,
            commands,
            state: SessionState::new(),
            deadline: Instant::now() + cfg.pong_wait,
            shutdown,
        };
        let mut result = inbound.run(reader).await;
        let subscriptions = inbound.state.subscription_count();
        inbound.teardown();
        drop(inbound);
        drop(registration);

        match writer_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                if result.is_ok() {
                    result = Err(e);
                }
            }
            Err(e) => warn!("connection writer task failed: id={id}, error={e}"),
        }

        match &result {
            Ok(()) => info!(
                "connection closed: id={id}, peer={peer:?}, subscriptions={subscriptions}"
            ),
            Err(e) => {
                metrics::inc_errors(e.kind());
                warn!(
                    "connection closed with error: id={id}, peer={peer:?}, \
                     subscriptions={subscriptions}, error={e}"
                );
            }
        }
        drop(active);
        result
    }
}

/// State and channels of the inbound task.
struct Inbound {
    id: ConnectionId,
    app: Arc<AppState>,
    push: PushHandle<Message>,
    commands_tx: mpsc::UnboundedSender<SubscriptionCommand>,
    commands: mpsc::UnboundedReceiver<SubscriptionCommand>,
    state: SessionState,
    /// Read deadline, pushed back by every `pong`.
    deadline: Instant,
    shutdown: CancellationToken,
}

impl Inbound {
    async fn run<R: TransportReader>(&mut self, mut reader: R) -> Result<(), SessionError> {
        self.send(Message::server_id(self.app.server_id())).await?;
        let shutdown = self.shutdown.clone();
        let pong_wait = self.app.session_config().pong_wait;

        loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => return Ok(()),
                Some(command) = self.commands.recv() => self.apply(command).await?,
                read = tokio::time::timeout_at(self.deadline, reader.recv()) => {
                    let frame = match read {
                        Err(_) => return Err(SessionError::ReadTimeout(pong_wait)),
                        Ok(None) => return Ok(()),
                        Ok(Some(frame)) => frame?,
                    };
                    self.handle_frame(&frame).await?;
                }
            }
        }
    }

    /// Queue a frame for the writer.
    async fn send(&self, message: Message) -> Result<(), SessionError> {
        self.push.push(message).await?;
        Ok(())
    }

    /// Stop every subscription without emitting deltas.
    fn teardown(&mut self) {
        for sub in self.state.drain_subscriptions() {
            sub.context.stop();
            metrics::dec_subscriptions();
        }
    }
}

#[cfg(test)]
mod tests;
