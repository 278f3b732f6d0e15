//! In-process client for a [`DdpApp`].

use std::time::Duration;

use ddpframe::{
    app::DdpApp,
    codec::{JsonCodec, WireCodec},
    connection::{ConnectionActor, SessionError},
    message::{Message, MessageKind},
    session::{ConnectionId, RegistryHandle, SessionRegistry},
    transport::memory::{self, MemoryPeer},
};
use serde_json::Value;
use tokio::{task::JoinHandle, time::timeout};

/// How long [`TestClient::recv`] waits before failing the test.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Client side of an in-memory connection to a running connection actor.
///
/// Each client gets its own session registry, so lifecycle listeners and
/// [`RegistryHandle::session_count`] see only this connection.
pub struct TestClient {
    peer: MemoryPeer,
    actor: JoinHandle<Result<(), SessionError>>,
    registry: RegistryHandle,
    id: ConnectionId,
}

impl TestClient {
    /// Spawn a connection actor serving `app`.
    ///
    /// Must be called inside a Tokio runtime.
    #[must_use]
    pub fn start(app: DdpApp) -> Self {
        let (state, notifier) = app.into_parts();
        let (registry, _task) = SessionRegistry::spawn(notifier);
        let (transport, peer) = memory::pair(64);
        let actor = ConnectionActor::new(transport, state, registry.clone());
        let id = actor.id();
        Self {
            peer,
            actor: tokio::spawn(actor.run()),
            registry,
            id,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &RegistryHandle { &self.registry }

    #[must_use]
    pub fn connection_id(&self) -> ConnectionId { self.id }

    /// Encode and send `message`.
    ///
    /// # Panics
    ///
    /// Panics if the server side has closed.
    pub async fn send(&self, message: &Message) {
        let frame = JsonCodec.encode(message).expect("encode test message");
        self.send_raw(frame).await;
    }

    /// Send a frame verbatim.
    ///
    /// # Panics
    ///
    /// Panics if the server side has closed.
    pub async fn send_raw(&self, frame: impl Into<String>) {
        self.peer.send(frame).await.expect("server accepts frame");
    }

    /// Next frame from the server, or `None` once it has closed.
    ///
    /// # Panics
    ///
    /// Panics if nothing arrives within [`RECV_TIMEOUT`] or the frame is not
    /// a valid message.
    pub async fn recv(&mut self) -> Option<Message> {
        let frame = timeout(RECV_TIMEOUT, self.peer.recv())
            .await
            .expect("server frame within timeout")?;
        Some(JsonCodec.decode(&frame).expect("server frame decodes"))
    }

    /// Next frame from the server as raw JSON.
    ///
    /// # Panics
    ///
    /// Panics on timeout, on close, or if the frame is not JSON.
    pub async fn recv_json(&mut self) -> Value {
        let frame = timeout(RECV_TIMEOUT, self.peer.recv())
            .await
            .expect("server frame within timeout")
            .expect("connection open");
        serde_json::from_str(&frame).expect("server frame is JSON")
    }

    /// Next frame, which must be of `kind`.
    ///
    /// # Panics
    ///
    /// Panics if the connection closed or the frame is of another kind.
    pub async fn expect(&mut self, kind: MessageKind) -> Message {
        let message = self.recv().await.expect("connection open");
        assert_eq!(
            message.kind().ok().flatten(),
            Some(kind),
            "unexpected frame: {message:?}"
        );
        message
    }

    /// Consume the greeting and complete the handshake, returning the
    /// session id.
    ///
    /// # Panics
    ///
    /// Panics if the server does not greet and accept version `"1"`.
    pub async fn handshake(&mut self) -> String {
        let greeting = self.recv().await.expect("greeting");
        assert!(greeting.server_id.is_some(), "expected greeting, got {greeting:?}");
        self.send(&Message::connect("1")).await;
        self.expect(MessageKind::Connected)
            .await
            .session
            .expect("session id")
    }

    /// Call `method` and return its `result` frame.
    ///
    /// A successful call's `updated` frame is left queued.
    pub async fn call(&mut self, id: &str, method: &str, params: Vec<Value>) -> Message {
        self.send(&Message::method(id, method, params)).await;
        self.expect(MessageKind::Result).await
    }

    /// Subscribe without waiting for any reply.
    pub async fn subscribe(&self, id: &str, name: &str, params: Vec<Value>) {
        self.send(&Message::sub(id, name, params)).await;
    }

    /// Receive frames until `ready` for `sub` arrives, returning everything
    /// received before it.
    ///
    /// # Panics
    ///
    /// Panics if the connection closes first.
    pub async fn until_ready(&mut self, sub: &str) -> Vec<Message> {
        let mut seen = Vec::new();
        loop {
            let message = self.recv().await.expect("connection open");
            let done = message.kind().ok().flatten() == Some(MessageKind::Ready)
                && message.subs.as_ref().is_some_and(|s| s.iter().any(|id| id == sub));
            if done {
                return seen;
            }
            seen.push(message);
        }
    }

    /// Close the client-to-server direction.
    pub fn close(&mut self) { self.peer.close(); }

    /// Drain remaining frames and return how the connection ended.
    ///
    /// # Panics
    ///
    /// Panics if the actor task itself panicked.
    pub async fn finish(mut self) -> Result<(), SessionError> {
        while self.recv().await.is_some() {}
        self.actor.await.expect("connection actor task")
    }
}
