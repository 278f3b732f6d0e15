use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use rstest::rstest;
use serde_json::{Value, json};
use tokio::{task::JoinHandle, time::timeout};

use super::*;
use crate::{
    app::DdpApp,
    config::SessionConfig,
    context::{MethodContext, SubscriptionContext},
    error::{DdpError, UNKNOWN_METHOD, UNKNOWN_SUBSCRIPTION},
    events::{EventNotifier, LifecycleEventKind},
    message::{Fields, MessageKind},
    session::SessionRegistry,
    transport::memory::{self, MemoryPeer},
};

const RECV_WAIT: Duration = Duration::from_secs(5);

fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

fn test_app() -> DdpApp {
    DdpApp::new()
        .id_generator(|| String::from("session-1"))
        .method("add", |ctx: MethodContext| async move {
            let a = ctx.param(0).and_then(Value::as_i64).unwrap_or_default();
            let b = ctx.param(1).and_then(Value::as_i64).unwrap_or_default();
            Ok(json!(a + b))
        })
        .method("boom", |_ctx: MethodContext| async move {
            Err(DdpError::new("boom", "Exploded", "Exploded [boom]"))
        })
        .publish("posts", |ctx: SubscriptionContext| async move {
            ctx.added("posts", "p1", fields(json!({ "title": "first" })))
                .expect("push p1");
            ctx.added("posts", "p2", fields(json!({ "title": "second" })))
                .expect("push p2");
            ctx.ready().expect("ready");
            Ok(())
        })
        // params: [field, value]; publishes one shared document.
        .publish("item", |ctx: SubscriptionContext| async move {
            let field = ctx
                .param(0)
                .and_then(Value::as_str)
                .unwrap_or("title")
                .to_owned();
            let value = ctx.param(1).cloned().unwrap_or(Value::Null);
            let mut doc = Fields::new();
            doc.insert(field, value);
            ctx.added("items", "x", doc).expect("push item");
            ctx.ready().expect("ready");
            Ok(())
        })
        .publish("broken", |ctx: SubscriptionContext| async move {
            ctx.added("posts", "p9", Fields::new()).expect("push before failing");
            Err(DdpError::new("denied", "Not allowed", "Not allowed [denied]"))
        })
        .publish("later", |ctx: SubscriptionContext| async move {
            tokio::spawn(async move {
                let _ = ctx.added("ticks", "t1", fields(json!({ "n": 1 })));
                let _ = ctx.ready();
            });
            Ok(())
        })
}

struct Client {
    peer: MemoryPeer,
    actor: JoinHandle<Result<(), SessionError>>,
    registry: RegistryHandle,
}

impl Client {
    fn start(app: DdpApp) -> Self {
        let (state, notifier) = app.into_parts();
        let (registry, _task) = SessionRegistry::spawn(notifier);
        let (transport, peer) = memory::pair(64);
        let actor = tokio::spawn(ConnectionActor::new(transport, state, registry.clone()).run());
        Self {
            peer,
            actor,
            registry,
        }
    }

    async fn send(&self, frame: Value) {
        self.peer
            .send(frame.to_string())
            .await
            .expect("send frame to server");
    }

    async fn recv(&mut self) -> Option<Value> {
        let frame = timeout(RECV_WAIT, self.peer.recv())
            .await
            .expect("server frame within deadline")?;
        Some(serde_json::from_str(&frame).expect("server frame is JSON"))
    }

    async fn expect(&mut self) -> Value { self.recv().await.expect("connection still open") }

    /// Read the greeting and complete the handshake.
    async fn connect(&mut self) {
        assert_eq!(self.expect().await, json!({ "server_id": "0" }));
        self.send(json!({ "msg": "connect", "version": "1", "support": ["1"] }))
            .await;
        assert_eq!(
            self.expect().await,
            json!({ "msg": "connected", "session": "session-1" })
        );
    }

    async fn finish(mut self) -> Result<(), SessionError> {
        while self.recv().await.is_some() {}
        self.actor.await.expect("actor task")
    }
}

#[tokio::test]
async fn handshake_assigns_session() {
    let mut client = Client::start(test_app());
    client.connect().await;
    client.peer.close();
    client.finish().await.expect("clean close");
}

#[tokio::test]
async fn repeated_connect_is_ignored() {
    let mut client = Client::start(test_app());
    client.connect().await;
    client
        .send(json!({ "msg": "connect", "version": "1" }))
        .await;
    client.send(json!({ "msg": "ping", "id": "a" })).await;
    assert_eq!(client.expect().await, json!({ "msg": "pong", "id": "a" }));
}

#[tokio::test]
async fn unsupported_version_fails_and_closes() {
    let mut client = Client::start(test_app());
    assert_eq!(client.expect().await, json!({ "server_id": "0" }));
    client
        .send(json!({ "msg": "connect", "version": "pre2", "support": ["pre2"] }))
        .await;
    assert_eq!(
        client.expect().await,
        json!({ "msg": "failed", "version": "1" })
    );
    let result = client.finish().await;
    assert!(matches!(
        result,
        Err(SessionError::UnsupportedVersion(Some(v))) if v == "pre2"
    ));
}

#[rstest]
#[case(json!({ "msg": "ping" }), json!({ "msg": "pong" }))]
#[case(json!({ "msg": "ping", "id": "7" }), json!({ "msg": "pong", "id": "7" }))]
#[tokio::test]
async fn ping_is_answered(#[case] ping: Value, #[case] pong: Value) {
    let mut client = Client::start(test_app());
    client.connect().await;
    client.send(ping).await;
    assert_eq!(client.expect().await, pong);
}

#[tokio::test]
async fn ping_is_answered_before_handshake() {
    let mut client = Client::start(test_app());
    assert_eq!(client.expect().await, json!({ "server_id": "0" }));
    client.send(json!({ "msg": "ping", "id": "early" })).await;
    assert_eq!(client.expect().await, json!({ "msg": "pong", "id": "early" }));
}

#[tokio::test]
async fn method_result_is_followed_by_updated() {
    let mut client = Client::start(test_app());
    client.connect().await;
    client
        .send(json!({ "msg": "method", "id": "1", "method": "add", "params": [2, 3] }))
        .await;
    assert_eq!(
        client.expect().await,
        json!({ "msg": "result", "id": "1", "result": 5 })
    );
    assert_eq!(
        client.expect().await,
        json!({ "msg": "updated", "methods": ["1"] })
    );
}

#[tokio::test]
async fn method_error_is_reported_without_updated() {
    let mut client = Client::start(test_app());
    client.connect().await;
    client
        .send(json!({ "msg": "method", "id": "2", "method": "boom" }))
        .await;
    assert_eq!(
        client.expect().await,
        json!({
            "msg": "result",
            "id": "2",
            "error": {
                "errorType": "Server.Error",
                "error": "boom",
                "reason": "Exploded",
                "message": "Exploded [boom]"
            }
        })
    );
    client.send(json!({ "msg": "ping", "id": "after" })).await;
    assert_eq!(client.expect().await, json!({ "msg": "pong", "id": "after" }));
}

#[tokio::test]
async fn unknown_method_is_an_error_reply() {
    let mut client = Client::start(test_app());
    client.connect().await;
    client
        .send(json!({ "msg": "method", "id": "3", "method": "nope", "params": [] }))
        .await;
    let reply = client.expect().await;
    assert_eq!(reply["msg"], "result");
    assert_eq!(reply["id"], "3");
    assert_eq!(reply["error"]["error"], UNKNOWN_METHOD);
    assert_eq!(reply["error"]["errorType"], "Method.Error");
}

#[tokio::test]
async fn requests_before_handshake_are_ignored() {
    let mut client = Client::start(test_app());
    assert_eq!(client.expect().await, json!({ "server_id": "0" }));
    client
        .send(json!({ "msg": "method", "id": "1", "method": "add", "params": [1, 1] }))
        .await;
    client
        .send(json!({ "msg": "sub", "id": "s1", "name": "posts" }))
        .await;
    client
        .send(json!({ "msg": "connect", "version": "1" }))
        .await;
    assert_eq!(
        client.expect().await,
        json!({ "msg": "connected", "session": "session-1" })
    );
    client.send(json!({ "msg": "ping", "id": "p" })).await;
    assert_eq!(client.expect().await, json!({ "msg": "pong", "id": "p" }));
}

#[tokio::test]
async fn subscription_publishes_documents_then_ready() {
    let mut client = Client::start(test_app());
    client.connect().await;
    client
        .send(json!({ "msg": "sub", "id": "s1", "name": "posts", "params": [] }))
        .await;
    assert_eq!(
        client.expect().await,
        json!({ "msg": "added", "collection": "posts", "id": "p1", "fields": { "title": "first" } })
    );
    assert_eq!(
        client.expect().await,
        json!({ "msg": "added", "collection": "posts", "id": "p2", "fields": { "title": "second" } })
    );
    assert_eq!(client.expect().await, json!({ "msg": "ready", "subs": ["s1"] }));

    client.send(json!({ "msg": "unsub", "id": "s1" })).await;
    assert_eq!(
        client.expect().await,
        json!({ "msg": "removed", "collection": "posts", "id": "p1" })
    );
    assert_eq!(
        client.expect().await,
        json!({ "msg": "removed", "collection": "posts", "id": "p2" })
    );
    assert_eq!(client.expect().await, json!({ "msg": "nosub", "id": "s1" }));
}

#[tokio::test]
async fn overlapping_subscriptions_are_merged() {
    let mut client = Client::start(test_app());
    client.connect().await;

    client
        .send(json!({ "msg": "sub", "id": "a", "name": "item", "params": ["title", "A"] }))
        .await;
    assert_eq!(
        client.expect().await,
        json!({ "msg": "added", "collection": "items", "id": "x", "fields": { "title": "A" } })
    );
    assert_eq!(client.expect().await, json!({ "msg": "ready", "subs": ["a"] }));

    // The first claim on `title` stays visible.
    client
        .send(json!({ "msg": "sub", "id": "b", "name": "item", "params": ["title", "B"] }))
        .await;
    assert_eq!(client.expect().await, json!({ "msg": "ready", "subs": ["b"] }));

    client.send(json!({ "msg": "unsub", "id": "a" })).await;
    assert_eq!(
        client.expect().await,
        json!({ "msg": "changed", "collection": "items", "id": "x", "fields": { "title": "B" } })
    );
    assert_eq!(client.expect().await, json!({ "msg": "nosub", "id": "a" }));

    client.send(json!({ "msg": "unsub", "id": "b" })).await;
    assert_eq!(
        client.expect().await,
        json!({ "msg": "removed", "collection": "items", "id": "x" })
    );
    assert_eq!(client.expect().await, json!({ "msg": "nosub", "id": "b" }));
}

#[tokio::test]
async fn background_pushes_reach_the_client() {
    let mut client = Client::start(test_app());
    client.connect().await;
    client
        .send(json!({ "msg": "sub", "id": "t", "name": "later" }))
        .await;
    assert_eq!(
        client.expect().await,
        json!({ "msg": "added", "collection": "ticks", "id": "t1", "fields": { "n": 1 } })
    );
    assert_eq!(client.expect().await, json!({ "msg": "ready", "subs": ["t"] }));
}

#[tokio::test]
async fn unknown_publication_gets_nosub_error() {
    let mut client = Client::start(test_app());
    client.connect().await;
    client
        .send(json!({ "msg": "sub", "id": "s9", "name": "missing" }))
        .await;
    let reply = client.expect().await;
    assert_eq!(reply["msg"], "nosub");
    assert_eq!(reply["id"], "s9");
    assert_eq!(reply["error"]["error"], UNKNOWN_SUBSCRIPTION);
}

#[tokio::test]
async fn unsub_of_unknown_id_gets_nosub_error() {
    let mut client = Client::start(test_app());
    client.connect().await;
    client.send(json!({ "msg": "unsub", "id": "ghost" })).await;
    let reply = client.expect().await;
    assert_eq!(reply["msg"], "nosub");
    assert_eq!(reply["id"], "ghost");
    assert_eq!(reply["error"]["error"], UNKNOWN_SUBSCRIPTION);
}

#[tokio::test]
async fn failing_publication_stops_with_error() {
    let mut client = Client::start(test_app());
    client.connect().await;
    client
        .send(json!({ "msg": "sub", "id": "s1", "name": "broken" }))
        .await;
    let reply = client.expect().await;
    assert_eq!(reply["msg"], "nosub");
    assert_eq!(reply["id"], "s1");
    assert_eq!(reply["error"]["error"], "denied");

    // The push made before failing never reaches the client.
    client.send(json!({ "msg": "ping", "id": "z" })).await;
    assert_eq!(client.expect().await, json!({ "msg": "pong", "id": "z" }));
}

#[rstest]
#[case::unknown_kind(json!({ "msg": "bogus" }), "protocol")]
#[case::server_only_kind(json!({ "msg": "added", "collection": "c", "id": "1" }), "protocol")]
#[case::missing_msg(json!({ "id": "1" }), "protocol")]
#[case::missing_method_name(json!({ "msg": "method", "id": "1" }), "protocol")]
#[tokio::test]
async fn protocol_violations_close_the_connection(#[case] frame: Value, #[case] label: &str) {
    let mut client = Client::start(test_app());
    client.connect().await;
    client.send(frame).await;
    let err = client.finish().await.expect_err("violation is fatal");
    assert_eq!(err.kind(), label);
}

#[tokio::test]
async fn server_only_kind_is_reported_as_unexpected() {
    let mut client = Client::start(test_app());
    client.connect().await;
    client.send(json!({ "msg": "ready", "subs": [] })).await;
    assert!(matches!(
        client.finish().await,
        Err(SessionError::UnexpectedMessage(MessageKind::Ready))
    ));
}

#[tokio::test]
async fn invalid_json_is_a_codec_error() {
    let mut client = Client::start(test_app());
    client.connect().await;
    client.peer.send("{not json").await.expect("send");
    assert!(matches!(client.finish().await, Err(SessionError::Codec(_))));
}

#[tokio::test]
async fn oversized_frame_is_rejected() {
    let mut client = Client::start(test_app());
    client.connect().await;
    let padding = "x".repeat(600);
    client
        .send(json!({ "msg": "method", "id": "1", "method": "add", "params": [padding] }))
        .await;
    assert!(matches!(
        client.finish().await,
        Err(SessionError::MessageTooLarge { max: 512, .. })
    ));
}

fn fast_keepalive() -> SessionConfig {
    SessionConfig {
        ping_period: Duration::from_secs(1),
        pong_wait: Duration::from_secs(2),
        ..SessionConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn silent_client_times_out() {
    let mut client = Client::start(test_app().session_config(fast_keepalive()));
    client.connect().await;
    assert_eq!(client.expect().await, json!({ "msg": "ping" }));
    let result = client.finish().await;
    assert!(matches!(result, Err(SessionError::ReadTimeout(d)) if d == Duration::from_secs(2)));
}

#[tokio::test(start_paused = true)]
async fn pongs_keep_the_connection_alive() {
    let mut client = Client::start(test_app().session_config(fast_keepalive()));
    client.connect().await;
    for _ in 0..5 {
        assert_eq!(client.expect().await, json!({ "msg": "ping" }));
        client.send(json!({ "msg": "pong" })).await;
    }
    client.send(json!({ "msg": "ping", "id": "alive" })).await;
    loop {
        let frame = client.expect().await;
        if frame["msg"] == "pong" {
            assert_eq!(frame["id"], "alive");
            break;
        }
    }
}

#[tokio::test]
async fn registry_tracks_connection_lifetime() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&events);
    let app = test_app()
        .on_connected({
            let log = Arc::clone(&log);
            move |e| log.lock().expect("lock").push(e.kind)
        })
        .on_disconnected(move |e| log.lock().expect("lock").push(e.kind));

    let mut client = Client::start(app);
    client.connect().await;
    assert_eq!(client.registry.session_count().await, Some(1));

    let registry = client.registry.clone();
    client.peer.close();
    client.finish().await.expect("clean close");
    assert_eq!(registry.session_count().await, Some(0));
    assert_eq!(
        *events.lock().expect("lock"),
        vec![
            LifecycleEventKind::Connected,
            LifecycleEventKind::Disconnected
        ]
    );
}

#[tokio::test]
async fn registry_shutdown_closes_connection() {
    let mut client = Client::start(test_app());
    client.connect().await;
    assert_eq!(client.registry.session_count().await, Some(1));
    client.registry.shutdown();
    client.finish().await.expect("shutdown is a clean close");
}

#[tokio::test]
async fn teardown_stops_live_subscriptions() {
    let captured: Arc<Mutex<Option<SubscriptionContext>>> = Arc::default();
    let slot = Arc::clone(&captured);
    let app = test_app().publish("held", move |ctx: SubscriptionContext| {
        let slot = Arc::clone(&slot);
        async move {
            *slot.lock().expect("lock") = Some(ctx);
            Ok(())
        }
    });

    let mut client = Client::start(app);
    client.connect().await;
    client
        .send(json!({ "msg": "sub", "id": "h", "name": "held" }))
        .await;
    client.send(json!({ "msg": "ping", "id": "sync" })).await;
    assert_eq!(client.expect().await, json!({ "msg": "pong", "id": "sync" }));

    client.peer.close();
    client.finish().await.expect("clean close");
    let ctx = captured.lock().expect("lock").take().expect("handler ran");
    assert!(ctx.is_stopped());
    assert!(ctx.ready().is_err());
}

#[tokio::test]
async fn unregistering_twice_is_harmless() {
    let (registry, _task) = SessionRegistry::spawn(EventNotifier::new());
    let id = ConnectionId::next();
    {
        let _guard = Registration::new(registry.clone(), id, CancellationToken::new());
        assert_eq!(registry.session_count().await, Some(1));
    }
    registry.unregister(id);
    assert_eq!(registry.session_count().await, Some(0));
}

#[rstest]
#[case::stopped(true)]
#[case::stopping(false)]
#[tokio::test]
async fn connection_closes_when_registry_is_gone(#[case] wait_for_stop: bool) {
    let (state, notifier) = test_app().into_parts();
    let (registry, task) = SessionRegistry::spawn(notifier);
    registry.shutdown();
    if wait_for_stop {
        task.await.expect("registry task");
    }

    let (transport, mut peer) = memory::pair(64);
    let actor = tokio::spawn(ConnectionActor::new(transport, state, registry).run());
    let greeting = timeout(RECV_WAIT, peer.recv())
        .await
        .expect("greeting within deadline");
    assert!(greeting.is_some());
    let result = timeout(RECV_WAIT, actor)
        .await
        .expect("actor stops without the client leaving")
        .expect("actor task");
    assert!(result.is_ok());
}
