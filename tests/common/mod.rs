//! Shared utilities for integration tests.

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use std::net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener};

use ddpframe::{
    app::DdpApp,
    context::{MethodContext, SubscriptionContext},
    error::DdpError,
    message::Fields,
};
use rstest::fixture;
use serde_json::{Value, json};

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Create a TCP listener bound to a free local port.
#[expect(
    clippy::expect_used,
    reason = "binding to an ephemeral localhost port must abort the test immediately"
)]
pub fn unused_listener() -> StdTcpListener {
    let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0);
    StdTcpListener::bind(addr).expect("failed to bind port")
}

/// Build a field map from a JSON object literal.
///
/// # Panics
///
/// Panics if `value` is not an object.
pub fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

fn closed(e: impl ToString) -> DdpError {
    let reason = e.to_string();
    DdpError::new("closed", reason.clone(), reason)
}

/// App with an `echo` method, a `fail` method and a `doc` publication.
///
/// `doc` takes `[collection, id, fields]` and publishes exactly that one
/// document before signalling ready.
#[fixture]
pub fn app() -> DdpApp {
    DdpApp::new()
        .method("echo", |ctx: MethodContext| async move {
            Ok(Value::Array(ctx.params().to_vec()))
        })
        .method("fail", |_ctx: MethodContext| async move {
            Err(DdpError::new("failed", "It failed", "It failed [failed]"))
        })
        .publish("doc", |ctx: SubscriptionContext| async move {
            let collection = ctx.param(0).and_then(Value::as_str).unwrap_or("docs").to_owned();
            let id = ctx.param(1).and_then(Value::as_str).unwrap_or("d").to_owned();
            let doc = ctx.param(2).cloned().map_or_else(Fields::new, fields);
            ctx.added(collection, id, doc).map_err(closed)?;
            ctx.ready().map_err(closed)?;
            Ok(())
        })
}

/// Params for the `doc` publication.
pub fn doc_params(collection: &str, id: &str, doc: Value) -> Vec<Value> {
    vec![json!(collection), json!(id), doc]
}
