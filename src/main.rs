//! Demo server: an `echo` method, a `counter` method and a `clock`
//! publication that ticks once a second.

mod cli;

use std::{
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
    time::Duration,
};

use clap::Parser;
use ddpframe::{
    app::DdpApp,
    config::SessionConfig,
    context::{MethodContext, SubscriptionContext},
    message::Fields,
    server::DdpServer,
};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

fn demo_app(cli: &cli::Cli) -> DdpApp {
    let counter = Arc::new(AtomicI64::new(0));
    DdpApp::new()
        .server_id(cli.server_id.clone())
        .session_config(SessionConfig {
            ping_period: Duration::from_secs(cli.ping_period),
            pong_wait: Duration::from_secs(cli.pong_wait),
            ..SessionConfig::default()
        })
        .method("echo", |ctx: MethodContext| async move {
            Ok(Value::Array(ctx.params().to_vec()))
        })
        .method("increment", move |ctx: MethodContext| {
            let counter = Arc::clone(&counter);
            async move {
                let by = ctx.param(0).and_then(Value::as_i64).unwrap_or(1);
                Ok(json!(counter.fetch_add(by, Ordering::Relaxed) + by))
            }
        })
        .publish("clock", |ctx: SubscriptionContext| async move {
            tokio::spawn(tick(ctx));
            Ok(())
        })
        .on_connected(|e| tracing::info!(connection = %e.connection, sessions = e.session_count, "client joined"))
        .on_disconnected(|e| tracing::info!(connection = %e.connection, sessions = e.session_count, "client left"))
}

async fn tick(ctx: SubscriptionContext) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    let mut first = true;
    let mut n: u64 = 0;
    while !ctx.is_stopped() {
        interval.tick().await;
        n += 1;
        let mut fields = Fields::new();
        fields.insert("tick".into(), json!(n));
        let pushed = if first {
            ctx.added("clock", "now", fields).and_then(|()| ctx.ready())
        } else {
            ctx.changed("clock", "now", fields, Vec::new())
        };
        if pushed.is_err() {
            break;
        }
        first = false;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = cli::Cli::parse();

    #[cfg(feature = "metrics")]
    if let Some(addr) = cli.metrics_addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        tracing::info!(%addr, "serving metrics");
    }

    let server = DdpServer::new(demo_app(&cli)).bind(cli.bind)?;
    if let Some(addr) = server.local_addr() {
        tracing::info!(%addr, "listening");
    }
    server.run().await?;
    Ok(())
}
