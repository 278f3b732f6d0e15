//! Per-connection task: websocket upgrade, then the connection actor.

use std::net::SocketAddr;

use futures::FutureExt;
use log::{error, warn};
use tokio::{net::TcpStream, time::timeout};
use tokio_util::task::TaskTracker;

use super::runtime::ConnectionDeps;
use crate::{connection::ConnectionActor, metrics, panic::format_panic, transport::WsTransport};

/// Spawn a task serving one TCP connection, logging and discarding any panic.
pub(super) fn spawn_connection_task(
    stream: TcpStream,
    peer: SocketAddr,
    deps: ConnectionDeps,
    tracker: &TaskTracker,
) {
    tracker.spawn(async move {
        let fut = std::panic::AssertUnwindSafe(process_stream(stream, peer, deps)).catch_unwind();
        if let Err(panic) = fut.await {
            metrics::inc_errors("panic");
            let panic_msg = format_panic(panic);
            // Emit via both `log` and `tracing` for consumers of either.
            error!("connection task panicked: panic={panic_msg}, peer_addr={peer}");
            tracing::error!(panic = %panic_msg, %peer, "connection task panicked");
        }
    });
}

async fn process_stream(stream: TcpStream, peer: SocketAddr, deps: ConnectionDeps) {
    let max_message_size = deps.app.session_config().max_message_size;
    let upgrade = WsTransport::accept(stream, max_message_size);
    let transport = match timeout(deps.upgrade_timeout, upgrade).await {
        Ok(Ok(transport)) => transport,
        Ok(Err(e)) => {
            warn!("websocket upgrade failed: error={e}, peer_addr={peer}");
            metrics::inc_errors("upgrade");
            return;
        }
        Err(_) => {
            warn!("websocket upgrade timed out: peer_addr={peer}");
            metrics::inc_errors("upgrade");
            return;
        }
    };

    // The actor logs its own outcome.
    let _ = ConnectionActor::new(transport, deps.app, deps.registry)
        .with_peer(peer)
        .run()
        .await;
}
