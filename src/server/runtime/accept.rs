//! Accept loop feeding new TCP connections to connection tasks.

use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use log::warn;
use tokio::{
    net::{TcpListener, TcpStream},
    time::sleep,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::backoff::BackoffConfig;
use crate::{
    app::AppState,
    metrics,
    server::connection::spawn_connection_task,
    session::RegistryHandle,
};

/// Source of incoming connections consumed by the accept loop.
///
/// Implementations must be cancellation safe: dropping a pending `accept()`
/// future must not leak resources.
#[async_trait]
pub(in crate::server) trait AcceptListener: Send + Sync {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl AcceptListener for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> { TcpListener::local_addr(self) }
}

/// Everything a connection task needs besides its stream.
#[derive(Clone, Debug)]
pub(in crate::server) struct ConnectionDeps {
    pub app: Arc<AppState>,
    pub registry: RegistryHandle,
    pub upgrade_timeout: Duration,
}

#[derive(Debug)]
pub(in crate::server) struct AcceptLoopOptions {
    pub deps: ConnectionDeps,
    pub shutdown: CancellationToken,
    pub tracker: TaskTracker,
    pub backoff: BackoffConfig,
}

/// Accept connections until `shutdown` is cancelled.
///
/// Every accepted stream gets its own tracked task. Accept failures are
/// logged and retried after an exponentially growing delay.
pub(in crate::server) async fn accept_loop<L>(listener: Arc<L>, options: AcceptLoopOptions)
where
    L: AcceptListener + 'static,
{
    let AcceptLoopOptions {
        deps,
        shutdown,
        tracker,
        backoff,
    } = options;
    let backoff = backoff.normalized();
    let mut delay = backoff.initial_delay;

    loop {
        tokio::select! {
            biased;

            () = shutdown.cancelled() => break,
            res = listener.accept() => match res {
                Ok((stream, peer)) => {
                    spawn_connection_task(stream, peer, deps.clone(), &tracker);
                    delay = backoff.initial_delay;
                }
                Err(e) => {
                    let local_addr = listener.local_addr().ok();
                    warn!("accept error: error={e:?}, local_addr={local_addr:?}");
                    metrics::inc_errors("accept");
                    tokio::select! {
                        () = shutdown.cancelled() => break,
                        () = sleep(delay) => {}
                    }
                    delay = backoff.next_delay(delay);
                }
            },
        }
    }
}
