//! Runtime control for [`DdpServer`].

mod accept;
mod backoff;
#[cfg(test)]
mod tests;

use std::sync::Arc;

pub(super) use accept::{AcceptLoopOptions, ConnectionDeps, accept_loop};
pub use backoff::BackoffConfig;
use futures::Future;
use log::{info, warn};
use tokio::signal;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{Bound, DdpServer, ServerError};

impl DdpServer<Bound> {
    /// Run the server until Ctrl+C.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Registry`] if the session registry task fails.
    /// Accept failures are retried with back-off and never surface here.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(async {
            let _ = signal::ctrl_c().await;
        })
        .await
    }

    /// Run the server until `shutdown` resolves.
    ///
    /// Shutdown stops the accept loop, closes every live connection through
    /// the registry and waits for connection tasks to finish.
    ///
    /// ```
    /// use std::net::{Ipv4Addr, SocketAddr};
    ///
    /// use ddpframe::{app::DdpApp, server::DdpServer};
    /// use tokio::sync::oneshot;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), ddpframe::server::ServerError> {
    /// let server = DdpServer::new(DdpApp::new()).bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))?;
    ///
    /// let (tx, rx) = oneshot::channel::<()>();
    /// let handle = tokio::spawn(server.run_with_shutdown(async {
    ///     let _ = rx.await;
    /// }));
    ///
    /// let _ = tx.send(());
    /// handle.await.expect("join server task")?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Registry`] if the session registry task fails.
    pub async fn run_with_shutdown<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send,
    {
        let DdpServer {
            app,
            registry,
            registry_handle,
            ready_tx,
            backoff_config,
            upgrade_timeout,
            state: Bound { listener },
        } = self;

        let registry_task = tokio::spawn(registry.run());
        let shutdown_token = CancellationToken::new();
        let tracker = TaskTracker::new();
        tracker.spawn(accept_loop(
            listener,
            AcceptLoopOptions {
                deps: ConnectionDeps {
                    app,
                    registry: registry_handle.clone(),
                    upgrade_timeout,
                },
                shutdown: shutdown_token.clone(),
                tracker: tracker.clone(),
                backoff: backoff_config,
            },
        ));

        if let Some(tx) = ready_tx
            && tx.send(()).is_err()
        {
            warn!("failed to send readiness signal: receiver dropped");
        }

        shutdown.await;
        info!("server shutting down");
        shutdown_token.cancel();
        registry_handle.shutdown();
        tracker.close();
        tracker.wait().await;
        registry_task.await?;
        Ok(())
    }
}
