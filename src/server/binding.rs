//! Listener binding for [`DdpServer`].

use std::{
    net::{SocketAddr, TcpListener as StdTcpListener},
    sync::Arc,
};

use tokio::net::TcpListener;

use super::{Bound, DdpServer, ServerError, ServerState, Unbound};

impl<S: ServerState> DdpServer<S> {
    fn bind_to_listener(self, std_listener: StdTcpListener) -> Result<DdpServer<Bound>, ServerError> {
        let DdpServer {
            app,
            registry,
            registry_handle,
            ready_tx,
            backoff_config,
            upgrade_timeout,
            ..
        } = self;

        std_listener
            .set_nonblocking(true)
            .map_err(ServerError::Bind)?;
        let listener = TcpListener::from_std(std_listener).map_err(ServerError::Bind)?;

        Ok(DdpServer {
            app,
            registry,
            registry_handle,
            ready_tx,
            backoff_config,
            upgrade_timeout,
            state: Bound {
                listener: Arc::new(listener),
            },
        })
    }

    /// Bind to a fresh address.
    ///
    /// ```
    /// use std::net::{Ipv4Addr, SocketAddr};
    ///
    /// use ddpframe::{app::DdpApp, server::DdpServer};
    ///
    /// # #[tokio::main]
    /// # async fn main() {
    /// let server = DdpServer::new(DdpApp::new())
    ///     .bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))
    ///     .expect("bind failed");
    /// assert!(server.local_addr().is_some());
    /// # }
    /// ```
    ///
    /// # Errors
    /// Returns a [`ServerError`] if binding or configuring the listener fails.
    pub fn bind(self, addr: SocketAddr) -> Result<DdpServer<Bound>, ServerError> {
        let std_listener = StdTcpListener::bind(addr).map_err(ServerError::Bind)?;
        self.bind_to_listener(std_listener)
    }

    /// Bind to an existing `StdTcpListener`.
    ///
    /// # Errors
    /// Returns a [`ServerError`] if configuring the listener fails.
    pub fn bind_listener(self, std_listener: StdTcpListener) -> Result<DdpServer<Bound>, ServerError> {
        self.bind_to_listener(std_listener)
    }
}

impl DdpServer<Unbound> {
    /// Return `None` as the server is not bound.
    #[must_use]
    pub const fn local_addr(&self) -> Option<SocketAddr> { None }
}

impl DdpServer<Bound> {
    /// Returns the bound address, or `None` if retrieving it fails.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> { self.state.listener.local_addr().ok() }
}
