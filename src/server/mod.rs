//! Tokio websocket server for [`DdpApp`] instances.
//!
//! `DdpServer` accepts TCP connections, upgrades each to a websocket and
//! runs a [`ConnectionActor`](crate::connection::ConnectionActor) for it.
//! All connections share one frozen [`AppState`] and one session registry.

use std::{sync::Arc, time::Duration};

use tokio::{net::TcpListener, sync::oneshot};

use crate::{
    app::{AppState, DdpApp},
    session::{RegistryHandle, SessionRegistry},
};

/// Default limit on the websocket upgrade handshake.
pub const DEFAULT_UPGRADE_TIMEOUT: Duration = Duration::from_secs(10);

/// Websocket server for a [`DdpApp`].
///
/// The server carries a typestate `S` indicating whether it is [`Unbound`]
/// or [`Bound`]. New servers start `Unbound` and must call
/// [`bind`](DdpServer::bind) or [`bind_listener`](DdpServer::bind_listener)
/// before they can run.
pub struct DdpServer<S: ServerState = Unbound> {
    pub(crate) app: Arc<AppState>,
    pub(crate) registry: SessionRegistry,
    pub(crate) registry_handle: RegistryHandle,
    /// Fires once the accept loop is running. Single use.
    pub(crate) ready_tx: Option<oneshot::Sender<()>>,
    pub(crate) backoff_config: BackoffConfig,
    pub(crate) upgrade_timeout: Duration,
    pub(crate) state: S,
}

/// Marker indicating the server has not yet bound a listener.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbound;

/// Marker indicating the server is bound to a TCP listener.
#[derive(Debug, Clone)]
pub struct Bound {
    pub(crate) listener: Arc<TcpListener>,
}

/// Trait implemented by [`Unbound`] and [`Bound`] to model binding typestate.
pub trait ServerState: sealed::Sealed {}

mod sealed {
    //! Prevent external implementations of [`ServerState`].

    pub trait Sealed {}
    impl Sealed for super::Unbound {}
    impl Sealed for super::Bound {}
}

impl ServerState for Unbound {}
impl ServerState for Bound {}

impl DdpServer<Unbound> {
    /// Freeze `app` and prepare an unbound server for it.
    #[must_use]
    pub fn new(app: DdpApp) -> Self {
        let (state, notifier) = app.into_parts();
        let (registry, registry_handle) = SessionRegistry::new(notifier);
        Self {
            app: state,
            registry,
            registry_handle,
            ready_tx: None,
            backoff_config: BackoffConfig::default(),
            upgrade_timeout: DEFAULT_UPGRADE_TIMEOUT,
            state: Unbound,
        }
    }
}

impl<S: ServerState> DdpServer<S> {
    /// Send `()` on `tx` once the server is accepting connections.
    #[must_use]
    pub fn ready_signal(mut self, tx: oneshot::Sender<()>) -> Self {
        self.ready_tx = Some(tx);
        self
    }

    /// Configure accept-loop back-off. Values are normalized.
    #[must_use]
    pub fn backoff(mut self, config: BackoffConfig) -> Self {
        self.backoff_config = config.normalized();
        self
    }

    /// Limit how long a client may take to complete the websocket upgrade.
    #[must_use]
    pub fn upgrade_timeout(mut self, timeout: Duration) -> Self {
        self.upgrade_timeout = timeout;
        self
    }

    /// Handle to the session registry, usable before and while running.
    #[must_use]
    pub fn registry(&self) -> RegistryHandle { self.registry_handle.clone() }

    /// Shared application state.
    #[must_use]
    pub fn app(&self) -> &Arc<AppState> { &self.app }
}

mod binding;
mod connection;
pub mod error;
mod runtime;

pub use error::ServerError;
pub use runtime::BackoffConfig;
