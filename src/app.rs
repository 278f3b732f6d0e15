//! Application builder registering methods, publications and listeners.
//!
//! [`DdpApp`] collects handlers before the server starts. Once handed to a
//! server it is frozen into an immutable [`AppState`] shared by every
//! connection.

use std::{collections::HashMap, fmt, future::Future, pin::Pin, sync::Arc};

use serde_json::Value;

use crate::{
    codec::{JsonCodec, WireCodec},
    config::SessionConfig,
    context::{MethodContext, SubscriptionContext},
    error::DdpError,
    events::{EventNotifier, LifecycleEvent, LifecycleEventKind},
    ids::{IdGenerator, RandomIdGenerator},
};

/// Boxed future returned by handlers.
pub type HandlerFuture<T> = Pin<Box<dyn Future<Output = Result<T, DdpError>> + Send>>;

/// Method handler: receives the call and resolves to its result.
pub type MethodHandler = Arc<dyn Fn(MethodContext) -> HandlerFuture<Value> + Send + Sync>;

/// Publication handler: receives the subscription and pushes documents
/// through it. Returning `Err` stops the subscription with `nosub`.
pub type PublicationHandler = Arc<dyn Fn(SubscriptionContext) -> HandlerFuture<()> + Send + Sync>;

/// Server id announced in the greeting frame by default.
pub const DEFAULT_SERVER_ID: &str = "0";

/// Configures handlers and per-connection settings.
///
/// ```
/// use ddpframe::{app::DdpApp, error::DdpError};
/// use serde_json::json;
///
/// let app = DdpApp::new()
///     .method("echo", |ctx| async move {
///         Ok(ctx.param(0).cloned().unwrap_or(json!(null)))
///     })
///     .publish("nothing", |ctx| async move {
///         ctx.ready().map_err(|e| DdpError::new("stopped", e.to_string(), ""))
///     });
/// assert!(app.has_method("echo"));
/// ```
pub struct DdpApp {
    methods: HashMap<String, MethodHandler>,
    publications: HashMap<String, PublicationHandler>,
    notifier: EventNotifier,
    server_id: String,
    session: SessionConfig,
    ids: Arc<dyn IdGenerator>,
    codec: Arc<dyn WireCodec>,
}

impl Default for DdpApp {
    fn default() -> Self {
        Self {
            methods: HashMap::new(),
            publications: HashMap::new(),
            notifier: EventNotifier::new(),
            server_id: DEFAULT_SERVER_ID.to_owned(),
            session: SessionConfig::default(),
            ids: Arc::new(RandomIdGenerator),
            codec: Arc::new(JsonCodec),
        }
    }
}

impl fmt::Debug for DdpApp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DdpApp")
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("publications", &self.publications.keys().collect::<Vec<_>>())
            .field("notifier", &self.notifier)
            .field("server_id", &self.server_id)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl DdpApp {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Register a method. A second registration under the same name
    /// replaces the first.
    #[must_use]
    pub fn method<F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(MethodContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, DdpError>> + Send + 'static,
    {
        let name = name.into();
        let handler: MethodHandler = Arc::new(move |ctx| Box::pin(handler(ctx)));
        if self.methods.insert(name.clone(), handler).is_some() {
            tracing::debug!(method = %name, "method handler replaced");
        }
        self
    }

    /// Register a publication. A second registration under the same name
    /// replaces the first.
    ///
    /// The handler runs on the connection's inbound task. Long-running
    /// publications should clone the context into a spawned task and
    /// return.
    #[must_use]
    pub fn publish<F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(SubscriptionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), DdpError>> + Send + 'static,
    {
        let name = name.into();
        let handler: PublicationHandler = Arc::new(move |ctx| Box::pin(handler(ctx)));
        if self.publications.insert(name.clone(), handler).is_some() {
            tracing::debug!(publication = %name, "publication handler replaced");
        }
        self
    }

    /// Call `listener` whenever a connection joins the registry.
    #[must_use]
    pub fn on_connected<F>(mut self, listener: F) -> Self
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.notifier.on(LifecycleEventKind::Connected, listener);
        self
    }

    /// Call `listener` whenever a connection leaves the registry.
    #[must_use]
    pub fn on_disconnected<F>(mut self, listener: F) -> Self
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.notifier.on(LifecycleEventKind::Disconnected, listener);
        self
    }

    /// Id sent in the greeting frame.
    #[must_use]
    pub fn server_id(mut self, server_id: impl Into<String>) -> Self {
        self.server_id = server_id.into();
        self
    }

    /// Per-connection timing and queue settings. Values are normalized.
    #[must_use]
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session = config.normalized();
        self
    }

    /// Source of session ids handed out on `connect`.
    #[must_use]
    pub fn id_generator(mut self, ids: impl IdGenerator) -> Self {
        self.ids = Arc::new(ids);
        self
    }

    /// Encoding used on the wire.
    #[must_use]
    pub fn codec(mut self, codec: impl WireCodec) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    #[must_use]
    pub fn has_method(&self, name: &str) -> bool { self.methods.contains_key(name) }

    #[must_use]
    pub fn has_publication(&self, name: &str) -> bool { self.publications.contains_key(name) }

    /// Freeze the handler tables, returning them with the lifecycle
    /// listeners destined for the session registry.
    #[must_use]
    pub fn into_parts(self) -> (Arc<AppState>, EventNotifier) {
        let state = AppState {
            methods: self.methods,
            publications: self.publications,
            server_id: self.server_id,
            session: self.session,
            ids: self.ids,
            codec: self.codec,
        };
        (Arc::new(state), self.notifier)
    }
}

/// Immutable application state shared by all connections.
pub struct AppState {
    methods: HashMap<String, MethodHandler>,
    publications: HashMap<String, PublicationHandler>,
    server_id: String,
    session: SessionConfig,
    ids: Arc<dyn IdGenerator>,
    codec: Arc<dyn WireCodec>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("methods", &self.methods.len())
            .field("publications", &self.publications.len())
            .field("server_id", &self.server_id)
            .finish_non_exhaustive()
    }
}

impl AppState {
    #[must_use]
    pub fn method(&self, name: &str) -> Option<&MethodHandler> { self.methods.get(name) }

    #[must_use]
    pub fn publication(&self, name: &str) -> Option<&PublicationHandler> {
        self.publications.get(name)
    }

    #[must_use]
    pub fn server_id(&self) -> &str { &self.server_id }

    #[must_use]
    pub fn session_config(&self) -> &SessionConfig { &self.session }

    #[must_use]
    pub fn codec(&self) -> &dyn WireCodec { self.codec.as_ref() }

    /// Generate a fresh session id.
    #[must_use]
    pub fn new_session_id(&self) -> String { self.ids.new_id() }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::session::ConnectionId;

    #[tokio::test]
    async fn later_registration_wins() {
        let app = DdpApp::new()
            .method("answer", |_| async { Ok(json!(1)) })
            .method("answer", |_| async { Ok(json!(2)) });
        let (state, _) = app.into_parts();

        let handler = state.method("answer").expect("registered");
        let ctx = MethodContext::new(
            "1".into(),
            "answer".into(),
            Vec::new(),
            ConnectionId::new(1),
            "s".into(),
        );
        assert_eq!(handler(ctx).await, Ok(json!(2)));
    }

    #[test]
    fn session_config_is_normalized() {
        let (state, _) = DdpApp::new()
            .session_config(SessionConfig {
                ping_period: Duration::from_secs(120),
                ..SessionConfig::default()
            })
            .into_parts();
        assert!(state.session_config().ping_period < state.session_config().pong_wait);
    }

    #[test]
    fn defaults() {
        let (state, notifier) = DdpApp::new()
            .id_generator(|| "fixed".to_owned())
            .on_connected(|_| {})
            .into_parts();
        assert_eq!(state.server_id(), DEFAULT_SERVER_ID);
        assert_eq!(state.new_session_id(), "fixed");
        assert!(state.publication("missing").is_none());
        assert_eq!(notifier.listener_count(LifecycleEventKind::Connected), 1);
    }
}
