//! Handle passed to method handlers.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use serde_json::Value;

use crate::session::ConnectionId;

#[derive(Debug, Default)]
struct ReplyState {
    done: AtomicBool,
    updated: AtomicBool,
}

/// One in-flight method call.
///
/// The handler's return value becomes the reply: `Ok` is sent as `result`
/// followed by `updated`, `Err` as a `result` carrying the error.
#[derive(Clone, Debug)]
pub struct MethodContext {
    id: String,
    method: String,
    params: Vec<Value>,
    connection: ConnectionId,
    session: String,
    reply: Arc<ReplyState>,
}

impl MethodContext {
    pub(crate) fn new(
        id: String,
        method: String,
        params: Vec<Value>,
        connection: ConnectionId,
        session: String,
    ) -> Self {
        Self {
            id,
            method,
            params,
            connection,
            session,
            reply: Arc::default(),
        }
    }

    /// Client-chosen call id.
    #[must_use]
    pub fn id(&self) -> &str { &self.id }

    #[must_use]
    pub fn method(&self) -> &str { &self.method }

    #[must_use]
    pub fn params(&self) -> &[Value] { &self.params }

    /// Positional parameter, if present.
    #[must_use]
    pub fn param(&self, index: usize) -> Option<&Value> { self.params.get(index) }

    #[must_use]
    pub fn connection_id(&self) -> ConnectionId { self.connection }

    #[must_use]
    pub fn session_id(&self) -> &str { &self.session }

    /// Returns `true` once the result or error has been sent.
    #[must_use]
    pub fn is_done(&self) -> bool { self.reply.done.load(Ordering::Acquire) }

    /// Returns `true` once `updated` has been sent.
    #[must_use]
    pub fn is_updated(&self) -> bool { self.reply.updated.load(Ordering::Acquire) }

    /// Claim the right to send the reply. Only the first call returns `true`.
    pub(crate) fn mark_done(&self) -> bool { !self.reply.done.swap(true, Ordering::AcqRel) }

    /// Claim the right to send `updated`. Only the first call returns `true`.
    pub(crate) fn mark_updated(&self) -> bool { !self.reply.updated.swap(true, Ordering::AcqRel) }
}
