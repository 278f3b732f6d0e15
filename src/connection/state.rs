//! Protocol state owned by a connection's inbound task.

use std::collections::HashMap;

use crate::{
    context::SubscriptionContext,
    merge::{MergeBox, SubscriptionKey},
};

/// Handshake progress.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) enum Handshake {
    Unconnected,
    Connected { session: String },
}

/// A subscription the client currently holds.
pub(super) struct ActiveSubscription {
    pub(super) key: SubscriptionKey,
    pub(super) context: SubscriptionContext,
}

/// Everything the state machine mutates. Only the inbound task touches it.
pub(super) struct SessionState {
    handshake: Handshake,
    subscriptions: HashMap<String, ActiveSubscription>,
    pub(super) merge: MergeBox,
    next_key: u64,
}

impl SessionState {
    pub(super) fn new() -> Self {
        Self {
            handshake: Handshake::Unconnected,
            subscriptions: HashMap::new(),
            merge: MergeBox::new(),
            next_key: 1,
        }
    }

    pub(super) fn session_id(&self) -> Option<&str> {
        match &self.handshake {
            Handshake::Connected { session } => Some(session),
            Handshake::Unconnected => None,
        }
    }

    pub(super) fn is_connected(&self) -> bool { self.session_id().is_some() }

    pub(super) fn connect(&mut self, session: String) {
        self.handshake = Handshake::Connected { session };
    }

    /// Hand out a key no other subscription on this connection has used.
    pub(super) fn allocate_key(&mut self) -> SubscriptionKey {
        let key = SubscriptionKey::new(self.next_key);
        self.next_key += 1;
        key
    }

    pub(super) fn has_subscription(&self, id: &str) -> bool { self.subscriptions.contains_key(id) }

    pub(super) fn insert_subscription(&mut self, id: String, context: SubscriptionContext) {
        let key = context.key();
        self.subscriptions
            .insert(id, ActiveSubscription { key, context });
    }

    pub(super) fn remove_subscription(&mut self, id: &str) -> Option<ActiveSubscription> {
        self.subscriptions.remove(id)
    }

    /// Returns `true` if `id` is live and still belongs to `key`. Commands
    /// from a stopped subscription fail this check even when the client has
    /// reused its id.
    pub(super) fn owns(&self, id: &str, key: SubscriptionKey) -> bool {
        self.subscriptions.get(id).is_some_and(|sub| sub.key == key)
    }

    pub(super) fn subscription_count(&self) -> usize { self.subscriptions.len() }

    /// Remove every subscription, leaving the merge box untouched.
    pub(super) fn drain_subscriptions(&mut self) -> Vec<ActiveSubscription> {
        self.subscriptions.drain().map(|(_, sub)| sub).collect()
    }
}
