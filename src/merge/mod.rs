//! Per-connection document merge engine.
//!
//! Several subscriptions on one connection may publish the same document and
//! even the same fields. The [`MergeBox`] keeps one [`DocumentView`] per
//! visible document and turns every publication event into the delta the
//! client should see, if any.
//!
//! Subscriptions are referenced by [`SubscriptionKey`], a plain number handed
//! out by the connection. Retracting a key removes every claim it holds, so no
//! entry outlives the subscription that made it.

use std::collections::{BTreeSet, HashMap};

use derive_more::Display;

use crate::message::{Fields, Message};

mod view;

pub use view::{ChangeCollector, DocumentView};

/// Connection-local handle identifying one subscription inside the merge box.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[display("sub#{_0}")]
pub struct SubscriptionKey(u64);

impl SubscriptionKey {
    #[must_use]
    pub const fn new(raw: u64) -> Self { Self(raw) }

    #[must_use]
    pub const fn get(self) -> u64 { self.0 }
}

/// Identity of a document: its collection and id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentKey {
    pub collection: String,
    pub id: String,
}

impl DocumentKey {
    #[must_use]
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

/// Client-visible outcome of a merge box operation.
#[derive(Clone, Debug, PartialEq)]
pub enum DocumentDelta {
    /// The document became visible with these fields.
    Added { key: DocumentKey, fields: Fields },
    /// Visible fields changed or were cleared.
    Changed {
        key: DocumentKey,
        fields: Fields,
        cleared: Vec<String>,
    },
    /// No subscription publishes the document any more.
    Removed { key: DocumentKey },
}

impl DocumentDelta {
    #[must_use]
    pub fn key(&self) -> &DocumentKey {
        match self {
            Self::Added { key, .. } | Self::Changed { key, .. } | Self::Removed { key } => key,
        }
    }

    fn from_collector(key: DocumentKey, collector: ChangeCollector) -> Option<Self> {
        if collector.is_empty() {
            return None;
        }
        let (fields, cleared) = collector.into_parts();
        Some(Self::Changed {
            key,
            fields,
            cleared,
        })
    }
}

impl From<DocumentDelta> for Message {
    fn from(delta: DocumentDelta) -> Self {
        match delta {
            DocumentDelta::Added { key, fields } => Message::added(key.collection, key.id, fields),
            DocumentDelta::Changed {
                key,
                fields,
                cleared,
            } => Message::changed(key.collection, key.id, fields, cleared),
            DocumentDelta::Removed { key } => Message::removed(key.collection, key.id),
        }
    }
}

#[derive(Debug, Default)]
struct Document {
    view: DocumentView,
    /// Subscriptions that have added the document and not yet removed it.
    /// A subscription may publish a document with no fields, so this is
    /// tracked apart from the view's field claims.
    publishers: BTreeSet<SubscriptionKey>,
}

/// All documents visible to one client.
#[derive(Debug, Default)]
pub struct MergeBox {
    documents: HashMap<DocumentKey, Document>,
    published: HashMap<SubscriptionKey, BTreeSet<DocumentKey>>,
}

impl MergeBox {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Number of documents currently visible to the client.
    #[must_use]
    pub fn len(&self) -> usize { self.documents.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.documents.is_empty() }

    /// Merged fields of a visible document.
    #[must_use]
    pub fn fields(&self, collection: &str, id: &str) -> Option<Fields> {
        self.documents
            .get(&DocumentKey::new(collection, id))
            .map(|doc| doc.view.get_fields())
    }

    /// Record `subscription` publishing a document.
    ///
    /// Returns [`DocumentDelta::Added`] if the client has not seen the
    /// document yet, otherwise the visible field changes.
    pub fn added(
        &mut self,
        subscription: SubscriptionKey,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> Option<DocumentDelta> {
        let key = DocumentKey::new(collection, id);
        let doc = self.documents.entry(key.clone()).or_default();
        let is_new = doc.publishers.is_empty();
        doc.publishers.insert(subscription);

        let mut collector = ChangeCollector::new();
        for (field, value) in fields {
            doc.view
                .change_field(subscription, &field, value, &mut collector, true);
        }
        self.published
            .entry(subscription)
            .or_default()
            .insert(key.clone());

        if is_new {
            let (fields, _) = collector.into_parts();
            Some(DocumentDelta::Added { key, fields })
        } else {
            DocumentDelta::from_collector(key, collector)
        }
    }

    /// Apply field updates and clears from `subscription`.
    ///
    /// Changes to a document the subscription has not added are ignored.
    pub fn changed(
        &mut self,
        subscription: SubscriptionKey,
        collection: &str,
        id: &str,
        fields: Fields,
        cleared: &[String],
    ) -> Option<DocumentDelta> {
        let key = DocumentKey::new(collection, id);
        let doc = self.documents.get_mut(&key)?;
        if !doc.publishers.contains(&subscription) {
            return None;
        }

        let mut collector = ChangeCollector::new();
        for (field, value) in fields {
            doc.view
                .change_field(subscription, &field, value, &mut collector, false);
        }
        for field in cleared {
            doc.view.clear_field(subscription, field, &mut collector);
        }
        DocumentDelta::from_collector(key, collector)
    }

    /// Withdraw `subscription` from a document.
    pub fn removed(
        &mut self,
        subscription: SubscriptionKey,
        collection: &str,
        id: &str,
    ) -> Option<DocumentDelta> {
        let key = DocumentKey::new(collection, id);
        if let Some(docs) = self.published.get_mut(&subscription) {
            docs.remove(&key);
            if docs.is_empty() {
                self.published.remove(&subscription);
            }
        }
        self.withdraw(subscription, key)
    }

    /// Withdraw `subscription` from every document it published.
    ///
    /// Deltas are returned in document order.
    pub fn retract(&mut self, subscription: SubscriptionKey) -> Vec<DocumentDelta> {
        let Some(docs) = self.published.remove(&subscription) else {
            return Vec::new();
        };
        docs.into_iter()
            .filter_map(|key| self.withdraw(subscription, key))
            .collect()
    }

    fn withdraw(&mut self, subscription: SubscriptionKey, key: DocumentKey) -> Option<DocumentDelta> {
        let doc = self.documents.get_mut(&key)?;
        if !doc.publishers.remove(&subscription) {
            return None;
        }

        let mut collector = ChangeCollector::new();
        doc.view.clear_subscription(subscription, &mut collector);
        if doc.publishers.is_empty() {
            self.documents.remove(&key);
            return Some(DocumentDelta::Removed { key });
        }
        DocumentDelta::from_collector(key, collector)
    }

    #[cfg(test)]
    fn view(&self, collection: &str, id: &str) -> Option<&DocumentView> {
        self.documents
            .get(&DocumentKey::new(collection, id))
            .map(|doc| &doc.view)
    }
}
