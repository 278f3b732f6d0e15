//! Per-document field precedence bookkeeping.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde_json::Value;

use super::SubscriptionKey;
use crate::message::Fields;

/// One subscription's claim on a field.
#[derive(Clone, Debug, PartialEq)]
struct Claim {
    subscription: SubscriptionKey,
    value: Value,
}

/// Visible effect of a single view operation.
///
/// A field appears in at most one of `changed` and `removed`: recording one
/// drops any earlier entry in the other, so a collector reused across several
/// operations always describes the net change.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChangeCollector {
    changed: Fields,
    removed: BTreeSet<String>,
}

impl ChangeCollector {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Fields whose visible value changed, with their new value.
    #[must_use]
    pub fn changed(&self) -> &Fields { &self.changed }

    /// Fields that are no longer claimed by any subscription.
    #[must_use]
    pub fn removed(&self) -> &BTreeSet<String> { &self.removed }

    /// Returns `true` if nothing visible changed.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.changed.is_empty() && self.removed.is_empty() }

    /// Split into the changed fields and the cleared field names.
    #[must_use]
    pub fn into_parts(self) -> (Fields, Vec<String>) {
        (self.changed, self.removed.into_iter().collect())
    }

    fn record_changed(&mut self, key: &str, value: Value) {
        self.removed.remove(key);
        self.changed.insert(key.to_owned(), value);
    }

    fn record_removed(&mut self, key: &str) {
        self.changed.remove(key);
        self.removed.insert(key.to_owned());
    }
}

/// Merged view of one document as seen by one client.
///
/// Every field keeps a precedence list of claims in the order they were
/// made. The head of the list is the value the client sees.
#[derive(Clone, Debug, Default)]
pub struct DocumentView {
    /// Number of claims each subscription holds across all fields.
    exists_in: HashMap<SubscriptionKey, usize>,
    data_by_key: BTreeMap<String, Vec<Claim>>,
}

impl DocumentView {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Returns `true` when no subscription claims any field.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.exists_in.is_empty() }

    /// Returns `true` if `subscription` holds at least one claim.
    #[must_use]
    pub fn contains(&self, subscription: SubscriptionKey) -> bool {
        self.exists_in.contains_key(&subscription)
    }

    /// Snapshot of the visible document: the head value of every field.
    #[must_use]
    pub fn get_fields(&self) -> Fields {
        self.data_by_key
            .iter()
            .filter_map(|(key, claims)| claims.first().map(|c| (key.clone(), c.value.clone())))
            .collect()
    }

    /// Record `subscription` writing `value` to `key`.
    ///
    /// A write by the subscription at the head of the list, or to an
    /// unclaimed key, is visible and lands in `collector`. Any other write is
    /// hidden behind the current head. With `is_add` set the write always
    /// appends a fresh claim at the tail.
    pub fn change_field(
        &mut self,
        subscription: SubscriptionKey,
        key: &str,
        value: Value,
        collector: &mut ChangeCollector,
        is_add: bool,
    ) {
        let Some(claims) = self.data_by_key.get_mut(key) else {
            self.data_by_key.insert(
                key.to_owned(),
                vec![Claim {
                    subscription,
                    value: value.clone(),
                }],
            );
            *self.exists_in.entry(subscription).or_insert(0) += 1;
            collector.record_changed(key, value);
            return;
        };

        let existing = if is_add {
            None
        } else {
            claims.iter().position(|c| c.subscription == subscription)
        };

        match existing {
            Some(0) => {
                claims[0].value = value.clone();
                collector.record_changed(key, value);
            }
            Some(index) => claims[index].value = value,
            None => {
                claims.push(Claim {
                    subscription,
                    value,
                });
                *self.exists_in.entry(subscription).or_insert(0) += 1;
            }
        }
    }

    /// Drop the claim `subscription` holds on `key`.
    ///
    /// Clearing a key the subscription never claimed is a no-op.
    pub fn clear_field(
        &mut self,
        subscription: SubscriptionKey,
        key: &str,
        collector: &mut ChangeCollector,
    ) {
        let Some(claims) = self.data_by_key.get_mut(key) else {
            return;
        };
        let Some(index) = claims.iter().position(|c| c.subscription == subscription) else {
            return;
        };

        let cleared = claims.remove(index);
        if claims.is_empty() {
            self.data_by_key.remove(key);
            collector.record_removed(key);
        } else if index == 0 && claims[0].value != cleared.value {
            collector.record_changed(key, claims[0].value.clone());
        }
        self.release(subscription);
    }

    /// Drop every claim held by `subscription`.
    pub fn clear_subscription(
        &mut self,
        subscription: SubscriptionKey,
        collector: &mut ChangeCollector,
    ) {
        let held: Vec<(String, usize)> = self
            .data_by_key
            .iter()
            .map(|(key, claims)| {
                let count = claims
                    .iter()
                    .filter(|c| c.subscription == subscription)
                    .count();
                (key.clone(), count)
            })
            .filter(|(_, count)| *count > 0)
            .collect();
        for (key, count) in held {
            for _ in 0..count {
                self.clear_field(subscription, &key, collector);
            }
        }
    }

    fn release(&mut self, subscription: SubscriptionKey) {
        if let Some(count) = self.exists_in.get_mut(&subscription) {
            *count -= 1;
            if *count == 0 {
                self.exists_in.remove(&subscription);
            }
        }
    }

    /// Claimants of `key` in precedence order.
    #[cfg(test)]
    pub(crate) fn precedence(&self, key: &str) -> Vec<SubscriptionKey> {
        self.data_by_key
            .get(key)
            .map(|claims| claims.iter().map(|c| c.subscription).collect())
            .unwrap_or_default()
    }

    /// Assert the structural invariants tying `exists_in` to the lists.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        let mut counts: HashMap<SubscriptionKey, usize> = HashMap::new();
        for (key, claims) in &self.data_by_key {
            assert!(!claims.is_empty(), "empty precedence list retained for {key}");
            for claim in claims {
                *counts.entry(claim.subscription).or_insert(0) += 1;
            }
        }
        assert_eq!(counts, self.exists_in);
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use serde_json::json;

    use super::*;

    const A: SubscriptionKey = SubscriptionKey::new(1);
    const B: SubscriptionKey = SubscriptionKey::new(2);

    #[fixture]
    fn view() -> DocumentView { DocumentView::new() }

    fn collector() -> ChangeCollector { ChangeCollector::new() }

    #[rstest]
    fn overlapping_subscriptions_follow_precedence(mut view: DocumentView) {
        let mut c = collector();
        view.change_field(A, "field", json!("Value1"), &mut c, false);
        assert_eq!(c.changed().get("field"), Some(&json!("Value1")));

        let mut c = collector();
        view.change_field(B, "field", json!("Value1"), &mut c, false);
        assert!(c.is_empty());

        let mut c = collector();
        view.change_field(A, "field", json!("Value2"), &mut c, false);
        assert_eq!(c.changed().get("field"), Some(&json!("Value2")));

        let mut c = collector();
        view.change_field(B, "field", json!("Value2"), &mut c, false);
        assert!(c.is_empty());

        let mut c = collector();
        view.clear_field(B, "field", &mut c);
        assert!(c.is_empty());
        assert!(!view.contains(B));

        let mut c = collector();
        view.clear_field(A, "field", &mut c);
        assert!(c.changed().is_empty());
        assert!(c.removed().contains("field"));
        assert!(view.is_empty());
        view.assert_consistent();
    }

    #[rstest]
    fn clearing_head_exposes_next_claim(mut view: DocumentView) {
        let mut c = collector();
        view.change_field(A, "title", json!("a"), &mut c, false);
        view.change_field(B, "title", json!("b"), &mut c, false);

        let mut c = collector();
        view.clear_field(A, "title", &mut c);
        assert_eq!(c.changed().get("title"), Some(&json!("b")));
        assert_eq!(view.get_fields().get("title"), Some(&json!("b")));
        assert_eq!(view.precedence("title"), vec![B]);
    }

    #[rstest]
    fn clearing_head_with_equal_successor_is_silent(mut view: DocumentView) {
        let mut c = collector();
        view.change_field(A, "title", json!("same"), &mut c, false);
        view.change_field(B, "title", json!("same"), &mut c, false);

        let mut c = collector();
        view.clear_field(A, "title", &mut c);
        assert!(c.is_empty());
    }

    #[rstest]
    fn clearing_unclaimed_key_is_noop(mut view: DocumentView) {
        let mut c = collector();
        view.clear_field(A, "missing", &mut c);
        assert!(c.is_empty());
        assert!(view.is_empty());
    }

    #[rstest]
    fn reclaiming_after_clear_goes_to_the_tail(mut view: DocumentView) {
        let mut c = collector();
        view.change_field(A, "n", json!(1), &mut c, false);
        view.change_field(B, "n", json!(2), &mut c, false);
        view.clear_field(A, "n", &mut c);
        view.change_field(A, "n", json!(3), &mut c, false);
        assert_eq!(view.precedence("n"), vec![B, A]);
        assert_eq!(view.get_fields().get("n"), Some(&json!(2)));
    }

    #[rstest]
    fn add_always_appends_a_claim(mut view: DocumentView) {
        let mut c = collector();
        view.change_field(A, "n", json!(1), &mut c, true);
        let mut c = collector();
        view.change_field(A, "n", json!(2), &mut c, true);
        assert!(c.is_empty());
        assert_eq!(view.precedence("n"), vec![A, A]);
        view.assert_consistent();

        let mut c = collector();
        view.clear_subscription(A, &mut c);
        assert!(c.removed().contains("n"));
        assert!(view.is_empty());
    }

    #[rstest]
    fn membership_survives_until_last_field_cleared(mut view: DocumentView) {
        let mut c = collector();
        view.change_field(A, "x", json!(1), &mut c, false);
        view.change_field(A, "y", json!(2), &mut c, false);
        view.clear_field(A, "x", &mut c);
        assert!(view.contains(A));
        view.clear_field(A, "y", &mut c);
        assert!(!view.contains(A));
    }

    #[test]
    fn collector_reports_net_change() {
        let mut c = collector();
        c.record_changed("k", json!(1));
        c.record_removed("k");
        assert!(c.changed().is_empty());
        c.record_changed("k", json!(2));
        assert!(c.removed().is_empty());
        assert_eq!(c.into_parts(), (Fields::from_iter([("k".into(), json!(2))]), Vec::new()));
    }
}
