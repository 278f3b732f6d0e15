//! Helpers for asserting on metrics recorded by `ddpframe`.

use metrics::SharedString;
use metrics_util::{
    CompositeKey,
    debugging::{DebugValue, DebuggingRecorder},
};

/// Everything a [`with_recorder`] run recorded.
#[derive(Debug)]
pub struct Recorded(Vec<(CompositeKey, Option<metrics::Unit>, Option<SharedString>, DebugValue)>);

impl Recorded {
    fn find(&self, name: &str, label: Option<(&str, &str)>) -> Option<&DebugValue> {
        self.0
            .iter()
            .find(|(key, _, _, _)| {
                key.key().name() == name
                    && label.is_none_or(|(k, v)| {
                        key.key().labels().any(|l| l.key() == k && l.value() == v)
                    })
            })
            .map(|(_, _, _, value)| value)
    }

    /// Value of counter `name`, optionally filtered by one label.
    #[must_use]
    pub fn counter(&self, name: &str, label: Option<(&str, &str)>) -> Option<u64> {
        match self.find(name, label)? {
            DebugValue::Counter(v) => Some(*v),
            _ => None,
        }
    }

    /// Value of gauge `name`.
    #[must_use]
    pub fn gauge(&self, name: &str) -> Option<f64> {
        match self.find(name, None)? {
            DebugValue::Gauge(v) => Some(v.into_inner()),
            _ => None,
        }
    }
}

/// Run `f` with a fresh local recorder and return what it recorded.
///
/// The recorder is thread local: use it with synchronous code or a
/// current-thread runtime driven inside `f`.
pub fn with_recorder<F: FnOnce()>(f: F) -> Recorded {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    metrics::with_local_recorder(&recorder, f);
    Recorded(snapshotter.snapshot().into_vec())
}
