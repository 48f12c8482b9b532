// Latest arrival snapshot plus the outcome of the most recent poll

use std::sync::{Arc, PoisonError, RwLock};

use crate::models::ArrivalSnapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollFailure {
    pub at: i64,
    pub message: String,
}

/// Consistent read of the store: the snapshot and poll status always come
/// from the same write.
#[derive(Debug, Clone, Default)]
pub struct StoreView {
    pub snapshot: Option<Arc<ArrivalSnapshot>>,
    pub last_failure: Option<PollFailure>,
    pub last_attempt: Option<i64>,
}

impl StoreView {
    /// Seconds since the held snapshot was built, if there is one.
    pub fn snapshot_age(&self, now: i64) -> Option<i64> {
        self.snapshot.as_ref().map(|s| s.age_secs(now))
    }
}

/// Single writer (the poll task), any number of readers. A snapshot is
/// swapped in whole; a failed poll leaves it untouched.
#[derive(Debug, Default)]
pub struct ArrivalStore {
    state: RwLock<StoreView>,
}

impl ArrivalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> StoreView {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn snapshot(&self) -> Option<Arc<ArrivalSnapshot>> {
        self.view().snapshot
    }

    pub fn replace_snapshot(&self, snapshot: ArrivalSnapshot) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.last_attempt = Some(snapshot.built_at);
        state.snapshot = Some(Arc::new(snapshot));
        state.last_failure = None;
    }

    pub fn record_failure(&self, at: i64, message: impl Into<String>) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.last_attempt = Some(at);
        state.last_failure = Some(PollFailure {
            at,
            message: message.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArrivalEvent, LineLetter};
    use std::collections::BTreeMap;

    fn snapshot(built_at: i64, b_times: &[i64], d_times: &[i64]) -> ArrivalSnapshot {
        let make = |c: char, times: &[i64]| {
            times
                .iter()
                .map(|t| ArrivalEvent {
                    route_id: c.to_string(),
                    line: LineLetter::new(c).unwrap(),
                    stop_id: "D21N".to_string(),
                    predicted_epoch_seconds: *t,
                })
                .collect::<Vec<_>>()
        };
        let mut lines = BTreeMap::new();
        lines.insert(LineLetter::new('B').unwrap(), make('B', b_times));
        lines.insert(LineLetter::new('D').unwrap(), make('D', d_times));
        ArrivalSnapshot { stop_id: "D21N".to_string(), built_at, lines }
    }

    #[test]
    fn test_empty_store() {
        let store = ArrivalStore::new();
        let view = store.view();
        assert!(view.snapshot.is_none());
        assert!(view.last_failure.is_none());
        assert_eq!(view.snapshot_age(100), None);
    }

    #[test]
    fn test_replace_swaps_every_line() {
        let store = ArrivalStore::new();
        store.replace_snapshot(snapshot(100, &[200, 300], &[250]));
        let before = store.snapshot().unwrap();

        store.replace_snapshot(snapshot(130, &[], &[400]));
        let after = store.snapshot().unwrap();

        // readers holding the old view keep seeing it unchanged
        assert_eq!(before.arrivals(LineLetter::new('B').unwrap()).len(), 2);
        assert!(after.arrivals(LineLetter::new('B').unwrap()).is_empty());
        assert_eq!(after.arrivals(LineLetter::new('D').unwrap())[0].predicted_epoch_seconds, 400);
    }

    #[test]
    fn test_failure_keeps_previous_snapshot() {
        let store = ArrivalStore::new();
        store.replace_snapshot(snapshot(100, &[200], &[]));
        store.record_failure(130, "Transport error: timed out");

        let view = store.view();
        assert_eq!(view.snapshot.as_ref().unwrap().built_at, 100);
        assert_eq!(view.snapshot_age(160), Some(60));
        assert_eq!(view.last_attempt, Some(130));
        assert_eq!(view.last_failure.as_ref().unwrap().message, "Transport error: timed out");

        store.replace_snapshot(snapshot(160, &[], &[]));
        assert!(store.view().last_failure.is_none());
    }
}
