// Poll pipeline: source -> store, at most one poll in flight at a time

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::Result;
use crate::source::ArrivalSource;
use crate::store::{ArrivalStore, StoreView};

pub struct ArrivalService {
    source: Arc<dyn ArrivalSource>,
    store: Arc<ArrivalStore>,
    min_poll_gap: Duration,
    // start of the most recent upstream attempt; held across the fetch
    last_poll: Mutex<Option<Instant>>,
}

impl ArrivalService {
    pub fn new(source: Arc<dyn ArrivalSource>, store: Arc<ArrivalStore>, poll_interval: Duration) -> Self {
        ArrivalService {
            source,
            store,
            min_poll_gap: poll_interval.max(Duration::from_secs(1)),
            last_poll: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<ArrivalStore> {
        &self.store
    }

    /// Polls unconditionally. A failure is logged and recorded; the previous
    /// snapshot stays in the store.
    pub async fn poll(&self, now: i64) -> Result<()> {
        let mut last_poll = self.last_poll.lock().await;
        *last_poll = Some(Instant::now());
        self.poll_locked(now).await
    }

    /// Polls only if no attempt started within the poll interval. Scheduled
    /// and on-demand refreshes share this gate, and concurrent callers share
    /// one upstream request.
    pub async fn refresh_if_stale(&self, now: i64) -> StoreView {
        let mut last_poll = self.last_poll.lock().await;
        if self.is_due(*last_poll) {
            *last_poll = Some(Instant::now());
            let _ = self.poll_locked(now).await;
        }
        drop(last_poll);
        self.store.view()
    }

    /// Earliest instant at which `refresh_if_stale` will reach upstream again.
    pub async fn next_poll_at(&self) -> Instant {
        match *self.last_poll.lock().await {
            Some(at) => at + self.min_poll_gap,
            None => Instant::now(),
        }
    }

    fn is_due(&self, last_poll: Option<Instant>) -> bool {
        match last_poll {
            Some(at) => at.elapsed() >= self.min_poll_gap,
            None => true,
        }
    }

    async fn poll_locked(&self, now: i64) -> Result<()> {
        match self.source.fetch(now).await {
            Ok(snapshot) => {
                let counts: Vec<String> = snapshot
                    .lines
                    .iter()
                    .map(|(line, events)| format!("{}={}", line, events.len()))
                    .collect();
                info!(stop_id = %snapshot.stop_id, arrivals = %counts.join(" "), "Arrivals refreshed");
                self.store.replace_snapshot(snapshot);
                Ok(())
            }
            Err(e) => {
                let view = self.store.view();
                match view.snapshot_age(now) {
                    Some(age) => warn!(error = %e, snapshot_age_secs = age, "Poll failed, keeping previous snapshot"),
                    None => warn!(error = %e, "Poll failed, no snapshot available yet"),
                }
                self.store.record_failure(now, e.to_string());
                Err(e)
            }
        }
    }
}
