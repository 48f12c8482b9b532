// Slow poll cadence and fast render cadence, as owned cancellable tasks

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::board::{BoardRenderer, RenderSink};
use crate::countdown::current_timestamp;
use crate::service::ArrivalService;

/// The poll cadence is the service's poll interval; the scheduler only owns
/// the render cadence.
pub struct RefreshScheduler {
    render_interval: Duration,
}

/// Both tasks stop when this is shut down; dropping it without calling
/// `shutdown` aborts them.
pub struct SchedulerHandle {
    shutdown: CancellationToken,
    render: Option<JoinHandle<()>>,
    poll: Option<JoinHandle<()>>,
}

impl RefreshScheduler {
    pub fn new(render_interval: Duration) -> Self {
        RefreshScheduler { render_interval }
    }

    /// Poll task only (server side).
    pub fn start_polling(&self, service: Arc<ArrivalService>) -> SchedulerHandle {
        let shutdown = CancellationToken::new();
        let poll = tokio::spawn(poll_task(service, shutdown.clone()));
        SchedulerHandle {
            shutdown,
            render: None,
            poll: Some(poll),
        }
    }

    /// Poll task plus render task driving `sink`.
    pub fn start<S: RenderSink + 'static>(
        &self,
        service: Arc<ArrivalService>,
        renderer: BoardRenderer,
        sink: S,
    ) -> SchedulerHandle {
        let shutdown = CancellationToken::new();
        let render = tokio::spawn(render_task(
            service.clone(),
            renderer,
            sink,
            self.render_interval,
            shutdown.child_token(),
        ));
        let poll = tokio::spawn(poll_task(service, shutdown.child_token()));
        SchedulerHandle {
            shutdown,
            render: Some(render),
            poll: Some(poll),
        }
    }
}

impl SchedulerHandle {
    /// Stops the render task, then the poll task, and waits for both. After
    /// this returns nothing touches the render sink again.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        if let Some(render) = self.render.take() {
            if let Err(e) = render.await {
                warn!(error = %e, "Render task ended abnormally");
            }
        }
        if let Some(poll) = self.poll.take() {
            if let Err(e) = poll.await {
                warn!(error = %e, "Poll task ended abnormally");
            }
        }
        info!("Refresh scheduler stopped");
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        if let Some(render) = self.render.take() {
            render.abort();
        }
        if let Some(poll) = self.poll.take() {
            poll.abort();
        }
    }
}

// Goes through the same gate as on-demand refreshes, so an API request that
// just polled pushes the next scheduled poll back instead of doubling it.
async fn poll_task(service: Arc<ArrivalService>, shutdown: CancellationToken) {
    loop {
        if shutdown.is_cancelled() {
            break;
        }
        // failures are recorded in the store; the loop keeps going
        service.refresh_if_stale(current_timestamp()).await;
        let next = service.next_poll_at().await;

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = time::sleep_until(next) => {}
        }
    }
    debug!("Poll task finished");
}

async fn render_task<S: RenderSink>(
    service: Arc<ArrivalService>,
    renderer: BoardRenderer,
    mut sink: S,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let frame = renderer.render(&service.store().view(), current_timestamp());
                sink.render(&frame);
            }
        }
    }
    debug!("Render task finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::BoardFrame;
    use crate::config::Settings;
    use crate::service::tests::FakeSource;
    use crate::store::ArrivalStore;
    use std::sync::Mutex;
    use std::sync::atomic::Ordering;

    #[derive(Clone, Default)]
    struct RecordingSink {
        frames: Arc<Mutex<Vec<BoardFrame>>>,
    }

    impl RenderSink for RecordingSink {
        fn render(&mut self, frame: &BoardFrame) {
            self.frames.lock().unwrap().push(frame.clone());
        }
    }

    fn setup() -> (Arc<FakeSource>, Arc<ArrivalService>, BoardRenderer) {
        let settings = Settings::defaults().unwrap();
        let source = Arc::new(FakeSource::new(900));
        let service = Arc::new(ArrivalService::new(
            source.clone(),
            Arc::new(ArrivalStore::new()),
            settings.board.poll_interval,
        ));
        let renderer = BoardRenderer::new(&settings.board, &settings.feed.lines);
        (source, service, renderer)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_and_slow_cadences() {
        let (source, service, renderer) = setup();
        let sink = RecordingSink::default();
        let scheduler = RefreshScheduler::new(Duration::from_secs(1));

        let handle = scheduler.start(service, renderer, sink.clone());
        time::sleep(Duration::from_millis(10_500)).await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(sink.frames.lock().unwrap().len() >= 10);

        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_poll_does_not_stop_the_loop() {
        let (source, service, renderer) = setup();
        source.fail.store(true, Ordering::SeqCst);
        let sink = RecordingSink::default();
        let scheduler = RefreshScheduler::new(Duration::from_secs(1));

        let handle = scheduler.start(service.clone(), renderer, sink.clone());
        time::sleep(Duration::from_millis(61_000)).await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert!(service.store().view().last_failure.is_some());
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_both_tasks() {
        let (source, service, renderer) = setup();
        let sink = RecordingSink::default();
        let scheduler = RefreshScheduler::new(Duration::from_secs(1));

        let handle = scheduler.start(service, renderer, sink.clone());
        time::sleep(Duration::from_millis(2_500)).await;
        handle.shutdown().await;

        let frames = sink.frames.lock().unwrap().len();
        let calls = source.calls.load(Ordering::SeqCst);
        time::sleep(Duration::from_secs(120)).await;

        assert_eq!(sink.frames.lock().unwrap().len(), frames);
        assert_eq!(source.calls.load(Ordering::SeqCst), calls);
        // the render task dropped its copy of the sink
        assert_eq!(Arc::strong_count(&sink.frames), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_only() {
        let (source, service, _) = setup();
        let scheduler = RefreshScheduler::new(Duration::from_secs(1));

        let handle = scheduler.start_polling(service.clone());
        time::sleep(Duration::from_millis(100)).await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(service.store().snapshot().is_some());
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_demand_refresh_delays_scheduled_poll() {
        let (source, service, _) = setup();
        let scheduler = RefreshScheduler::new(Duration::from_secs(1));

        service.refresh_if_stale(current_timestamp()).await;
        let handle = scheduler.start_polling(service.clone());
        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        time::sleep(Duration::from_millis(29_800)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        time::sleep(Duration::from_millis(200)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_demand_refresh_between_ticks() {
        let (source, service, _) = setup();
        let scheduler = RefreshScheduler::new(Duration::from_secs(1));

        let handle = scheduler.start_polling(service.clone());
        time::sleep(Duration::from_secs(31)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        // the scheduled poll at 30 s closed the gate until 60 s
        service.refresh_if_stale(current_timestamp()).await;
        time::sleep(Duration::from_secs(28)).await;
        service.refresh_if_stale(current_timestamp()).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        handle.shutdown().await;
    }
}
