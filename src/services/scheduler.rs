//! Periodic callback runner with on-demand triggering

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type Callback = Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, ()> + Send + Sync>;

/// Smallest period accepted by the tick loop
const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Default)]
struct SchedulerState {
    token: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
    started: bool,
}

/// Runs a callback once per interval, or immediately on [`trigger`].
///
/// Invocations are serialized: triggers arriving while the callback runs
/// collapse into a single follow-up run, and triggering never resets the
/// interval timer.
///
/// [`trigger`]: PeriodicScheduler::trigger
pub struct PeriodicScheduler {
    period: Duration,
    callback: Callback,
    trigger: Arc<Notify>,
    state: Mutex<SchedulerState>,
}

impl PeriodicScheduler {
    pub fn new<F, Fut>(period: Duration, callback: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback: Callback =
            Arc::new(move |token: CancellationToken| -> BoxFuture<'static, ()> {
                Box::pin(callback(token))
            });
        Self {
            period: period.max(MIN_INTERVAL),
            callback,
            trigger: Arc::new(Notify::new()),
            state: Mutex::new(SchedulerState::default()),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Spawn the tick loop under a child of `parent`; later calls are no-ops
    pub fn start(&self, parent: &CancellationToken) {
        let mut state = self.state.lock();
        if state.started {
            debug!("Scheduler already started");
            return;
        }
        state.started = true;

        let token = parent.child_token();
        let period = self.period;
        let callback = self.callback.clone();
        let trigger = self.trigger.clone();
        let loop_token = token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            // Skip the first immediate tick
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = loop_token.cancelled() => break,
                    _ = ticker.tick() => {}
                    _ = trigger.notified() => {}
                }
                callback(loop_token.clone()).await;
            }
            debug!("Scheduler loop stopped");
        });

        state.token = Some(token);
        state.handle = Some(handle);
    }

    /// Run the callback now; ignored unless the scheduler is running
    pub fn trigger(&self) {
        let running = self
            .state
            .lock()
            .token
            .as_ref()
            .is_some_and(|token| !token.is_cancelled());
        if running {
            self.trigger.notify_one();
        } else {
            debug!("Ignoring trigger on a scheduler that is not running");
        }
    }

    pub fn is_running(&self) -> bool {
        let state = self.state.lock();
        state.handle.is_some() && state.token.as_ref().is_some_and(|t| !t.is_cancelled())
    }

    /// Cancel the loop and wait for it to exit, including any callback in progress
    pub async fn stop(&self) {
        let (token, handle) = {
            let mut state = self.state.lock();
            (state.token.clone(), state.handle.take())
        };

        if let Some(token) = token {
            token.cancel();
        }
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!("Scheduler loop ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(period: Duration) -> (PeriodicScheduler, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let scheduler = PeriodicScheduler::new(period, move |_token| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        (scheduler, count)
    }

    async fn wait_for(count: &AtomicUsize, expected: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while count.load(Ordering::SeqCst) < expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("callback did not run in time");
    }

    #[tokio::test]
    async fn test_trigger_runs_immediately() {
        let (scheduler, count) = counting(Duration::from_secs(3600));
        let token = CancellationToken::new();
        scheduler.start(&token);

        scheduler.trigger();
        wait_for(&count, 1).await;

        scheduler.stop().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_runs_on_interval() {
        let (scheduler, count) = counting(Duration::from_millis(20));
        let token = CancellationToken::new();
        scheduler.start(&token);

        wait_for(&count, 2).await;
        scheduler.stop().await;
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_trigger_before_start_and_after_stop_is_ignored() {
        let (scheduler, count) = counting(Duration::from_secs(3600));
        scheduler.trigger();

        let token = CancellationToken::new();
        scheduler.start(&token);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        scheduler.stop().await;
        scheduler.trigger();
        scheduler.stop().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_parent_cancellation_stops_loop() {
        let (scheduler, _count) = counting(Duration::from_secs(3600));
        let parent = CancellationToken::new();
        scheduler.start(&parent);
        assert!(scheduler.is_running());

        parent.cancel();
        scheduler.stop().await;
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_callbacks_never_overlap() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let runs = Arc::new(AtomicUsize::new(0));

        let scheduler = {
            let (active, peak, runs) = (active.clone(), peak.clone(), runs.clone());
            PeriodicScheduler::new(Duration::from_secs(3600), move |_token| {
                let (active, peak, runs) = (active.clone(), peak.clone(), runs.clone());
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    runs.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        let token = CancellationToken::new();
        scheduler.start(&token);
        scheduler.trigger();
        wait_for(&active, 1).await;
        for _ in 0..5 {
            scheduler.trigger();
        }

        // One run in progress plus one coalesced follow-up
        wait_for(&runs, 2).await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        scheduler.stop().await;

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
