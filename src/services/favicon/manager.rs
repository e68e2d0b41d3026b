//! Site favicon orchestration
//!
//! Decides which sites need a fetch, keeps at most one fetch in flight per
//! site, runs fetches on a single background worker, persists the outcome
//! and notifies subscribers.

use chrono::Utc;
use dashmap::DashSet;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::events::{FaviconEvent, FaviconSubscription, SubscriberRegistry, favicon_url};
use super::resolver::FaviconResolver;
use super::state::{FetchState, FreshnessPolicy, classify};
use crate::config::FaviconConfig;
use crate::database::repositories::SiteFaviconStore;
use crate::models::{FaviconUpdate, Site};
use crate::services::scheduler::PeriodicScheduler;

/// Tuning knobs of the manager
#[derive(Debug, Clone)]
pub struct FaviconSettings {
    pub refresh_interval: Duration,
    pub retry_interval: Duration,
    pub scan_interval: Duration,
    pub scan_on_start: bool,
    pub queue_capacity: usize,
    pub enqueue_timeout: Duration,
    pub subscriber_buffer: usize,
}

impl From<&FaviconConfig> for FaviconSettings {
    fn from(config: &FaviconConfig) -> Self {
        Self {
            refresh_interval: config.refresh_interval,
            retry_interval: config.retry_interval,
            scan_interval: config.scan_interval,
            scan_on_start: config.scan_on_start,
            queue_capacity: config.queue_capacity,
            enqueue_timeout: config.enqueue_timeout,
            subscriber_buffer: config.subscriber_buffer,
        }
    }
}

impl Default for FaviconSettings {
    fn default() -> Self {
        Self::from(&FaviconConfig::default())
    }
}

impl FaviconSettings {
    pub fn policy(&self) -> FreshnessPolicy {
        FreshnessPolicy {
            refresh_interval: self.refresh_interval,
            retry_interval: self.retry_interval,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct FetchTask {
    site_id: Uuid,
    /// Skip the eligibility re-check on dequeue
    force: bool,
    /// Broadcast even if the bytes did not change
    notify: bool,
}

/// State shared between the manager handle, the worker and the scan
struct Shared {
    store: Arc<dyn SiteFaviconStore>,
    resolver: Arc<dyn FaviconResolver>,
    settings: FaviconSettings,
    in_flight: Arc<DashSet<Uuid>>,
    subscribers: Arc<SubscriberRegistry>,
    sender: mpsc::Sender<FetchTask>,
}

#[derive(Default)]
struct Lifecycle {
    token: Option<CancellationToken>,
    worker: Option<JoinHandle<()>>,
    scheduler: Option<Arc<PeriodicScheduler>>,
}

pub struct SiteFaviconManager {
    shared: Arc<Shared>,
    receiver: Mutex<Option<mpsc::Receiver<FetchTask>>>,
    lifecycle: Mutex<Lifecycle>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl SiteFaviconManager {
    pub fn new(
        store: Arc<dyn SiteFaviconStore>,
        resolver: Arc<dyn FaviconResolver>,
        settings: FaviconSettings,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(settings.queue_capacity.max(1));
        let subscribers = Arc::new(SubscriberRegistry::new(settings.subscriber_buffer));

        Self {
            shared: Arc::new(Shared {
                store,
                resolver,
                settings,
                in_flight: Arc::new(DashSet::new()),
                subscribers,
                sender,
            }),
            receiver: Mutex::new(Some(receiver)),
            lifecycle: Mutex::new(Lifecycle::default()),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &FaviconSettings {
        &self.shared.settings
    }

    /// Launch the worker and the periodic scan under a child of `parent`.
    ///
    /// Must be called from within a Tokio runtime. Only the first call has
    /// any effect, and a stopped manager cannot be restarted.
    pub fn start(&self, parent: &CancellationToken) {
        if self.stopped.load(Ordering::SeqCst) || self.started.swap(true, Ordering::SeqCst) {
            debug!("Favicon manager already started or stopped");
            return;
        }
        let Some(receiver) = self.receiver.lock().take() else {
            return;
        };

        let token = parent.child_token();
        let worker = tokio::spawn(run_worker(self.shared.clone(), receiver, token.clone()));

        let scan_shared = self.shared.clone();
        let scheduler = Arc::new(PeriodicScheduler::new(
            self.shared.settings.scan_interval,
            move |token| {
                let shared = scan_shared.clone();
                async move {
                    shared.scan(&token).await;
                }
            },
        ));
        scheduler.start(&token);
        if self.shared.settings.scan_on_start {
            scheduler.trigger();
        }

        let mut lifecycle = self.lifecycle.lock();
        lifecycle.token = Some(token);
        lifecycle.worker = Some(worker);
        lifecycle.scheduler = Some(scheduler);

        info!(
            "Favicon manager started (scan every {}, refresh after {}, retry after {})",
            humantime::format_duration(self.shared.settings.scan_interval),
            humantime::format_duration(self.shared.settings.refresh_interval),
            humantime::format_duration(self.shared.settings.retry_interval),
        );
    }

    /// Cancel background work, wait for it to exit, then close every
    /// subscription. A fetch already running is allowed to finish.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        let (token, worker, scheduler) = {
            let mut lifecycle = self.lifecycle.lock();
            (
                lifecycle.token.take(),
                lifecycle.worker.take(),
                lifecycle.scheduler.take(),
            )
        };
        // Never started: drop the queue so later enqueues fail fast
        drop(self.receiver.lock().take());

        if let Some(token) = token {
            token.cancel();
        }
        if let Some(scheduler) = scheduler {
            scheduler.stop().await;
        }
        if let Some(worker) = worker
            && let Err(e) = worker.await
        {
            warn!("Favicon worker ended abnormally: {}", e);
        }

        let closed = self.shared.subscribers.close_all();
        info!("Favicon manager stopped ({} subscriptions closed)", closed);
    }

    /// Queue a fetch for `site` if it is due and not already in flight.
    ///
    /// Never blocks: when the queue is full the enqueue is retried in the
    /// background for a bounded time.
    pub fn schedule_fetch(&self, site: &Site) {
        let fetch_state = classify(&site.favicon_state(), Utc::now(), &self.shared.settings.policy());
        if !fetch_state.is_eligible() {
            trace!("Site {} favicon not due ({:?})", site.id, fetch_state);
            return;
        }

        self.shared.enqueue(FetchTask {
            site_id: site.id,
            force: fetch_state.is_forced(),
            notify: true,
        });
    }

    /// Run a staleness scan now instead of waiting for the next interval.
    /// Does nothing unless the manager is running.
    pub fn trigger_scheduled_refresh(&self) {
        let scheduler = self.lifecycle.lock().scheduler.clone();
        match scheduler {
            Some(scheduler) => scheduler.trigger(),
            None => debug!("Favicon manager not running, ignoring refresh trigger"),
        }
    }

    /// Scan every site inline and return how many fetches were queued.
    /// Queues nothing unless the manager is running.
    pub async fn refresh_all(&self) -> usize {
        let token = self.lifecycle.lock().token.clone();
        match token {
            Some(token) if self.is_running() => self.shared.scan(&token).await,
            _ => {
                debug!("Favicon manager not running, ignoring refresh");
                0
            }
        }
    }

    /// Open an event stream; after `stop` the stream is already closed
    pub fn subscribe(&self) -> FaviconSubscription {
        self.shared.subscribers.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.shared.in_flight.len()
    }

    /// No fetch queued or running
    pub fn is_idle(&self) -> bool {
        self.shared.in_flight.is_empty()
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.stopped.load(Ordering::SeqCst)
    }
}

impl Drop for SiteFaviconManager {
    fn drop(&mut self) {
        if let Some(token) = self.lifecycle.get_mut().token.take() {
            token.cancel();
        }
    }
}

impl Shared {
    /// Mark the site in flight and try to queue it without blocking
    fn enqueue(&self, task: FetchTask) -> bool {
        if !self.in_flight.insert(task.site_id) {
            trace!("Favicon fetch for site {} already in flight", task.site_id);
            return false;
        }

        match self.sender.try_send(task) {
            Ok(()) => true,
            Err(TrySendError::Closed(task)) => {
                debug!("Favicon queue closed, dropping fetch for site {}", task.site_id);
                self.in_flight.remove(&task.site_id);
                false
            }
            Err(TrySendError::Full(task)) => {
                let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                    warn!("Favicon queue full and no runtime available, dropping site {}", task.site_id);
                    self.in_flight.remove(&task.site_id);
                    return false;
                };
                let sender = self.sender.clone();
                let timeout = self.settings.enqueue_timeout;
                let in_flight = self.in_flight.clone();
                runtime.spawn(async move {
                    if let Err(e) = sender.send_timeout(task, timeout).await {
                        let task = match e {
                            SendTimeoutError::Timeout(task) | SendTimeoutError::Closed(task) => task,
                        };
                        warn!("Favicon queue saturated, dropping fetch for site {}", task.site_id);
                        in_flight.remove(&task.site_id);
                    }
                });
                true
            }
        }
    }

    /// Queue eligible sites; waits up to the enqueue timeout per site
    async fn scan(&self, token: &CancellationToken) -> usize {
        let states = match self.store.list_favicon_states().await {
            Ok(states) => states,
            Err(e) => {
                warn!("Favicon refresh scan failed to list sites: {}", e);
                return 0;
            }
        };

        let now = Utc::now();
        let policy = self.settings.policy();
        let total = states.len();
        let mut queued = 0;

        for state in states {
            if token.is_cancelled() {
                debug!("Favicon refresh scan interrupted by shutdown");
                break;
            }

            let fetch_state = classify(&state, now, &policy);
            if !fetch_state.is_eligible() {
                continue;
            }
            if !self.in_flight.insert(state.id) {
                continue;
            }

            let task = FetchTask {
                site_id: state.id,
                force: fetch_state.is_forced(),
                notify: fetch_state.is_forced(),
            };
            match self.sender.send_timeout(task, self.settings.enqueue_timeout).await {
                Ok(()) => queued += 1,
                Err(_) => {
                    warn!("Favicon queue saturated during scan, skipping site {}", state.id);
                    self.in_flight.remove(&state.id);
                }
            }
        }

        debug!("Favicon refresh scan queued {} of {} sites", queued, total);
        queued
    }

    async fn process(&self, task: FetchTask) {
        let site = match self.store.find_site(task.site_id).await {
            Ok(Some(site)) => site,
            Ok(None) => {
                debug!("Site {} no longer exists, skipping favicon fetch", task.site_id);
                return;
            }
            Err(e) => {
                warn!("Failed to load site {} for favicon fetch: {}", task.site_id, e);
                return;
            }
        };

        let fetch_state = classify(&site.favicon_state(), Utc::now(), &self.settings.policy());
        if fetch_state == FetchState::MissingOrigin {
            debug!("Site {} has no origin, skipping favicon fetch", site.id);
            return;
        }
        if !task.force && !fetch_state.is_eligible() {
            debug!("Site {} favicon no longer due ({:?})", site.id, fetch_state);
            return;
        }

        let origin = site.allowed_origin.trim().to_string();
        let resolved = self.resolver.resolve_asset(&origin).await;
        let mut update = FaviconUpdate::attempted(origin.clone(), Utc::now());
        match resolved {
            Ok(Some(asset)) => {
                debug!(
                    "Resolved favicon for site {} from {} ({} bytes, {})",
                    site.id,
                    asset.source_url,
                    asset.data.len(),
                    asset.content_type
                );
                update = update.with_asset(asset);
            }
            Ok(None) => debug!("No favicon found for site {} at {}", site.id, origin),
            Err(e) => debug!("Favicon fetch for site {} at {} failed: {}", site.id, origin, e),
        }

        let changed = update
            .fetched
            .as_ref()
            .is_some_and(|fetched| fetched.data != site.favicon_data);

        if let Err(e) = self.store.update_favicon(site.id, &update).await {
            warn!("Failed to persist favicon for site {}: {}", site.id, e);
            return;
        }

        if let Some(fetched) = &update.fetched
            && (task.notify || changed)
        {
            let event = FaviconEvent {
                site_id: site.id,
                favicon_url: favicon_url(site.id, Some(fetched.fetched_at)),
                updated_at: fetched.fetched_at,
            };
            let delivered = self.subscribers.broadcast(&event);
            trace!("Favicon event for site {} delivered to {} subscribers", site.id, delivered);
        }
    }
}

async fn run_worker(
    shared: Arc<Shared>,
    mut receiver: mpsc::Receiver<FetchTask>,
    token: CancellationToken,
) {
    debug!("Favicon worker started");
    loop {
        let task = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            task = receiver.recv() => match task {
                Some(task) => task,
                None => break,
            },
        };

        shared.process(task).await;
        shared.in_flight.remove(&task.site_id);
    }

    // Release sites whose tasks will never run
    receiver.close();
    while let Ok(task) = receiver.try_recv() {
        shared.in_flight.remove(&task.site_id);
    }
    debug!("Favicon worker stopped");
}
