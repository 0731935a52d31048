//! Fixed-interval poll cycle: fetch → extract → normalize → classify → dedup → deliver.
//!
//! - At most one cycle runs at a time; a tick that fires mid-cycle is dropped.
//! - No cycle failure escapes to the caller; each run ends in a `CycleReport`.
//! - A missing credential or unresolvable channel ends the cycle before any fetch.

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, Local};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::{
    classify::classify,
    credentials::CredentialSource,
    dedup::DedupStore,
    dispatch::Dispatcher,
    domain::{ChatId, NotificationId},
    errors::Error,
    extract::extract_notifications,
    messaging::port::MessagingPort,
    normalize::normalize,
    source::FeedSource,
    watchlist::WatchlistSource,
};

/// Collaborators of the pipeline, injected once at startup.
#[derive(Clone)]
pub struct PipelineDeps {
    pub credentials: Arc<dyn CredentialSource>,
    pub source: Arc<dyn FeedSource>,
    pub messenger: Arc<dyn MessagingPort>,
    pub dedup: Arc<dyn DedupStore>,
    pub watchlist: Arc<dyn WatchlistSource>,
}

#[derive(Clone, Debug)]
pub struct PollSettings {
    pub chat_id: ChatId,
    pub interval: Duration,
    pub base_url: String,
    pub footer: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed,
    NotAuthenticated,
    ChannelUnavailable(String),
    FetchFailed(String),
}

#[derive(Clone, Debug)]
pub struct CycleReport {
    pub started_at: DateTime<Local>,
    pub outcome: CycleOutcome,
    pub extracted: usize,
    pub delivered: usize,
    pub already_delivered: usize,
    pub filtered: usize,
    pub failed: usize,
    /// Delivered, but the dedup write failed.
    pub unrecorded: usize,
}

impl CycleReport {
    fn new(outcome: CycleOutcome) -> Self {
        Self {
            started_at: Local::now(),
            outcome,
            extracted: 0,
            delivered: 0,
            already_delivered: 0,
            filtered: 0,
            failed: 0,
            unrecorded: 0,
        }
    }
}

#[derive(Clone)]
pub struct PollController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    deps: PipelineDeps,
    settings: PollSettings,
    dispatcher: Dispatcher,
    running: AtomicBool,
    cycles: AtomicU64,
    last_report: tokio::sync::Mutex<Option<CycleReport>>,
    /// Sent during this process lifetime, but the dedup write failed.
    unrecorded: tokio::sync::Mutex<HashSet<NotificationId>>,
}

/// Clears the running flag when the cycle ends, including on panic.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl PollController {
    pub fn new(deps: PipelineDeps, settings: PollSettings) -> Self {
        let dispatcher = Dispatcher::new(
            deps.source.clone(),
            deps.messenger.clone(),
            deps.dedup.clone(),
            settings.chat_id,
            settings.footer.clone(),
        );
        Self {
            inner: Arc::new(ControllerInner {
                deps,
                settings,
                dispatcher,
                running: AtomicBool::new(false),
                cycles: AtomicU64::new(0),
                last_report: tokio::sync::Mutex::new(None),
                unrecorded: tokio::sync::Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn settings(&self) -> &PollSettings {
        &self.inner.settings
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn cycles_run(&self) -> u64 {
        self.inner.cycles.load(Ordering::SeqCst)
    }

    pub async fn last_report(&self) -> Option<CycleReport> {
        self.inner.last_report.lock().await.clone()
    }

    /// Run one cycle unless one is already in flight (`None`).
    pub async fn try_run_cycle(&self) -> Option<CycleReport> {
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }
        let _guard = RunningGuard(&self.inner.running);

        let report = self.run_cycle().await;
        self.inner.cycles.fetch_add(1, Ordering::SeqCst);
        log_report(&report);
        *self.inner.last_report.lock().await = Some(report.clone());
        Some(report)
    }

    /// Spawn the interval loop. The first cycle runs immediately.
    pub fn spawn(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let controller = self.clone();
        tokio::spawn(async move { controller.interval_loop(cancel).await })
    }

    async fn interval_loop(&self, cancel: CancellationToken) {
        let mut tick = tokio::time::interval(self.inner.settings.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(
            interval_secs = self.inner.settings.interval.as_secs(),
            "poll loop started"
        );

        loop {
            tokio::select! {
              _ = cancel.cancelled() => break,
              _ = tick.tick() => {
                // Own task so a panic inside the cycle cannot end the loop.
                let controller = self.clone();
                match tokio::spawn(async move { controller.try_run_cycle().await }).await {
                  Ok(Some(_)) => {}
                  Ok(None) => tracing::info!("previous cycle still running; tick skipped"),
                  Err(e) => tracing::error!(error = %e, "poll cycle aborted"),
                }
              }
            }
        }

        tracing::info!("poll loop stopped");
    }

    async fn run_cycle(&self) -> CycleReport {
        let deps = &self.inner.deps;
        let settings = &self.inner.settings;

        let cred = match deps.credentials.load() {
            Ok(Some(cred)) => cred,
            Ok(None) => return CycleReport::new(CycleOutcome::NotAuthenticated),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read session credential");
                return CycleReport::new(CycleOutcome::NotAuthenticated);
            }
        };

        if let Err(e) = deps.messenger.check_channel(settings.chat_id).await {
            return CycleReport::new(CycleOutcome::ChannelUnavailable(e.to_string()));
        }

        let page = match deps.source.fetch_feed(&cred).await {
            Ok(page) => page,
            Err(Error::NotAuthenticated) => {
                return CycleReport::new(CycleOutcome::NotAuthenticated)
            }
            Err(e) => return CycleReport::new(CycleOutcome::FetchFailed(e.to_string())),
        };

        let items = extract_notifications(&page);
        let watchlist = deps.watchlist.load();
        let mut report = CycleReport::new(CycleOutcome::Completed);
        report.extracted = items.len();

        let mut handled = HashSet::new();
        for raw in &items {
            if !handled.insert(raw.id.clone()) {
                continue;
            }

            let notif = normalize(raw, &settings.base_url);
            if notif.text.is_empty() {
                tracing::debug!(notif_id = %notif.id, "entry without text skipped");
                report.filtered += 1;
                continue;
            }
            let classification = classify(&notif.text, &watchlist);
            if !classification.should_deliver {
                report.filtered += 1;
                continue;
            }

            if self.settle_unrecorded(&notif.id).await {
                report.already_delivered += 1;
                continue;
            }

            match deps.dedup.is_delivered(&notif.id).await {
                Ok(true) => {
                    report.already_delivered += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(notif_id = %notif.id, error = %e, "dedup lookup failed; skipping entry this cycle");
                    report.failed += 1;
                    continue;
                }
            }

            match self
                .inner
                .dispatcher
                .deliver(&cred, &notif, classification)
                .await
            {
                Ok(delivery) => {
                    tracing::info!(
                        notif_id = %notif.id,
                        severity = classification.severity.label(),
                        thumbnail = delivery.with_thumbnail,
                        "notification delivered"
                    );
                    report.delivered += 1;
                    if !delivery.committed {
                        report.unrecorded += 1;
                        self.inner.unrecorded.lock().await.insert(notif.id.clone());
                    }
                }
                Err(e) => {
                    tracing::warn!(notif_id = %notif.id, error = %e, "delivery failed; will retry next cycle");
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// True when `id` was already sent by this process; retries its dedup write
    /// instead of sending it again.
    async fn settle_unrecorded(&self, id: &NotificationId) -> bool {
        let mut pending = self.inner.unrecorded.lock().await;
        if !pending.contains(id) {
            return false;
        }
        match self.inner.deps.dedup.mark_delivered(id).await {
            Ok(_) => {
                pending.remove(id);
                tracing::info!(notif_id = %id, "recorded earlier delivery");
            }
            Err(e) => tracing::warn!(notif_id = %id, error = %e, "dedup write still failing"),
        }
        true
    }
}

fn log_report(report: &CycleReport) {
    match &report.outcome {
        CycleOutcome::Completed => tracing::info!(
            extracted = report.extracted,
            delivered = report.delivered,
            already_delivered = report.already_delivered,
            filtered = report.filtered,
            failed = report.failed,
            "poll cycle completed"
        ),
        CycleOutcome::NotAuthenticated => {
            tracing::warn!("poll cycle skipped: not authenticated against the source site")
        }
        CycleOutcome::ChannelUnavailable(e) => {
            tracing::warn!(error = %e, "poll cycle skipped: destination channel unavailable")
        }
        CycleOutcome::FetchFailed(e) => tracing::warn!(error = %e, "poll cycle failed: feed fetch"),
    }
}
