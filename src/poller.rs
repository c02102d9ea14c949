// src/poller.rs
//
// The poll scheduler: one long-lived cooperative loop driving
// authenticate -> fetch -> normalize -> diff -> dispatch, one cycle at a
// time. Cycles never overlap; cancellation is observed at state boundaries.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use metrics::{counter, gauge};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::diff::{self, DiffOptions};
use crate::fetch::{FetchError, SurveySource};
use crate::metrics::ensure_metrics_described;
use crate::model::{QuotaState, Snapshot};
use crate::normalize;
use crate::notify::{self, DeliveryReport, NotificationSink, SubscriptionLookup};
use crate::session::{AuthError, Session, SessionManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    Idle,
    Authenticating,
    Fetching,
    Diffing,
    Dispatching,
    Sleeping,
    Stopped,
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// What one successful cycle did, for logging and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleReport {
    pub surveys: usize,
    pub events: usize,
    pub delivery: DeliveryReport,
}

/// Shared, read-side view of the most recently completed snapshot. The query
/// API reads it without ever blocking on an in-flight cycle; `stale` flips on
/// when the latest cycle failed.
#[derive(Clone, Default)]
pub struct SnapshotStore {
    inner: Arc<RwLock<StoreInner>>,
}

#[derive(Default)]
struct StoreInner {
    snapshot: Option<Snapshot>,
    stale: bool,
}

/// Cloned-out view so callers never hold the lock.
#[derive(Debug, Clone, Default)]
pub struct StoreView {
    pub snapshot: Option<Snapshot>,
    pub stale: bool,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: Snapshot) {
        let mut inner = self.inner.write().expect("rwlock poisoned");
        inner.snapshot = Some(snapshot);
        inner.stale = false;
    }

    pub fn mark_stale(&self) {
        let mut inner = self.inner.write().expect("rwlock poisoned");
        inner.stale = true;
    }

    pub fn current(&self) -> StoreView {
        let inner = self.inner.read().expect("rwlock poisoned");
        StoreView {
            snapshot: inner.snapshot.clone(),
            stale: inner.stale,
        }
    }
}

pub struct PollerOptions {
    pub poll_interval: Duration,
    pub failure_backoff: Duration,
    pub diff: DiffOptions,
}

impl Default for PollerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(120),
            failure_backoff: Duration::from_secs(300),
            diff: DiffOptions::default(),
        }
    }
}

pub struct Poller<S: SurveySource + 'static> {
    sessions: SessionManager,
    source: Arc<S>,
    store: SnapshotStore,
    subscriptions: Arc<dyn SubscriptionLookup>,
    sink: Arc<dyn NotificationSink>,
    opts: PollerOptions,
    phase: PollPhase,
    session: Option<Session>,
    // Previous snapshot, exclusively owned here; replaced atomically after a
    // successful diff, never mutated in place.
    last: Option<Snapshot>,
}

impl<S: SurveySource + 'static> Poller<S> {
    pub fn new(
        sessions: SessionManager,
        source: Arc<S>,
        store: SnapshotStore,
        subscriptions: Arc<dyn SubscriptionLookup>,
        sink: Arc<dyn NotificationSink>,
        opts: PollerOptions,
    ) -> Self {
        Self {
            sessions,
            source,
            store,
            subscriptions,
            sink,
            opts,
            phase: PollPhase::Idle,
            session: None,
            last: None,
        }
    }

    pub fn phase(&self) -> PollPhase {
        self.phase
    }

    /// Run the loop until the shutdown channel flips to `true` (or its sender
    /// goes away). The failure path uses a fixed, longer backoff: the usual
    /// failure mode is "vendor briefly down or session expired", not load.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        ensure_metrics_described();
        loop {
            if *shutdown.borrow() {
                break;
            }

            let sleep_for = match self.run_cycle().await {
                Ok(report) => {
                    tracing::info!(
                        surveys = report.surveys,
                        events = report.events,
                        delivered = report.delivery.delivered,
                        failed = report.delivery.failed,
                        "poll cycle complete"
                    );
                    self.opts.poll_interval
                }
                Err(e) => {
                    tracing::warn!(error = %e, "poll cycle failed, backing off");
                    counter!("poll_failures_total").increment(1);
                    self.store.mark_stale();
                    self.opts.failure_backoff
                }
            };

            self.phase = PollPhase::Sleeping;
            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                res = shutdown.changed() => {
                    if res.is_err() {
                        break;
                    }
                }
            }
        }
        self.phase = PollPhase::Stopped;
        tracing::info!("poller stopped");
    }

    /// One full cycle. Either it reaches dispatching or it errors before any
    /// event is emitted; there is no half-delivered state.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, CycleError> {
        self.phase = PollPhase::Authenticating;
        let session = self.sessions.ensure_valid(self.session.take()).await?;
        self.session = Some(session.clone());

        self.phase = PollPhase::Fetching;
        let raw_surveys = match self.source.fetch_surveys(&session).await {
            Ok(v) => v,
            Err(e) => {
                if e.is_auth_expired() {
                    // Token revoked server-side; force a fresh login next cycle.
                    self.session = None;
                }
                return Err(e.into());
            }
        };

        let mut surveys = BTreeMap::new();
        for (id, raw) in &raw_surveys {
            surveys.insert(id.clone(), normalize::normalize_survey(id, raw));
        }

        // Quota fetches are independent read-only calls; run them
        // concurrently, but the snapshot is assembled only once all finish.
        let mut tasks: JoinSet<(String, Result<Vec<QuotaState>, FetchError>)> = JoinSet::new();
        for id in surveys.keys().cloned() {
            let source = Arc::clone(&self.source);
            let session = session.clone();
            tasks.spawn(async move {
                let res = source
                    .fetch_quotas(&session, &id)
                    .await
                    .map(|raw| raw.iter().map(normalize::normalize_quota).collect());
                (id, res)
            });
        }

        let mut quotas: BTreeMap<String, Vec<QuotaState>> = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, Ok(list))) => {
                    quotas.insert(id, list);
                }
                Ok((id, Err(e))) => {
                    // Partial data beats no data: a failed quota fetch
                    // degrades to an empty list for that survey.
                    tracing::warn!(survey = %id, error = %e, "quota fetch failed");
                    quotas.insert(id, Vec::new());
                }
                Err(e) => {
                    tracing::warn!(error = %e, "quota fetch task panicked");
                }
            }
        }

        self.phase = PollPhase::Diffing;
        let snapshot = Snapshot {
            surveys,
            quotas,
            taken_at: Utc::now(),
        };
        let events = diff::diff(self.last.as_ref(), &snapshot, &self.opts.diff);

        self.store.publish(snapshot.clone());
        self.last = Some(snapshot);

        self.phase = PollPhase::Dispatching;
        let delivery =
            notify::dispatch(&events, self.subscriptions.as_ref(), self.sink.as_ref()).await;

        let report = CycleReport {
            surveys: self.last.as_ref().map(|s| s.surveys.len()).unwrap_or(0),
            events: events.len(),
            delivery,
        };

        counter!("poll_cycles_total").increment(1);
        counter!("change_events_total").increment(report.events as u64);
        gauge!("surveys_active").set(report.surveys as f64);
        gauge!("poll_last_success_ts").set(Utc::now().timestamp().max(0) as f64);

        Ok(report)
    }
}

/// Convenience wrapper used by the binary: spawn the poller on the runtime.
pub fn spawn_poller<S: SurveySource + 'static>(
    poller: Poller<S>,
    shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(poller.run(shutdown))
}
