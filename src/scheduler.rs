//! Poll scheduler: fetch → latest snapshot → seen-log diff → notify, on a timer.
//!
//! One scheduler per source. Cycles of the same scheduler never overlap: the
//! timer loop and `poll_now` both go through the cycle mutex. A failed cycle
//! is logged and counted; the loop always carries on with the next tick.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::cache::{cached_fetch, store_degraded, CacheStore, Namespace, TtlPolicy};
use crate::error::{FetchError, PollError, StoreUnavailable};
use crate::ingest::ids_of;
use crate::ingest::types::{Fetched, Fetcher, Record};
use crate::notify::{DispatchReport, NotifierMux, RecordEvent};
use crate::tracker::{SeenLog, DEFAULT_MAX_SEEN};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    /// Upper bound on one fetch, whatever the fetcher's own timeout is.
    pub fetch_timeout: Duration,
    /// Route fetches through the TTL cache when set.
    pub cache_ttl: Option<TtlPolicy>,
    pub max_seen: usize,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(600),
            fetch_timeout: Duration::from_secs(30),
            cache_ttl: None,
            max_seen: DEFAULT_MAX_SEEN,
        }
    }
}

/// Host "ready" flag. Schedulers do not start polling before it is set.
#[derive(Clone)]
pub struct ReadySignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for ReadySignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadySignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Already-set signal, for hosts with nothing to wait for.
    pub fn ready() -> Self {
        let sig = Self::new();
        sig.mark_ready();
        sig
    }

    pub fn mark_ready(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_ready(&self) -> bool {
        *self.tx.borrow()
    }

    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|ready| *ready).await;
    }
}

/// Everything a scheduler shares with the rest of the process.
#[derive(Clone)]
pub struct WatchContext {
    pub store: Arc<dyn CacheStore>,
    pub notifier: Arc<NotifierMux>,
    pub ready: ReadySignal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    pub fetched: usize,
    pub new_ids: Vec<String>,
    pub cache_hit: bool,
    pub delivered: usize,
    pub failed_deliveries: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceStatus {
    pub name: String,
    pub running: bool,
    pub interval_secs: u64,
    pub cycles: u64,
    pub failures: u64,
    pub new_records: u64,
    pub seen: usize,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

struct PollState {
    seen: SeenLog,
    restored: bool,
}

#[derive(Clone)]
pub struct PollScheduler {
    fetcher: Arc<dyn Fetcher>,
    ctx: WatchContext,
    settings: PollSettings,
    ns: Namespace,
    state: Arc<Mutex<PollState>>,
    status: Arc<RwLock<SourceStatus>>,
}

impl PollScheduler {
    pub fn new(fetcher: Arc<dyn Fetcher>, ctx: WatchContext, settings: PollSettings) -> Self {
        let ns = Namespace::new(fetcher.name());
        let status = SourceStatus {
            name: ns.as_str().to_string(),
            interval_secs: settings.interval.as_secs(),
            ..SourceStatus::default()
        };
        Self {
            state: Arc::new(Mutex::new(PollState {
                seen: SeenLog::new(settings.max_seen),
                restored: false,
            })),
            status: Arc::new(RwLock::new(status)),
            fetcher,
            ctx,
            settings,
            ns,
        }
    }

    pub fn name(&self) -> &str {
        self.ns.as_str()
    }

    pub fn status(&self) -> SourceStatus {
        match self.status.read() {
            Ok(s) => s.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    /// Last stored snapshot of this source's records (JSON array).
    pub async fn latest_snapshot(&self) -> Result<Option<String>, StoreUnavailable> {
        self.ctx.store.get(&self.ns.key("latest")).await
    }

    fn update_status(&self, f: impl FnOnce(&mut SourceStatus)) {
        match self.status.write() {
            Ok(mut s) => f(&mut s),
            Err(poison) => f(&mut poison.into_inner()),
        }
    }

    /// Run one full cycle now. Waits for an in-flight cycle to finish first.
    ///
    /// Refused with [`PollError::NotReady`] until the host marks itself ready,
    /// so nothing reaches the sinks before that.
    pub async fn poll_once(&self) -> Result<CycleReport, PollError> {
        crate::metrics::ensure_described();
        if !self.ctx.ready.is_ready() {
            return Err(PollError::NotReady {
                feed: self.ns.as_str().to_string(),
            });
        }
        let mut state = self.state.lock().await;

        let source = self.ns.as_str().to_string();
        let started = Utc::now();
        counter!("poll_cycles_total", "source" => source.clone()).increment(1);
        gauge!("poll_last_run_ts", "source" => source.clone()).set(started.timestamp() as f64);
        self.update_status(|s| {
            s.cycles += 1;
            s.last_run_at = Some(started);
        });

        let (fetched, cache_hit) = match self.fetch().await {
            Ok(v) => v,
            Err(err) => {
                counter!("poll_errors_total", "kind" => err.kind()).increment(1);
                tracing::warn!(
                    target: "feedwatch::poll",
                    source = %source,
                    kind = err.kind(),
                    error = %err,
                    "poll cycle aborted"
                );
                let err = PollError::Fetch { feed: source, err };
                let msg = err.to_string();
                self.update_status(|s| {
                    s.failures += 1;
                    s.last_error = Some(msg);
                });
                return Err(err);
            }
        };

        self.store_latest(&fetched.records).await;
        if !state.restored {
            self.restore_seen(&mut state).await;
        }

        let new_ids = state.seen.diff_and_update(&ids_of(&fetched.records));
        self.persist_seen(&state.seen).await;

        let report = self.dispatch(&source, &fetched.records, &new_ids).await;

        counter!("poll_new_records_total", "source" => source.clone())
            .increment(new_ids.len() as u64);
        let seen_len = state.seen.len();
        let new_count = new_ids.len() as u64;
        self.update_status(|s| {
            s.new_records += new_count;
            s.seen = seen_len;
            s.last_success_at = Some(Utc::now());
            s.last_error = None;
        });

        tracing::debug!(
            target: "feedwatch::poll",
            source = %source,
            fetched = fetched.records.len(),
            new = new_ids.len(),
            cache_hit,
            "poll cycle done"
        );

        Ok(CycleReport {
            fetched: fetched.records.len(),
            new_ids,
            cache_hit,
            delivered: report.delivered,
            failed_deliveries: report.failed,
        })
    }

    async fn fetch(&self) -> Result<(Fetched, bool), FetchError> {
        let fut = async {
            match &self.settings.cache_ttl {
                Some(ttl) => {
                    let key = self.ns.key(&self.fetcher.cache_resource());
                    cached_fetch(self.ctx.store.as_ref(), &key, self.fetcher.as_ref(), ttl)
                        .await
                        .map(|c| (c.fetched, c.hit))
                }
                None => self.fetcher.fetch().await.map(|f| (f, false)),
            }
        };

        tokio::time::timeout(self.settings.fetch_timeout, fut)
            .await
            .map_err(|_| {
                FetchError::Network(format!(
                    "fetch timed out after {}s",
                    self.settings.fetch_timeout.as_secs()
                ))
            })?
    }

    async fn store_latest(&self, records: &[Record]) {
        let key = self.ns.key("latest");
        let json = match serde_json::to_string(records) {
            Ok(j) => j,
            Err(e) => {
                tracing::warn!(source = %self.ns.as_str(), error = %e, "latest snapshot not serializable");
                return;
            }
        };
        if let Err(e) = self.bounded(self.ctx.store.set_forever(&key, &json)).await {
            store_degraded(&key, &e);
        }
    }

    // Store calls share the fetch bound; a stalled store must not pin the cycle lock.
    async fn bounded<T>(
        &self,
        op: impl std::future::Future<Output = Result<T, StoreUnavailable>>,
    ) -> Result<T, StoreUnavailable> {
        tokio::time::timeout(self.settings.fetch_timeout, op)
            .await
            .map_err(|_| {
                StoreUnavailable(format!(
                    "store call timed out after {}s",
                    self.settings.fetch_timeout.as_secs()
                ))
            })?
    }

    async fn restore_seen(&self, state: &mut PollState) {
        let key = self.ns.key("seen");
        match self.bounded(self.ctx.store.get(&key)).await {
            Ok(Some(json)) => match SeenLog::from_json(&json, self.settings.max_seen) {
                Ok(log) => {
                    tracing::info!(source = %self.ns.as_str(), ids = log.len(), "seen log restored");
                    state.seen = log;
                }
                Err(e) => {
                    tracing::warn!(source = %self.ns.as_str(), error = %e, "stored seen log unreadable, starting fresh");
                }
            },
            Ok(None) => {}
            Err(e) => store_degraded(&key, &e),
        }
        state.restored = true;
    }

    async fn persist_seen(&self, seen: &SeenLog) {
        let key = self.ns.key("seen");
        let json = seen.to_json();
        if let Err(e) = self.bounded(self.ctx.store.set_forever(&key, &json)).await {
            store_degraded(&key, &e);
        }
    }

    async fn dispatch(&self, source: &str, records: &[Record], new_ids: &[String]) -> DispatchReport {
        let mut by_id: HashMap<&str, &Record> = HashMap::with_capacity(records.len());
        for r in records {
            by_id.entry(r.id.as_str()).or_insert(r);
        }

        let detected_at = Utc::now();
        let mut report = DispatchReport::default();
        for id in new_ids {
            let Some(record) = by_id.get(id.as_str()) else {
                continue;
            };
            let ev = RecordEvent {
                source: source.to_string(),
                record: (*record).clone(),
                detected_at,
            };
            report.merge(self.ctx.notifier.dispatch(&ev).await);
        }
        report
    }

    /// Spawn the timer loop. Polling begins once the ready signal is set.
    pub fn start(self) -> SchedulerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let join = tokio::spawn(self.clone().run(stop_rx));
        SchedulerHandle {
            scheduler: self,
            stop_tx,
            join,
        }
    }

    async fn run(self, mut stop_rx: watch::Receiver<bool>) {
        let source = self.ns.as_str().to_string();

        tokio::select! {
            _ = self.ctx.ready.wait() => {}
            _ = stop_requested(&mut stop_rx) => {
                tracing::info!(source = %source, "poll scheduler stopped before ready");
                return;
            }
        }

        let mut ticker = interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.update_status(|s| s.running = true);
        tracing::info!(
            source = %source,
            interval_secs = self.settings.interval.as_secs(),
            "poll scheduler started"
        );

        loop {
            tokio::select! {
                biased;
                _ = stop_requested(&mut stop_rx) => break,
                _ = ticker.tick() => {}
            }
            // failures are logged and counted inside
            let _ = self.poll_once().await;
        }

        self.update_status(|s| s.running = false);
        tracing::info!(source = %source, "poll scheduler stopped");
    }
}

// A dropped sender counts as a stop request.
async fn stop_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Owner side of a running scheduler.
pub struct SchedulerHandle {
    scheduler: PollScheduler,
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn scheduler(&self) -> &PollScheduler {
        &self.scheduler
    }

    pub async fn poll_now(&self) -> Result<CycleReport, PollError> {
        self.scheduler.poll_once().await
    }

    pub fn status(&self) -> SourceStatus {
        self.scheduler.status()
    }

    /// Ask the loop to stop; an in-flight cycle still completes.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Stop and wait for the loop to exit.
    pub async fn shutdown(self) {
        self.stop();
        if let Err(e) = self.join.await {
            tracing::warn!(source = %self.scheduler.name(), error = %e, "poll task ended abnormally");
        }
    }
}
