//! Background refresh loop for the odds cache.
//!
//! One loop per coordinator, one pass at a time. A pass refreshes the sports
//! list first, then every sport of interest, pacing secondary fetches and
//! honoring the cache's per-key throttle. Failures are absorbed into the
//! observable status; after too many in a row the loop stops itself.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::{OddsCache, ResourceKey};
use crate::config::RefreshConfig;
use crate::error::{CoordinatorError, FetchError};
use crate::fetch::OddsFetcher;
use crate::models::SportSummary;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    Idle,
    Running,
    Refreshing,
}

/// Snapshot of the coordinator for status display.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshStatus {
    pub phase: RefreshPhase,
    pub is_refreshing: bool,
    pub last_refresh_completed_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    /// Set when the loop gave up after repeated failures; cleared by `start()`.
    pub auto_stopped: bool,
    pub last_error: Option<String>,
}

impl RefreshStatus {
    pub fn is_running(&self) -> bool {
        self.phase != RefreshPhase::Idle
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotRunning,
    AlreadyRefreshing,
    RecentlyRefreshed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    Completed { refreshed: usize, throttled: usize },
    Failed(FetchError),
    Cancelled,
    Skipped(SkipReason),
}

#[derive(Debug, Default)]
struct RefreshState {
    running: bool,
    refreshing: bool,
    last_completed: Option<Instant>,
    last_completed_utc: Option<DateTime<Utc>>,
    consecutive_failures: u32,
    auto_stopped: bool,
    last_error: Option<String>,
}

impl RefreshState {
    fn snapshot(&self) -> RefreshStatus {
        let phase = if self.refreshing {
            RefreshPhase::Refreshing
        } else if self.running {
            RefreshPhase::Running
        } else {
            RefreshPhase::Idle
        };
        RefreshStatus {
            phase,
            is_refreshing: self.refreshing,
            last_refresh_completed_at: self.last_completed_utc,
            consecutive_failures: self.consecutive_failures,
            auto_stopped: self.auto_stopped,
            last_error: self.last_error.clone(),
        }
    }
}

/// Sport keys the consumer has asked about. Shared between the coordinator
/// and read-through callers so that viewed sports get refreshed.
#[derive(Debug, Clone, Default)]
pub struct SportTracker {
    keys: Arc<Mutex<BTreeSet<String>>>,
}

impl SportTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self, sport_key: &str) {
        lock(&self.keys).insert(sport_key.to_string());
    }

    /// Returns whether the key was tracked. A sport that still has an events
    /// entry in the cache stays of interest until that entry is invalidated.
    pub fn untrack(&self, sport_key: &str) -> bool {
        lock(&self.keys).remove(sport_key)
    }

    pub fn contains(&self, sport_key: &str) -> bool {
        lock(&self.keys).contains(sport_key)
    }
}

enum PassError {
    Fetch(FetchError),
    Cancelled,
}

struct Shared<F: OddsFetcher> {
    fetcher: Arc<F>,
    cache: Arc<OddsCache<F::Record>>,
    config: RefreshConfig,
    tracker: SportTracker,
    state: Mutex<RefreshState>,
    cancel: Mutex<CancellationToken>,
    status_tx: watch::Sender<RefreshStatus>,
}

/// Clears the refreshing flag even if the pass future is dropped mid-flight.
struct PassGuard<'a, F: OddsFetcher> {
    shared: &'a Shared<F>,
    armed: bool,
}

impl<F: OddsFetcher> PassGuard<'_, F> {
    fn finish<T>(mut self, record: impl FnOnce(&mut RefreshState) -> T) -> T {
        self.armed = false;
        self.shared.update(|state| {
            state.refreshing = false;
            record(state)
        })
    }
}

impl<F: OddsFetcher> Drop for PassGuard<'_, F> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.update(|state| state.refreshing = false);
        }
    }
}

impl<F: OddsFetcher> Shared<F> {
    fn update<T>(&self, apply: impl FnOnce(&mut RefreshState) -> T) -> T {
        let mut state = lock(&self.state);
        let out = apply(&mut state);
        let snapshot = state.snapshot();
        self.status_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
        out
    }

    fn current_token(&self) -> CancellationToken {
        lock(&self.cancel).clone()
    }

    /// Installs `next` and cancels the token it replaces, reaching passes
    /// started outside the loop as well.
    fn replace_token(&self, next: CancellationToken) {
        let previous = std::mem::replace(&mut *lock(&self.cancel), next);
        previous.cancel();
    }

    async fn run_pass(&self, scheduled: bool, token: &CancellationToken) -> PassOutcome {
        let gate = self.config.active_refresh_interval();
        let acquired = self.update(|state| {
            if scheduled && !state.running {
                return Err(SkipReason::NotRunning);
            }
            if state.refreshing {
                return Err(SkipReason::AlreadyRefreshing);
            }
            if scheduled {
                if let Some(last) = state.last_completed {
                    if last.elapsed() < gate {
                        return Err(SkipReason::RecentlyRefreshed);
                    }
                }
            }
            state.refreshing = true;
            Ok(())
        });
        if let Err(reason) = acquired {
            debug!(?reason, "skipping refresh pass");
            return PassOutcome::Skipped(reason);
        }

        let guard = PassGuard {
            shared: self,
            armed: true,
        };

        match self.execute(token).await {
            Ok((refreshed, throttled)) => {
                guard.finish(|state| {
                    state.consecutive_failures = 0;
                    state.last_completed = Some(Instant::now());
                    state.last_completed_utc = Some(Utc::now());
                    state.last_error = None;
                });
                info!(refreshed, throttled, "refresh pass completed");
                PassOutcome::Completed {
                    refreshed,
                    throttled,
                }
            }
            Err(PassError::Cancelled) => {
                guard.finish(|_| ());
                info!("refresh pass cancelled");
                PassOutcome::Cancelled
            }
            Err(PassError::Fetch(err)) => {
                let max = self.config.max_consecutive_failures.max(1);
                let (failures, gave_up) = guard.finish(|state| {
                    state.consecutive_failures += 1;
                    state.last_error = Some(err.to_string());
                    let gave_up = state.running && state.consecutive_failures >= max;
                    if gave_up {
                        state.running = false;
                        state.auto_stopped = true;
                    }
                    (state.consecutive_failures, gave_up)
                });
                if gave_up {
                    error!(
                        error = %err,
                        failures,
                        "too many refresh failures, stopping background refresh"
                    );
                    token.cancel();
                } else if err.is_transient() {
                    warn!(error = %err, failures, "refresh pass failed, will retry next tick");
                } else {
                    warn!(error = %err, failures, "refresh pass failed with a non-transient error");
                }
                PassOutcome::Failed(err)
            }
        }
    }

    /// Returns (refreshed, throttled) secondary counts.
    async fn execute(&self, token: &CancellationToken) -> Result<(usize, usize), PassError> {
        let sports = match self.cache.sports_if_fresh() {
            Some(sports) => {
                debug!(count = sports.len(), "sports list still fresh");
                sports
            }
            None => {
                let sports = self.guarded(token, self.fetcher.fetch_sports()).await?;
                self.cache.put_sports(sports.clone());
                sports
            }
        };

        let mut refreshed = 0;
        let mut throttled = 0;
        for sport_key in self.sports_of_interest(&sports) {
            if token.is_cancelled() {
                return Err(PassError::Cancelled);
            }
            if self.cache.should_throttle(&ResourceKey::events(sport_key.as_str())) {
                debug!(sport = %sport_key, "throttled, skipping this pass");
                throttled += 1;
                continue;
            }
            if refreshed > 0 {
                self.pause(token).await?;
            }
            let events = self
                .guarded(token, self.fetcher.fetch_events(&sport_key))
                .await?;
            self.cache.put_events(&sport_key, events);
            refreshed += 1;
        }
        Ok((refreshed, throttled))
    }

    /// Sports from the primary list, in list order, that were either tracked
    /// or already fetched at least once.
    fn sports_of_interest(&self, sports: &[SportSummary]) -> Vec<String> {
        let cached: BTreeSet<String> = self.cache.cached_event_keys().into_iter().collect();
        sports
            .iter()
            .filter(|sport| cached.contains(&sport.key) || self.tracker.contains(&sport.key))
            .map(|sport| sport.key.clone())
            .collect()
    }

    async fn guarded<T>(
        &self,
        token: &CancellationToken,
        fetch: impl Future<Output = Result<T, FetchError>>,
    ) -> Result<T, PassError> {
        let timeout = self.config.fetch_timeout();
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(PassError::Cancelled),
            result = tokio::time::timeout(timeout, fetch) => match result {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => Err(PassError::Fetch(err)),
                Err(_) => Err(PassError::Fetch(FetchError::Transport(format!(
                    "fetch timed out after {timeout:?}"
                )))),
            },
        }
    }

    async fn pause(&self, token: &CancellationToken) -> Result<(), PassError> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(PassError::Cancelled),
            _ = tokio::time::sleep(self.config.pacing_delay()) => Ok(()),
        }
    }
}

struct LoopHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl LoopHandle {
    async fn stop(self) -> Result<(), CoordinatorError> {
        self.token.cancel();
        self.join.await.map_err(CoordinatorError::from)
    }
}

/// Drives periodic refresh of an [`OddsCache`] through an [`OddsFetcher`].
pub struct RefreshCoordinator<F: OddsFetcher + 'static> {
    shared: Arc<Shared<F>>,
    task: AsyncMutex<Option<LoopHandle>>,
}

impl<F: OddsFetcher + 'static> RefreshCoordinator<F> {
    pub fn new(fetcher: Arc<F>, cache: Arc<OddsCache<F::Record>>, config: RefreshConfig) -> Self {
        Self::with_tracker(fetcher, cache, config, SportTracker::new())
    }

    pub fn with_tracker(
        fetcher: Arc<F>,
        cache: Arc<OddsCache<F::Record>>,
        config: RefreshConfig,
        tracker: SportTracker,
    ) -> Self {
        let (status_tx, _) = watch::channel(RefreshState::default().snapshot());
        Self {
            shared: Arc::new(Shared {
                fetcher,
                cache,
                config,
                tracker,
                state: Mutex::new(RefreshState::default()),
                cancel: Mutex::new(CancellationToken::new()),
                status_tx,
            }),
            task: AsyncMutex::new(None),
        }
    }

    pub fn cache(&self) -> &Arc<OddsCache<F::Record>> {
        &self.shared.cache
    }

    pub fn tracker(&self) -> &SportTracker {
        &self.shared.tracker
    }

    /// Adds a sport to the set refreshed by every pass.
    pub fn track_sport(&self, sport_key: &str) {
        self.shared.tracker.track(sport_key);
    }

    pub fn untrack_sport(&self, sport_key: &str) -> bool {
        let removed = self.shared.tracker.untrack(sport_key);
        if removed {
            debug!(sport = %sport_key, "sport no longer tracked");
        }
        removed
    }

    /// Starts the loop, first stopping any loop already running. Resets the
    /// failure count and the auto-stop flag. Must be called within a Tokio runtime.
    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if let Some(previous) = task.take() {
            if let Err(err) = previous.stop().await {
                warn!(error = %err, "previous refresh loop ended abnormally");
            }
        }

        let token = CancellationToken::new();
        self.shared.replace_token(token.clone());
        self.shared.update(|state| {
            state.running = true;
            state.consecutive_failures = 0;
            state.auto_stopped = false;
            state.last_error = None;
        });

        let join = tokio::spawn(run_loop(Arc::clone(&self.shared), token.clone()));
        *task = Some(LoopHandle { token, join });
    }

    /// Cancels the loop and waits for it to exit. An in-flight pass, scheduled
    /// or manual, is abandoned at its next suspension point.
    pub async fn stop(&self) {
        if let Err(err) = self.halt().await {
            warn!(error = %err, "refresh loop ended abnormally");
        }
    }

    /// Like [`RefreshCoordinator::stop`], but reports a panicked loop task.
    pub async fn shutdown(&self) -> Result<(), CoordinatorError> {
        self.halt().await
    }

    async fn halt(&self) -> Result<(), CoordinatorError> {
        let mut task = self.task.lock().await;
        self.shared.replace_token(CancellationToken::new());
        let result = match task.take() {
            Some(handle) => handle.stop().await,
            None => Ok(()),
        };

        let was_running = self.shared.update(|state| {
            let was_running = state.running;
            if was_running {
                state.running = false;
                state.consecutive_failures = 0;
                state.last_error = None;
            }
            was_running
        });
        if was_running {
            info!("background refresh stopped");
        }
        result
    }

    /// Host application came to the foreground.
    pub async fn on_foreground(&self) {
        self.start().await;
    }

    /// Host application went to the background.
    pub async fn on_background(&self) {
        self.stop().await;
    }

    /// One scheduled tick: skipped unless running, idle and past the
    /// active-refresh gate.
    pub async fn tick(&self) -> PassOutcome {
        let token = self.shared.current_token();
        self.shared.run_pass(true, &token).await
    }

    /// Runs a pass now, ignoring the active-refresh gate. Still refuses to
    /// overlap a pass in progress.
    pub async fn refresh_now(&self) -> PassOutcome {
        let token = self.shared.current_token();
        self.shared.run_pass(false, &token).await
    }

    pub fn status(&self) -> RefreshStatus {
        self.shared.status_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RefreshStatus> {
        self.shared.status_tx.subscribe()
    }

    pub fn is_refreshing(&self) -> bool {
        self.status().is_refreshing
    }

    pub fn last_refresh_completed_at(&self) -> Option<DateTime<Utc>> {
        self.status().last_refresh_completed_at
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.status().consecutive_failures
    }
}

impl<F: OddsFetcher + 'static> Drop for RefreshCoordinator<F> {
    fn drop(&mut self) {
        self.shared.current_token().cancel();
    }
}

async fn run_loop<F: OddsFetcher + 'static>(shared: Arc<Shared<F>>, token: CancellationToken) {
    let period = shared.config.tick_interval().max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(?period, "background refresh started");

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("refresh loop shutdown requested");
                break;
            }
            _ = ticker.tick() => {
                let outcome = shared.run_pass(true, &token).await;
                if let PassOutcome::Skipped(SkipReason::NotRunning) = outcome {
                    break;
                }
            }
        }
    }
}
