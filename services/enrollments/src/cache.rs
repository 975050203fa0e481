//! In-process cache around the unification pass.
//!
//! ```text
//! get() ──► snapshot fresh?  ──yes──► Arc<EnrollmentSnapshot>
//!              │ soft expired ─────► spawn refresh (if none), serve current
//!              │ empty / invalidated / hard expired
//!              ▼
//!          join in-flight refresh or start one ──► await (bounded) ──► new snapshot
//!                                                     │ timeout
//!                                                     ▼
//!                                               stale copy or RefreshTimedOut
//! ```
//!
//! - **Single flight**: at most one refresh runs at a time; every caller that
//!   needs it awaits the same [`Shared`] future and receives the same `Arc`.
//! - **Single writer**: only the refresh task stores into the snapshot slot.
//!   Readers load it through [`ArcSwapOption`] and never observe a partial swap.
//! - Refreshes run as spawned tasks, so a caller giving up on the await never
//!   cancels the pass.
//! - An invalidation that lands while a pass is running may postdate that
//!   pass's reads. The running pass then leaves the view invalidated and starts
//!   one follow-up pass as it finishes; readers waiting on the view await both.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::repository::{EnrollmentSource, InvalidationPort};
use crate::domain::types::{CanonicalEnrollment, EnrollmentStats};
use crate::error::EnrollmentsError;

/// Timing rules for the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Past this age a read waits for a new pass.
    pub ttl: Duration,
    /// Past this age a read triggers a background pass but is served the current copy.
    pub soft_ttl: Duration,
    /// Longest a read waits on an in-flight pass before falling back to the stale copy.
    pub await_timeout: Duration,
}

impl CachePolicy {
    pub fn new(ttl: Duration, soft_ttl: Duration, await_timeout: Duration) -> Self {
        Self {
            ttl,
            soft_ttl: soft_ttl.min(ttl),
            await_timeout,
        }
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(300),
            Duration::from_secs(240),
            Duration::from_secs(30),
        )
    }
}

/// One immutable result of a unification pass.
#[derive(Debug)]
pub struct EnrollmentSnapshot {
    pub enrollments: Vec<CanonicalEnrollment>,
    pub stats: EnrollmentStats,
    pub refreshed_at: Instant,
}

impl EnrollmentSnapshot {
    fn new(enrollments: Vec<CanonicalEnrollment>) -> Self {
        let stats = EnrollmentStats::from_enrollments(&enrollments);
        Self {
            enrollments,
            stats,
            refreshed_at: Instant::now(),
        }
    }

    pub fn age(&self) -> Duration {
        self.refreshed_at.elapsed()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheState {
    /// Nothing servable: never warmed, invalidated, or past the hard TTL.
    Empty,
    Warm,
    /// Serving the current copy while a background pass replaces it.
    StaleServing,
    /// A pass is running and readers are waiting on it.
    Refreshing,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheCounters {
    pub refreshes: u64,
    pub failures: u64,
    pub invalidations: u64,
    /// Invalidations that arrived while a pass was already running.
    pub coalesced_invalidations: u64,
}

type RefreshResult = Result<Arc<EnrollmentSnapshot>, Arc<EnrollmentsError>>;
type RefreshFuture = Shared<BoxFuture<'static, RefreshResult>>;

struct InFlight {
    generation: u64,
    /// `Inner::invalidation_epoch` when the pass started.
    epoch: u64,
    future: RefreshFuture,
}

#[derive(Default)]
struct Inner {
    invalidated: bool,
    invalidation_epoch: u64,
    in_flight: Option<InFlight>,
    next_generation: u64,
    shut_down: bool,
}

#[derive(Default)]
struct Counters {
    refreshes: AtomicU64,
    failures: AtomicU64,
    invalidations: AtomicU64,
    coalesced_invalidations: AtomicU64,
}

struct Core<E> {
    source: E,
    policy: CachePolicy,
    snapshot: ArcSwapOption<EnrollmentSnapshot>,
    inner: Mutex<Inner>,
    counters: Counters,
    runtime: Handle,
}

// ── UnifiedViewCache ─────────────────────────────────────────────────────────

pub struct UnifiedViewCache<E: EnrollmentSource> {
    core: Arc<Core<E>>,
    cancel: CancellationToken,
    keep_warm: Mutex<Option<JoinHandle<()>>>,
}

impl<E: EnrollmentSource> UnifiedViewCache<E> {
    /// Must be called from within a tokio runtime; refreshes are spawned onto it.
    pub fn new(source: E, policy: CachePolicy) -> Self {
        Self {
            core: Arc::new(Core {
                source,
                policy,
                snapshot: ArcSwapOption::empty(),
                inner: Mutex::new(Inner::default()),
                counters: Counters::default(),
                runtime: Handle::current(),
            }),
            cancel: CancellationToken::new(),
            keep_warm: Mutex::new(None),
        }
    }

    pub fn source(&self) -> &E {
        &self.core.source
    }

    /// The unified set, refreshed according to the policy.
    pub async fn get(&self) -> Result<Arc<EnrollmentSnapshot>, EnrollmentsError> {
        let policy = self.core.policy;
        let (pending, stale) = {
            let mut inner = self.core.lock();
            if inner.shut_down {
                return Err(EnrollmentsError::ShutDown);
            }
            let current = self.core.snapshot.load_full();
            if let Some(snapshot) = current.as_ref().filter(|_| !inner.invalidated) {
                let age = snapshot.age();
                if age < policy.soft_ttl {
                    return Ok(snapshot.clone());
                }
                if age < policy.ttl {
                    if inner.in_flight.is_none() {
                        debug!(
                            age_ms = age.as_millis() as u64,
                            "soft ttl elapsed, refreshing in background"
                        );
                        self.core.start_background_refresh(&mut inner);
                    }
                    return Ok(snapshot.clone());
                }
            }
            (self.core.join_or_start(&mut inner), current)
        };

        match tokio::time::timeout(policy.await_timeout, pending).await {
            Ok(Ok(snapshot)) => Ok(snapshot),
            Ok(Err(e)) => Err(EnrollmentsError::RefreshFailed(e)),
            Err(_) => match stale {
                Some(snapshot) => {
                    warn!(
                        timeout_ms = policy.await_timeout.as_millis() as u64,
                        age_ms = snapshot.age().as_millis() as u64,
                        "refresh still running, serving stale enrollments"
                    );
                    Ok(snapshot)
                }
                None => Err(EnrollmentsError::RefreshTimedOut),
            },
        }
    }

    /// Mark the view stale and start a refresh right away. When a pass is
    /// already running, a single follow-up pass starts once it finishes.
    pub fn invalidate(&self) {
        let mut inner = self.core.lock();
        if inner.shut_down {
            debug!("invalidation after shutdown ignored");
            return;
        }
        inner.invalidated = true;
        inner.invalidation_epoch += 1;
        self.core.counters.invalidations.fetch_add(1, Ordering::Relaxed);
        if inner.in_flight.is_some() {
            self.core
                .counters
                .coalesced_invalidations
                .fetch_add(1, Ordering::Relaxed);
            debug!("refresh already in flight, follow-up pass queued");
            return;
        }
        debug!("unified enrollments invalidated, refreshing");
        self.core.start_background_refresh(&mut inner);
    }

    /// Run a pass now, joining one already in flight. Not bounded by the await timeout.
    pub async fn warm_up(&self) -> Result<Arc<EnrollmentSnapshot>, EnrollmentsError> {
        let pending = {
            let mut inner = self.core.lock();
            if inner.shut_down {
                return Err(EnrollmentsError::ShutDown);
            }
            self.core.join_or_start(&mut inner)
        };
        pending.await.map_err(EnrollmentsError::RefreshFailed)
    }

    /// Await the pass currently in flight, if any, and its follow-up pass.
    pub async fn wait_for_refresh(
        &self,
    ) -> Result<Option<Arc<EnrollmentSnapshot>>, EnrollmentsError> {
        let pending = {
            let inner = self.core.lock();
            self.core.current_pass(&inner)
        };
        match pending {
            Some(future) => future
                .await
                .map(Some)
                .map_err(EnrollmentsError::RefreshFailed),
            None => Ok(None),
        }
    }

    /// The copy currently held, regardless of age.
    pub fn snapshot(&self) -> Option<Arc<EnrollmentSnapshot>> {
        self.core.snapshot.load_full()
    }

    pub fn stats(&self) -> Option<EnrollmentStats> {
        self.core
            .snapshot
            .load_full()
            .map(|snapshot| snapshot.stats.clone())
    }

    pub fn counters(&self) -> CacheCounters {
        let c = &self.core.counters;
        CacheCounters {
            refreshes: c.refreshes.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
            invalidations: c.invalidations.load(Ordering::Relaxed),
            coalesced_invalidations: c.coalesced_invalidations.load(Ordering::Relaxed),
        }
    }

    pub fn state(&self) -> CacheState {
        let inner = self.core.lock();
        let refreshing = inner.in_flight.is_some();
        match self.core.snapshot.load_full() {
            Some(snapshot) if !inner.invalidated && snapshot.age() < self.core.policy.ttl => {
                if refreshing {
                    CacheState::StaleServing
                } else {
                    CacheState::Warm
                }
            }
            _ if refreshing => CacheState::Refreshing,
            _ => CacheState::Empty,
        }
    }

    /// Refresh on a fixed interval whenever the copy is missing, invalidated or
    /// past the soft TTL. Replaces a previously started task.
    pub fn spawn_keep_warm(&self, every: Duration) {
        if every.is_zero() {
            debug!("keep-warm disabled");
            return;
        }
        let core = self.core.clone();
        let cancel = self.cancel.clone();
        let task = self.core.runtime.spawn(async move {
            info!(interval_secs = every.as_secs(), "keep-warm started");
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let Some(pending) = core.refresh_if_due() else {
                    continue;
                };
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = pending => {
                        if let Err(e) = result {
                            warn!(error = %e, "keep-warm refresh failed");
                        }
                    }
                }
            }
            info!("keep-warm stopped");
        });
        let previous = self
            .keep_warm
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Stop keep-warm and wait for any running pass. Later calls return `ShutDown`.
    pub async fn shutdown(&self) {
        let pending = {
            let mut inner = self.core.lock();
            inner.shut_down = true;
            inner
                .in_flight
                .as_ref()
                .map(|in_flight| in_flight.future.clone())
        };
        self.cancel.cancel();
        let keep_warm = self
            .keep_warm
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = keep_warm {
            if let Err(e) = task.await {
                warn!(error = %e, "keep-warm task ended abnormally");
            }
        }
        if let Some(future) = pending {
            let _ = future.await;
        }
        info!("unified enrollments cache shut down");
    }
}

impl<E: EnrollmentSource> InvalidationPort for UnifiedViewCache<E> {
    fn invalidate(&self) {
        UnifiedViewCache::invalidate(self)
    }
}

impl<E: EnrollmentSource> Core<E> {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn join_or_start(self: &Arc<Self>, inner: &mut Inner) -> BoxFuture<'static, RefreshResult> {
        match self.current_pass(inner) {
            Some(pending) => pending,
            None => self.start_refresh(inner).boxed(),
        }
    }

    /// The in-flight pass. When it started before the latest invalidation, the
    /// returned future also awaits the follow-up pass it hands over to.
    fn current_pass(self: &Arc<Self>, inner: &Inner) -> Option<BoxFuture<'static, RefreshResult>> {
        let in_flight = inner.in_flight.as_ref()?;
        let running = in_flight.future.clone();
        if in_flight.epoch == inner.invalidation_epoch {
            return Some(running.boxed());
        }
        let core = self.clone();
        Some(
            async move {
                let result = running.await;
                let follow_up = core
                    .lock()
                    .in_flight
                    .as_ref()
                    .map(|in_flight| in_flight.future.clone());
                match follow_up {
                    Some(future) => future.await,
                    // Shut down before the follow-up could start.
                    None => result,
                }
            }
            .boxed(),
        )
    }

    /// The spawned task runs to completion whether or not anyone awaits it.
    fn start_background_refresh(self: &Arc<Self>, inner: &mut Inner) {
        let _ = self.start_refresh(inner);
    }

    /// Spawn a pass and register it as the in-flight refresh. Callers hold the
    /// lock and have checked that nothing is in flight.
    fn start_refresh(self: &Arc<Self>, inner: &mut Inner) -> RefreshFuture {
        let generation = inner.next_generation;
        inner.next_generation += 1;
        let epoch = inner.invalidation_epoch;

        let task = self.runtime.spawn(self.clone().run_refresh(generation, epoch));
        let core = self.clone();
        let future = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    // The task never reached its own cleanup.
                    core.counters.failures.fetch_add(1, Ordering::Relaxed);
                    core.clear_in_flight(generation);
                    error!(generation, error = %e, "unified enrollments refresh task aborted");
                    Err(Arc::new(EnrollmentsError::Internal(anyhow::anyhow!(
                        "refresh task aborted: {e}"
                    ))))
                }
            }
        }
        .boxed()
        .shared();

        inner.in_flight = Some(InFlight {
            generation,
            epoch,
            future: future.clone(),
        });
        future
    }

    async fn run_refresh(self: Arc<Self>, generation: u64, epoch: u64) -> RefreshResult {
        let started = Instant::now();
        let result = match self.source.unify().await {
            Ok(enrollments) => {
                let snapshot = Arc::new(EnrollmentSnapshot::new(enrollments));
                self.snapshot.store(Some(snapshot.clone()));
                self.counters.refreshes.fetch_add(1, Ordering::Relaxed);
                info!(
                    generation,
                    total = snapshot.stats.total,
                    from_legacy = snapshot.stats.from_legacy,
                    from_normalized = snapshot.stats.from_normalized,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "unified enrollments refreshed"
                );
                Ok(snapshot)
            }
            Err(e) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    generation,
                    error = %e.root(),
                    kind = e.kind(),
                    kept_previous = self.snapshot.load_full().is_some(),
                    "unified enrollments refresh failed"
                );
                Err(Arc::new(e))
            }
        };

        let mut inner = self.lock();
        let invalidated_mid_pass = inner.invalidation_epoch != epoch;
        if result.is_ok() && !invalidated_mid_pass {
            inner.invalidated = false;
        }
        if inner
            .in_flight
            .as_ref()
            .is_some_and(|in_flight| in_flight.generation == generation)
        {
            inner.in_flight = None;
            if invalidated_mid_pass && !inner.shut_down {
                debug!(generation, "invalidated while refreshing, starting follow-up pass");
                self.start_background_refresh(&mut inner);
            }
        }
        result
    }

    fn clear_in_flight(&self, generation: u64) {
        let mut inner = self.lock();
        if inner
            .in_flight
            .as_ref()
            .is_some_and(|in_flight| in_flight.generation == generation)
        {
            inner.in_flight = None;
        }
    }

    /// The keep-warm check: a refresh future when the copy needs one and no pass is running.
    fn refresh_if_due(self: &Arc<Self>) -> Option<RefreshFuture> {
        let mut inner = self.lock();
        if inner.shut_down || inner.in_flight.is_some() {
            return None;
        }
        let due = match self.snapshot.load_full() {
            Some(snapshot) => inner.invalidated || snapshot.age() >= self.policy.soft_ttl,
            None => true,
        };
        due.then(|| self.start_refresh(&mut inner))
    }
}
