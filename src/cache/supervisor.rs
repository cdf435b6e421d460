/// the cache supervisor: one active backend, one reconcile cycle at a time.
///
/// the published pair `(kind, backend)` is a single `Arc<ActiveBackend>`
/// behind a read/write lock.  Readers hold the lock only long enough to clone
/// the `Arc`; the reconcile cycle is the only writer.  A cycle builds the new
/// backend first and only then replaces the pointer, so a reader sees either
/// the old pair or the new one and never a backend that failed to build.
///
/// the background handler ticks at a fixed rate and spawns each cycle as its
/// own task.  A tick that finds a cycle still running is skipped, and shutdown
/// cancels an in-flight cycle rather than waiting for its probe.
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_channel::{bounded, Receiver, Sender};
use async_std::future;
use async_std::task::{self, JoinHandle};
use chrono::{DateTime, Utc};
use domain_keys::keys::RouteKey;
use log::*;
use parking_lot::RwLock;
use service_uptime::Uptime;

use super::facade::CacheFacade;
use super::{BackendFactory, BackendProbe, CacheBackend, CacheBackendKind};
use super::{DefaultBackendFactory, RedisProbe};
use crate::config::SupervisorConfig;
use crate::error::{CacheError, CacheResult};
use crate::status::{to_json, LoopState, ProbeRecord, SupervisorStatus, TransitionRecord, OK};

const REQUEST_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
pub enum Command {
    Probe, // run a cycle now, e.g. after a failed backend operation
    Status(Sender<SupervisorStatus>),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// the probe agreed with the active kind
    Unchanged(CacheBackendKind),
    Transitioned {
        from: CacheBackendKind,
        to: CacheBackendKind,
    },
    /// a degraded durable backend was rebuilt in place of itself
    Refreshed,
    /// the target backend did not build; the active one was kept
    ConstructionFailed(CacheBackendKind),
    /// another cycle was in flight
    Skipped,
}

/// the published pair; replaced whole, never mutated
#[derive(Debug)]
pub struct ActiveBackend {
    pub kind: CacheBackendKind,
    pub backend: Arc<dyn CacheBackend>,
    pub installed_at: DateTime<Utc>,
}

impl ActiveBackend {
    fn new(kind: CacheBackendKind, backend: Arc<dyn CacheBackend>) -> ActiveBackend {
        ActiveBackend {
            kind,
            backend,
            installed_at: Utc::now(),
        }
    }
}

#[derive(Debug)]
pub struct SupervisorState {
    active: RwLock<Arc<ActiveBackend>>,
    last_probe_at: RwLock<Option<DateTime<Utc>>>,
    last_transition_at: RwLock<Option<DateTime<Utc>>>,
    reconciling: AtomicBool,
    degraded: AtomicBool,
    probe_count: AtomicU64,
    transition_count: AtomicU64,
    skipped_cycles: AtomicU64,
    construction_failures: AtomicU64,
    operation_failures: AtomicU64,
}

impl SupervisorState {
    fn new(active: ActiveBackend) -> SupervisorState {
        SupervisorState {
            active: RwLock::new(Arc::new(active)),
            last_probe_at: RwLock::new(None),
            last_transition_at: RwLock::new(None),
            reconciling: AtomicBool::new(false),
            degraded: AtomicBool::new(false),
            probe_count: AtomicU64::new(0),
            transition_count: AtomicU64::new(0),
            skipped_cycles: AtomicU64::new(0),
            construction_failures: AtomicU64::new(0),
            operation_failures: AtomicU64::new(0),
        }
    }

    /// the active pair as of now
    pub fn active(&self) -> Arc<ActiveBackend> {
        self.active.read().clone()
    }

    pub fn current_kind(&self) -> CacheBackendKind {
        self.active.read().kind
    }

    pub fn last_probe_at(&self) -> Option<DateTime<Utc>> {
        *self.last_probe_at.read()
    }

    pub fn last_transition_at(&self) -> Option<DateTime<Utc>> {
        *self.last_transition_at.read()
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    pub fn probe_count(&self) -> u64 {
        self.probe_count.load(Ordering::Relaxed)
    }

    pub fn transition_count(&self) -> u64 {
        self.transition_count.load(Ordering::Relaxed)
    }

    pub fn skipped_cycles(&self) -> u64 {
        self.skipped_cycles.load(Ordering::Relaxed)
    }

    pub fn construction_failures(&self) -> u64 {
        self.construction_failures.load(Ordering::Relaxed)
    }

    pub fn operation_failures(&self) -> u64 {
        self.operation_failures.load(Ordering::Relaxed)
    }

    // the only write to the active pair; a new backend starts healthy
    fn publish(&self, next: ActiveBackend) -> Arc<ActiveBackend> {
        let next = Arc::new(next);
        let mut active = self.active.write();
        self.degraded.store(false, Ordering::Release);
        std::mem::replace(&mut *active, next)
    }

    fn record_probe(&self) {
        self.probe_count.fetch_add(1, Ordering::Relaxed);
        *self.last_probe_at.write() = Some(Utc::now());
    }

    fn record_transition(&self, at: DateTime<Utc>) {
        self.transition_count.fetch_add(1, Ordering::Relaxed);
        *self.last_transition_at.write() = Some(at);
    }

    /// a request-time failure of the pair the request ran on.  A failure
    /// of the published durable backend marks the state degraded so the
    /// next reachable probe rebuilds the connection; a late report from a
    /// pair that was already replaced only counts.
    pub(crate) fn record_operation_failure(&self, failed: &Arc<ActiveBackend>) {
        self.operation_failures.fetch_add(1, Ordering::Relaxed);
        if failed.kind != CacheBackendKind::Durable {
            return;
        }

        let active = self.active.read();
        if Arc::ptr_eq(&*active, failed) {
            self.degraded.store(true, Ordering::Release);
        }
    }

    fn snapshot(&self, id: &str, uptime: &Uptime, state: LoopState) -> SupervisorStatus {
        SupervisorStatus {
            supervisor_id: id.to_string(),
            status: OK.to_string(),
            state,
            current_kind: self.current_kind(),
            uptime: uptime.to_string(),
            last_probe_at: self.last_probe_at(),
            last_transition_at: self.last_transition_at(),
            probe_count: self.probe_count(),
            transition_count: self.transition_count(),
            skipped_cycles: self.skipped_cycles(),
            construction_failures: self.construction_failures(),
            operation_failures: self.operation_failures(),
        }
    }
}

// held for the length of one cycle and moved into the cycle's task; released
// on drop, so a cancelled cycle frees the next tick
struct CycleGuard(Arc<SupervisorState>);

impl CycleGuard {
    fn acquire(state: &Arc<SupervisorState>) -> Option<CycleGuard> {
        state
            .reconciling
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleGuard(state.clone()))
    }
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.0.reconciling.store(false, Ordering::Release);
    }
}

// build through the factory and insist on the requested kind
async fn build_backend(
    factory: &dyn BackendFactory,
    kind: CacheBackendKind,
) -> CacheResult<Arc<dyn CacheBackend>> {
    let backend = factory.build(kind).await?;
    if backend.kind() != kind {
        return Err(CacheError::KindMismatch {
            expected: kind,
            actual: backend.kind(),
        });
    }

    Ok(backend)
}

/// runs probe-and-reconcile cycles against the shared state
#[derive(Clone)]
pub struct Reconciler {
    state: Arc<SupervisorState>,
    probe: Arc<dyn BackendProbe>,
    factory: Arc<dyn BackendFactory>,
}

impl Reconciler {
    pub fn in_progress(&self) -> bool {
        self.state.reconciling.load(Ordering::Acquire)
    }

    /// one cycle: probe, compare, and on a difference build, publish and
    /// release.  Runs at most once at a time.
    pub async fn reconcile(&self) -> CycleOutcome {
        match self.claim() {
            Some(guard) => self.run_cycle(guard).await,
            None => CycleOutcome::Skipped,
        }
    }

    fn claim(&self) -> Option<CycleGuard> {
        let guard = CycleGuard::acquire(&self.state);
        if guard.is_none() {
            self.state.skipped_cycles.fetch_add(1, Ordering::Relaxed);
            debug!("cycle skipped, previous cycle still running");
        }

        guard
    }

    async fn run_cycle(&self, _guard: CycleGuard) -> CycleOutcome {
        let started = Instant::now();
        let probe_result = self.probe.check().await;
        self.state.record_probe();

        let record = ProbeRecord {
            probe_result,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        debug!("probe: {}", to_json(&record));

        let target = probe_result.target_kind();
        let current = self.state.current_kind();
        let refresh = target == current
            && target == CacheBackendKind::Durable
            && self.state.degraded.swap(false, Ordering::AcqRel);

        if target == current && !refresh {
            return CycleOutcome::Unchanged(current);
        }

        let backend = match build_backend(self.factory.as_ref(), target).await {
            Ok(backend) => backend,
            Err(e) => {
                self.state
                    .construction_failures
                    .fetch_add(1, Ordering::Relaxed);
                if refresh {
                    self.state.degraded.store(true, Ordering::Release);
                }
                warn!("{} backend did not build, keeping {}: {}", target, current, e);
                return CycleOutcome::ConstructionFailed(target);
            }
        };

        let previous = self.state.publish(ActiveBackend::new(target, backend));
        let previous_kind = previous.kind;

        // in-flight requests may still hold it; the last one out frees it
        drop(previous);

        if refresh {
            info!("durable backend refreshed after operation failures");
            return CycleOutcome::Refreshed;
        }

        let transition = TransitionRecord::new(previous_kind, target);
        self.state.record_transition(transition.timestamp);
        info!("cache backend transition: {}", to_json(&transition));

        CycleOutcome::Transitioned {
            from: previous_kind,
            to: target,
        }
    }
}

// the handler loop
pub async fn handler(
    id: String,
    reconciler: Reconciler,
    period: Duration,
    rx: Receiver<Command>,
) -> Result<()> {
    let uptime = Uptime::new();
    let mut in_flight: Option<JoinHandle<CycleOutcome>> = None;
    let mut next_tick = Instant::now() + period;

    loop {
        let wait = next_tick.saturating_duration_since(Instant::now());
        match future::timeout(wait, rx.recv()).await {
            Err(_) => {
                next_tick += period;
                let now = Instant::now();
                if next_tick <= now {
                    next_tick = now + period;
                }
                spawn_cycle(&reconciler, &mut in_flight);
            }
            Ok(Ok(Command::Probe)) => {
                debug!("early probe requested");
                spawn_cycle(&reconciler, &mut in_flight);
            }
            Ok(Ok(Command::Status(tx))) => {
                let status = reconciler.state.snapshot(&id, &uptime, LoopState::Running);
                if tx.send(status).await.is_err() {
                    error!("error returning status to channel: {:?}", tx);
                }
            }
            Ok(Ok(Command::Shutdown)) | Ok(Err(_)) => break,
        }
    }

    // abandon an in-flight probe instead of waiting on it
    if let Some(handle) = in_flight.take() {
        handle.cancel().await;
    }

    rx.close();

    let status = reconciler.state.snapshot(&id, &uptime, LoopState::Shutdown);
    info!("supervisor stopped: {}", to_json(&status));

    Ok(())
}

// the guard is claimed here, before the spawn, so the handle kept in
// `in_flight` is always the cycle that holds it
fn spawn_cycle(reconciler: &Reconciler, in_flight: &mut Option<JoinHandle<CycleOutcome>>) {
    let Some(guard) = reconciler.claim() else {
        return;
    };

    let cycle = reconciler.clone();
    *in_flight = Some(task::spawn(async move { cycle.run_cycle(guard).await }));
}

pub struct CacheSupervisor {
    id: String,
    reconciler: Reconciler,
    request_tx: Sender<Command>,
    handle: JoinHandle<()>,
}

impl fmt::Debug for CacheSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheSupervisor")
            .field("id", &self.id)
            .field("current_kind", &self.current_kind())
            .finish()
    }
}

impl CacheSupervisor {
    /// start with the redis probe and the default factory
    pub async fn from_config(config: &SupervisorConfig) -> Result<CacheSupervisor> {
        let probe = Arc::new(RedisProbe::new(config));
        let factory = Arc::new(DefaultBackendFactory::new(config.clone()));
        CacheSupervisor::start(config.probe_period(), probe, factory).await
    }

    /// pick the initial backend with one probe, then start the periodic
    /// loop.  Fails only when not even the fallback backend can be built.
    pub async fn start(
        period: Duration,
        probe: Arc<dyn BackendProbe>,
        factory: Arc<dyn BackendFactory>,
    ) -> Result<CacheSupervisor> {
        let id = RouteKey::create();
        info!("starting cache supervisor, id: {}, period: {:?}", id, period);

        let probe_result = probe.check().await;
        let mut target = probe_result.target_kind();
        let mut construction_failed = false;

        let backend = match build_backend(factory.as_ref(), target).await {
            Ok(backend) => backend,
            Err(e) if target == CacheBackendKind::Durable => {
                warn!("initial durable backend did not build, using fallback: {}", e);
                construction_failed = true;
                target = CacheBackendKind::Fallback;
                build_backend(factory.as_ref(), target)
                    .await
                    .context("fallback backend did not build")?
            }
            Err(e) => return Err(e).context("fallback backend did not build"),
        };

        let state = Arc::new(SupervisorState::new(ActiveBackend::new(target, backend)));
        state.record_probe();
        if construction_failed {
            state.construction_failures.fetch_add(1, Ordering::Relaxed);
        }

        info!("initial probe: {:?}, active backend: {}", probe_result, target);

        let reconciler = Reconciler {
            state,
            probe,
            factory,
        };

        let (request_tx, request_receiver) = bounded(REQUEST_CAPACITY);

        let loop_id = id.clone();
        let loop_reconciler = reconciler.clone();
        let handle = task::spawn(async move {
            match handler(loop_id.clone(), loop_reconciler, period, request_receiver).await {
                Ok(()) => info!("supervisor handler exit for id: {}", loop_id),
                Err(e) => error!("supervisor handler exit with error: {:?}", e),
            }
        });

        Ok(CacheSupervisor {
            id,
            reconciler,
            request_tx,
            handle,
        })
    }

    pub fn id(&self) -> String {
        self.id.to_string()
    }

    pub fn current_kind(&self) -> CacheBackendKind {
        self.reconciler.state.current_kind()
    }

    pub fn state(&self) -> Arc<SupervisorState> {
        self.reconciler.state.clone()
    }

    /// the application's handle on whatever backend is active
    pub fn facade(&self) -> CacheFacade {
        CacheFacade::new(self.reconciler.state.clone(), self.request_tx.clone())
    }

    /// a handle for running cycles from another task
    pub fn reconciler(&self) -> Reconciler {
        self.reconciler.clone()
    }

    /// run one cycle now, on the caller's task
    pub async fn reconcile(&self) -> CycleOutcome {
        self.reconciler.reconcile().await
    }

    /// ask the loop for an early cycle; dropped if the loop is busy
    pub fn request_probe(&self) {
        if self.request_tx.try_send(Command::Probe).is_err() {
            debug!("early probe request dropped");
        }
    }

    pub async fn status(&self) -> Result<SupervisorStatus> {
        let (tx, rx) = bounded(1);
        self.request_tx
            .send(Command::Status(tx))
            .await
            .context("supervisor loop is not running")?;

        let status = rx.recv().await.context("no status from supervisor loop")?;
        Ok(status)
    }

    /// stop the loop; an in-flight probe is abandoned.  The active backend
    /// is released once the last facade clone is dropped.
    pub async fn shutdown(self) -> Result<()> {
        info!("shutting down supervisor, id: {}", self.id);
        self.request_tx
            .send(Command::Shutdown)
            .await
            .context("supervisor loop already stopped")?;
        self.handle.await;
        Ok(())
    }
}
