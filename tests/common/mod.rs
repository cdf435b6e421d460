//! probe and factory doubles shared by the integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use cache_supervisor::cache::{
    BackendFactory, BackendProbe, CacheBackend, FallbackCache, ProbeResult,
};
use cache_supervisor::{CacheBackendKind, CacheError, CacheResult};

/// a probe with a scripted sequence of answers; once the script runs out it
/// answers with the current `reachable` flag
#[derive(Debug, Default)]
pub struct TestProbe {
    reachable: AtomicBool,
    script: Mutex<VecDeque<ProbeResult>>,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
}

impl TestProbe {
    pub fn new(reachable: bool) -> Arc<TestProbe> {
        let probe = TestProbe::default();
        probe.set_reachable(reachable);
        Arc::new(probe)
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn script(&self, results: &[ProbeResult]) {
        self.script.lock().extend(results.iter().copied());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendProbe for TestProbe {
    async fn check(&self) -> ProbeResult {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if !delay.is_zero() {
            async_std::task::sleep(delay).await;
        }

        if let Some(result) = self.script.lock().pop_front() {
            return result;
        }

        if self.reachable.load(Ordering::SeqCst) {
            ProbeResult::Reachable
        } else {
            ProbeResult::Unreachable
        }
    }
}

/// stands in for redis: a durable-kind backend over an in-process map whose
/// operations can be made to fail
#[derive(Debug)]
pub struct MemoryDurable {
    inner: FallbackCache,
    failing: Arc<AtomicBool>,
}

impl MemoryDurable {
    fn check(&self) -> CacheResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(CacheError::Connection("simulated connection loss".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryDurable {
    fn kind(&self) -> CacheBackendKind {
        CacheBackendKind::Durable
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        self.check()?;
        self.inner.put(key, value, ttl).await
    }

    async fn evict(&self, key: &str) -> CacheResult<()> {
        self.check()?;
        self.inner.evict(key).await
    }
}

#[derive(Debug, Default)]
pub struct TestFactory {
    durable_fails: AtomicBool,
    wrong_kind: AtomicBool,
    durable_ops_fail: Arc<AtomicBool>,
    builds: Mutex<Vec<CacheBackendKind>>,
}

impl TestFactory {
    pub fn new() -> Arc<TestFactory> {
        Arc::new(TestFactory::default())
    }

    pub fn set_durable_fails(&self, fails: bool) {
        self.durable_fails.store(fails, Ordering::SeqCst);
    }

    pub fn set_wrong_kind(&self, wrong: bool) {
        self.wrong_kind.store(wrong, Ordering::SeqCst);
    }

    /// applies to every durable backend built so far and later
    pub fn set_durable_ops_fail(&self, fails: bool) {
        self.durable_ops_fail.store(fails, Ordering::SeqCst);
    }

    pub fn builds(&self) -> Vec<CacheBackendKind> {
        self.builds.lock().clone()
    }
}

#[async_trait]
impl BackendFactory for TestFactory {
    async fn build(&self, kind: CacheBackendKind) -> CacheResult<Arc<dyn CacheBackend>> {
        if self.wrong_kind.load(Ordering::SeqCst) {
            self.builds.lock().push(CacheBackendKind::Fallback);
            return Ok(Arc::new(FallbackCache::new(100)));
        }

        match kind {
            CacheBackendKind::Durable if self.durable_fails.load(Ordering::SeqCst) => {
                Err(CacheError::Connection("simulated connect failure".to_string()))
            }
            CacheBackendKind::Durable => {
                self.builds.lock().push(kind);
                Ok(Arc::new(MemoryDurable {
                    inner: FallbackCache::new(0),
                    failing: self.durable_ops_fail.clone(),
                }))
            }
            CacheBackendKind::Fallback => {
                self.builds.lock().push(kind);
                Ok(Arc::new(FallbackCache::new(100)))
            }
        }
    }
}

/// poll until the condition holds or the timeout passes
pub async fn eventually<F: Fn() -> bool>(condition: F, timeout: Duration) -> bool {
    let started = Instant::now();
    while started.elapsed() < timeout {
        if condition() {
            return true;
        }
        async_std::task::sleep(Duration::from_millis(10)).await;
    }

    condition()
}

/// long enough that the periodic loop stays out of the way
pub const QUIET_PERIOD: Duration = Duration::from_secs(3600);
