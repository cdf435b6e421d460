/// the application's entry point to the cache.
///
/// every call reads the active backend from the supervisor state at call
/// time, so a swap is visible to the very next request.  Backend failures
/// fail open: a failed `get` is a miss, a failed `put` or `evict` is a no-op.
/// The failure is counted and the supervisor is asked for an early probe.
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_channel::Sender;
use log::*;

use super::supervisor::{ActiveBackend, Command, SupervisorState};
use super::CacheBackendKind;
use crate::error::CacheError;

#[derive(Clone)]
pub struct CacheFacade {
    state: Arc<SupervisorState>,
    signal: Sender<Command>,
}

impl fmt::Debug for CacheFacade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheFacade")
            .field("current_kind", &self.current_kind())
            .finish()
    }
}

impl CacheFacade {
    pub(crate) fn new(state: Arc<SupervisorState>, signal: Sender<Command>) -> CacheFacade {
        CacheFacade { state, signal }
    }

    pub fn current_kind(&self) -> CacheBackendKind {
        self.state.current_kind()
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let active = self.state.active();
        match active.backend.get(key).await {
            Ok(value) => value,
            Err(e) => {
                self.report_failure(&active, "get", key, &e);
                None
            }
        }
    }

    /// store with the backend's default ttl
    pub async fn put(&self, key: &str, value: &[u8]) {
        self.store(key, value, None).await
    }

    pub async fn put_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) {
        self.store(key, value, Some(ttl)).await
    }

    pub async fn evict(&self, key: &str) {
        let active = self.state.active();
        if let Err(e) = active.backend.evict(key).await {
            self.report_failure(&active, "evict", key, &e);
        }
    }

    /// return the cached value, or compute, cache and return it.  A
    /// computation that yields `None` is returned as is and not cached.
    pub async fn get_or_insert_with<F, Fut>(&self, key: &str, compute: F) -> Option<Vec<u8>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<Vec<u8>>>,
    {
        if let Some(value) = self.get(key).await {
            return Some(value);
        }

        let value = compute().await?;
        self.put(key, &value).await;
        Some(value)
    }

    async fn store(&self, key: &str, value: &[u8], ttl: Option<Duration>) {
        let active = self.state.active();
        if let Err(e) = active.backend.put(key, value, ttl).await {
            self.report_failure(&active, "put", key, &e);
        }
    }

    fn report_failure(&self, active: &Arc<ActiveBackend>, op: &str, key: &str, e: &CacheError) {
        warn!("{} {} failed for key: {}, failing open: {}", active.kind, op, key, e);
        self.state.record_operation_failure(active);

        if active.kind == CacheBackendKind::Durable
            && self.signal.try_send(Command::Probe).is_err()
        {
            debug!("early probe request dropped");
        }
    }
}
