/// the capability interface shared by both backends, and the factory the
/// supervisor uses to build them.
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::*;

use super::{CacheBackendKind, DurableCache, FallbackCache};
use crate::config::SupervisorConfig;
use crate::error::CacheResult;

/// get/put/evict over opaque byte values.
///
/// implementations hold no cleanup obligations: dropping one releases its
/// connection or channel and nothing else.
#[async_trait]
pub trait CacheBackend: Debug + Send + Sync {
    fn kind(&self) -> CacheBackendKind;

    /// `Ok(None)` is a miss
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// store the value; `None` uses the backend's default ttl
    async fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()>;

    async fn evict(&self, key: &str) -> CacheResult<()>;
}

/// builds a fully initialized backend of the requested kind.  An `Err` means
/// the backend must not be published.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    async fn build(&self, kind: CacheBackendKind) -> CacheResult<Arc<dyn CacheBackend>>;
}

/// redis for durable, an in-process map for fallback
#[derive(Debug, Clone)]
pub struct DefaultBackendFactory {
    config: SupervisorConfig,
}

impl DefaultBackendFactory {
    pub fn new(config: SupervisorConfig) -> DefaultBackendFactory {
        DefaultBackendFactory { config }
    }
}

#[async_trait]
impl BackendFactory for DefaultBackendFactory {
    async fn build(&self, kind: CacheBackendKind) -> CacheResult<Arc<dyn CacheBackend>> {
        info!("building {} backend", kind);
        match kind {
            CacheBackendKind::Durable => {
                let cache = DurableCache::connect(&self.config).await?;
                Ok(Arc::new(cache))
            }
            CacheBackendKind::Fallback => {
                let cache = FallbackCache::new(self.config.fallback_max_entries);
                Ok(Arc::new(cache))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_fallback() {
        async_std::task::block_on(async move {
            let factory = DefaultBackendFactory::new(SupervisorConfig::default());
            let backend = factory
                .build(CacheBackendKind::Fallback)
                .await
                .expect("fallback should always build");
            assert_eq!(backend.kind(), CacheBackendKind::Fallback);
        });
    }

    #[test]
    fn durable_fails_without_redis() {
        async_std::task::block_on(async move {
            // nothing listens on port 1
            let config = SupervisorConfig {
                port: 1,
                probe_timeout_ms: 200,
                ..SupervisorConfig::default()
            };
            let factory = DefaultBackendFactory::new(config);
            assert!(factory.build(CacheBackendKind::Durable).await.is_err());
        });
    }
}
