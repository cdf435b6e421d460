/// redis backed durable cache.
///
/// every write carries a ttl, the configured default unless the caller
/// passes one.  Empty values are never written, so a miss can't be cached.
/// Keys are namespaced with the configured prefix, e.g. `cache-supervisor::k1`.
use std::fmt;
use std::time::Duration;

use async_std::future;
use async_trait::async_trait;
use log::*;
use redis::aio::MultiplexedConnection;

use super::{CacheBackend, CacheBackendKind};
use crate::config::SupervisorConfig;
use crate::error::{CacheError, CacheResult};

#[derive(Clone)]
pub struct DurableCache {
    connection: MultiplexedConnection,
    entry_ttl: Duration,
    key_prefix: String,
}

impl fmt::Debug for DurableCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DurableCache")
            .field("connection", &"MultiplexedConnection")
            .field("entry_ttl", &self.entry_ttl)
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

impl DurableCache {
    /// open a connection and verify it with a PING.  The whole attempt is
    /// bounded by the probe timeout.
    pub async fn connect(config: &SupervisorConfig) -> CacheResult<DurableCache> {
        let client = redis::Client::open(config.redis_url())
            .map_err(|e| CacheError::Connection(format!("invalid redis config: {}", e)))?;

        let timeout = config.probe_timeout();
        let attempt = async {
            let mut connection = client.get_multiplexed_async_connection().await?;
            let pong: String = redis::cmd("PING").query_async(&mut connection).await?;
            Ok::<_, CacheError>((connection, pong))
        };

        let (connection, pong) = future::timeout(timeout, attempt)
            .await
            .map_err(|_| CacheError::Timeout(timeout.as_millis()))??;

        if pong != "PONG" {
            return Err(CacheError::Connection(format!("unexpected ping reply: {}", pong)));
        }

        info!(
            "durable cache connected to {}:{}, entry ttl: {}s",
            config.host_name,
            config.port,
            config.entry_ttl().as_secs()
        );

        Ok(DurableCache {
            connection,
            entry_ttl: config.entry_ttl(),
            key_prefix: config.key_prefix.clone(),
        })
    }

    pub fn entry_ttl(&self) -> Duration {
        self.entry_ttl
    }

    /// the redis key for a cache key
    pub fn redis_key(&self, key: &str) -> String {
        namespaced(&self.key_prefix, key)
    }
}

fn namespaced(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}::{}", prefix, key)
    }
}

/// whole seconds, at least one; redis rejects an EX of zero
fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl CacheBackend for DurableCache {
    fn kind(&self) -> CacheBackendKind {
        CacheBackendKind::Durable
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = self.connection.clone();
        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(self.redis_key(key))
            .query_async(&mut conn)
            .await?;
        debug!("durable get key: {}, hit: {}", key, value.is_some());
        Ok(value)
    }

    async fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        if value.is_empty() {
            debug!("durable put key: {} skipped, empty value", key);
            return Ok(());
        }

        let seconds = ttl_seconds(ttl.unwrap_or(self.entry_ttl));
        let mut conn = self.connection.clone();
        let _: () = redis::cmd("SET")
            .arg(self.redis_key(key))
            .arg(value)
            .arg("EX")
            .arg(seconds)
            .query_async(&mut conn)
            .await?;

        debug!("durable put key: {}, ttl: {}s", key, seconds);
        Ok(())
    }

    async fn evict(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.connection.clone();
        let _: () = redis::cmd("DEL")
            .arg(self.redis_key(key))
            .query_async(&mut conn)
            .await?;
        debug!("durable evict key: {}", key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_rounding() {
        assert_eq!(ttl_seconds(Duration::from_millis(10)), 1);
        assert_eq!(ttl_seconds(Duration::from_secs(90)), 90);
        assert_eq!(ttl_seconds(Duration::from_secs(86_400)), 86_400);
    }

    #[test]
    fn key_namespacing() {
        assert_eq!(namespaced("cache-supervisor", "k1"), "cache-supervisor::k1");
        assert_eq!(namespaced("demoInformationCache", "a::b"), "demoInformationCache::a::b");
        assert_eq!(namespaced("", "k1"), "k1");
    }

    #[test]
    fn connect_refused() {
        async_std::task::block_on(async move {
            let config = SupervisorConfig {
                port: 1,
                probe_timeout_ms: 500,
                ..SupervisorConfig::default()
            };
            let result = DurableCache::connect(&config).await;
            assert!(matches!(
                result,
                Err(CacheError::Connection(_)) | Err(CacheError::Timeout(_))
            ));
        });
    }

    // needs a live server at the default 127.0.0.1:6379
    #[cfg(feature = "redis-tests")]
    mod integration {
        use super::*;

        #[test]
        fn put_get_evict() {
            async_std::task::block_on(async move {
                let cache = DurableCache::connect(&SupervisorConfig::default())
                    .await
                    .expect("redis should be running for redis-tests");

                let key = format!("test:{}", domain_keys::keys::RouteKey::create());
                assert_eq!(cache.get(&key).await.unwrap(), None);

                cache.put(&key, b"v1", None).await.unwrap();
                assert_eq!(cache.get(&key).await.unwrap(), Some(b"v1".to_vec()));

                // empty values are not cached
                cache.put(&key, b"", None).await.unwrap();
                assert_eq!(cache.get(&key).await.unwrap(), Some(b"v1".to_vec()));

                cache.evict(&key).await.unwrap();
                assert_eq!(cache.get(&key).await.unwrap(), None);
            });
        }

        #[test]
        fn ttl_expiry() {
            async_std::task::block_on(async move {
                let cache = DurableCache::connect(&SupervisorConfig::default())
                    .await
                    .expect("redis should be running for redis-tests");

                let key = format!("ttl:{}", domain_keys::keys::RouteKey::create());
                cache
                    .put(&key, b"temporary", Some(Duration::from_secs(1)))
                    .await
                    .unwrap();
                assert!(cache.get(&key).await.unwrap().is_some());

                async_std::task::sleep(Duration::from_millis(1500)).await;
                assert!(cache.get(&key).await.unwrap().is_none());
            });
        }
    }
}
