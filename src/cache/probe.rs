/// durable backend reachability check.
use std::time::Duration;

use async_std::future;
use async_trait::async_trait;
use log::*;
use serde::{Deserialize, Serialize};

use super::CacheBackendKind;
use crate::config::SupervisorConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeResult {
    Reachable,
    Unreachable,
}

impl ProbeResult {
    /// the backend kind this result asks for
    pub fn target_kind(self) -> CacheBackendKind {
        match self {
            ProbeResult::Reachable => CacheBackendKind::Durable,
            ProbeResult::Unreachable => CacheBackendKind::Fallback,
        }
    }
}

/// one connectivity check per call, no retries.  Failing to connect is an
/// answer (`Unreachable`), never an error.
#[async_trait]
pub trait BackendProbe: Send + Sync {
    async fn check(&self) -> ProbeResult;
}

/// opens a fresh connection and sends PING, bounded by a timeout
#[derive(Debug, Clone)]
pub struct RedisProbe {
    url: String,
    timeout: Duration,
}

impl RedisProbe {
    pub fn new(config: &SupervisorConfig) -> RedisProbe {
        RedisProbe {
            url: config.redis_url(),
            timeout: config.probe_timeout(),
        }
    }

    async fn ping(&self) -> redis::RedisResult<String> {
        let client = redis::Client::open(self.url.as_str())?;
        let mut connection = client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async(&mut connection).await
    }
}

#[async_trait]
impl BackendProbe for RedisProbe {
    async fn check(&self) -> ProbeResult {
        match future::timeout(self.timeout, self.ping()).await {
            Ok(Ok(pong)) if pong == "PONG" => ProbeResult::Reachable,
            Ok(Ok(pong)) => {
                debug!("probe got unexpected reply: {}", pong);
                ProbeResult::Unreachable
            }
            Ok(Err(e)) => {
                debug!("probe failed: {}", e);
                ProbeResult::Unreachable
            }
            Err(_) => {
                debug!("probe timed out after {} ms", self.timeout.as_millis());
                ProbeResult::Unreachable
            }
        }
    }
}
