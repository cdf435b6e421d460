/// in-process fallback backend.
///
/// the map lives inside a handler task and is reached through a bounded
/// request channel; each request carries its own response channel.  Dropping
/// the `FallbackCache` drops the only request sender, which ends the handler
/// loop and frees the map.  There is no persistence of any kind.
use std::time::{Duration, Instant};

use anyhow::Result;
use async_channel::{bounded, Receiver, Sender};
use async_trait::async_trait;
use domain_keys::keys::RouteKey;
use hashbrown::HashMap;
use log::*;

use super::{CacheBackend, CacheBackendKind};
use crate::error::{CacheError, CacheResult};

const REQUEST_CAPACITY: usize = 250;

#[derive(Debug, Clone)]
pub enum Command {
    Put(String, Vec<u8>, Option<Instant>, Sender<bool>),
    Get(String, Sender<Option<Vec<u8>>>),
    Evict(String, Sender<Option<Vec<u8>>>),
    Len(Sender<usize>),
    Shutdown,
}

/// a stored value and its absolute expiry
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Vec<u8>,
    pub expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

// the handler loop; a max_entries of zero means unbounded
pub async fn handler(id: String, max_entries: usize, rx: Receiver<Command>) -> Result<()> {
    let mut cache: HashMap<String, CacheEntry> = HashMap::new();
    let mut error_count = 0u16;

    while let Ok(cmd) = rx.recv().await {
        match cmd {
            Command::Put(key, value, expires_at, tx) => {
                let now = Instant::now();
                if max_entries > 0 && cache.len() >= max_entries && !cache.contains_key(&key) {
                    cache.retain(|_, entry| !entry.is_expired(now));
                }

                let stored = if max_entries > 0
                    && cache.len() >= max_entries
                    && !cache.contains_key(&key)
                {
                    warn!("fallback {} full at {} entries, dropped key: {}", id, max_entries, key);
                    false
                } else {
                    debug!("put key: {}", key);
                    cache.insert(key, CacheEntry { value, expires_at });
                    true
                };

                error_count += send_response(stored, tx).await;
            }
            Command::Get(key, tx) => {
                let now = Instant::now();
                if cache.get(&key).is_some_and(|entry| entry.is_expired(now)) {
                    cache.remove(&key);
                }
                let value = cache.get(&key).map(|entry| entry.value.clone());
                debug!("get key: {}, hit: {}", key, value.is_some());
                error_count += send_response(value, tx).await;
            }
            Command::Evict(key, tx) => {
                debug!("evict key: {}", key);
                let value = cache.remove(&key).map(|entry| entry.value);
                error_count += send_response(value, tx).await;
            }
            Command::Len(tx) => {
                let now = Instant::now();
                cache.retain(|_, entry| !entry.is_expired(now));
                error_count += send_response(cache.len(), tx).await;
            }
            Command::Shutdown => break,
        }
    }

    async fn send_response<T>(msg: T, tx: Sender<T>) -> u16 {
        if tx.send(msg).await.is_err() {
            error!("error sending fallback response, requester is gone");
            1u16
        } else {
            0u16
        }
    }

    rx.close();
    info!("fallback {} closed, {} entries dropped, errors: {}", id, cache.len(), error_count);

    Ok(())
}

#[derive(Debug)]
pub struct FallbackCache {
    id: String,
    request_tx: Sender<Command>,
}

impl FallbackCache {
    /// create the fallback and start its handler task
    pub fn new(max_entries: usize) -> FallbackCache {
        let id = RouteKey::create();
        let wid = id.clone();

        let (request_tx, request_receiver) = bounded(REQUEST_CAPACITY);

        async_std::task::spawn(async move {
            match handler(id.clone(), max_entries, request_receiver).await {
                Ok(()) => debug!("fallback handler exit for id: {}", id),
                Err(e) => error!("fallback handler exit with error: {:?}", e),
            }
        });

        info!("fallback cache created, id: {}, max entries: {}", wid, max_entries);

        FallbackCache {
            id: wid,
            request_tx,
        }
    }

    pub fn id(&self) -> String {
        self.id.to_string()
    }

    /// the number of live entries
    pub async fn len(&self) -> CacheResult<usize> {
        let (tx, rx) = bounded(1);
        self.request(Command::Len(tx), rx).await
    }

    pub async fn is_empty(&self) -> CacheResult<bool> {
        Ok(self.len().await? == 0)
    }

    async fn request<T>(&self, cmd: Command, rx: Receiver<T>) -> CacheResult<T> {
        self.request_tx
            .send(cmd)
            .await
            .map_err(|e| CacheError::Closed(format!("fallback {}: {}", self.id, e)))?;

        rx.recv()
            .await
            .map_err(|e| CacheError::Closed(format!("fallback {}: {}", self.id, e)))
    }
}

#[async_trait]
impl CacheBackend for FallbackCache {
    fn kind(&self) -> CacheBackendKind {
        CacheBackendKind::Fallback
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let (tx, rx) = bounded(1);
        self.request(Command::Get(key.to_string(), tx), rx).await
    }

    async fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        let (tx, rx) = bounded(1);
        let cmd = Command::Put(key.to_string(), value.to_vec(), expires_at, tx);
        self.request(cmd, rx).await?;
        Ok(())
    }

    async fn evict(&self, key: &str) -> CacheResult<()> {
        let (tx, rx) = bounded(1);
        self.request(Command::Evict(key.to_string(), tx), rx).await?;
        Ok(())
    }
}
