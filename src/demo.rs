/// the demo service: a compute-and-cache lookup by key.
///
/// the first lookup of a key stores the current time; later lookups return
/// that stored time for as long as the active backend keeps it.
use chrono::Utc;
use log::*;

use crate::cache::facade::CacheFacade;

#[derive(Debug, Clone)]
pub struct DemoCacheService {
    cache: CacheFacade,
}

impl DemoCacheService {
    pub fn new(cache: CacheFacade) -> DemoCacheService {
        DemoCacheService { cache }
    }

    /// the cached value for the key, or now as rfc 3339
    pub async fn lookup(&self, key: &str) -> String {
        let value = self
            .cache
            .get_or_insert_with(key, || async {
                debug!("computing value for key: {}", key);
                Some(Utc::now().to_rfc3339().into_bytes())
            })
            .await
            .unwrap_or_default();

        String::from_utf8_lossy(&value).into_owned()
    }

    /// the response body for `GET /cache/{key}`
    pub async fn respond(&self, key: &str) -> String {
        format!("Hello Cache {}", self.lookup(key).await)
    }
}
