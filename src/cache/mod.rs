/// adaptive cache backend supervision.
///
/// the application talks to a single [`facade::CacheFacade`]; behind it the
/// [`supervisor::CacheSupervisor`] keeps exactly one active backend:
///
/// * durable: a remote redis store, used whenever the probe can reach it
/// * fallback: an in-process map, used while redis is unreachable
///
/// a probe runs on a fixed period.  When its answer disagrees with the active
/// kind the supervisor builds the other backend completely, publishes it in a
/// single swap and lets the old one drop.  Entries are never migrated between
/// backends: whatever the fallback held is lost on the swap to durable, and a
/// swap to fallback starts empty.
///
pub mod backend;
pub mod durable;
pub mod facade;
pub mod fallback;
pub mod probe;
pub mod supervisor;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use backend::{BackendFactory, CacheBackend, DefaultBackendFactory};
pub use durable::DurableCache;
pub use fallback::FallbackCache;
pub use probe::{BackendProbe, ProbeResult, RedisProbe};

/// which backend implementation is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    Durable,
    Fallback,
}

impl fmt::Display for CacheBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheBackendKind::Durable => write!(f, "durable"),
            CacheBackendKind::Fallback => write!(f, "fallback"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_display_and_json() {
        assert_eq!(CacheBackendKind::Durable.to_string(), "durable");
        assert_eq!(CacheBackendKind::Fallback.to_string(), "fallback");

        let js = serde_json::to_string(&CacheBackendKind::Fallback).unwrap();
        assert_eq!(js, r#""fallback""#);
    }
}
