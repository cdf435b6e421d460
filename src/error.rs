/// errors raised by the cache backends, probes and factories.
///
/// none of these reach the application: the facade fails open and the
/// supervisor treats them as evidence for the fallback backend.
use thiserror::Error;

use crate::cache::CacheBackendKind;

#[derive(Debug, Error)]
pub enum CacheError {
    /// could not open or verify a connection to the durable store
    #[error("cache connection error: {0}")]
    Connection(String),

    #[error("cache operation timed out after {0} ms")]
    Timeout(u128),

    /// the store answered, but the command failed
    #[error("cache backend error: {0}")]
    Backend(String),

    /// the backend's worker task is gone
    #[error("cache backend closed: {0}")]
    Closed(String),

    #[error("factory built a {actual} backend, expected {expected}")]
    KindMismatch {
        expected: CacheBackendKind,
        actual: CacheBackendKind,
    },
}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_io_error()
            || e.is_timeout()
            || e.is_connection_dropped()
            || e.is_connection_refusal()
        {
            CacheError::Connection(e.to_string())
        } else {
            CacheError::Backend(e.to_string())
        }
    }
}

pub type CacheResult<T> = Result<T, CacheError>;
