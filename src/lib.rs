#![doc = include_str!("../README.md")]

pub mod cache;
pub mod config;
pub mod demo;
pub mod error;
pub mod logging;
pub mod status;

pub use cache::facade::CacheFacade;
pub use cache::supervisor::{CacheSupervisor, CycleOutcome};
pub use cache::CacheBackendKind;
pub use config::SupervisorConfig;
pub use error::{CacheError, CacheResult};

/// the current app version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
