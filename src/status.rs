/// supervisor status and observability records
///
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::{CacheBackendKind, ProbeResult};

pub type JsonString = String;

pub const OK: &str = "ok";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopState {
    #[default]
    Running,
    Shutdown,
}

/// emitted once per backend swap between kinds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub previous_kind: CacheBackendKind,
    pub new_kind: CacheBackendKind,
    pub timestamp: DateTime<Utc>,
}

impl TransitionRecord {
    pub fn new(previous_kind: CacheBackendKind, new_kind: CacheBackendKind) -> TransitionRecord {
        TransitionRecord {
            previous_kind,
            new_kind,
            timestamp: Utc::now(),
        }
    }
}

/// emitted every cycle for probe latency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeRecord {
    pub probe_result: ProbeResult,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorStatus {
    pub supervisor_id: String,
    pub status: String,
    pub state: LoopState,
    pub current_kind: CacheBackendKind,
    pub uptime: String,
    pub last_probe_at: Option<DateTime<Utc>>,
    pub last_transition_at: Option<DateTime<Utc>>,
    pub probe_count: u64,
    pub transition_count: u64,
    pub skipped_cycles: u64,
    pub construction_failures: u64,
    pub operation_failures: u64,
}

/// serialize a record for a log line; a record that won't serialize still logs
pub fn to_json<T: Serialize>(record: &T) -> JsonString {
    match serde_json::to_string(record) {
        Ok(js) => js,
        Err(e) => format!(r#"{}"status":"json parse error: {:?}"{}"#, "{", e, "}"),
    }
}
