use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use slowscope_protocol::{ErrorInfo, ErrorKind};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
pub struct DiagnosticEntry {
    pub task: String,
    pub kind: ErrorKind,
    pub message: String,
    pub at_unix_ms: u64,
}

/// Append-only record of everything that went wrong during a run. Clones share one log.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticLog {
    entries: Arc<Mutex<Vec<DiagnosticEntry>>>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, task: &str, error: &ErrorInfo) {
        let entry = DiagnosticEntry {
            task: task.to_string(),
            kind: error.kind,
            message: error.message.clone(),
            at_unix_ms: unix_ms(),
        };
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    pub fn snapshot(&self) -> Vec<DiagnosticEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
