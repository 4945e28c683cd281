//! In-process counters and latencies for the agent loop. Nothing is exported;
//! the snapshot is folded into the run summary so tests can assert on it.

use parking_lot::Mutex;
use serde::Serialize;
use std::{collections::BTreeMap, sync::Arc};
use thiserror::Error;

pub const TICKS_COMPLETED: &str = "ticks.completed";
pub const TICKS_SKIPPED: &str = "ticks.skipped";
pub const FETCH_FAILURES: &str = "fetch.failures";
pub const PERSIST_RETRIES: &str = "persist.retries";
pub const FETCH_LATENCY_MS: &str = "fetch.latency_ms";

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("counter overflow for metric {0}")]
    CounterOverflow(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TelemetrySnapshot {
    pub counters: BTreeMap<String, u64>,
    pub latencies_ms: BTreeMap<String, LatencySummary>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LatencySummary {
    pub count: usize,
    pub max: u64,
    pub mean: u64,
}

impl LatencySummary {
    fn from_samples(samples: &[u64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let sum: u128 = samples.iter().map(|v| u128::from(*v)).sum();
        Self {
            count: samples.len(),
            max: samples.iter().copied().max().unwrap_or_default(),
            mean: (sum / samples.len() as u128) as u64,
        }
    }
}

#[derive(Default)]
struct TelemetryState {
    counters: BTreeMap<String, u64>,
    latencies_ms: BTreeMap<String, Vec<u64>>,
}

#[derive(Clone, Default)]
pub struct TelemetryHandle {
    state: Arc<Mutex<TelemetryState>>,
}

impl TelemetryHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_counter(&self, name: &str, delta: u64) -> Result<(), TelemetryError> {
        let mut guard = self.state.lock();
        let entry = guard.counters.entry(name.to_owned()).or_default();
        *entry = entry
            .checked_add(delta)
            .ok_or_else(|| TelemetryError::CounterOverflow(name.to_owned()))?;
        Ok(())
    }

    pub fn record_latency_ms(&self, name: &str, value: u64) {
        self.state
            .lock()
            .latencies_ms
            .entry(name.to_owned())
            .or_default()
            .push(value);
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.state.lock().counters.get(name).copied().unwrap_or_default()
    }

    /// Current values without resetting them.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        let guard = self.state.lock();
        TelemetrySnapshot {
            counters: guard.counters.clone(),
            latencies_ms: guard
                .latencies_ms
                .iter()
                .map(|(k, v)| (k.clone(), LatencySummary::from_samples(v)))
                .collect(),
        }
    }
}
