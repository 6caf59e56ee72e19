//! # Node Metrics
//!
//! Lock-free activity counters for the task queue, discovery and RPC layers.
//! Recording is infallible so it can never fail the operation being measured.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct PetasosMetrics {
    pub tasks_registered: AtomicU64,
    pub tasks_queued: AtomicU64,
    pub tasks_forwarded: AtomicU64,
    pub tasks_offloaded: AtomicU64,
    pub tasks_onloaded: AtomicU64,
    pub tasks_started: AtomicU64,
    pub tasks_finished: AtomicU64,
    pub tasks_failed: AtomicU64,
    pub tasks_cancelled: AtomicU64,
    pub rpc_calls: AtomicU64,
    pub rpc_failures: AtomicU64,
    pub probes: AtomicU64,
    pub probe_failures: AtomicU64,
    pub evictions: AtomicU64,
    last_activity: Mutex<Option<(String, DateTime<Utc>)>>,
}

/// Serializable copy of all counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub tasks_registered: u64,
    pub tasks_queued: u64,
    pub tasks_forwarded: u64,
    pub tasks_offloaded: u64,
    pub tasks_onloaded: u64,
    pub tasks_started: u64,
    pub tasks_finished: u64,
    pub tasks_failed: u64,
    pub tasks_cancelled: u64,
    pub rpc_calls: u64,
    pub rpc_failures: u64,
    pub probes: u64,
    pub probe_failures: u64,
    pub evictions: u64,
    pub last_activity: Option<String>,
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl PetasosMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Stamp a timestamped activity marker
    pub fn mark_activity(&self, marker: &str) {
        *self.last_activity.lock() = Some((marker.to_string(), Utc::now()));
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        let last_activity = self.last_activity.lock().clone();
        MetricsSnapshot {
            tasks_registered: load(&self.tasks_registered),
            tasks_queued: load(&self.tasks_queued),
            tasks_forwarded: load(&self.tasks_forwarded),
            tasks_offloaded: load(&self.tasks_offloaded),
            tasks_onloaded: load(&self.tasks_onloaded),
            tasks_started: load(&self.tasks_started),
            tasks_finished: load(&self.tasks_finished),
            tasks_failed: load(&self.tasks_failed),
            tasks_cancelled: load(&self.tasks_cancelled),
            rpc_calls: load(&self.rpc_calls),
            rpc_failures: load(&self.rpc_failures),
            probes: load(&self.probes),
            probe_failures: load(&self.probe_failures),
            evictions: load(&self.evictions),
            last_activity_at: last_activity.as_ref().map(|(_, at)| *at),
            last_activity: last_activity.map(|(marker, _)| marker),
        }
    }
}
