//! # Participant Registry
//!
//! Execution state for every participant this node has seen. Entries are
//! created on first reference with the configured thresholds and are never
//! removed; each entry carries its own lock.

use crate::config::TaskQueueConfig;
use crate::models::{ParticipantSnapshot, ParticipantState};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

#[derive(Debug)]
pub struct ParticipantRegistry {
    participants: DashMap<String, Arc<Mutex<ParticipantState>>>,
    config: TaskQueueConfig,
}

impl ParticipantRegistry {
    pub fn new(config: TaskQueueConfig) -> Self {
        Self {
            participants: DashMap::new(),
            config,
        }
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.participants.contains_key(name)
    }

    pub fn get_or_create(&self, name: &str) -> Arc<Mutex<ParticipantState>> {
        if let Some(state) = self.participants.get(name) {
            return state.value().clone();
        }
        self.participants
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(ParticipantState::new(
                    name,
                    self.config.size_max,
                    self.config.offload_threshold,
                    self.config.onload_threshold,
                )))
            })
            .value()
            .clone()
    }

    /// Run `f` against the participant's state under its lock
    pub fn with<R>(&self, name: &str, f: impl FnOnce(&mut ParticipantState) -> R) -> R {
        let state = self.get_or_create(name);
        let mut guard = state.lock();
        f(&mut guard)
    }

    pub fn state(&self, name: &str) -> ParticipantState {
        self.with(name, |state| state.clone())
    }

    pub fn enable(&self, name: &str) {
        self.with(name, |state| state.enabled = true);
        info!(participant = %name, "Participant enabled");
    }

    pub fn disable(&self, name: &str) {
        self.with(name, |state| state.enabled = false);
        info!(participant = %name, "Participant disabled");
    }

    pub fn suspend(&self, name: &str) {
        self.with(name, |state| state.suspended = true);
        info!(participant = %name, "Participant suspended");
    }

    pub fn resume(&self, name: &str) {
        self.with(name, |state| state.suspended = false);
        info!(participant = %name, "Participant resumed");
    }

    pub fn mark_idle(&self, name: &str) {
        self.with(name, |state| state.mark_idle());
    }

    pub fn mark_busy(&self, name: &str) {
        self.with(name, |state| state.mark_busy());
    }

    /// Atomically move an idle participant to busy; false if it was not idle
    pub fn try_claim(&self, name: &str) -> bool {
        self.with(name, |state| {
            if state.is_idle() {
                state.mark_busy();
                true
            } else {
                false
            }
        })
    }

    /// Override the thresholds for one participant
    pub fn set_thresholds(&self, name: &str, offload_threshold: usize, onload_threshold: usize) {
        self.with(name, |state| {
            state.offload_threshold = offload_threshold;
            state.onload_threshold = onload_threshold;
        });
    }

    pub fn snapshot(&self, name: &str, queue_size: usize) -> ParticipantSnapshot {
        self.with(name, |state| ParticipantSnapshot {
            name: state.name.clone(),
            enabled: state.enabled,
            suspended: state.suspended,
            activity: state.activity,
            queue_size,
            queue_size_max: state.queue_size_max,
            offload_threshold: state.offload_threshold,
            onload_threshold: state.onload_threshold,
            offloaded_count: state.offloaded_count,
        })
    }

    pub fn names(&self) -> Vec<String> {
        self.participants.iter().map(|entry| entry.key().clone()).collect()
    }
}
