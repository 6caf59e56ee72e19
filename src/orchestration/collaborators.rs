//! # Task Queue Collaborators
//!
//! Seams between the queue manager and the rest of the node: the distribution
//! channel that actually runs tasks, the producer/executor that wants to hear
//! about task lifecycle changes, and the central store that holds offloaded
//! tasks.

use crate::error::{PetasosError, PetasosResult};
use crate::models::Task;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use tracing::debug;

/// Distribution channel to the participant's executor
#[async_trait]
pub trait TaskDistributor: Send + Sync {
    async fn distribute(&self, participant: &str, task: Task) -> PetasosResult<()>;
}

/// Producer/executor callbacks. Implementations must not fail the caller.
#[async_trait]
pub trait TaskLifecycleListener: Send + Sync {
    async fn notify_task_start(&self, participant: &str, task: &Task);
    async fn notify_task_failure(&self, participant: &str, task: &Task, reason: &str);
    async fn register_task_outcome(&self, task: &Task);
}

/// Listener that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingLifecycleListener;

#[async_trait]
impl TaskLifecycleListener for LoggingLifecycleListener {
    async fn notify_task_start(&self, participant: &str, task: &Task) {
        debug!(participant, task_id = %task.task_id, "Task started");
    }

    async fn notify_task_failure(&self, participant: &str, task: &Task, reason: &str) {
        debug!(participant, task_id = %task.task_id, reason, "Task failed");
    }

    async fn register_task_outcome(&self, task: &Task) {
        debug!(task_id = %task.task_id, outcome = ?task.outcome, "Task outcome registered");
    }
}

/// Central storage for tasks a participant could not accept locally
#[async_trait]
pub trait TaskOffloadStore: Send + Sync {
    async fn offload(&self, participant: &str, task: Task) -> PetasosResult<()>;

    /// Take back up to `limit` offloaded tasks for `participant`, oldest first
    async fn onload(&self, participant: &str, limit: usize) -> PetasosResult<Vec<Task>>;
}

/// Process-local offload store
#[derive(Debug, Default)]
pub struct InMemoryOffloadStore {
    parked: DashMap<String, VecDeque<Task>>,
}

impl InMemoryOffloadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parked_count(&self, participant: &str) -> usize {
        self.parked.get(participant).map_or(0, |tasks| tasks.len())
    }
}

#[async_trait]
impl TaskOffloadStore for InMemoryOffloadStore {
    async fn offload(&self, participant: &str, task: Task) -> PetasosResult<()> {
        if participant.trim().is_empty() {
            return Err(PetasosError::OffloadError(
                "cannot offload for an empty participant name".to_string(),
            ));
        }
        self.parked
            .entry(participant.to_string())
            .or_default()
            .push_back(task);
        Ok(())
    }

    async fn onload(&self, participant: &str, limit: usize) -> PetasosResult<Vec<Task>> {
        let Some(mut parked) = self.parked.get_mut(participant) else {
            return Ok(Vec::new());
        };
        let take = limit.min(parked.len());
        Ok(parked.drain(..take).collect())
    }
}
