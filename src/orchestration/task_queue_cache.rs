//! # Local Task Queue Cache
//!
//! Participant name → [`ParticipantTaskQueue`]. Two-level locking: the map's
//! shard locks serialize queue creation, each queue's own lock serializes its
//! contents, so unrelated participants never contend.

use super::participant_task_queue::{ParticipantTaskQueue, TaskQueueEntry};
use crate::constants::defaults;
use crate::models::{Task, TaskId};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
pub struct LocalTaskQueueCache {
    queues: DashMap<String, Arc<ParticipantTaskQueue>>,
    size_max: usize,
}

impl Default for LocalTaskQueueCache {
    fn default() -> Self {
        Self::new(defaults::TASK_QUEUE_SIZE_MAX)
    }
}

impl LocalTaskQueueCache {
    pub fn new(size_max: usize) -> Self {
        Self {
            queues: DashMap::new(),
            size_max,
        }
    }

    pub fn size_max(&self) -> usize {
        self.size_max
    }

    pub fn queue(&self, participant: &str) -> Option<Arc<ParticipantTaskQueue>> {
        self.queues.get(participant).map(|queue| queue.value().clone())
    }

    pub fn get_or_create_queue(&self, participant: &str) -> Arc<ParticipantTaskQueue> {
        if let Some(queue) = self.queues.get(participant) {
            return queue.value().clone();
        }
        self.queues
            .entry(participant.to_string())
            .or_insert_with(|| Arc::new(ParticipantTaskQueue::new(participant)))
            .value()
            .clone()
    }

    /// Queue `task` for every non-capability performer with a resolvable
    /// participant name. Returns the participants it was queued for.
    pub fn queue_task(&self, task: &Task) -> Vec<String> {
        if !task.is_well_formed() {
            debug!(task_id = %task.task_id, "Ignoring malformed task");
            return Vec::new();
        }
        task.participant_names()
            .into_iter()
            .filter(|participant| self.insert_for(participant, TaskQueueEntry::from_task(task)))
            .collect()
    }

    pub fn insert_for(&self, participant: &str, entry: TaskQueueEntry) -> bool {
        if participant.trim().is_empty() {
            debug!(task_id = %entry.task_id, "Ignoring entry for empty participant name");
            return false;
        }
        self.get_or_create_queue(participant).insert(entry)
    }

    pub fn peek(&self, participant: &str) -> Option<TaskQueueEntry> {
        self.queue(participant).and_then(|queue| queue.peek())
    }

    pub fn poll(&self, participant: &str) -> Option<TaskQueueEntry> {
        self.queue(participant).and_then(|queue| queue.poll())
    }

    pub fn size(&self, participant: &str) -> usize {
        self.queue(participant).map_or(0, |queue| queue.size())
    }

    /// Last-resort backpressure: the queue has reached the hard ceiling
    pub fn is_full(&self, participant: &str) -> bool {
        self.size(participant) >= self.size_max
    }

    /// Whether any participant queue still references `task_id`
    pub fn references_task(&self, task_id: &TaskId) -> bool {
        self.queues.iter().any(|queue| queue.value().contains(task_id))
    }

    pub fn participants(&self) -> Vec<String> {
        self.queues.iter().map(|queue| queue.key().clone()).collect()
    }
}
