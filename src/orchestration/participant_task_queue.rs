//! # Participant Task Queue
//!
//! Ordered queue of pending tasks for one participant. Entries are kept sorted
//! by producer sequence number in a contiguous deque, so `peek`/`poll` are O(1)
//! and `insert` is a binary search plus an O(n) shift on a bounded collection.
//!
//! Dequeue order is ascending sequence number, not arrival order: a late task
//! with a lower sequence number overtakes already-queued higher-numbered ones.

use crate::models::{Task, TaskId, TaskSequenceNumber};
use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::debug;

/// The unit stored in a participant queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskQueueEntry {
    pub task_id: TaskId,
    pub sequence_number: Option<TaskSequenceNumber>,
}

impl TaskQueueEntry {
    pub fn new(task_id: TaskId, sequence_number: TaskSequenceNumber) -> Self {
        Self {
            task_id,
            sequence_number: Some(sequence_number),
        }
    }

    pub fn from_task(task: &Task) -> Self {
        Self {
            task_id: task.task_id.clone(),
            sequence_number: task.sequence_number,
        }
    }

    pub fn is_well_formed(&self) -> bool {
        !self.task_id.is_empty() && self.sequence_number.is_some()
    }
}

#[derive(Debug)]
pub struct ParticipantTaskQueue {
    participant: String,
    entries: Mutex<VecDeque<TaskQueueEntry>>,
}

impl ParticipantTaskQueue {
    pub fn new(participant: impl Into<String>) -> Self {
        Self {
            participant: participant.into(),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    pub fn participant(&self) -> &str {
        &self.participant
    }

    /// Insert keeping ascending sequence order. Malformed entries and entries
    /// for a task already queued here are ignored; returns whether it was added.
    pub fn insert(&self, entry: TaskQueueEntry) -> bool {
        let Some(sequence) = entry.sequence_number.filter(|_| entry.is_well_formed()) else {
            debug!(
                participant = %self.participant,
                task_id = %entry.task_id,
                "Ignoring malformed task queue entry"
            );
            return false;
        };

        let mut entries = self.entries.lock();
        if entries.iter().any(|queued| queued.task_id == entry.task_id) {
            debug!(
                participant = %self.participant,
                task_id = %entry.task_id,
                "Task already queued for participant"
            );
            return false;
        }
        // Every queued entry is well formed, so unwrap_or is never consulted
        let position = entries.partition_point(|queued| {
            queued.sequence_number.unwrap_or(TaskSequenceNumber(0)) <= sequence
        });
        entries.insert(position, entry);
        true
    }

    pub fn peek(&self) -> Option<TaskQueueEntry> {
        self.entries.lock().front().cloned()
    }

    pub fn poll(&self) -> Option<TaskQueueEntry> {
        self.entries.lock().pop_front()
    }

    /// Poll the head only if it is still the entry for `task_id`
    pub fn poll_if_head(&self, task_id: &TaskId) -> Option<TaskQueueEntry> {
        let mut entries = self.entries.lock();
        match entries.front() {
            Some(head) if &head.task_id == task_id => entries.pop_front(),
            _ => None,
        }
    }

    pub fn remove(&self, task_id: &TaskId) -> bool {
        let mut entries = self.entries.lock();
        match entries.iter().position(|queued| &queued.task_id == task_id) {
            Some(position) => entries.remove(position).is_some(),
            None => false,
        }
    }

    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.entries.lock().iter().any(|queued| &queued.task_id == task_id)
    }

    pub fn size(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Snapshot of the queue in dequeue order
    pub fn entries(&self) -> Vec<TaskQueueEntry> {
        self.entries.lock().iter().cloned().collect()
    }
}
