//! # Local Task Cache
//!
//! Task bodies for every task that is queued or in flight on this node. Queue
//! entries only carry (task id, sequence number); the body is resolved here.

use crate::models::{Task, TaskId};
use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct LocalTaskCache {
    tasks: DashMap<TaskId, Task>,
}

impl LocalTaskCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, task: Task) {
        self.tasks.insert(task.task_id.clone(), task);
    }

    pub fn get(&self, task_id: &TaskId) -> Option<Task> {
        self.tasks.get(task_id).map(|task| task.value().clone())
    }

    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.tasks.contains_key(task_id)
    }

    /// Mutate a cached task in place; returns the updated copy
    pub fn update(&self, task_id: &TaskId, f: impl FnOnce(&mut Task)) -> Option<Task> {
        self.tasks.get_mut(task_id).map(|mut task| {
            f(task.value_mut());
            task.value().clone()
        })
    }

    pub fn remove(&self, task_id: &TaskId) -> Option<Task> {
        self.tasks.remove(task_id).map(|(_, task)| task)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TaskExecutionStatus, TaskSequenceNumber};

    #[test]
    fn test_register_update_remove() {
        let cache = LocalTaskCache::new();
        let task = Task::for_participant(TaskSequenceNumber(1), "p");
        let id = task.task_id.clone();
        cache.register(task);
        assert!(cache.contains(&id));

        let updated = cache
            .update(&id, |task| task.status = TaskExecutionStatus::Queued)
            .unwrap();
        assert_eq!(updated.status, TaskExecutionStatus::Queued);
        assert_eq!(cache.get(&id).unwrap().status, TaskExecutionStatus::Queued);

        assert!(cache.remove(&id).is_some());
        assert!(cache.is_empty());
        assert!(cache.update(&id, |_| {}).is_none());
    }
}
