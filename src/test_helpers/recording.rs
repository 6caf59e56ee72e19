//! Recording collaborators: capture what the node hands to its collaborators
//! so tests can assert on it.

use crate::error::{PetasosError, PetasosResult};
use crate::models::{SubscriptionRequest, Task, TaskId};
use crate::orchestration::{TaskDistributor, TaskLifecycleListener};
use crate::registry::SubscriptionWiring;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct RecordingDistributor {
    dispatched: Mutex<Vec<(String, Task)>>,
    fail_next: Mutex<Option<String>>,
    stall: Mutex<Option<Duration>>,
}

impl RecordingDistributor {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next distribution attempt fails with `reason`
    pub fn fail_next(&self, reason: &str) {
        *self.fail_next.lock() = Some(reason.to_string());
    }

    /// Every distribution attempt sleeps for `delay` first
    pub fn stall_for(&self, delay: Duration) {
        *self.stall.lock() = Some(delay);
    }

    pub fn dispatched(&self, participant: &str) -> Vec<Task> {
        self.dispatched
            .lock()
            .iter()
            .filter(|(name, _)| name == participant)
            .map(|(_, task)| task.clone())
            .collect()
    }

    pub fn dispatched_ids(&self, participant: &str) -> Vec<TaskId> {
        self.dispatched(participant)
            .into_iter()
            .map(|task| task.task_id)
            .collect()
    }

    pub fn total_dispatched(&self) -> usize {
        self.dispatched.lock().len()
    }
}

#[async_trait]
impl TaskDistributor for RecordingDistributor {
    async fn distribute(&self, participant: &str, task: Task) -> PetasosResult<()> {
        let stall = *self.stall.lock();
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = self.fail_next.lock().take() {
            return Err(PetasosError::DistributionError(reason));
        }
        self.dispatched.lock().push((participant.to_string(), task));
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingLifecycleListener {
    started: Mutex<Vec<(String, Task)>>,
    failures: Mutex<Vec<(Task, String)>>,
    outcomes: Mutex<Vec<Task>>,
}

impl RecordingLifecycleListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started(&self) -> Vec<(String, Task)> {
        self.started.lock().clone()
    }

    pub fn failures(&self) -> Vec<(Task, String)> {
        self.failures.lock().clone()
    }

    pub fn outcomes(&self) -> Vec<Task> {
        self.outcomes.lock().clone()
    }
}

#[async_trait]
impl TaskLifecycleListener for RecordingLifecycleListener {
    async fn notify_task_start(&self, participant: &str, task: &Task) {
        self.started
            .lock()
            .push((participant.to_string(), task.clone()));
    }

    async fn notify_task_failure(&self, _participant: &str, task: &Task, reason: &str) {
        self.failures.lock().push((task.clone(), reason.to_string()));
    }

    async fn register_task_outcome(&self, task: &Task) {
        self.outcomes.lock().push(task.clone());
    }
}

#[derive(Debug, Default)]
pub struct RecordingSubscriptionWiring {
    wired: Mutex<Vec<SubscriptionRequest>>,
    refuse: Mutex<Option<String>>,
}

impl RecordingSubscriptionWiring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every subsequent request with `reason`
    pub fn refuse_with(&self, reason: &str) {
        *self.refuse.lock() = Some(reason.to_string());
    }

    pub fn wired(&self) -> Vec<SubscriptionRequest> {
        self.wired.lock().clone()
    }
}

#[async_trait]
impl SubscriptionWiring for RecordingSubscriptionWiring {
    async fn wire(&self, request: &SubscriptionRequest) -> PetasosResult<()> {
        if let Some(reason) = self.refuse.lock().clone() {
            return Err(PetasosError::ValidationError(reason));
        }
        self.wired.lock().push(request.clone());
        Ok(())
    }
}
