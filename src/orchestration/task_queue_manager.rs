//! # Task Queue Manager
//!
//! Routes every inbound task to each of its performers and drains participant
//! queues as participants become available.
//!
//! ## Routing
//!
//! For each (task, performer) pair exactly one decision is taken:
//!
//! | Condition | Decision |
//! |---|---|
//! | performer disabled, queue length > offload threshold, or queue at the hard ceiling | [`RoutingDecision::Offload`] |
//! | queue empty and performer idle (and not suspended) | [`RoutingDecision::Forward`] |
//! | otherwise | [`RoutingDecision::Enqueue`] |
//!
//! ## Draining
//!
//! [`TaskQueueManager::process_next_queued_task_for_participant`] is a guarded
//! pipeline that stops at the first failing precondition: not suspended, queue
//! non-empty, participant idle, head task resolvable, participant enabled
//! (otherwise the task is cancelled), retry delay elapsed for retries, then
//! dequeue and dispatch. A retry held back by the delay gets a one-shot
//! re-drain once the remaining delay has passed.

use super::collaborators::{TaskDistributor, TaskLifecycleListener, TaskOffloadStore};
use super::participant_registry::ParticipantRegistry;
use super::participant_task_queue::TaskQueueEntry;
use super::task_cache::LocalTaskCache;
use super::task_queue_cache::LocalTaskQueueCache;
use crate::config::TaskQueueConfig;
use crate::constants::reasons;
use crate::error::{PetasosError, PetasosResult};
use crate::logging::{log_error, log_task_operation};
use crate::metrics::PetasosMetrics;
use crate::models::{
    FulfillmentStatus, ParticipantSnapshot, ParticipantState, Task, TaskExecutionStatus, TaskId,
};
use chrono::Utc;
use dashmap::DashSet;
use futures::future::join_all;
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingDecision {
    /// Not queued or cached locally; parked in the central offload store
    Offload,
    /// Dispatched straight to the distribution channel
    Forward,
    /// Inserted into the participant's queue
    Enqueue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PerformerRouting {
    pub participant: String,
    pub decision: RoutingDecision,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskRoutingReport {
    pub task_id: TaskId,
    pub routings: Vec<PerformerRouting>,
}

impl TaskRoutingReport {
    fn empty(task_id: TaskId) -> Self {
        Self {
            task_id,
            routings: Vec::new(),
        }
    }

    /// At least one performer was forwarded to or enqueued for
    pub fn processed_successfully(&self) -> bool {
        self.routings
            .iter()
            .any(|routing| routing.decision != RoutingDecision::Offload)
    }

    pub fn decision_for(&self, participant: &str) -> Option<RoutingDecision> {
        self.routings
            .iter()
            .find(|routing| routing.participant == participant)
            .map(|routing| routing.decision)
    }
}

/// Result of one pass of the drain pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    Suspended,
    Empty,
    Busy,
    /// The head entry had no task body; the entry was dropped
    StaleEntryDiscarded(TaskId),
    /// The participant is disabled; the head task was cancelled
    CancelledDisabled(TaskId),
    /// The head task is a retry and the retry delay has not elapsed
    RetryDelayPending(TaskId),
    Dispatched(TaskId),
    DispatchFailed(TaskId),
}

impl DrainOutcome {
    /// Whether another pass could make progress without a dispatch
    pub fn continues_draining(&self) -> bool {
        matches!(
            self,
            DrainOutcome::StaleEntryDiscarded(_) | DrainOutcome::CancelledDisabled(_)
        )
    }
}

/// The routing table for one (task, performer) pair
pub fn decide_routing(
    state: &ParticipantState,
    queue_size: usize,
    queue_full: bool,
) -> RoutingDecision {
    if state.is_disabled() || queue_size > state.offload_threshold || queue_full {
        RoutingDecision::Offload
    } else if queue_size == 0 && state.is_idle() && !state.suspended {
        RoutingDecision::Forward
    } else {
        RoutingDecision::Enqueue
    }
}

pub struct TaskQueueManager {
    me: Weak<TaskQueueManager>,
    config: TaskQueueConfig,
    queues: Arc<LocalTaskQueueCache>,
    tasks: Arc<LocalTaskCache>,
    participants: Arc<ParticipantRegistry>,
    distributor: Arc<dyn TaskDistributor>,
    listener: Arc<dyn TaskLifecycleListener>,
    offload_store: Arc<dyn TaskOffloadStore>,
    metrics: Arc<PetasosMetrics>,
    /// Participants with a retry re-drain already scheduled
    pending_redrains: DashSet<String>,
}

impl std::fmt::Debug for TaskQueueManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueueManager")
            .field("config", &self.config)
            .field("participants", &self.participants.names())
            .field("cached_tasks", &self.tasks.len())
            .finish()
    }
}

impl TaskQueueManager {
    pub fn new(
        config: TaskQueueConfig,
        distributor: Arc<dyn TaskDistributor>,
        listener: Arc<dyn TaskLifecycleListener>,
        offload_store: Arc<dyn TaskOffloadStore>,
        metrics: Arc<PetasosMetrics>,
    ) -> Arc<Self> {
        info!(
            size_max = config.size_max,
            offload_threshold = config.offload_threshold,
            onload_threshold = config.onload_threshold,
            batch_size = config.batch_size,
            retry_delay_ms = config.retry_delay_ms,
            "Creating TaskQueueManager"
        );
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            queues: Arc::new(LocalTaskQueueCache::new(config.size_max)),
            tasks: Arc::new(LocalTaskCache::new()),
            participants: Arc::new(ParticipantRegistry::new(config)),
            config,
            distributor,
            listener,
            offload_store,
            metrics,
            pending_redrains: DashSet::new(),
        })
    }

    pub fn config(&self) -> &TaskQueueConfig {
        &self.config
    }

    pub fn queues(&self) -> &Arc<LocalTaskQueueCache> {
        &self.queues
    }

    pub fn tasks(&self) -> &Arc<LocalTaskCache> {
        &self.tasks
    }

    pub fn participants(&self) -> &Arc<ParticipantRegistry> {
        &self.participants
    }

    pub fn participant_snapshot(&self, name: &str) -> ParticipantSnapshot {
        self.participants.snapshot(name, self.queues.size(name))
    }

    // =========================================================================
    // Routing
    // =========================================================================

    /// Route `task` to each of its named performers. Malformed tasks and tasks
    /// with no resolvable performer are rejected with a debug note.
    pub async fn queue_task(&self, task: Task) -> TaskRoutingReport {
        if !task.is_well_formed() {
            debug!(task_id = %task.task_id, "Rejecting malformed task");
            return TaskRoutingReport::empty(task.task_id);
        }
        let performers = task.participant_names();
        if performers.is_empty() {
            debug!(task_id = %task.task_id, "Task has no resolvable participant performer");
            return TaskRoutingReport::empty(task.task_id);
        }
        PetasosMetrics::increment(&self.metrics.tasks_registered);

        let planned: Vec<(String, RoutingDecision)> = performers
            .into_iter()
            .map(|participant| {
                let queue_size = self.queues.size(&participant);
                let queue_full = self.queues.is_full(&participant);
                let decision = self.participants.with(&participant, |state| {
                    decide_routing(state, queue_size, queue_full)
                });
                (participant, decision)
            })
            .collect();

        if planned
            .iter()
            .any(|(_, decision)| *decision != RoutingDecision::Offload)
            && !self.tasks.contains(&task.task_id)
        {
            let mut cached = task.clone();
            cached.status = TaskExecutionStatus::Queued;
            if cached.fulfillment.registration_instant.is_none() {
                cached.fulfillment.registration_instant = Some(Utc::now());
                cached.fulfillment.status = FulfillmentStatus::Registered;
            }
            self.tasks.register(cached);
        }

        let mut report = TaskRoutingReport::empty(task.task_id.clone());
        for (participant, decision) in planned {
            let applied = match decision {
                RoutingDecision::Offload => {
                    self.offload(&participant, &task).await;
                    RoutingDecision::Offload
                }
                RoutingDecision::Forward if self.participants.try_claim(&participant) => {
                    PetasosMetrics::increment(&self.metrics.tasks_forwarded);
                    self.dispatch(&participant, &task.task_id).await;
                    RoutingDecision::Forward
                }
                RoutingDecision::Forward | RoutingDecision::Enqueue => {
                    self.enqueue(&participant, &task).await;
                    RoutingDecision::Enqueue
                }
            };
            debug!(
                task_id = %task.task_id,
                participant = %participant,
                decision = ?applied,
                "Task routed"
            );
            report.routings.push(PerformerRouting {
                participant,
                decision: applied,
            });
        }

        // Offloaded for every performer: no local copy may remain
        if !report.processed_successfully() && !self.is_in_flight(&task.task_id) {
            self.release_task(&task.task_id);
        }
        report
    }

    fn is_in_flight(&self, task_id: &TaskId) -> bool {
        self.tasks.get(task_id).is_some_and(|task| {
            matches!(
                task.status,
                TaskExecutionStatus::Dispatched | TaskExecutionStatus::Executing
            )
        })
    }

    async fn offload(&self, participant: &str, task: &Task) {
        // A re-submitted task must not linger in a queue it was offloaded from
        if let Some(queue) = self.queues.queue(participant) {
            queue.remove(&task.task_id);
        }

        let mut parked = task.clone();
        parked.status = TaskExecutionStatus::Offloaded;
        match self.offload_store.offload(participant, parked).await {
            Ok(()) => {
                self.participants
                    .with(participant, |state| state.offloaded_count += 1);
                PetasosMetrics::increment(&self.metrics.tasks_offloaded);
                log_task_operation(
                    "offload",
                    Some(task.task_id.as_str()),
                    Some(participant),
                    "offloaded",
                    None,
                );
            }
            Err(e) => {
                warn!(
                    task_id = %task.task_id,
                    participant = %participant,
                    error = %e,
                    "Offload store rejected task; treating it as handled remotely"
                );
            }
        }
    }

    async fn enqueue(&self, participant: &str, task: &Task) {
        if self
            .queues
            .insert_for(participant, TaskQueueEntry::from_task(task))
        {
            PetasosMetrics::increment(&self.metrics.tasks_queued);
        }
        let idle = self.participants.with(participant, |state| state.is_idle());
        if idle {
            self.process_next_queued_task_for_participant(participant)
                .await;
        }
    }

    // =========================================================================
    // Draining
    // =========================================================================

    pub async fn process_next_queued_task_for_participant(&self, participant: &str) -> DrainOutcome {
        let state = self.participants.state(participant);

        if state.suspended {
            return DrainOutcome::Suspended;
        }
        let Some(head) = self.queues.peek(participant) else {
            return DrainOutcome::Empty;
        };
        if !state.is_idle() {
            return DrainOutcome::Busy;
        }
        let Some(task) = self.tasks.get(&head.task_id) else {
            self.poll_head(participant, &head.task_id);
            debug!(
                participant = %participant,
                task_id = %head.task_id,
                "Discarded stale queue entry with no cached task"
            );
            return DrainOutcome::StaleEntryDiscarded(head.task_id);
        };
        if state.is_disabled() {
            self.poll_head(participant, &head.task_id);
            self.cancel_for_disabled(participant, &task.task_id).await;
            return DrainOutcome::CancelledDisabled(head.task_id);
        }
        if task.is_retry() {
            let remaining = state.retry_delay_remaining(self.config.retry_delay());
            if !remaining.is_zero() {
                debug!(
                    participant = %participant,
                    task_id = %task.task_id,
                    remaining_ms = remaining.as_millis() as u64,
                    "Retry delay not yet elapsed, leaving task at head"
                );
                self.schedule_redrain(participant, remaining);
                return DrainOutcome::RetryDelayPending(head.task_id);
            }
        }
        if !self.participants.try_claim(participant) {
            return DrainOutcome::Busy;
        }
        if self.poll_head(participant, &head.task_id).is_none() {
            // Another drain took this head first
            self.participants.mark_idle(participant);
            return DrainOutcome::Busy;
        }
        self.dispatch(participant, &head.task_id).await
    }

    /// Repeat the drain pipeline while it makes progress without dispatching
    pub async fn drain_participant(&self, participant: &str) -> Vec<DrainOutcome> {
        let mut outcomes = Vec::new();
        loop {
            let outcome = self
                .process_next_queued_task_for_participant(participant)
                .await;
            let keep_going = outcome.continues_draining();
            outcomes.push(outcome);
            if !keep_going {
                return outcomes;
            }
        }
    }

    /// Drain `participant` again once `delay` has passed; at most one pending per participant
    fn schedule_redrain(&self, participant: &str, delay: Duration) {
        if !self.pending_redrains.insert(participant.to_string()) {
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            self.pending_redrains.remove(participant);
            warn!(participant = %participant, "No async runtime; retry re-drain not scheduled");
            return;
        };
        let me = self.me.clone();
        let participant = participant.to_string();
        runtime.spawn(async move {
            tokio::time::sleep(delay + Duration::from_millis(1)).await;
            let Some(manager) = me.upgrade() else {
                return;
            };
            manager.pending_redrains.remove(&participant);
            let outcomes = manager.drain_participant(&participant).await;
            debug!(participant = %participant, ?outcomes, "Retry re-drain ran");
        });
    }

    fn poll_head(&self, participant: &str, task_id: &TaskId) -> Option<TaskQueueEntry> {
        self.queues
            .queue(participant)
            .and_then(|queue| queue.poll_if_head(task_id))
    }

    /// Hand a claimed task to the distribution channel. The participant must
    /// already have been claimed (marked busy) by the caller.
    async fn dispatch(&self, participant: &str, task_id: &TaskId) -> DrainOutcome {
        let Some(task) = self.tasks.update(task_id, |task| {
            task.status = TaskExecutionStatus::Dispatched;
            task.fulfillment.fulfiller_id = Some(participant.to_string());
            task.fulfillment.status = FulfillmentStatus::Initiated;
        }) else {
            self.participants.mark_idle(participant);
            return DrainOutcome::StaleEntryDiscarded(task_id.clone());
        };

        match self.distributor.distribute(participant, task).await {
            Ok(()) => {
                debug!(participant = %participant, task_id = %task_id, "Task dispatched");
                DrainOutcome::Dispatched(task_id.clone())
            }
            Err(e) => {
                warn!(
                    participant = %participant,
                    task_id = %task_id,
                    error = %e,
                    "Task distribution failed"
                );
                self.participants.mark_idle(participant);
                let reason = format!("{}: {e}", reasons::DISTRIBUTION_FAILED);
                self.fail_task(participant, task_id, &reason).await;
                DrainOutcome::DispatchFailed(task_id.clone())
            }
        }
    }

    async fn cancel_for_disabled(&self, participant: &str, task_id: &TaskId) {
        let Some(cancelled) = self
            .tasks
            .update(task_id, |task| task.mark_cancelled(reasons::PARTICIPANT_DISABLED))
        else {
            return;
        };
        PetasosMetrics::increment(&self.metrics.tasks_cancelled);
        log_task_operation(
            "cancel",
            Some(task_id.as_str()),
            Some(participant),
            "cancelled",
            Some(reasons::PARTICIPANT_DISABLED),
        );
        self.listener.register_task_outcome(&cancelled).await;
        self.release_task(task_id);
    }

    async fn fail_task(&self, participant: &str, task_id: &TaskId, reason: &str) -> Option<Task> {
        let failed = self.tasks.update(task_id, |task| task.mark_failed(reason))?;
        PetasosMetrics::increment(&self.metrics.tasks_failed);
        self.listener
            .notify_task_failure(participant, &failed, reason)
            .await;
        self.listener.register_task_outcome(&failed).await;
        self.release_task(task_id);
        Some(failed)
    }

    /// Forget a task body once no participant queue references it
    fn release_task(&self, task_id: &TaskId) {
        if !self.queues.references_task(task_id) {
            self.tasks.remove(task_id);
        }
    }

    // =========================================================================
    // Onloading
    // =========================================================================

    /// Pull up to `batch_size` offloaded tasks back into `participant`'s queue
    /// once the queue is at or below its onload threshold.
    pub async fn onload_participant_tasks(&self, participant: &str) -> PetasosResult<usize> {
        let state = self.participants.state(participant);
        if state.is_disabled() || state.offloaded_count == 0 {
            return Ok(0);
        }
        if self.queues.size(participant) > state.onload_threshold {
            return Ok(0);
        }

        let onloaded = self
            .offload_store
            .onload(participant, self.config.batch_size)
            .await?;
        let count = onloaded.len();
        for mut task in onloaded {
            if !self.tasks.contains(&task.task_id) {
                task.status = TaskExecutionStatus::Queued;
                self.tasks.register(task.clone());
            }
            self.queues
                .insert_for(participant, TaskQueueEntry::from_task(&task));
        }
        self.participants.with(participant, |state| {
            state.offloaded_count = state.offloaded_count.saturating_sub(count)
        });
        self.metrics
            .tasks_onloaded
            .fetch_add(count as u64, std::sync::atomic::Ordering::Relaxed);

        if count > 0 {
            info!(participant = %participant, count, "Onloaded offloaded tasks");
            self.drain_participant(participant).await;
        }
        Ok(count)
    }

    /// Onload every known participant; returns the total number of tasks pulled back
    pub async fn onload_all(&self) -> usize {
        let participants = self.participants.names();
        let results = join_all(
            participants
                .iter()
                .map(|participant| self.onload_participant_tasks(participant)),
        )
        .await;

        participants
            .iter()
            .zip(results)
            .map(|(participant, result)| match result {
                Ok(count) => count,
                Err(e) => {
                    log_error(
                        "task_queue_manager",
                        "onload",
                        &e.to_string(),
                        Some(participant),
                    );
                    0
                }
            })
            .sum()
    }

    // =========================================================================
    // Executor feedback
    // =========================================================================

    pub async fn task_started(&self, participant: &str, task_id: &TaskId) -> PetasosResult<Task> {
        let started = self
            .tasks
            .update(task_id, |task| {
                task.status = TaskExecutionStatus::Executing;
                task.fulfillment.status = FulfillmentStatus::Active;
                task.fulfillment.start_instant = Some(Utc::now());
            })
            .ok_or_else(|| unknown_task(task_id))?;
        self.participants.mark_busy(participant);
        PetasosMetrics::increment(&self.metrics.tasks_started);
        self.listener.notify_task_start(participant, &started).await;
        Ok(started)
    }

    pub async fn task_finished(&self, participant: &str, task_id: &TaskId) -> PetasosResult<Task> {
        let finished = self
            .tasks
            .update(task_id, |task| task.mark_completed())
            .ok_or_else(|| unknown_task(task_id))?;
        PetasosMetrics::increment(&self.metrics.tasks_finished);
        debug!(participant = %participant, task_id = %task_id, "Task finished");
        self.listener.register_task_outcome(&finished).await;
        self.release_task(task_id);
        Ok(finished)
    }

    pub async fn task_failed(
        &self,
        participant: &str,
        task_id: &TaskId,
        reason: &str,
    ) -> PetasosResult<Task> {
        self.fail_task(participant, task_id, reason)
            .await
            .ok_or_else(|| unknown_task(task_id))
    }

    /// The participant finished its current work; drain its queue
    pub async fn participant_idle(&self, participant: &str) -> Vec<DrainOutcome> {
        self.participants.mark_idle(participant);
        self.drain_participant(participant).await
    }

    pub fn participant_busy(&self, participant: &str) {
        self.participants.mark_busy(participant);
    }

    /// Disable a participant; its queued tasks are cancelled as it drains
    pub async fn disable_participant(&self, participant: &str) -> Vec<DrainOutcome> {
        self.participants.disable(participant);
        self.drain_participant(participant).await
    }

    pub async fn enable_participant(&self, participant: &str) -> Vec<DrainOutcome> {
        self.participants.enable(participant);
        self.drain_participant(participant).await
    }

    pub fn suspend_participant(&self, participant: &str) {
        self.participants.suspend(participant);
    }

    pub async fn resume_participant(&self, participant: &str) -> Vec<DrainOutcome> {
        self.participants.resume(participant);
        self.drain_participant(participant).await
    }

    // =========================================================================
    // Queries and updates
    // =========================================================================

    pub fn update_task_status(
        &self,
        task_id: &TaskId,
        status: TaskExecutionStatus,
    ) -> PetasosResult<Task> {
        self.tasks
            .update(task_id, |task| task.status = status)
            .ok_or_else(|| unknown_task(task_id))
    }

    /// Task bodies queued for `participant`, in dequeue order
    pub fn queued_tasks(&self, participant: &str) -> PetasosResult<Vec<Task>> {
        if participant.trim().is_empty() {
            return Err(PetasosError::resource_update(
                "participant",
                "participant name must not be empty",
            ));
        }
        Ok(self
            .queues
            .queue(participant)
            .map(|queue| queue.entries())
            .unwrap_or_default()
            .iter()
            .filter_map(|entry| self.tasks.get(&entry.task_id))
            .collect())
    }
}

fn unknown_task(task_id: &TaskId) -> PetasosError {
    PetasosError::resource_update(format!("task {task_id}"), "task is not known to this node")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OutcomeStatus, PerformerDeclaration, TaskSequenceNumber};
    use crate::orchestration::collaborators::InMemoryOffloadStore;
    use crate::test_helpers::{RecordingDistributor, RecordingLifecycleListener};
    use std::time::Duration;

    struct Harness {
        manager: Arc<TaskQueueManager>,
        distributor: Arc<RecordingDistributor>,
        listener: Arc<RecordingLifecycleListener>,
        store: Arc<InMemoryOffloadStore>,
    }

    fn harness(config: TaskQueueConfig) -> Harness {
        let distributor = Arc::new(RecordingDistributor::new());
        let listener = Arc::new(RecordingLifecycleListener::new());
        let store = Arc::new(InMemoryOffloadStore::new());
        let manager = TaskQueueManager::new(
            config,
            distributor.clone(),
            listener.clone(),
            store.clone(),
            Arc::new(PetasosMetrics::new()),
        );
        Harness {
            manager,
            distributor,
            listener,
            store,
        }
    }

    fn task(sequence: u64, participant: &str) -> Task {
        Task::for_participant(TaskSequenceNumber(sequence), participant)
    }

    #[test]
    fn test_routing_table() {
        let mut state = ParticipantState::new("p", 500, 10, 5);
        assert_eq!(decide_routing(&state, 0, false), RoutingDecision::Forward);
        assert_eq!(decide_routing(&state, 3, false), RoutingDecision::Enqueue);
        assert_eq!(decide_routing(&state, 11, false), RoutingDecision::Offload);
        assert_eq!(decide_routing(&state, 10, false), RoutingDecision::Enqueue);
        assert_eq!(decide_routing(&state, 3, true), RoutingDecision::Offload);

        state.mark_busy();
        assert_eq!(decide_routing(&state, 0, false), RoutingDecision::Enqueue);

        state.mark_idle();
        state.suspended = true;
        assert_eq!(decide_routing(&state, 0, false), RoutingDecision::Enqueue);

        state.enabled = false;
        assert_eq!(decide_routing(&state, 0, false), RoutingDecision::Offload);
    }

    #[tokio::test]
    async fn test_idle_empty_participant_gets_task_forwarded() {
        let h = harness(TaskQueueConfig::default());
        let t = task(1, "p");
        let report = h.manager.queue_task(t.clone()).await;

        assert_eq!(report.decision_for("p"), Some(RoutingDecision::Forward));
        assert!(report.processed_successfully());
        assert_eq!(h.distributor.dispatched_ids("p"), vec![t.task_id.clone()]);
        assert_eq!(h.manager.queues().size("p"), 0);
        assert!(!h.manager.participants().state("p").is_idle());
    }

    #[tokio::test]
    async fn test_busy_participant_gets_task_enqueued() {
        let h = harness(TaskQueueConfig::default());
        h.manager.participant_busy("p");
        let report = h.manager.queue_task(task(1, "p")).await;
        assert_eq!(report.decision_for("p"), Some(RoutingDecision::Enqueue));
        assert_eq!(h.manager.queues().size("p"), 1);
        assert!(h.distributor.dispatched_ids("p").is_empty());
    }

    #[tokio::test]
    async fn test_offload_threshold_scenario() {
        let config = TaskQueueConfig {
            offload_threshold: 10,
            ..TaskQueueConfig::default()
        };
        let h = harness(config);
        h.manager.participant_busy("p");

        for sequence in 1..=11 {
            let report = h.manager.queue_task(task(sequence, "p")).await;
            assert_eq!(report.decision_for("p"), Some(RoutingDecision::Enqueue));
        }
        let twelfth = task(12, "p");
        let report = h.manager.queue_task(twelfth.clone()).await;

        assert_eq!(report.decision_for("p"), Some(RoutingDecision::Offload));
        assert!(!report.processed_successfully());
        assert!(!h.manager.queues().queue("p").unwrap().contains(&twelfth.task_id));
        assert!(!h.manager.tasks().contains(&twelfth.task_id));
        assert_eq!(h.store.parked_count("p"), 1);
        assert_eq!(h.manager.participant_snapshot("p").offloaded_count, 1);
    }

    #[tokio::test]
    async fn test_disabled_performer_is_offloaded_even_with_prior_queue_entry() {
        let h = harness(TaskQueueConfig::default());
        h.manager.participant_busy("p");
        let t = task(1, "p");
        h.manager.queue_task(t.clone()).await;
        assert_eq!(h.manager.queues().size("p"), 1);

        h.manager.participants().disable("p");
        let report = h.manager.queue_task(t.clone()).await;
        assert_eq!(report.decision_for("p"), Some(RoutingDecision::Offload));
        assert!(!h.manager.queues().queue("p").unwrap().contains(&t.task_id));
        assert!(!h.manager.tasks().contains(&t.task_id));
    }

    #[tokio::test]
    async fn test_offload_keeps_body_queued_for_another_performer() {
        let h = harness(TaskQueueConfig::default());
        h.manager.participant_busy("p");
        h.manager.participant_busy("q");
        let t = Task::new(
            TaskSequenceNumber(1),
            vec![
                PerformerDeclaration::participant("p"),
                PerformerDeclaration::participant("q"),
            ],
        );
        h.manager.queue_task(t.clone()).await;

        h.manager.participants().disable("p");
        let report = h.manager.queue_task(t.clone()).await;
        assert_eq!(report.decision_for("p"), Some(RoutingDecision::Offload));
        assert!(!h.manager.queues().queue("p").unwrap().contains(&t.task_id));
        assert!(h.manager.queues().queue("q").unwrap().contains(&t.task_id));
        assert!(h.manager.tasks().contains(&t.task_id));
    }

    #[tokio::test]
    async fn test_each_performer_gets_exactly_one_decision() {
        let h = harness(TaskQueueConfig::default());
        h.manager.participant_busy("busy");
        h.manager.participants().disable("off");
        let t = Task::new(
            TaskSequenceNumber(1),
            vec![
                PerformerDeclaration::participant("idle"),
                PerformerDeclaration::participant("busy"),
                PerformerDeclaration::participant("off"),
                PerformerDeclaration::capability("anyone"),
            ],
        );
        let report = h.manager.queue_task(t).await;
        assert_eq!(report.routings.len(), 3);
        assert_eq!(report.decision_for("idle"), Some(RoutingDecision::Forward));
        assert_eq!(report.decision_for("busy"), Some(RoutingDecision::Enqueue));
        assert_eq!(report.decision_for("off"), Some(RoutingDecision::Offload));
        assert!(report.processed_successfully());
    }

    #[tokio::test]
    async fn test_malformed_task_is_rejected_silently() {
        let h = harness(TaskQueueConfig::default());
        let mut t = task(1, "p");
        t.sequence_number = None;
        let report = h.manager.queue_task(t).await;
        assert!(report.routings.is_empty());
        assert!(!report.processed_successfully());

        let report = h
            .manager
            .queue_task(Task::new(
                TaskSequenceNumber(2),
                vec![PerformerDeclaration::capability("x")],
            ))
            .await;
        assert!(report.routings.is_empty());
    }

    #[tokio::test]
    async fn test_idle_transition_dispatches_lowest_sequence_first() {
        let h = harness(TaskQueueConfig::default());
        h.manager.participant_busy("p");
        let high = task(20, "p");
        let low = task(10, "p");
        h.manager.queue_task(high.clone()).await;
        h.manager.queue_task(low.clone()).await;

        let outcomes = h.manager.participant_idle("p").await;
        assert_eq!(outcomes, vec![DrainOutcome::Dispatched(low.task_id.clone())]);

        let outcomes = h.manager.participant_idle("p").await;
        assert_eq!(outcomes, vec![DrainOutcome::Dispatched(high.task_id.clone())]);
        assert_eq!(
            h.distributor.dispatched_ids("p"),
            vec![low.task_id, high.task_id]
        );
    }

    #[tokio::test]
    async fn test_drain_guards_short_circuit_in_order() {
        let h = harness(TaskQueueConfig::default());
        assert_eq!(
            h.manager.process_next_queued_task_for_participant("p").await,
            DrainOutcome::Empty
        );

        h.manager.participant_busy("p");
        h.manager.queue_task(task(1, "p")).await;
        h.manager.suspend_participant("p");
        assert_eq!(
            h.manager.process_next_queued_task_for_participant("p").await,
            DrainOutcome::Suspended
        );
        h.manager.participants().resume("p");
        assert_eq!(
            h.manager.process_next_queued_task_for_participant("p").await,
            DrainOutcome::Busy
        );
    }

    #[tokio::test]
    async fn test_stale_entry_is_discarded() {
        let h = harness(TaskQueueConfig::default());
        h.manager.participant_busy("p");
        let t = task(1, "p");
        h.manager.queue_task(t.clone()).await;
        h.manager.tasks().remove(&t.task_id);
        h.manager.participants().mark_idle("p");

        let outcome = h.manager.process_next_queued_task_for_participant("p").await;
        assert_eq!(outcome, DrainOutcome::StaleEntryDiscarded(t.task_id));
        assert_eq!(h.manager.queues().size("p"), 0);
    }

    #[tokio::test]
    async fn test_disabled_participant_drain_cancels_every_task() {
        let h = harness(TaskQueueConfig::default());
        h.manager.participant_busy("p");
        let queued: Vec<Task> = (1..=3).map(|s| task(s, "p")).collect();
        for t in &queued {
            h.manager.queue_task(t.clone()).await;
        }
        h.manager.participants().disable("p");
        h.manager.participants().mark_idle("p");

        let outcomes = h.manager.drain_participant("p").await;
        assert_eq!(outcomes.len(), 4);
        assert_eq!(outcomes.last(), Some(&DrainOutcome::Empty));
        assert_eq!(h.manager.queues().size("p"), 0);

        let recorded = h.listener.outcomes();
        assert_eq!(recorded.len(), 3);
        for cancelled in recorded {
            assert_eq!(cancelled.fulfillment.status, FulfillmentStatus::Cancelled);
            assert_eq!(
                cancelled.fulfillment.reason.as_deref(),
                Some(reasons::PARTICIPANT_DISABLED)
            );
            assert_eq!(cancelled.outcome.unwrap().status, OutcomeStatus::Cancelled);
        }
        assert!(h.distributor.dispatched_ids("p").is_empty());
    }

    #[tokio::test]
    async fn test_retry_waits_for_retry_delay() {
        let config = TaskQueueConfig {
            retry_delay_ms: 60_000,
            ..TaskQueueConfig::default()
        };
        let h = harness(config);
        h.manager.participant_busy("p");
        let original = task(1, "p");
        let retry = task(2, "p").as_retry_of(&original.task_id);
        h.manager.queue_task(retry.clone()).await;

        let outcomes = h.manager.participant_idle("p").await;
        assert_eq!(
            outcomes,
            vec![DrainOutcome::RetryDelayPending(retry.task_id.clone())]
        );
        assert_eq!(h.manager.queues().size("p"), 1);
    }

    #[tokio::test]
    async fn test_retry_dispatches_once_delay_elapsed() {
        let config = TaskQueueConfig {
            retry_delay_ms: 20,
            ..TaskQueueConfig::default()
        };
        let h = harness(config);
        h.manager.participant_busy("p");
        let retry = task(2, "p").as_retry_of(&TaskId::from("earlier"));
        h.manager.queue_task(retry.clone()).await;
        h.manager.participants().mark_idle("p");

        tokio::time::sleep(Duration::from_millis(40)).await;
        let outcome = h.manager.process_next_queued_task_for_participant("p").await;
        assert_eq!(outcome, DrainOutcome::Dispatched(retry.task_id));
    }

    #[tokio::test]
    async fn test_held_back_retry_is_dispatched_once_delay_passes() {
        let config = TaskQueueConfig {
            retry_delay_ms: 50,
            ..TaskQueueConfig::default()
        };
        let h = harness(config);
        h.manager.participant_busy("p");
        let retry = task(2, "p").as_retry_of(&TaskId::from("earlier"));
        h.manager.queue_task(retry.clone()).await;

        let outcomes = h.manager.participant_idle("p").await;
        assert_eq!(
            outcomes,
            vec![DrainOutcome::RetryDelayPending(retry.task_id.clone())]
        );
        // A second idle report must not schedule a second dispatch
        h.manager.participant_idle("p").await;

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while h.distributor.dispatched_ids("p").is_empty()
            && tokio::time::Instant::now() < deadline
        {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(h.distributor.dispatched_ids("p"), vec![retry.task_id]);
        assert_eq!(h.manager.queues().size("p"), 0);
        assert!(!h.manager.participants().state("p").is_idle());
    }

    #[tokio::test]
    async fn test_distribution_failure_fails_task_and_frees_participant() {
        let h = harness(TaskQueueConfig::default());
        h.distributor.fail_next("executor offline");
        let t = task(1, "p");
        let report = h.manager.queue_task(t.clone()).await;
        assert_eq!(report.decision_for("p"), Some(RoutingDecision::Forward));

        assert!(h.manager.participants().state("p").is_idle());
        let failures = h.listener.failures();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].1.starts_with(reasons::DISTRIBUTION_FAILED));
        assert!(!h.manager.tasks().contains(&t.task_id));
    }

    #[tokio::test]
    async fn test_executor_feedback_updates_task_and_notifies() {
        let h = harness(TaskQueueConfig::default());
        let t = task(1, "p");
        h.manager.queue_task(t.clone()).await;

        let started = h.manager.task_started("p", &t.task_id).await.unwrap();
        assert_eq!(started.status, TaskExecutionStatus::Executing);
        assert_eq!(h.listener.started().len(), 1);

        let finished = h.manager.task_finished("p", &t.task_id).await.unwrap();
        assert_eq!(finished.outcome.unwrap().status, OutcomeStatus::Completed);
        assert!(!h.manager.tasks().contains(&t.task_id));

        let err = h.manager.task_finished("p", &t.task_id).await.unwrap_err();
        assert!(matches!(err, PetasosError::ResourceUpdate { .. }));
    }

    #[tokio::test]
    async fn test_onload_pulls_back_a_batch_below_threshold() {
        let config = TaskQueueConfig {
            offload_threshold: 2,
            onload_threshold: 1,
            batch_size: 2,
            ..TaskQueueConfig::default()
        };
        let h = harness(config);
        h.manager.participant_busy("p");
        for sequence in 1..=6 {
            h.manager.queue_task(task(sequence, "p")).await;
        }
        assert_eq!(h.manager.queues().size("p"), 3);
        assert_eq!(h.store.parked_count("p"), 3);

        // Above the onload threshold nothing comes back
        assert_eq!(h.manager.onload_participant_tasks("p").await.unwrap(), 0);

        while h.manager.queues().poll("p").is_some() {}
        let onloaded = h.manager.onload_participant_tasks("p").await.unwrap();
        assert_eq!(onloaded, 2);
        assert_eq!(h.manager.queues().size("p"), 2);
        assert_eq!(h.store.parked_count("p"), 1);
        assert_eq!(h.manager.participant_snapshot("p").offloaded_count, 1);
    }

    #[tokio::test]
    async fn test_queries_surface_resource_update_errors() {
        let h = harness(TaskQueueConfig::default());
        assert!(matches!(
            h.manager.queued_tasks(" "),
            Err(PetasosError::ResourceUpdate { .. })
        ));
        assert!(matches!(
            h.manager
                .update_task_status(&TaskId::from("nope"), TaskExecutionStatus::Failed),
            Err(PetasosError::ResourceUpdate { .. })
        ));

        h.manager.participant_busy("p");
        let t = task(1, "p");
        h.manager.queue_task(t.clone()).await;
        let queued = h.manager.queued_tasks("p").unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].status, TaskExecutionStatus::Queued);
        assert!(h.manager.queued_tasks("nobody").unwrap().is_empty());
    }
}
