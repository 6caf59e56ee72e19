//! # Task Model
//!
//! A task is a unit of work addressed to one or more performers. Its sequence
//! number is assigned by the producing node and orders it within every
//! participant queue it lands in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Producer-assigned ordering key; unique per producing node
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TaskSequenceNumber(pub u64);

impl fmt::Display for TaskSequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic sequence source for one producing node
#[derive(Debug, Default)]
pub struct SequenceGenerator {
    next: AtomicU64,
}

impl SequenceGenerator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    pub fn next_sequence(&self) -> TaskSequenceNumber {
        TaskSequenceNumber(self.next.fetch_add(1, Ordering::SeqCst))
    }
}

/// Who is expected to perform a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PerformerDeclaration {
    /// A named participant; the name may be missing on malformed input
    Participant { name: Option<String> },
    /// Any performer offering the capability; never queued locally
    Capability { capability: String },
}

impl PerformerDeclaration {
    pub fn participant(name: impl Into<String>) -> Self {
        Self::Participant {
            name: Some(name.into()),
        }
    }

    pub fn capability(capability: impl Into<String>) -> Self {
        Self::Capability {
            capability: capability.into(),
        }
    }

    pub fn is_capability_based(&self) -> bool {
        matches!(self, Self::Capability { .. })
    }

    /// The participant name, when this declaration names a non-blank one
    pub fn participant_name(&self) -> Option<&str> {
        match self {
            Self::Participant { name: Some(name) } if !name.trim().is_empty() => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskExecutionStatus {
    Registered,
    Queued,
    Offloaded,
    Dispatched,
    Executing,
    Finished,
    Failed,
    Cancelled,
}

impl TaskExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    Unregistered,
    Registered,
    Initiated,
    Active,
    Finished,
    Failed,
    Cancelled,
}

/// The in-flight fulfillment record of a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFulfillment {
    pub fulfiller_id: Option<String>,
    pub status: FulfillmentStatus,
    /// Fulfiller-visible explanation of the current status
    pub reason: Option<String>,
    pub registration_instant: Option<DateTime<Utc>>,
    pub start_instant: Option<DateTime<Utc>>,
    pub finish_instant: Option<DateTime<Utc>>,
}

impl Default for TaskFulfillment {
    fn default() -> Self {
        Self {
            fulfiller_id: None,
            status: FulfillmentStatus::Unregistered,
            reason: None,
            registration_instant: None,
            start_instant: None,
            finish_instant: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub status: OutcomeStatus,
    pub reason: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl TaskOutcome {
    pub fn new(status: OutcomeStatus, reason: Option<String>) -> Self {
        Self {
            status,
            reason,
            recorded_at: Utc::now(),
        }
    }
}

/// Describes a fulfillment on another node, carried across a handover
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTraceabilityElement {
    pub fulfiller_id: String,
    pub task_id: TaskId,
    pub registration_instant: Option<DateTime<Utc>>,
    pub start_instant: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskTraceability {
    pub is_retry: bool,
    pub retry_of: Option<TaskId>,
    /// Fulfillments on upstream nodes, oldest first
    #[serde(default)]
    pub upstream: Vec<TaskTraceabilityElement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub sequence_number: Option<TaskSequenceNumber>,
    pub performers: Vec<PerformerDeclaration>,
    pub status: TaskExecutionStatus,
    pub fulfillment: TaskFulfillment,
    pub outcome: Option<TaskOutcome>,
    pub traceability: TaskTraceability,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Task {
    pub fn new(sequence_number: TaskSequenceNumber, performers: Vec<PerformerDeclaration>) -> Self {
        Self {
            task_id: TaskId::new(),
            sequence_number: Some(sequence_number),
            performers,
            status: TaskExecutionStatus::Registered,
            fulfillment: TaskFulfillment::default(),
            outcome: None,
            traceability: TaskTraceability::default(),
            payload: serde_json::Value::Null,
        }
    }

    /// Convenience constructor for a task addressed to a single named participant
    pub fn for_participant(sequence_number: TaskSequenceNumber, participant: &str) -> Self {
        Self::new(
            sequence_number,
            vec![PerformerDeclaration::participant(participant)],
        )
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Mark this task as a retry of `previous`
    pub fn as_retry_of(mut self, previous: &TaskId) -> Self {
        self.traceability.is_retry = true;
        self.traceability.retry_of = Some(previous.clone());
        self
    }

    pub fn is_retry(&self) -> bool {
        self.traceability.is_retry
    }

    pub fn is_well_formed(&self) -> bool {
        !self.task_id.is_empty() && self.sequence_number.is_some()
    }

    /// Names of every non-capability performer with a resolvable participant name
    pub fn participant_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for performer in &self.performers {
            if let Some(name) = performer.participant_name() {
                if !names.iter().any(|existing| existing == name) {
                    names.push(name.to_string());
                }
            }
        }
        names
    }

    pub fn mark_cancelled(&mut self, reason: &str) {
        let now = Utc::now();
        self.status = TaskExecutionStatus::Cancelled;
        self.fulfillment.status = FulfillmentStatus::Cancelled;
        self.fulfillment.reason = Some(reason.to_string());
        self.fulfillment.finish_instant = Some(now);
        self.outcome = Some(TaskOutcome::new(
            OutcomeStatus::Cancelled,
            Some(reason.to_string()),
        ));
    }

    pub fn mark_failed(&mut self, reason: &str) {
        let now = Utc::now();
        self.status = TaskExecutionStatus::Failed;
        self.fulfillment.status = FulfillmentStatus::Failed;
        self.fulfillment.reason = Some(reason.to_string());
        self.fulfillment.finish_instant = Some(now);
        self.outcome = Some(TaskOutcome::new(OutcomeStatus::Failed, Some(reason.to_string())));
    }

    pub fn mark_completed(&mut self) {
        self.status = TaskExecutionStatus::Finished;
        self.fulfillment.status = FulfillmentStatus::Finished;
        self.fulfillment.finish_instant = Some(Utc::now());
        self.outcome = Some(TaskOutcome::new(OutcomeStatus::Completed, None));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_generator_is_monotonic() {
        let generator = SequenceGenerator::new();
        let first = generator.next_sequence();
        let second = generator.next_sequence();
        assert!(second > first);
        assert_eq!(first, TaskSequenceNumber(1));
    }

    #[test]
    fn test_participant_names_skip_capabilities_and_blank_names() {
        let task = Task::new(
            TaskSequenceNumber(1),
            vec![
                PerformerDeclaration::participant("ehr-writer"),
                PerformerDeclaration::capability("fhir-validate"),
                PerformerDeclaration::Participant { name: None },
                PerformerDeclaration::participant("  "),
                PerformerDeclaration::participant("ehr-writer"),
                PerformerDeclaration::participant("audit-sink"),
            ],
        );
        assert_eq!(task.participant_names(), vec!["ehr-writer", "audit-sink"]);
    }

    #[test]
    fn test_well_formedness() {
        let mut task = Task::for_participant(TaskSequenceNumber(3), "p");
        assert!(task.is_well_formed());
        task.sequence_number = None;
        assert!(!task.is_well_formed());
        task.sequence_number = Some(TaskSequenceNumber(3));
        task.task_id = TaskId(String::new());
        assert!(!task.is_well_formed());
    }

    #[test]
    fn test_cancellation_records_reason() {
        let mut task = Task::for_participant(TaskSequenceNumber(1), "p");
        task.mark_cancelled("Participant is Disabled");
        assert_eq!(task.status, TaskExecutionStatus::Cancelled);
        assert_eq!(task.fulfillment.status, FulfillmentStatus::Cancelled);
        let outcome = task.outcome.unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Cancelled);
        assert_eq!(outcome.reason.as_deref(), Some("Participant is Disabled"));
    }

    #[test]
    fn test_performer_serialization_shape() {
        let json = serde_json::to_value(PerformerDeclaration::participant("p")).unwrap();
        assert_eq!(json["kind"], "participant");
        assert_eq!(json["name"], "p");
    }
}
