//! Proptest strategies for queue and routing properties

use petasos::models::ParticipantState;
use proptest::prelude::*;

/// Sequence numbers drawn from a narrow range so duplicates are common
pub fn sequence_numbers_strategy() -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(0u64..64, 0..80)
}

#[derive(Debug, Clone)]
pub struct ParticipantCondition {
    pub enabled: bool,
    pub suspended: bool,
    pub idle: bool,
    pub offload_threshold: usize,
    pub queue_size_max: usize,
}

impl ParticipantCondition {
    pub fn state(&self) -> ParticipantState {
        let mut state = ParticipantState::new(
            "p",
            self.queue_size_max,
            self.offload_threshold,
            self.offload_threshold / 2,
        );
        state.enabled = self.enabled;
        state.suspended = self.suspended;
        if !self.idle {
            state.mark_busy();
        }
        state
    }
}

pub fn participant_condition_strategy() -> impl Strategy<Value = ParticipantCondition> {
    (
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
        0usize..20,
        1usize..30,
    )
        .prop_map(
            |(enabled, suspended, idle, offload_threshold, queue_size_max)| ParticipantCondition {
                enabled,
                suspended,
                idle,
                offload_threshold,
                queue_size_max,
            },
        )
}

/// One step of a producer/executor interleaving against a single participant
#[derive(Debug, Clone)]
pub enum QueueOperation {
    Submit,
    FinishCurrent,
    Suspend,
    Resume,
    Onload,
}

pub fn queue_operations_strategy() -> impl Strategy<Value = Vec<QueueOperation>> {
    prop::collection::vec(
        prop_oneof![
            6 => Just(QueueOperation::Submit),
            3 => Just(QueueOperation::FinishCurrent),
            1 => Just(QueueOperation::Suspend),
            1 => Just(QueueOperation::Resume),
            1 => Just(QueueOperation::Onload),
        ],
        1..60,
    )
}
