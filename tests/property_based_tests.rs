mod common;

use common::strategies::*;
use petasos::config::TaskQueueConfig;
use petasos::metrics::PetasosMetrics;
use petasos::models::{SequenceGenerator, Task, TaskId, TaskSequenceNumber};
use petasos::orchestration::{
    decide_routing, InMemoryOffloadStore, ParticipantTaskQueue, RoutingDecision,
    TaskQueueEntry, TaskQueueManager,
};
use petasos::test_helpers::{RecordingDistributor, RecordingLifecycleListener};
use proptest::prelude::*;
use std::sync::Arc;

proptest! {
    /// Property: a participant queue always dequeues in ascending sequence order
    #[test]
    fn queue_dequeues_in_sequence_order(sequences in sequence_numbers_strategy()) {
        let queue = ParticipantTaskQueue::new("p");
        for sequence in &sequences {
            prop_assert!(queue.insert(TaskQueueEntry::new(TaskId::new(), TaskSequenceNumber(*sequence))));
        }
        prop_assert_eq!(queue.size(), sequences.len());

        let mut drained = Vec::new();
        while let Some(entry) = queue.poll() {
            drained.push(entry.sequence_number.unwrap().0);
        }
        let mut expected = sequences.clone();
        expected.sort_unstable();
        prop_assert_eq!(drained, expected);
    }

    /// Property: a task id is queued at most once per participant
    #[test]
    fn queue_rejects_duplicate_task_ids(sequences in sequence_numbers_strategy()) {
        let queue = ParticipantTaskQueue::new("p");
        let entries: Vec<TaskQueueEntry> = sequences
            .iter()
            .map(|sequence| TaskQueueEntry::new(TaskId::new(), TaskSequenceNumber(*sequence)))
            .collect();
        for entry in &entries {
            queue.insert(entry.clone());
        }
        for entry in &entries {
            prop_assert!(!queue.insert(entry.clone()));
        }
        prop_assert_eq!(queue.size(), entries.len());
    }

    /// Property: routing picks exactly the decision the backpressure rules dictate
    #[test]
    fn routing_follows_backpressure_rules(
        condition in participant_condition_strategy(),
        queue_size in 0usize..40,
    ) {
        let state = condition.state();
        let full = queue_size >= condition.queue_size_max;
        let decision = decide_routing(&state, queue_size, full);

        let must_offload = !condition.enabled || queue_size > condition.offload_threshold || full;
        let may_forward = queue_size == 0 && condition.idle && !condition.suspended;
        let expected = if must_offload {
            RoutingDecision::Offload
        } else if may_forward {
            RoutingDecision::Forward
        } else {
            RoutingDecision::Enqueue
        };
        prop_assert_eq!(decision, expected);
    }

    /// Property: no task is lost or duplicated by any interleaving of
    /// submissions, completions, suspension and onloading
    #[test]
    fn tasks_are_conserved_across_interleavings(operations in queue_operations_strategy()) {
        let config = TaskQueueConfig {
            size_max: 8,
            offload_threshold: 5,
            onload_threshold: 2,
            batch_size: 3,
            retry_delay_ms: 0,
        };
        let distributor = Arc::new(RecordingDistributor::new());
        let store = Arc::new(InMemoryOffloadStore::new());
        let manager = TaskQueueManager::new(
            config,
            distributor.clone(),
            Arc::new(RecordingLifecycleListener::new()),
            store.clone(),
            Arc::new(PetasosMetrics::new()),
        );
        let sequence = SequenceGenerator::new();

        let (submitted, finished) = tokio_test::block_on(async {
            let mut submitted = 0usize;
            let mut finished = 0usize;
            for operation in &operations {
                match operation {
                    QueueOperation::Submit => {
                        let report = manager
                            .queue_task(Task::for_participant(sequence.next_sequence(), "p"))
                            .await;
                        assert_eq!(report.routings.len(), 1);
                        submitted += 1;
                    }
                    QueueOperation::FinishCurrent => {
                        let dispatched = distributor.dispatched_ids("p");
                        if dispatched.len() > finished {
                            let current = dispatched[dispatched.len() - 1].clone();
                            manager.task_finished("p", &current).await.unwrap();
                            finished += 1;
                            manager.participant_idle("p").await;
                        }
                    }
                    QueueOperation::Suspend => manager.suspend_participant("p"),
                    QueueOperation::Resume => {
                        manager.resume_participant("p").await;
                    }
                    QueueOperation::Onload => {
                        manager.onload_participant_tasks("p").await.unwrap();
                    }
                }
                assert!(manager.queues().size("p") <= 8);
            }
            (submitted, finished)
        });

        let queued = manager.queues().size("p");
        let parked = store.parked_count("p");
        let dispatched = distributor.total_dispatched();
        prop_assert_eq!(submitted, queued + parked + dispatched);
        prop_assert_eq!(manager.participant_snapshot("p").offloaded_count, parked);
        prop_assert!(dispatched <= finished + 1);
    }
}
