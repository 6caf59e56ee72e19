//! # Task Orchestration
//!
//! Local task queueing and distribution for the participants hosted on this
//! node, plus the inter-node handover protocol.
//!
//! ## Core Components
//!
//! - **ParticipantTaskQueue**: per-participant queue ordered by producer sequence number
//! - **LocalTaskQueueCache**: participant name → queue, with the hard size ceiling
//! - **ParticipantRegistry**: idle/busy/suspended/disabled state and thresholds
//! - **TaskQueueManager**: forward / enqueue / offload routing and queue draining
//! - **HandoverSender / HandoverReceiver**: moving tasks between nodes

pub mod collaborators;
pub mod handover;
pub mod participant_registry;
pub mod participant_task_queue;
pub mod task_cache;
pub mod task_queue_cache;
pub mod task_queue_manager;

pub use collaborators::{
    InMemoryOffloadStore, LoggingLifecycleListener, TaskDistributor, TaskLifecycleListener,
    TaskOffloadStore,
};
pub use handover::{apply_handover_response, HandoverReceiver, HandoverSender};
pub use participant_registry::ParticipantRegistry;
pub use participant_task_queue::{ParticipantTaskQueue, TaskQueueEntry};
pub use task_cache::LocalTaskCache;
pub use task_queue_cache::LocalTaskQueueCache;
pub use task_queue_manager::{
    decide_routing, DrainOutcome, PerformerRouting, RoutingDecision, TaskQueueManager,
    TaskRoutingReport,
};
