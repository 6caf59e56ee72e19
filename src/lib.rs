#![allow(clippy::doc_markdown)] // Allow technical terms like DashMap, SegQueue in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Petasos
//!
//! Task orchestration and endpoint discovery for a clustered integration
//! engine. Each node (a "Processing Plant") hosts work-unit participants,
//! queues tasks for them, hands tasks to other nodes, and tracks which remote
//! endpoints are alive and who publishes or subscribes to what.
//!
//! ## Module Organization
//!
//! - [`orchestration`] - Participant task queues, forward/enqueue/offload routing, handover
//! - [`discovery`] - Endpoint cache and the periodic probe/eviction engine
//! - [`registry`] - Publisher instances, subscription interests and subscribers
//! - [`messaging`] - Transport seams, the RPC client and handover packets
//! - [`node`] - Wires one Processing Plant node together
//! - [`config`] - Parameter resolution with silent fallback to defaults
//! - [`models`] - Tasks, participants, endpoint identities, registrations
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use petasos::config::PetasosConfig;
//! use petasos::models::PerformerDeclaration;
//! use petasos::node::{NodeCollaborators, ProcessingPlantNode};
//! use petasos::test_helpers::{InMemoryCluster, RecordingDistributor};
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let cluster = InMemoryCluster::new();
//! let node = ProcessingPlantNode::new(
//!     PetasosConfig::default(),
//!     cluster.clone(),
//!     NodeCollaborators::new(Arc::new(RecordingDistributor::new())),
//! );
//! cluster.join(node.identity(), &node);
//! node.start();
//!
//! let task = node.new_task(vec![PerformerDeclaration::participant("ingress")]);
//! let report = node.queue_task(task).await;
//! assert!(report.processed_successfully());
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit, integration and property tests
//! ```

pub mod config;
pub mod constants;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod metrics;
pub mod models;
pub mod node;
pub mod orchestration;
pub mod registry;
pub mod test_helpers;

pub use config::{ConfigLoader, ConfigurationSource, PetasosConfig};
pub use discovery::{DiscoveryEngine, DiscoveryPolicy, EndpointMap, ScopedDiscoveryPolicy};
pub use error::{PetasosError, PetasosResult, RpcError, RpcResult};
pub use messaging::{ClusterTransport, MembershipListener, RemoteProcedureHandler, RpcClient};
pub use metrics::{MetricsSnapshot, PetasosMetrics};
pub use node::{NodeCollaborators, ProcessingPlantNode};
pub use orchestration::{
    RoutingDecision, TaskDistributor, TaskLifecycleListener, TaskOffloadStore, TaskQueueManager,
};
pub use registry::PublisherSubscriberRegistry;
