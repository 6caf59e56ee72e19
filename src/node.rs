//! # Processing Plant Node
//!
//! Wires one node together: endpoint names, the endpoint cache and discovery
//! engine, the publisher/subscriber registry, the local task queue manager and
//! both ends of the handover protocol. The node is the inbound
//! [`RemoteProcedureHandler`] and the [`MembershipListener`] the cluster
//! transport talks to.

use crate::config::PetasosConfig;
use crate::discovery::{DiscoveryEngine, EndpointMap, ScopedDiscoveryPolicy};
use crate::error::RpcResult;
use crate::messaging::{
    ClusterTransport, MembershipListener, RemoteProcedureHandler, RpcClient, TaskHandoverPacket,
    TaskHandoverResponse,
};
use crate::metrics::{MetricsSnapshot, PetasosMetrics};
use crate::models::{
    DataParcelManifest, EndpointDescriptor, EndpointFunctionType, EndpointIdentifier,
    EndpointNameResolver, NodeIdentity, PerformerDeclaration, PublisherRegistration,
    SequenceGenerator, SubscriptionRequest, SubscriptionResponse, SubscriptionStatus, Task,
};
use crate::orchestration::{
    HandoverReceiver, HandoverSender, InMemoryOffloadStore, LoggingLifecycleListener,
    TaskDistributor, TaskLifecycleListener, TaskOffloadStore, TaskQueueManager, TaskRoutingReport,
};
use crate::registry::{LoggingSubscriptionWiring, PublisherSubscriberRegistry, SubscriptionWiring};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// The external collaborators a node hands work to
#[derive(Clone)]
pub struct NodeCollaborators {
    pub distributor: Arc<dyn TaskDistributor>,
    pub lifecycle: Arc<dyn TaskLifecycleListener>,
    pub offload_store: Arc<dyn TaskOffloadStore>,
    pub wiring: Arc<dyn SubscriptionWiring>,
}

impl NodeCollaborators {
    /// Logging lifecycle listener and wiring, process-local offload store
    pub fn new(distributor: Arc<dyn TaskDistributor>) -> Self {
        Self {
            distributor,
            lifecycle: Arc::new(LoggingLifecycleListener),
            offload_store: Arc::new(InMemoryOffloadStore::new()),
            wiring: Arc::new(LoggingSubscriptionWiring),
        }
    }

    pub fn with_lifecycle(mut self, lifecycle: Arc<dyn TaskLifecycleListener>) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn with_offload_store(mut self, offload_store: Arc<dyn TaskOffloadStore>) -> Self {
        self.offload_store = offload_store;
        self
    }

    pub fn with_wiring(mut self, wiring: Arc<dyn SubscriptionWiring>) -> Self {
        self.wiring = wiring;
        self
    }
}

pub struct ProcessingPlantNode {
    config: PetasosConfig,
    resolver: EndpointNameResolver,
    metrics: Arc<PetasosMetrics>,
    sequence: Arc<SequenceGenerator>,
    endpoints: Arc<EndpointMap>,
    registry: Arc<PublisherSubscriberRegistry>,
    discovery: Arc<DiscoveryEngine>,
    queue_manager: Arc<TaskQueueManager>,
    handover_sender: HandoverSender,
    handover_receiver: HandoverReceiver,
}

impl std::fmt::Debug for ProcessingPlantNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingPlantNode")
            .field("identity", self.resolver.identity())
            .field("discovery", &self.discovery)
            .field("registry", &self.registry)
            .finish()
    }
}

impl ProcessingPlantNode {
    pub fn new(
        config: PetasosConfig,
        transport: Arc<dyn ClusterTransport>,
        collaborators: NodeCollaborators,
    ) -> Arc<Self> {
        let identity = NodeIdentity::from(&config.node);
        let resolver = EndpointNameResolver::new(identity.clone());
        let metrics = Arc::new(PetasosMetrics::new());
        let rpc = RpcClient::new(transport, config.rpc.unicast_timeout(), metrics.clone());

        let registry = PublisherSubscriberRegistry::new(
            resolver.resolve(EndpointFunctionType::Subscription),
            identity.cluster_prefix.clone(),
            rpc.clone(),
            collaborators.wiring,
            config.subscription,
        );
        let endpoints = Arc::new(EndpointMap::new());
        let discovery = DiscoveryEngine::new(
            resolver.resolve(EndpointFunctionType::Discovery),
            identity.cluster_prefix.clone(),
            endpoints.clone(),
            rpc.clone(),
            Arc::new(ScopedDiscoveryPolicy::new(
                registry.clone(),
                config.discovery.max_probe_retries,
            )),
            config.discovery,
            metrics.clone(),
        );
        let queue_manager = TaskQueueManager::new(
            config.task_queue,
            collaborators.distributor,
            collaborators.lifecycle,
            collaborators.offload_store,
            metrics.clone(),
        );
        let sequence = Arc::new(SequenceGenerator::new());
        let handover_sender = HandoverSender::new(
            rpc,
            resolver.address_name(EndpointFunctionType::Tasking),
        );
        let handover_receiver = HandoverReceiver::new(
            queue_manager.clone(),
            sequence.clone(),
            config.handover.receive_timeout(),
        );

        info!(
            site = %identity.site,
            zone = %identity.zone,
            service = %identity.service,
            instance = %identity.instance,
            "Processing plant node created"
        );
        Arc::new(Self {
            config,
            resolver,
            metrics,
            sequence,
            endpoints,
            registry,
            discovery,
            queue_manager,
            handover_sender,
            handover_receiver,
        })
    }

    pub fn config(&self) -> &PetasosConfig {
        &self.config
    }

    pub fn identity(&self) -> &NodeIdentity {
        self.resolver.identity()
    }

    pub fn endpoint(&self, function: EndpointFunctionType) -> EndpointIdentifier {
        self.resolver.resolve(function)
    }

    pub fn endpoints(&self) -> &Arc<EndpointMap> {
        &self.endpoints
    }

    pub fn discovery(&self) -> &Arc<DiscoveryEngine> {
        &self.discovery
    }

    pub fn registry(&self) -> &Arc<PublisherSubscriberRegistry> {
        &self.registry
    }

    pub fn queue_manager(&self) -> &Arc<TaskQueueManager> {
        &self.queue_manager
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub fn start(&self) {
        match serde_json::to_string(&self.config) {
            Ok(effective) => info!(config = %effective, "Starting processing plant node"),
            Err(_) => info!("Starting processing plant node"),
        }
        self.discovery.start();
        self.registry.start_subscription_checks();
    }

    pub fn shutdown(&self) {
        self.discovery.shutdown();
        self.registry.stop_subscription_checks();
        info!(instance = %self.identity().instance, "Processing plant node stopped");
    }

    // =========================================================================
    // Producer surface
    // =========================================================================

    /// A new task stamped with this node's next sequence number
    pub fn new_task(&self, performers: Vec<PerformerDeclaration>) -> Task {
        Task::new(self.sequence.next_sequence(), performers)
    }

    pub async fn queue_task(&self, task: Task) -> TaskRoutingReport {
        self.queue_manager.queue_task(task).await
    }

    /// Hand `task` to `target_participant` on the node owning `target`
    pub async fn hand_over(
        &self,
        target: &EndpointIdentifier,
        task: Task,
        source_participant: &str,
        target_participant: &str,
    ) -> Task {
        let tasking = target.for_function(EndpointFunctionType::Tasking);
        self.handover_sender
            .hand_over(
                &tasking.address_name,
                task,
                source_participant,
                target_participant,
            )
            .await
    }

    // =========================================================================
    // Publish / subscribe
    // =========================================================================

    /// Advertise the data types this node publishes in its probe descriptor
    pub fn publish(&self, manifests: Vec<DataParcelManifest>) {
        self.discovery.set_published_manifests(manifests);
    }

    /// Subscribe to `service`, immediately against any instance already
    /// discovered and otherwise as soon as one appears
    pub async fn subscribe_to(
        &self,
        service: &str,
        manifests: Vec<DataParcelManifest>,
    ) -> SubscriptionStatus {
        self.registry
            .add_subscription_interest(service, manifests.clone());
        match self.endpoints.endpoints_for_service(service).into_iter().next() {
            Some(publisher) => {
                self.registry
                    .subscribe_to_remote_publishers(manifests, publisher)
                    .await
            }
            None => SubscriptionStatus::Pending,
        }
    }
}

#[async_trait]
impl RemoteProcedureHandler for ProcessingPlantNode {
    async fn on_probe(&self, caller: EndpointDescriptor) -> RpcResult<EndpointDescriptor> {
        Ok(self.discovery.handle_probe(&caller))
    }

    async fn on_register_publisher(
        &self,
        candidate: EndpointIdentifier,
    ) -> RpcResult<PublisherRegistration> {
        Ok(self.registry.register_publisher(candidate))
    }

    async fn on_subscription_request(
        &self,
        request: SubscriptionRequest,
    ) -> RpcResult<SubscriptionResponse> {
        Ok(self.registry.handle_subscription_request(request).await)
    }

    async fn on_handover(&self, packet: TaskHandoverPacket) -> RpcResult<TaskHandoverResponse> {
        Ok(self.handover_receiver.receive(packet).await)
    }
}

impl MembershipListener for ProcessingPlantNode {
    fn interface_added(&self, address_name: &str) {
        self.discovery.interface_added(address_name);
    }

    fn interface_removed(&self, address_name: &str) {
        self.discovery.interface_removed(address_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::HandoverStatus;
    use crate::models::OutcomeStatus;
    use crate::test_helpers::{test_config, MockTransport, RecordingDistributor};

    #[tokio::test]
    async fn test_new_tasks_get_increasing_sequence_numbers() {
        let node = ProcessingPlantNode::new(
            test_config("site-a", "zone-1", "ehr", "n1"),
            Arc::new(MockTransport::new()),
            NodeCollaborators::new(Arc::new(RecordingDistributor::new())),
        );
        let first = node.new_task(vec![PerformerDeclaration::participant("p")]);
        let second = node.new_task(vec![PerformerDeclaration::participant("p")]);
        assert!(first.sequence_number < second.sequence_number);
    }

    #[tokio::test]
    async fn test_hand_over_targets_tasking_endpoint() {
        let transport = Arc::new(MockTransport::new());
        let node = ProcessingPlantNode::new(
            test_config("site-a", "zone-1", "ehr", "n1"),
            transport.clone(),
            NodeCollaborators::new(Arc::new(RecordingDistributor::new())),
        );
        let remote = EndpointNameResolver::new(NodeIdentity {
            site: "site-a".to_string(),
            zone: "zone-1".to_string(),
            service: "lab".to_string(),
            instance: "n2".to_string(),
            cluster_prefix: "petasos".to_string(),
        })
        .resolve(EndpointFunctionType::Discovery);
        let tasking = remote.for_function(EndpointFunctionType::Tasking).address_name;
        transport.set_handover_status(&tasking, HandoverStatus::ReceiveTimedOut);

        let task = node.new_task(vec![PerformerDeclaration::participant("egress")]);
        let handed = node.hand_over(&remote, task, "egress", "lab-ingress").await;

        let handovers = transport.handovers();
        assert_eq!(handovers.len(), 1);
        assert_eq!(handovers[0].0, tasking);
        assert_eq!(handovers[0].1.accounting.transfer_count, 1);
        assert_eq!(handed.outcome.unwrap().status, OutcomeStatus::Failed);
    }

    #[tokio::test]
    async fn test_inbound_rpc_surface_delegates() {
        let node = ProcessingPlantNode::new(
            test_config("site-a", "zone-1", "lab", "n1"),
            Arc::new(MockTransport::new()),
            NodeCollaborators::new(Arc::new(RecordingDistributor::new())),
        );
        node.publish(vec![DataParcelManifest::new("lab-result", "1")]);

        let caller = EndpointNameResolver::new(NodeIdentity {
            site: "site-a".to_string(),
            zone: "zone-1".to_string(),
            service: "ehr".to_string(),
            instance: "n9".to_string(),
            cluster_prefix: "petasos".to_string(),
        });
        let answer = node
            .on_probe(EndpointDescriptor::new(
                caller.resolve(EndpointFunctionType::Discovery),
            ))
            .await
            .unwrap();
        assert_eq!(answer.manifests.len(), 1);

        let response = node
            .on_subscription_request(SubscriptionRequest::new(
                caller.resolve(EndpointFunctionType::Subscription),
                vec![DataParcelManifest::new("lab-result", "1")],
            ))
            .await
            .unwrap();
        assert!(response.successful);
        assert_eq!(node.registry().subscribers().len(), 1);
        node.shutdown();
    }
}
