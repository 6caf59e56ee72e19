//! Shared fixtures for the integration tests

#![allow(dead_code)]

pub mod strategies;

use petasos::models::{EndpointFunctionType, EndpointIdentifier};
use petasos::node::{NodeCollaborators, ProcessingPlantNode};
use petasos::test_helpers::{test_config, InMemoryCluster, RecordingDistributor};
use std::sync::Arc;
use std::time::Duration;

/// A node joined to `cluster` together with its recording distributor
pub struct TestNode {
    pub node: Arc<ProcessingPlantNode>,
    pub distributor: Arc<RecordingDistributor>,
}

impl TestNode {
    pub fn discovery_endpoint(&self) -> EndpointIdentifier {
        self.node.endpoint(EndpointFunctionType::Discovery)
    }

    pub fn address(&self, function: EndpointFunctionType) -> String {
        self.node.endpoint(function).address_name
    }
}

pub fn spawn_node(
    cluster: &Arc<InMemoryCluster>,
    site: &str,
    zone: &str,
    service: &str,
    instance: &str,
) -> TestNode {
    spawn_node_with(cluster, site, zone, service, instance, |_| {})
}

pub fn spawn_node_with(
    cluster: &Arc<InMemoryCluster>,
    site: &str,
    zone: &str,
    service: &str,
    instance: &str,
    adjust: impl FnOnce(&mut petasos::PetasosConfig),
) -> TestNode {
    petasos::logging::init_structured_logging();
    let mut config = test_config(site, zone, service, instance);
    adjust(&mut config);
    let distributor = Arc::new(RecordingDistributor::new());
    let node = ProcessingPlantNode::new(
        config,
        cluster.clone(),
        NodeCollaborators::new(distributor.clone()),
    );
    cluster.join(node.identity(), &node);
    node.start();
    TestNode { node, distributor }
}

/// Poll `condition` every 5ms until it holds or `timeout` passes
pub async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
