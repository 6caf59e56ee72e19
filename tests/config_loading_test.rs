//! Configuration Loading Tests
//!
//! File formats accepted by the loader and a node built from a loaded file.

use petasos::config::ConfigLoader;
use petasos::constants::defaults;
use petasos::models::EndpointFunctionType;
use petasos::node::{NodeCollaborators, ProcessingPlantNode};
use petasos::test_helpers::{MockTransport, RecordingDistributor};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn json_configuration_is_resolved() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("petasos.json");
    fs::write(
        &path,
        r#"{
            "node": {"site": "site-east", "service": "radiology", "instance": "rad-3"},
            "rpc": {"unicast_timeout_ms": 900},
            "subscription": {"cross_zone_forwarding": true}
        }"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(Some(&path)).unwrap();
    assert_eq!(config.node.site, "site-east");
    assert_eq!(config.node.service, "radiology");
    assert_eq!(config.node.zone, defaults::ZONE);
    assert_eq!(config.rpc.unicast_timeout(), Duration::from_millis(900));
    assert!(config.subscription.cross_zone_forwarding);
    assert!(!config.subscription.cross_site_forwarding);
}

#[test]
fn yaml_configuration_with_bad_values_falls_back() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("petasos.yaml");
    fs::write(
        &path,
        "task_queue:\n  size_max: 0\n  onload_threshold: 12\ndiscovery:\n  period_ms: later\n",
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(Some(&path)).unwrap();
    assert_eq!(config.task_queue.size_max, defaults::TASK_QUEUE_SIZE_MAX);
    assert_eq!(config.task_queue.onload_threshold, 12);
    assert_eq!(config.discovery.period_ms, defaults::DISCOVERY_PERIOD_MS);
}

#[tokio::test]
async fn node_endpoints_follow_loaded_identity() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("petasos.toml");
    fs::write(
        &path,
        "[node]\nsite = \"s1\"\nzone = \"z1\"\nservice = \"pharmacy\"\ninstance = \"ph-1\"\ncluster_prefix = \"clinical\"\n",
    )
    .unwrap();
    let config = ConfigLoader::load_from_file(Some(&path)).unwrap();

    let node = ProcessingPlantNode::new(
        config,
        Arc::new(MockTransport::new()),
        NodeCollaborators::new(Arc::new(RecordingDistributor::new())),
    );
    let tasking = node.endpoint(EndpointFunctionType::Tasking);
    assert_eq!(tasking.address_name, "s1::z1::pharmacy::tasking::ph-1");
    assert_eq!(tasking.cluster_group, "clinical-tasking");
}
