// Test Helpers Module - in-process collaborators for unit and integration tests
//
// Provides a scriptable transport for single-node tests, an in-memory cluster
// that routes RPCs between several nodes, and recording task/subscription
// collaborators.

pub mod in_memory_cluster;
pub mod mock_transport;
pub mod recording;

pub use in_memory_cluster::InMemoryCluster;
pub use mock_transport::MockTransport;
pub use recording::{RecordingDistributor, RecordingLifecycleListener, RecordingSubscriptionWiring};

use crate::config::{NodeConfig, PetasosConfig};

/// Configuration for a test node with short timers
pub fn test_config(site: &str, zone: &str, service: &str, instance: &str) -> PetasosConfig {
    let mut config = PetasosConfig {
        node: NodeConfig {
            site: site.to_string(),
            zone: zone.to_string(),
            service: service.to_string(),
            instance: instance.to_string(),
            ..NodeConfig::default()
        },
        ..PetasosConfig::default()
    };
    config.discovery.initial_delay_ms = 1;
    config.discovery.period_ms = 10;
    config.subscription.initial_delay_ms = 5;
    config.subscription.period_ms = 20;
    config.rpc.unicast_timeout_ms = 250;
    config.handover.receive_timeout_ms = 250;
    config
}
