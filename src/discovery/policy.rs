//! # Discovery Policy
//!
//! The pluggable part of endpoint discovery: which endpoints are in scope,
//! how many failed probes an endpoint survives, and what happens when an
//! endpoint is discovered or evicted.

use crate::constants::defaults;
use crate::models::{EndpointDescriptor, EndpointIdentifier};
use crate::registry::PublisherSubscriberRegistry;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait DiscoveryPolicy: Send + Sync {
    /// Same cluster group and function as `local`, and not `local` itself
    fn in_scope(&self, local: &EndpointIdentifier, candidate: &EndpointIdentifier) -> bool {
        local.same_scope(candidate) && !local.is_same_endpoint(candidate)
    }

    fn max_probe_retries(&self) -> u32;

    async fn on_endpoint_discovered(&self, descriptor: &EndpointDescriptor);

    async fn on_endpoint_evicted(&self, identifier: &EndpointIdentifier);
}

/// Default policy: discovered endpoints become known publishers, evicted ones
/// are unregistered.
pub struct ScopedDiscoveryPolicy {
    registry: Arc<PublisherSubscriberRegistry>,
    max_probe_retries: u32,
}

impl std::fmt::Debug for ScopedDiscoveryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedDiscoveryPolicy")
            .field("max_probe_retries", &self.max_probe_retries)
            .finish()
    }
}

impl ScopedDiscoveryPolicy {
    pub fn new(registry: Arc<PublisherSubscriberRegistry>, max_probe_retries: u32) -> Self {
        Self {
            registry,
            max_probe_retries,
        }
    }

    pub fn with_default_retries(registry: Arc<PublisherSubscriberRegistry>) -> Self {
        Self::new(registry, defaults::MAX_PROBE_RETRIES)
    }
}

#[async_trait]
impl DiscoveryPolicy for ScopedDiscoveryPolicy {
    fn max_probe_retries(&self) -> u32 {
        self.max_probe_retries
    }

    async fn on_endpoint_discovered(&self, descriptor: &EndpointDescriptor) {
        self.registry
            .on_publisher_discovered(descriptor.identifier.clone())
            .await;
    }

    async fn on_endpoint_evicted(&self, identifier: &EndpointIdentifier) {
        self.registry.unregister_publisher(&identifier.address_name);
    }
}
