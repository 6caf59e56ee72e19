//! Routing hookup for accepted subscription requests.

use crate::error::PetasosResult;
use crate::models::SubscriptionRequest;
use async_trait::async_trait;
use tracing::info;

/// Message-routing collaborator that wires an accepted subscriber into the
/// publisher's outbound flows
#[async_trait]
pub trait SubscriptionWiring: Send + Sync {
    async fn wire(&self, request: &SubscriptionRequest) -> PetasosResult<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSubscriptionWiring;

#[async_trait]
impl SubscriptionWiring for LoggingSubscriptionWiring {
    async fn wire(&self, request: &SubscriptionRequest) -> PetasosResult<()> {
        info!(
            subscriber = %request.subscriber,
            manifests = request.manifests.len(),
            "Subscriber wired"
        );
        Ok(())
    }
}
