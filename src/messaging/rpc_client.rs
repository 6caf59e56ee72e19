//! # RPC Client
//!
//! Wraps a [`ClusterTransport`] with the unicast timeout and RPC accounting.
//! There is no retry at this layer; retries belong to the discovery retry count
//! and to the next subscription reconciliation tick.

use crate::constants::methods;
use crate::error::{RpcError, RpcResult};
use crate::messaging::message::{TaskHandoverPacket, TaskHandoverResponse};
use crate::messaging::transport::ClusterTransport;
use crate::metrics::PetasosMetrics;
use crate::models::{
    EndpointDescriptor, EndpointIdentifier, PublisherRegistration, SubscriptionRequest,
    SubscriptionResponse,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Clone)]
pub struct RpcClient {
    transport: Arc<dyn ClusterTransport>,
    timeout: Duration,
    metrics: Arc<PetasosMetrics>,
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("transport", &"<Arc<dyn ClusterTransport>>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RpcClient {
    pub fn new(
        transport: Arc<dyn ClusterTransport>,
        timeout: Duration,
        metrics: Arc<PetasosMetrics>,
    ) -> Self {
        Self {
            transport,
            timeout,
            metrics,
        }
    }

    pub fn transport(&self) -> &Arc<dyn ClusterTransport> {
        &self.transport
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn members(&self, cluster_group: &str) -> Vec<String> {
        self.transport.members(cluster_group)
    }

    pub fn is_live(&self, address_name: &str) -> bool {
        self.transport.is_live(address_name)
    }

    async fn call<T, Fut>(&self, target: &str, method: &str, request: Fut) -> RpcResult<T>
    where
        Fut: Future<Output = RpcResult<T>>,
    {
        PetasosMetrics::increment(&self.metrics.rpc_calls);

        let result = match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(RpcError::Timeout {
                target: target.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        };

        if let Err(e) = &result {
            PetasosMetrics::increment(&self.metrics.rpc_failures);
            debug!(target_address = %target, method, error = %e, "RPC call failed");
        }
        result
    }

    pub async fn probe(
        &self,
        target: &str,
        caller: EndpointDescriptor,
    ) -> RpcResult<EndpointDescriptor> {
        self.call(target, methods::PROBE, self.transport.probe(target, caller))
            .await
    }

    pub async fn register_publisher(
        &self,
        target: &str,
        candidate: EndpointIdentifier,
    ) -> RpcResult<PublisherRegistration> {
        self.call(
            target,
            methods::REGISTER_PUBLISHER,
            self.transport.register_publisher(target, candidate),
        )
        .await
    }

    pub async fn request_subscription(
        &self,
        target: &str,
        request: SubscriptionRequest,
    ) -> RpcResult<SubscriptionResponse> {
        self.call(
            target,
            methods::REQUEST_SUBSCRIPTION,
            self.transport.request_subscription(target, request),
        )
        .await
    }

    pub async fn handover(
        &self,
        target: &str,
        packet: TaskHandoverPacket,
    ) -> RpcResult<TaskHandoverResponse> {
        self.call(
            target,
            methods::HANDOVER,
            self.transport.handover(target, packet),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EndpointFunctionType, EndpointNameResolver, NodeIdentity};
    use crate::test_helpers::MockTransport;

    fn discovery_endpoint(instance: &str) -> EndpointIdentifier {
        EndpointNameResolver::new(NodeIdentity {
            site: "site-a".to_string(),
            zone: "zone-1".to_string(),
            service: "lab".to_string(),
            instance: instance.to_string(),
            cluster_prefix: "petasos".to_string(),
        })
        .resolve(EndpointFunctionType::Discovery)
    }

    fn client(transport: Arc<MockTransport>, timeout_ms: u64) -> (RpcClient, Arc<PetasosMetrics>) {
        let metrics = Arc::new(PetasosMetrics::new());
        let client = RpcClient::new(transport, Duration::from_millis(timeout_ms), metrics.clone());
        (client, metrics)
    }

    #[tokio::test]
    async fn test_probe_success_is_counted() {
        let transport = Arc::new(MockTransport::new());
        let remote = discovery_endpoint("n2");
        transport.add_endpoint(EndpointDescriptor::new(remote.clone()));
        let (client, metrics) = client(transport, 200);

        let answer = client
            .probe(&remote.address_name, EndpointDescriptor::new(discovery_endpoint("n1")))
            .await
            .unwrap();

        assert_eq!(answer.identifier, remote);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.rpc_calls, 1);
        assert_eq!(snapshot.rpc_failures, 0);
    }

    #[tokio::test]
    async fn test_slow_transport_maps_to_timeout() {
        let transport = Arc::new(MockTransport::new());
        let remote = discovery_endpoint("n2");
        transport.add_endpoint(EndpointDescriptor::new(remote.clone()));
        transport.set_latency(Duration::from_millis(200));
        let (client, metrics) = client(transport, 20);

        let err = client
            .probe(&remote.address_name, EndpointDescriptor::new(discovery_endpoint("n1")))
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(err.target(), remote.address_name);
        assert_eq!(metrics.snapshot().rpc_failures, 1);
    }

    #[tokio::test]
    async fn test_unreachable_target_is_reported_not_retried() {
        let transport = Arc::new(MockTransport::new());
        let (client, metrics) = client(transport.clone(), 200);

        let err = client
            .probe(
                "site-a::zone-1::lab::discovery::gone",
                EndpointDescriptor::new(discovery_endpoint("n1")),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RpcError::Unreachable { .. }));
        assert_eq!(transport.probe_calls(), 1);
        assert_eq!(metrics.snapshot().rpc_calls, 1);
        assert_eq!(metrics.snapshot().rpc_failures, 1);
    }
}
