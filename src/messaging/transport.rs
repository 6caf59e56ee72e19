//! # Cluster Transport Seams
//!
//! The cluster membership transport is an external collaborator. It supplies
//! live membership, interface-change events and a request/response primitive;
//! this module defines both directions of that seam.
//!
//! ```text
//! outbound: RpcClient ──→ ClusterTransport ──→ (network) ──→ RemoteProcedureHandler
//! events:   ClusterTransport ──→ MembershipListener::{interface_added, interface_removed}
//! ```

use crate::error::RpcResult;
use crate::messaging::message::{TaskHandoverPacket, TaskHandoverResponse};
use crate::models::{
    EndpointDescriptor, EndpointIdentifier, PublisherRegistration, SubscriptionRequest,
    SubscriptionResponse,
};
use async_trait::async_trait;

/// Outbound side of the node-to-node remote procedure surface
#[async_trait]
pub trait ClusterTransport: Send + Sync {
    /// Addresses of the live members of `cluster_group`
    fn members(&self, cluster_group: &str) -> Vec<String>;

    /// Whether `address_name` is currently a live member
    fn is_live(&self, address_name: &str) -> bool;

    async fn probe(&self, target: &str, caller: EndpointDescriptor) -> RpcResult<EndpointDescriptor>;

    async fn register_publisher(
        &self,
        target: &str,
        candidate: EndpointIdentifier,
    ) -> RpcResult<PublisherRegistration>;

    async fn request_subscription(
        &self,
        target: &str,
        request: SubscriptionRequest,
    ) -> RpcResult<SubscriptionResponse>;

    async fn handover(
        &self,
        target: &str,
        packet: TaskHandoverPacket,
    ) -> RpcResult<TaskHandoverResponse>;
}

/// Inbound side of the remote procedure surface, implemented by a node
#[async_trait]
pub trait RemoteProcedureHandler: Send + Sync {
    async fn on_probe(&self, caller: EndpointDescriptor) -> RpcResult<EndpointDescriptor>;

    async fn on_register_publisher(
        &self,
        candidate: EndpointIdentifier,
    ) -> RpcResult<PublisherRegistration>;

    async fn on_subscription_request(
        &self,
        request: SubscriptionRequest,
    ) -> RpcResult<SubscriptionResponse>;

    async fn on_handover(&self, packet: TaskHandoverPacket) -> RpcResult<TaskHandoverResponse>;
}

/// Receives membership-delta callbacks from the transport
pub trait MembershipListener: Send + Sync {
    fn interface_added(&self, address_name: &str);
    fn interface_removed(&self, address_name: &str);
}
