//! In-process cluster: a [`ClusterTransport`] shared by several nodes that
//! routes each RPC to the node owning the target address and delivers
//! membership deltas to every other joined node.

use crate::error::{RpcError, RpcResult};
use crate::messaging::{
    ClusterTransport, MembershipListener, RemoteProcedureHandler, TaskHandoverPacket,
    TaskHandoverResponse,
};
use crate::models::{
    EndpointDescriptor, EndpointFunctionType, EndpointIdentifier, EndpointNameResolver,
    NodeIdentity, PublisherRegistration, SubscriptionRequest, SubscriptionResponse,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use tracing::debug;

struct ClusterMember {
    addresses: Vec<EndpointIdentifier>,
    handler: Weak<dyn RemoteProcedureHandler>,
    listener: Weak<dyn MembershipListener>,
}

#[derive(Default)]
pub struct InMemoryCluster {
    /// Node key (`site::zone::service::instance`) → member
    nodes: RwLock<HashMap<String, ClusterMember>>,
    /// Node keys currently cut off from the rest of the cluster
    partitioned: RwLock<HashSet<String>>,
}

impl std::fmt::Debug for InMemoryCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCluster")
            .field("nodes", &self.nodes.read().keys().cloned().collect::<Vec<_>>())
            .field("partitioned", &self.partitioned.read())
            .finish()
    }
}

fn node_key(identity: &NodeIdentity) -> String {
    format!(
        "{}::{}::{}::{}",
        identity.site, identity.zone, identity.service, identity.instance
    )
}

impl InMemoryCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Join a node: every functional endpoint becomes a live member and all
    /// previously joined nodes hear `interface_added` for each of them.
    pub fn join<N>(&self, identity: &NodeIdentity, node: &Arc<N>)
    where
        N: RemoteProcedureHandler + MembershipListener + 'static,
    {
        let resolver = EndpointNameResolver::new(identity.clone());
        let addresses: Vec<EndpointIdentifier> = EndpointFunctionType::ALL
            .into_iter()
            .map(|function| resolver.resolve(function))
            .collect();
        let weak: Weak<N> = Arc::downgrade(node);
        let handler: Weak<dyn RemoteProcedureHandler> = weak.clone();
        let listener: Weak<dyn MembershipListener> = weak;

        let others = self.listeners_except(&node_key(identity));
        self.nodes.write().insert(
            node_key(identity),
            ClusterMember {
                addresses: addresses.clone(),
                handler,
                listener,
            },
        );
        debug!(node = %node_key(identity), "Node joined in-memory cluster");
        for listener in others {
            for address in &addresses {
                listener.interface_added(&address.address_name);
            }
        }
    }

    /// Remove a node; every remaining node hears `interface_removed`
    pub fn leave(&self, identity: &NodeIdentity) {
        let key = node_key(identity);
        let Some(member) = self.nodes.write().remove(&key) else {
            return;
        };
        self.partitioned.write().remove(&key);
        debug!(node = %key, "Node left in-memory cluster");
        for listener in self.listeners_except(&key) {
            for address in &member.addresses {
                listener.interface_removed(&address.address_name);
            }
        }
    }

    /// Keep the node in membership but make every call to it fail
    pub fn partition(&self, identity: &NodeIdentity) {
        self.partitioned.write().insert(node_key(identity));
    }

    pub fn heal(&self, identity: &NodeIdentity) {
        self.partitioned.write().remove(&node_key(identity));
    }

    fn listeners_except(&self, key: &str) -> Vec<Arc<dyn MembershipListener>> {
        self.nodes
            .read()
            .iter()
            .filter(|(node, _)| node.as_str() != key)
            .filter_map(|(_, member)| member.listener.upgrade())
            .collect()
    }

    fn route(&self, target: &str) -> RpcResult<Arc<dyn RemoteProcedureHandler>> {
        let unreachable = || RpcError::Unreachable {
            target: target.to_string(),
        };
        let key = self
            .nodes
            .read()
            .iter()
            .find(|(_, member)| {
                member
                    .addresses
                    .iter()
                    .any(|address| address.address_name == target)
            })
            .map(|(key, _)| key.clone())
            .ok_or_else(unreachable)?;
        if self.partitioned.read().contains(&key) {
            return Err(unreachable());
        }
        self.nodes
            .read()
            .get(&key)
            .and_then(|member| member.handler.upgrade())
            .ok_or_else(unreachable)
    }
}

#[async_trait]
impl ClusterTransport for InMemoryCluster {
    fn members(&self, cluster_group: &str) -> Vec<String> {
        self.nodes
            .read()
            .values()
            .flat_map(|member| member.addresses.iter())
            .filter(|address| address.cluster_group == cluster_group)
            .map(|address| address.address_name.clone())
            .collect()
    }

    fn is_live(&self, address_name: &str) -> bool {
        self.route(address_name).is_ok()
    }

    async fn probe(&self, target: &str, caller: EndpointDescriptor) -> RpcResult<EndpointDescriptor> {
        let handler = self.route(target)?;
        handler.on_probe(caller).await
    }

    async fn register_publisher(
        &self,
        target: &str,
        candidate: EndpointIdentifier,
    ) -> RpcResult<PublisherRegistration> {
        let handler = self.route(target)?;
        handler.on_register_publisher(candidate).await
    }

    async fn request_subscription(
        &self,
        target: &str,
        request: SubscriptionRequest,
    ) -> RpcResult<SubscriptionResponse> {
        let handler = self.route(target)?;
        handler.on_subscription_request(request).await
    }

    async fn handover(
        &self,
        target: &str,
        packet: TaskHandoverPacket,
    ) -> RpcResult<TaskHandoverResponse> {
        let handler = self.route(target)?;
        handler.on_handover(packet).await
    }
}
