//! Scriptable [`ClusterTransport`] for exercising one node in isolation.
//!
//! Endpoints added with [`MockTransport::add_endpoint`] become live members of
//! their cluster group and answer probes with their descriptor. Subscription
//! requests are accepted and handovers acknowledged unless scripted otherwise.

use crate::constants::methods;
use crate::error::{RpcError, RpcResult};
use crate::messaging::{ClusterTransport, HandoverStatus, TaskHandoverPacket, TaskHandoverResponse};
use crate::models::{
    EndpointDescriptor, EndpointIdentifier, PublisherRegistration, SubscriptionRequest,
    SubscriptionResponse,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
enum HandoverScript {
    Status(HandoverStatus),
    Fail(RpcError),
}

#[derive(Debug, Default)]
pub struct MockTransport {
    members: Mutex<HashMap<String, Vec<String>>>,
    live: Mutex<HashSet<String>>,
    descriptors: Mutex<HashMap<String, EndpointDescriptor>>,
    subscription_responses: Mutex<HashMap<String, RpcResult<SubscriptionResponse>>>,
    handover_scripts: Mutex<HashMap<String, HandoverScript>>,
    handovers: Mutex<Vec<(String, TaskHandoverPacket)>>,
    latency: Mutex<Option<Duration>>,
    probe_calls: AtomicUsize,
    subscription_calls: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `descriptor`'s endpoint a live member that answers probes
    pub fn add_endpoint(&self, descriptor: EndpointDescriptor) {
        let identifier = descriptor.identifier.clone();
        {
            let mut members = self.members.lock();
            let group = members.entry(identifier.cluster_group.clone()).or_default();
            if !group.contains(&identifier.address_name) {
                group.push(identifier.address_name.clone());
            }
        }
        self.live.lock().insert(identifier.address_name.clone());
        self.descriptors
            .lock()
            .insert(identifier.address_name, descriptor);
    }

    pub fn remove_endpoint(&self, address_name: &str) {
        for group in self.members.lock().values_mut() {
            group.retain(|address| address != address_name);
        }
        self.live.lock().remove(address_name);
        self.descriptors.lock().remove(address_name);
    }

    pub fn set_live(&self, address_name: &str, live: bool) {
        let mut addresses = self.live.lock();
        if live {
            addresses.insert(address_name.to_string());
        } else {
            addresses.remove(address_name);
        }
    }

    /// Every call waits `latency` before answering
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    pub fn set_subscription_response(
        &self,
        address_name: &str,
        response: RpcResult<SubscriptionResponse>,
    ) {
        self.subscription_responses
            .lock()
            .insert(address_name.to_string(), response);
    }

    pub fn clear_subscription_response(&self, address_name: &str) {
        self.subscription_responses.lock().remove(address_name);
    }

    pub fn set_handover_status(&self, address_name: &str, status: HandoverStatus) {
        self.handover_scripts
            .lock()
            .insert(address_name.to_string(), HandoverScript::Status(status));
    }

    pub fn fail_handover(&self, address_name: &str, error: RpcError) {
        self.handover_scripts
            .lock()
            .insert(address_name.to_string(), HandoverScript::Fail(error));
    }

    pub fn handovers(&self) -> Vec<(String, TaskHandoverPacket)> {
        self.handovers.lock().clone()
    }

    pub fn probe_calls(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    pub fn subscription_calls(&self) -> usize {
        self.subscription_calls.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl ClusterTransport for MockTransport {
    fn members(&self, cluster_group: &str) -> Vec<String> {
        self.members
            .lock()
            .get(cluster_group)
            .cloned()
            .unwrap_or_default()
    }

    fn is_live(&self, address_name: &str) -> bool {
        self.live.lock().contains(address_name)
    }

    async fn probe(
        &self,
        target: &str,
        _caller: EndpointDescriptor,
    ) -> RpcResult<EndpointDescriptor> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if !self.is_live(target) {
            return Err(RpcError::Unreachable {
                target: target.to_string(),
            });
        }
        let descriptor = self.descriptors.lock().get(target).cloned();
        match descriptor {
            Some(mut descriptor) => {
                descriptor.last_activity = Utc::now();
                Ok(descriptor)
            }
            None => Err(RpcError::NoRemoteMethod {
                target: target.to_string(),
                method: methods::PROBE.to_string(),
            }),
        }
    }

    async fn register_publisher(
        &self,
        _target: &str,
        candidate: EndpointIdentifier,
    ) -> RpcResult<PublisherRegistration> {
        self.simulate_latency().await;
        Ok(PublisherRegistration::new(candidate))
    }

    async fn request_subscription(
        &self,
        target: &str,
        _request: SubscriptionRequest,
    ) -> RpcResult<SubscriptionResponse> {
        self.subscription_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        let scripted = self.subscription_responses.lock().get(target).cloned();
        scripted.unwrap_or_else(|| Ok(SubscriptionResponse::accepted("accepted")))
    }

    async fn handover(
        &self,
        target: &str,
        packet: TaskHandoverPacket,
    ) -> RpcResult<TaskHandoverResponse> {
        self.simulate_latency().await;
        self.handovers
            .lock()
            .push((target.to_string(), packet.clone()));
        let script = self.handover_scripts.lock().get(target).cloned();
        match script {
            Some(HandoverScript::Fail(error)) => Err(error),
            Some(HandoverScript::Status(status)) => {
                Ok(TaskHandoverResponse::for_packet(&packet, status))
            }
            None => Ok(TaskHandoverResponse::for_packet(
                &packet,
                HandoverStatus::ReceivedAndDecoded,
            )),
        }
    }
}
