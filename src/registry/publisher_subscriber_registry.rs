//! # Publisher/Subscriber Registry
//!
//! Tracks, per logical publishing service, the live publisher instances this
//! node knows about and the local subscriber's registration against that
//! service. The same registry answers inbound subscription requests when this
//! node acts as a publisher.
//!
//! RPC failures only downgrade an instance to `unreachable`. Removing an
//! instance is the discovery engine's job, driven by its retry count.

use super::wiring::SubscriptionWiring;
use crate::config::SubscriptionConfig;
use crate::error::RpcResult;
use crate::logging::log_registry_operation;
use crate::messaging::RpcClient;
use crate::models::{
    DataParcelManifest, EndpointFunctionType, EndpointIdentifier, PublisherRegistration,
    PublisherStatus, SubscriberRegistration, SubscriptionRegistration, SubscriptionRequest,
    SubscriptionResponse, SubscriptionStatus,
};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What one subscription reconciliation pass did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubscriptionCheckReport {
    pub services_checked: usize,
    pub instances_revalidated: usize,
    pub instances_discovered: usize,
    pub active_services: usize,
}

pub struct PublisherSubscriberRegistry {
    me: Weak<PublisherSubscriberRegistry>,
    /// This node's subscription endpoint
    local: EndpointIdentifier,
    cluster_prefix: String,
    rpc: RpcClient,
    wiring: Arc<dyn SubscriptionWiring>,
    config: SubscriptionConfig,
    publishers: DashMap<String, Arc<Mutex<PublisherRegistration>>>,
    service_instances: DashMap<String, Vec<String>>,
    subscriptions: DashMap<String, Arc<Mutex<SubscriptionRegistration>>>,
    interests: DashMap<String, Vec<DataParcelManifest>>,
    subscribers: DashMap<String, SubscriberRegistration>,
    checks_running: AtomicBool,
    check_timer: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for PublisherSubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublisherSubscriberRegistry")
            .field("local", &self.local.address_name)
            .field("publishers", &self.publishers.len())
            .field("subscriptions", &self.subscriptions.len())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl PublisherSubscriberRegistry {
    pub fn new(
        local: EndpointIdentifier,
        cluster_prefix: impl Into<String>,
        rpc: RpcClient,
        wiring: Arc<dyn SubscriptionWiring>,
        config: SubscriptionConfig,
    ) -> Arc<Self> {
        let cluster_prefix = cluster_prefix.into();
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            local,
            cluster_prefix,
            rpc,
            wiring,
            config,
            publishers: DashMap::new(),
            service_instances: DashMap::new(),
            subscriptions: DashMap::new(),
            interests: DashMap::new(),
            subscribers: DashMap::new(),
            checks_running: AtomicBool::new(false),
            check_timer: Mutex::new(None),
        })
    }

    pub fn local_identifier(&self) -> &EndpointIdentifier {
        &self.local
    }

    // =========================================================================
    // Publisher instances
    // =========================================================================

    /// Idempotent: an already known candidate gets its existing registration back
    pub fn register_publisher(&self, candidate: EndpointIdentifier) -> PublisherRegistration {
        let address = candidate.address_name.clone();
        if let Some(existing) = self.publishers.get(&address) {
            return existing.value().lock().clone();
        }

        let mut created = false;
        let registration = self
            .publishers
            .entry(address.clone())
            .or_insert_with(|| {
                created = true;
                Arc::new(Mutex::new(PublisherRegistration::new(candidate.clone())))
            })
            .value()
            .clone();

        if created {
            let mut instances = self
                .service_instances
                .entry(candidate.service.clone())
                .or_default();
            if !instances.contains(&address) {
                instances.push(address.clone());
            }
            drop(instances);
            log_registry_operation(
                "register_publisher",
                Some(&candidate.service),
                Some(&candidate.instance),
                "registered",
                None,
            );
        }
        let registration = registration.lock();
        registration.clone()
    }

    /// Forget one publisher instance; the service registration goes with its
    /// last instance.
    pub fn unregister_publisher(&self, address_name: &str) -> Option<PublisherRegistration> {
        let (_, registration) = self.publishers.remove(address_name)?;
        let registration = registration.lock().clone();
        let service = registration.service_name().to_string();

        let now_empty = self
            .service_instances
            .get_mut(&service)
            .map(|mut instances| {
                instances.retain(|address| address != address_name);
                instances.is_empty()
            })
            .unwrap_or(true);
        if now_empty {
            self.service_instances
                .remove_if(&service, |_, instances| instances.is_empty());
            if self.subscriptions.remove(&service).is_some() {
                info!(service = %service, "Last publisher instance gone, subscription registration removed");
            }
        }
        log_registry_operation(
            "unregister_publisher",
            Some(&service),
            Some(&registration.publisher.instance),
            "removed",
            None,
        );
        Some(registration)
    }

    pub fn publisher(&self, address_name: &str) -> Option<PublisherRegistration> {
        self.publishers
            .get(address_name)
            .map(|registration| registration.value().lock().clone())
    }

    pub fn publishers_for_service(&self, service: &str) -> Vec<PublisherRegistration> {
        self.instance_addresses(service)
            .iter()
            .filter_map(|address| self.publisher(address))
            .collect()
    }

    pub fn publisher_count(&self) -> usize {
        self.publishers.len()
    }

    fn instance_addresses(&self, service: &str) -> Vec<String> {
        self.service_instances
            .get(service)
            .map(|instances| instances.value().clone())
            .unwrap_or_default()
    }

    /// Announce this node as a publisher to the registry at `target`
    pub async fn advertise_to(&self, target: &EndpointIdentifier) -> RpcResult<PublisherRegistration> {
        let target_address = target
            .for_function(EndpointFunctionType::Subscription)
            .address_name;
        self.rpc
            .register_publisher(
                &target_address,
                self.local.for_function(EndpointFunctionType::Discovery),
            )
            .await
    }

    // =========================================================================
    // Publisher role
    // =========================================================================

    /// Accept or reject a remote subscriber. Same-zone requests are always
    /// accepted; cross-zone and cross-site ones need the matching forwarding flag.
    pub async fn handle_subscription_request(
        &self,
        request: SubscriptionRequest,
    ) -> SubscriptionResponse {
        let requester = &request.subscriber;
        let permitted = if self.local.same_zone(requester) {
            true
        } else if self.local.same_site(requester) {
            self.config.cross_zone_forwarding
        } else {
            self.config.cross_site_forwarding
        };

        if !permitted {
            let reason = format!(
                "subscriber {} in {}::{} is outside the forwarding scope of {}::{}",
                requester.service, requester.site, requester.zone, self.local.site, self.local.zone
            );
            debug!(subscriber = %requester, reason = %reason, "Subscription request rejected");
            return SubscriptionResponse::rejected(reason);
        }

        if let Err(e) = self.wiring.wire(&request).await {
            warn!(subscriber = %requester, error = %e, "Subscription wiring failed");
            return SubscriptionResponse::rejected(format!("subscription wiring failed: {e}"));
        }

        self.subscribers.insert(
            requester.address_name.clone(),
            SubscriberRegistration {
                subscriber: requester.clone(),
                manifests: request.manifests.clone(),
                accepted_at: Utc::now(),
            },
        );
        log_registry_operation(
            "accept_subscriber",
            Some(&requester.service),
            Some(&requester.instance),
            "accepted",
            None,
        );
        SubscriptionResponse::accepted(format!("subscribed to {}", self.local.service))
    }

    pub fn subscribers(&self) -> Vec<SubscriberRegistration> {
        self.subscribers
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    // =========================================================================
    // Subscriber role
    // =========================================================================

    /// Record what the local subscriber wants from `service`
    pub fn add_subscription_interest(&self, service: &str, manifests: Vec<DataParcelManifest>) {
        {
            let mut interest = self.interests.entry(service.to_string()).or_default();
            for manifest in &manifests {
                if !interest.contains(manifest) {
                    interest.push(manifest.clone());
                }
            }
        }
        self.subscription_entry(service, &manifests);
    }

    fn subscription_entry(
        &self,
        service: &str,
        manifests: &[DataParcelManifest],
    ) -> Arc<Mutex<SubscriptionRegistration>> {
        let registration = self
            .subscriptions
            .entry(service.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(SubscriptionRegistration::new(
                    service,
                    manifests.to_vec(),
                )))
            })
            .value()
            .clone();
        registration.lock().merge_manifests(manifests);
        registration
    }

    pub fn subscription(&self, service: &str) -> Option<SubscriptionRegistration> {
        self.subscriptions
            .get(service)
            .map(|registration| registration.value().lock().clone())
    }

    pub fn subscriptions(&self) -> Vec<SubscriptionRegistration> {
        self.subscriptions
            .iter()
            .map(|entry| entry.value().lock().clone())
            .collect()
    }

    /// Register `publisher` and subscribe to every known instance of its
    /// service. The service is active when at least one instance accepted and
    /// is itself active.
    pub async fn subscribe_to_remote_publishers(
        &self,
        manifests: Vec<DataParcelManifest>,
        publisher: EndpointIdentifier,
    ) -> SubscriptionStatus {
        let service = publisher.service.clone();
        self.register_publisher(publisher);
        let registration = self.subscription_entry(&service, &manifests);
        let wanted = registration.lock().manifests.clone();

        let mut any_active = false;
        for address in self.instance_addresses(&service) {
            if self.subscribe_instance(&address, &wanted).await {
                any_active = true;
            }
        }

        let status = if any_active {
            SubscriptionStatus::Active
        } else {
            SubscriptionStatus::Failed
        };
        {
            let mut registration = registration.lock();
            registration.status = status;
            registration.last_check = Some(Utc::now());
        }
        log_registry_operation(
            "subscribe",
            Some(&service),
            None,
            if any_active { "active" } else { "failed" },
            None,
        );
        status
    }

    /// One subscription RPC against one publisher instance; true when the
    /// instance accepted and reports itself active
    async fn subscribe_instance(&self, address: &str, manifests: &[DataParcelManifest]) -> bool {
        let Some(entry) = self
            .publishers
            .get(address)
            .map(|entry| entry.value().clone())
        else {
            return false;
        };
        let publisher = entry.lock().publisher.clone();
        let target = publisher
            .for_function(EndpointFunctionType::Subscription)
            .address_name;
        let request = SubscriptionRequest::new(self.local.clone(), manifests.to_vec());

        match self.rpc.request_subscription(&target, request).await {
            Ok(response) if response.successful => {
                entry.lock().touch(response.registration_status);
                response.registration_status == PublisherStatus::Active
            }
            Ok(response) => {
                debug!(
                    publisher = %target,
                    commentary = %response.commentary,
                    "Publisher declined subscription"
                );
                entry.lock().touch(response.registration_status);
                false
            }
            Err(e) => {
                warn!(publisher = %target, error = %e, "Subscription request failed");
                entry.lock().status = PublisherStatus::Unreachable;
                false
            }
        }
    }

    /// A new publisher endpoint was discovered; subscribe straight away when the
    /// local subscriber is interested in its service
    pub async fn on_publisher_discovered(&self, publisher: EndpointIdentifier) -> PublisherRegistration {
        let registration = self.register_publisher(publisher.clone());
        let interest = self
            .interests
            .get(&publisher.service)
            .map(|manifests| manifests.value().clone());
        if let Some(manifests) = interest {
            self.subscribe_to_remote_publishers(manifests, publisher.clone())
                .await;
            return self.publisher(&publisher.address_name).unwrap_or(registration);
        }
        registration
    }

    /// One reconciliation pass over every subscription registration. Never
    /// fails; per-instance failures are recorded as instance status.
    pub async fn perform_subscription_check(&self) -> SubscriptionCheckReport {
        let mut report = SubscriptionCheckReport::default();

        let interests: Vec<(String, Vec<DataParcelManifest>)> = self
            .interests
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        for (service, manifests) in &interests {
            self.subscription_entry(service, manifests);
        }

        let registrations: Vec<(String, Arc<Mutex<SubscriptionRegistration>>)> = self
            .subscriptions
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        let discovery_group = EndpointIdentifier::cluster_group_for(
            &self.cluster_prefix,
            EndpointFunctionType::Discovery,
        );
        let members = self.rpc.members(&discovery_group);

        for (service, registration) in registrations {
            report.services_checked += 1;
            let manifests = registration.lock().manifests.clone();
            let mut any_active = false;

            for address in self.instance_addresses(&service) {
                let Some(status) = self.publisher(&address).map(|p| p.status) else {
                    continue;
                };
                if matches!(status, PublisherStatus::Registered | PublisherStatus::Unreachable) {
                    report.instances_revalidated += 1;
                    if self.subscribe_instance(&address, &manifests).await {
                        any_active = true;
                    }
                } else if status == PublisherStatus::Active {
                    any_active = true;
                }
            }

            for address in &members {
                let Some(candidate) =
                    EndpointIdentifier::parse_address(address, &self.cluster_prefix)
                else {
                    continue;
                };
                if candidate.service != service
                    || self.publishers.contains_key(address)
                    || candidate
                        .for_function(EndpointFunctionType::Subscription)
                        .is_same_endpoint(&self.local)
                    || !self.rpc.is_live(address)
                {
                    continue;
                }
                self.register_publisher(candidate);
                report.instances_discovered += 1;
                if self.subscribe_instance(address, &manifests).await {
                    any_active = true;
                }
            }

            let has_instances = !self.instance_addresses(&service).is_empty();
            let mut registration = registration.lock();
            registration.status = match (any_active, has_instances) {
                (true, _) => SubscriptionStatus::Active,
                (false, true) => SubscriptionStatus::Failed,
                (false, false) => SubscriptionStatus::Pending,
            };
            registration.last_check = Some(Utc::now());
            if any_active {
                report.active_services += 1;
            }
        }

        debug!(
            services = report.services_checked,
            revalidated = report.instances_revalidated,
            discovered = report.instances_discovered,
            active = report.active_services,
            "Subscription check completed"
        );
        report
    }

    // =========================================================================
    // Reconciliation timer
    // =========================================================================

    pub fn start_subscription_checks(&self) {
        if self
            .checks_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime available; subscription checks not started");
            self.checks_running.store(false, Ordering::SeqCst);
            return;
        };

        info!(
            initial_delay_ms = self.config.initial_delay_ms,
            period_ms = self.config.period_ms,
            "Starting subscription checks"
        );
        let registry = self.me.clone();
        let initial_delay = self.config.initial_delay();
        let period = self.config.period();
        let handle = runtime.spawn(async move {
            tokio::time::sleep(initial_delay).await;
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                if !registry.checks_running.load(Ordering::SeqCst) {
                    break;
                }
                registry.perform_subscription_check().await;
            }
        });
        *self.check_timer.lock() = Some(handle);
    }

    pub fn stop_subscription_checks(&self) {
        self.checks_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.check_timer.lock().take() {
            handle.abort();
            info!("Subscription checks stopped");
        }
    }

    pub fn subscription_checks_running(&self) -> bool {
        self.checks_running.load(Ordering::SeqCst)
    }
}

impl Drop for PublisherSubscriberRegistry {
    fn drop(&mut self) {
        if let Some(handle) = self.check_timer.get_mut().take() {
            handle.abort();
        }
    }
}
