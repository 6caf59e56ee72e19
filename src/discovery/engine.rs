//! # Endpoint Discovery Engine
//!
//! A timer loop that drains the check schedule once per tick. Each pending-add
//! item in scope is probed over RPC; successes are merged into the
//! [`EndpointMap`] and reported to the policy, failures bump the item's retry
//! count and are rescheduled until the count exceeds the policy's bound, at
//! which point the item becomes a removal applied on the next tick.
//!
//! The timer runs only while there is work: it clears its armed flag when the
//! schedule is empty and is re-armed by the next membership delta.

use super::endpoint_map::EndpointMap;
use super::policy::DiscoveryPolicy;
use crate::config::DiscoveryConfig;
use crate::logging::log_endpoint_operation;
use crate::messaging::{MembershipListener, RpcClient};
use crate::metrics::PetasosMetrics;
use crate::models::{
    CheckKind, CheckScheduleElement, DataParcelManifest, EndpointDescriptor, EndpointIdentifier,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What one tick of the check loop did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckCycleReport {
    pub probed_ok: usize,
    pub probe_failures: usize,
    /// Items whose retry count passed the bound and became removals
    pub converted_to_removal: usize,
    pub removed: usize,
    pub out_of_scope: usize,
    pub rescheduled: usize,
}

pub struct DiscoveryEngine {
    me: Weak<DiscoveryEngine>,
    local: EndpointIdentifier,
    cluster_prefix: String,
    published_manifests: Mutex<Vec<DataParcelManifest>>,
    endpoints: Arc<EndpointMap>,
    rpc: RpcClient,
    policy: Arc<dyn DiscoveryPolicy>,
    config: DiscoveryConfig,
    metrics: Arc<PetasosMetrics>,
    timer_armed: AtomicBool,
    shut_down: AtomicBool,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for DiscoveryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryEngine")
            .field("local", &self.local.address_name)
            .field("config", &self.config)
            .field("known_endpoints", &self.endpoints.len())
            .field("scheduled", &self.endpoints.schedule_len())
            .field("timer_armed", &self.timer_armed.load(Ordering::Relaxed))
            .finish()
    }
}

impl DiscoveryEngine {
    pub fn new(
        local: EndpointIdentifier,
        cluster_prefix: impl Into<String>,
        endpoints: Arc<EndpointMap>,
        rpc: RpcClient,
        policy: Arc<dyn DiscoveryPolicy>,
        config: DiscoveryConfig,
        metrics: Arc<PetasosMetrics>,
    ) -> Arc<Self> {
        info!(
            local = %local,
            initial_delay_ms = config.initial_delay_ms,
            period_ms = config.period_ms,
            max_probe_retries = policy.max_probe_retries(),
            "Creating DiscoveryEngine"
        );
        let cluster_prefix = cluster_prefix.into();
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            local,
            cluster_prefix,
            published_manifests: Mutex::new(Vec::new()),
            endpoints,
            rpc,
            policy,
            config,
            metrics,
            timer_armed: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
            timer: Mutex::new(None),
        })
    }

    pub fn local_identifier(&self) -> &EndpointIdentifier {
        &self.local
    }

    pub fn endpoints(&self) -> &Arc<EndpointMap> {
        &self.endpoints
    }

    /// Manifests advertised in this node's probe descriptor
    pub fn set_published_manifests(&self, manifests: Vec<DataParcelManifest>) {
        *self.published_manifests.lock() = manifests;
    }

    pub fn local_descriptor(&self) -> EndpointDescriptor {
        EndpointDescriptor::new(self.local.clone())
            .with_manifests(self.published_manifests.lock().clone())
    }

    pub fn is_timer_armed(&self) -> bool {
        self.timer_armed.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Schedule every live in-scope member not already cached, then arm the timer
    pub fn start(&self) {
        self.shut_down.store(false, Ordering::SeqCst);
        let mut scheduled = 0;
        for address in self.rpc.members(&self.local.cluster_group) {
            if self.endpoints.contains(&address) {
                continue;
            }
            if let Some(candidate) = self.classify_in_scope(&address) {
                self.endpoints.schedule(CheckScheduleElement::add(candidate));
                scheduled += 1;
            }
        }
        info!(local = %self.local, scheduled, "DiscoveryEngine started");
        self.arm_timer();
    }

    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }
        self.timer_armed.store(false, Ordering::SeqCst);
        info!(local = %self.local, "DiscoveryEngine stopped");
    }

    fn classify_in_scope(&self, address: &str) -> Option<EndpointIdentifier> {
        let Some(candidate) = EndpointIdentifier::parse_address(address, &self.cluster_prefix)
        else {
            debug!(address, "Ignoring address outside the endpoint naming scheme");
            return None;
        };
        self.policy
            .in_scope(&self.local, &candidate)
            .then_some(candidate)
    }

    fn arm_timer(&self) {
        if self.shut_down.load(Ordering::SeqCst) || self.endpoints.schedule_len() == 0 {
            return;
        }
        if self
            .timer_armed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(local = %self.local, "No async runtime available; discovery timer not armed");
            self.timer_armed.store(false, Ordering::SeqCst);
            return;
        };

        let engine = self.me.clone();
        let initial_delay = self.config.initial_delay();
        let period = self.config.period();
        let handle = runtime.spawn(async move {
            tokio::time::sleep(initial_delay).await;
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                if engine.shut_down.load(Ordering::SeqCst) {
                    engine.timer_armed.store(false, Ordering::SeqCst);
                    break;
                }
                engine.run_check_cycle().await;
                if engine.endpoints.schedule_len() == 0 {
                    engine.timer_armed.store(false, Ordering::SeqCst);
                    // Work scheduled between the check and the clear must not be stranded
                    let reclaimed = engine.endpoints.schedule_len() > 0
                        && engine
                            .timer_armed
                            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                            .is_ok();
                    if !reclaimed {
                        debug!(local = %engine.local, "Check schedule empty, discovery timer parked");
                        break;
                    }
                }
            }
        });
        *self.timer.lock() = Some(handle);
    }

    // =========================================================================
    // Check cycle
    // =========================================================================

    /// Run exactly one tick. Never fails: a failure on one item is recorded
    /// against that item and processing continues.
    pub async fn run_check_cycle(&self) -> CheckCycleReport {
        let mut report = CheckCycleReport::default();
        let mut carried_over = Vec::new();

        for item in self.endpoints.drain_schedule() {
            match item.kind {
                CheckKind::Remove => {
                    self.evict(&item.identifier).await;
                    report.removed += 1;
                }
                CheckKind::Add => {
                    if !self.policy.in_scope(&self.local, &item.identifier) {
                        report.out_of_scope += 1;
                        continue;
                    }
                    match self.probe(&item.identifier).await {
                        Ok(descriptor) => {
                            let first_sighting = self.endpoints.insert_or_enrich(descriptor.clone());
                            log_endpoint_operation(
                                "probe",
                                &item.identifier.address_name,
                                Some(item.identifier.function_type.token()),
                                if first_sighting { "discovered" } else { "enriched" },
                                None,
                            );
                            self.policy.on_endpoint_discovered(&descriptor).await;
                            report.probed_ok += 1;
                        }
                        Err(reason) => {
                            report.probe_failures += 1;
                            PetasosMetrics::increment(&self.metrics.probe_failures);
                            self.endpoints.mark_unreachable(&item.identifier.address_name);

                            let retry_count = item.retry_count + 1;
                            if retry_count > self.policy.max_probe_retries() {
                                warn!(
                                    address = %item.identifier.address_name,
                                    retry_count,
                                    reason = %reason,
                                    "Probe retries exhausted, scheduling eviction"
                                );
                                carried_over.push(CheckScheduleElement::remove(item.identifier));
                                report.converted_to_removal += 1;
                            } else {
                                debug!(
                                    address = %item.identifier.address_name,
                                    retry_count,
                                    reason = %reason,
                                    "Probe failed, rescheduling"
                                );
                                carried_over.push(CheckScheduleElement {
                                    retry_count,
                                    ..item
                                });
                                report.rescheduled += 1;
                            }
                        }
                    }
                }
            }
        }

        for item in carried_over {
            self.endpoints.schedule(item);
        }
        self.metrics.mark_activity("discovery_check_cycle");
        report
    }

    async fn probe(&self, target: &EndpointIdentifier) -> Result<EndpointDescriptor, String> {
        PetasosMetrics::increment(&self.metrics.probes);
        if !self.rpc.is_live(&target.address_name) {
            return Err("address is not a live member".to_string());
        }
        self.rpc
            .probe(&target.address_name, self.local_descriptor())
            .await
            .map_err(|e| e.to_string())
    }

    async fn evict(&self, identifier: &EndpointIdentifier) {
        self.endpoints.remove(&identifier.address_name);
        PetasosMetrics::increment(&self.metrics.evictions);
        self.policy.on_endpoint_evicted(identifier).await;
        log_endpoint_operation(
            "evict",
            &identifier.address_name,
            Some(identifier.function_type.token()),
            "removed",
            None,
        );
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    /// Answer an inbound probe; an unknown in-scope caller is scheduled for checking
    pub fn handle_probe(&self, caller: &EndpointDescriptor) -> EndpointDescriptor {
        let address = &caller.identifier.address_name;
        if self.policy.in_scope(&self.local, &caller.identifier) && !self.endpoints.contains(address) {
            debug!(caller = %address, "Probe from unknown endpoint, scheduling check");
            self.endpoints
                .schedule(CheckScheduleElement::add(caller.identifier.clone()));
            self.arm_timer();
        }
        self.local_descriptor()
    }
}

impl MembershipListener for DiscoveryEngine {
    fn interface_added(&self, address_name: &str) {
        if let Some(candidate) = self.classify_in_scope(address_name) {
            debug!(address = address_name, "Membership added, scheduling probe");
            self.endpoints.schedule(CheckScheduleElement::add(candidate));
            self.arm_timer();
        }
    }

    fn interface_removed(&self, address_name: &str) {
        if let Some(candidate) = self.classify_in_scope(address_name) {
            debug!(address = address_name, "Membership removed, scheduling removal");
            self.endpoints
                .schedule(CheckScheduleElement::remove(candidate));
            self.arm_timer();
        }
    }
}

impl Drop for DiscoveryEngine {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.get_mut().take() {
            handle.abort();
        }
    }
}
