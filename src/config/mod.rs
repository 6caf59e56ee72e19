//! # Petasos Configuration
//!
//! Node configuration is resolved from named string parameters. Every parameter
//! has a compiled-in default (see [`crate::constants::defaults`]); a parameter that
//! is missing or cannot be parsed falls back to that default with a debug note
//! instead of failing startup.
//!
//! ## Usage
//!
//! ```rust
//! use petasos::config::{ConfigurationSource, PetasosConfig};
//! use std::collections::HashMap;
//!
//! let mut params = HashMap::new();
//! params.insert("task_queue.offload_threshold".to_string(), "10".to_string());
//! params.insert("task_queue.batch_size".to_string(), "not-a-number".to_string());
//!
//! let config = PetasosConfig::from_source(&params);
//! assert_eq!(config.task_queue.offload_threshold, 10);
//! assert_eq!(config.task_queue.batch_size, 10); // fell back to default
//! ```

pub mod error;
pub mod loader;

use crate::constants::{defaults, parameters};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigLoader;

/// Supplies named string parameters
pub trait ConfigurationSource {
    fn parameter(&self, key: &str) -> Option<String>;
}

impl ConfigurationSource for HashMap<String, String> {
    fn parameter(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

impl ConfigurationSource for config::Config {
    fn parameter(&self, key: &str) -> Option<String> {
        self.get_string(key).ok()
    }
}

/// Resolve a parameter, falling back to `default` when it is absent, unparseable
/// or rejected by `valid`.
fn resolve_or_default<T, F>(source: &dyn ConfigurationSource, key: &str, default: T, valid: F) -> T
where
    T: FromStr + Copy + std::fmt::Debug,
    F: Fn(&T) -> bool,
{
    let Some(raw) = source.parameter(key) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => value,
        Ok(value) => {
            debug!(parameter = key, ?value, ?default, "Rejected configuration value, using default");
            default
        }
        Err(_) => {
            debug!(parameter = key, raw = %raw, ?default, "Malformed configuration value, using default");
            default
        }
    }
}

fn resolve_string(source: &dyn ConfigurationSource, key: &str, default: &str) -> String {
    match source.parameter(key) {
        Some(value) if !value.trim().is_empty() => value.trim().to_string(),
        Some(_) => {
            debug!(parameter = key, default, "Empty configuration value, using default");
            default.to_string()
        }
        None => default.to_string(),
    }
}

/// Root configuration for one Processing Plant node
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PetasosConfig {
    pub node: NodeConfig,
    pub task_queue: TaskQueueConfig,
    pub discovery: DiscoveryConfig,
    pub subscription: SubscriptionConfig,
    pub rpc: RpcConfig,
    pub handover: HandoverConfig,
}

impl PetasosConfig {
    pub fn from_source(source: &dyn ConfigurationSource) -> Self {
        Self {
            node: NodeConfig::from_source(source),
            task_queue: TaskQueueConfig::from_source(source),
            discovery: DiscoveryConfig::from_source(source),
            subscription: SubscriptionConfig::from_source(source),
            rpc: RpcConfig::from_source(source),
            handover: HandoverConfig::from_source(source),
        }
    }
}

/// Identity components of this node; see [`crate::models::endpoint::NodeIdentity`]
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeConfig {
    pub site: String,
    pub zone: String,
    pub service: String,
    pub instance: String,
    pub cluster_prefix: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            site: defaults::SITE.to_string(),
            zone: defaults::ZONE.to_string(),
            service: defaults::SERVICE.to_string(),
            instance: uuid::Uuid::new_v4().simple().to_string(),
            cluster_prefix: defaults::CLUSTER_PREFIX.to_string(),
        }
    }
}

impl NodeConfig {
    pub fn from_source(source: &dyn ConfigurationSource) -> Self {
        let fallback = Self::default();
        Self {
            site: resolve_string(source, parameters::NODE_SITE, &fallback.site),
            zone: resolve_string(source, parameters::NODE_ZONE, &fallback.zone),
            service: resolve_string(source, parameters::NODE_SERVICE, &fallback.service),
            instance: resolve_string(source, parameters::NODE_INSTANCE, &fallback.instance),
            cluster_prefix: resolve_string(
                source,
                parameters::NODE_CLUSTER_PREFIX,
                &fallback.cluster_prefix,
            ),
        }
    }
}

/// Local task queue thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct TaskQueueConfig {
    pub size_max: usize,
    pub offload_threshold: usize,
    pub onload_threshold: usize,
    pub batch_size: usize,
    pub retry_delay_ms: u64,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self {
            size_max: defaults::TASK_QUEUE_SIZE_MAX,
            offload_threshold: defaults::TASK_QUEUE_OFFLOAD_THRESHOLD,
            onload_threshold: defaults::TASK_QUEUE_ONLOAD_THRESHOLD,
            batch_size: defaults::TASK_QUEUE_BATCH_SIZE,
            retry_delay_ms: defaults::TASK_RETRY_DELAY_MS,
        }
    }
}

impl TaskQueueConfig {
    pub fn from_source(source: &dyn ConfigurationSource) -> Self {
        let size_max = resolve_or_default(
            source,
            parameters::TASK_QUEUE_SIZE_MAX,
            defaults::TASK_QUEUE_SIZE_MAX,
            |v| *v > 0,
        );
        Self {
            size_max,
            offload_threshold: resolve_or_default(
                source,
                parameters::TASK_QUEUE_OFFLOAD_THRESHOLD,
                defaults::TASK_QUEUE_OFFLOAD_THRESHOLD,
                |_| true,
            ),
            onload_threshold: resolve_or_default(
                source,
                parameters::TASK_QUEUE_ONLOAD_THRESHOLD,
                defaults::TASK_QUEUE_ONLOAD_THRESHOLD,
                |_| true,
            ),
            batch_size: resolve_or_default(
                source,
                parameters::TASK_QUEUE_BATCH_SIZE,
                defaults::TASK_QUEUE_BATCH_SIZE,
                |v| *v > 0,
            ),
            retry_delay_ms: resolve_or_default(
                source,
                parameters::TASK_RETRY_DELAY_MS,
                defaults::TASK_RETRY_DELAY_MS,
                |_| true,
            ),
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Discovery timer and retry bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct DiscoveryConfig {
    pub initial_delay_ms: u64,
    pub period_ms: u64,
    pub max_probe_retries: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: defaults::DISCOVERY_INITIAL_DELAY_MS,
            period_ms: defaults::DISCOVERY_PERIOD_MS,
            max_probe_retries: defaults::MAX_PROBE_RETRIES,
        }
    }
}

impl DiscoveryConfig {
    pub fn from_source(source: &dyn ConfigurationSource) -> Self {
        Self {
            initial_delay_ms: resolve_or_default(
                source,
                parameters::DISCOVERY_INITIAL_DELAY_MS,
                defaults::DISCOVERY_INITIAL_DELAY_MS,
                |_| true,
            ),
            period_ms: resolve_or_default(
                source,
                parameters::DISCOVERY_PERIOD_MS,
                defaults::DISCOVERY_PERIOD_MS,
                |v| *v > 0,
            ),
            max_probe_retries: resolve_or_default(
                source,
                parameters::MAX_PROBE_RETRIES,
                defaults::MAX_PROBE_RETRIES,
                |_| true,
            ),
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

/// Subscriber reconciliation timer and publisher forwarding policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct SubscriptionConfig {
    pub initial_delay_ms: u64,
    pub period_ms: u64,
    pub cross_zone_forwarding: bool,
    pub cross_site_forwarding: bool,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: defaults::SUBSCRIPTION_CHECK_INITIAL_DELAY_MS,
            period_ms: defaults::SUBSCRIPTION_CHECK_PERIOD_MS,
            cross_zone_forwarding: false,
            cross_site_forwarding: false,
        }
    }
}

impl SubscriptionConfig {
    pub fn from_source(source: &dyn ConfigurationSource) -> Self {
        Self {
            initial_delay_ms: resolve_or_default(
                source,
                parameters::SUBSCRIPTION_CHECK_INITIAL_DELAY_MS,
                defaults::SUBSCRIPTION_CHECK_INITIAL_DELAY_MS,
                |_| true,
            ),
            period_ms: resolve_or_default(
                source,
                parameters::SUBSCRIPTION_CHECK_PERIOD_MS,
                defaults::SUBSCRIPTION_CHECK_PERIOD_MS,
                |v| *v > 0,
            ),
            cross_zone_forwarding: resolve_or_default(
                source,
                parameters::SUBSCRIPTION_CROSS_ZONE_FORWARDING,
                false,
                |_| true,
            ),
            cross_site_forwarding: resolve_or_default(
                source,
                parameters::SUBSCRIPTION_CROSS_SITE_FORWARDING,
                false,
                |_| true,
            ),
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct RpcConfig {
    pub unicast_timeout_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            unicast_timeout_ms: defaults::RPC_UNICAST_TIMEOUT_MS,
        }
    }
}

impl RpcConfig {
    pub fn from_source(source: &dyn ConfigurationSource) -> Self {
        Self {
            unicast_timeout_ms: resolve_or_default(
                source,
                parameters::RPC_UNICAST_TIMEOUT_MS,
                defaults::RPC_UNICAST_TIMEOUT_MS,
                |v| *v > 0,
            ),
        }
    }

    pub fn unicast_timeout(&self) -> Duration {
        Duration::from_millis(self.unicast_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct HandoverConfig {
    pub receive_timeout_ms: u64,
}

impl Default for HandoverConfig {
    fn default() -> Self {
        Self {
            receive_timeout_ms: defaults::HANDOVER_RECEIVE_TIMEOUT_MS,
        }
    }
}

impl HandoverConfig {
    pub fn from_source(source: &dyn ConfigurationSource) -> Self {
        Self {
            receive_timeout_ms: resolve_or_default(
                source,
                parameters::HANDOVER_RECEIVE_TIMEOUT_MS,
                defaults::HANDOVER_RECEIVE_TIMEOUT_MS,
                |v| *v > 0,
            ),
        }
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_when_source_is_empty() {
        let config = PetasosConfig::from_source(&HashMap::new());
        assert_eq!(config.task_queue, TaskQueueConfig::default());
        assert_eq!(config.discovery.max_probe_retries, 5);
        assert_eq!(config.task_queue.size_max, 500);
        assert!(!config.subscription.cross_site_forwarding);
        assert_eq!(config.node.cluster_prefix, "petasos");
    }

    #[test]
    fn test_valid_values_are_applied() {
        let source = params(&[
            ("task_queue.offload_threshold", "10"),
            ("task_queue.onload_threshold", "3"),
            ("task_queue.retry_delay_ms", "250"),
            ("discovery.max_probe_retries", "2"),
            ("subscription.cross_zone_forwarding", "true"),
            ("node.site", "site-b"),
        ]);
        let config = PetasosConfig::from_source(&source);
        assert_eq!(config.task_queue.offload_threshold, 10);
        assert_eq!(config.task_queue.onload_threshold, 3);
        assert_eq!(config.task_queue.retry_delay(), Duration::from_millis(250));
        assert_eq!(config.discovery.max_probe_retries, 2);
        assert!(config.subscription.cross_zone_forwarding);
        assert_eq!(config.node.site, "site-b");
    }

    #[test]
    fn test_malformed_values_fall_back_silently() {
        let source = params(&[
            ("task_queue.size_max", "-4"),
            ("task_queue.batch_size", "0"),
            ("discovery.period_ms", "soon"),
            ("subscription.cross_site_forwarding", "yes please"),
            ("node.zone", "   "),
        ]);
        let config = PetasosConfig::from_source(&source);
        assert_eq!(config.task_queue.size_max, defaults::TASK_QUEUE_SIZE_MAX);
        assert_eq!(config.task_queue.batch_size, defaults::TASK_QUEUE_BATCH_SIZE);
        assert_eq!(config.discovery.period_ms, defaults::DISCOVERY_PERIOD_MS);
        assert!(!config.subscription.cross_site_forwarding);
        assert_eq!(config.node.zone, defaults::ZONE);
    }

    #[test]
    fn test_values_are_trimmed() {
        let source = params(&[("rpc.unicast_timeout_ms", " 750 ")]);
        let config = RpcConfig::from_source(&source);
        assert_eq!(config.unicast_timeout(), Duration::from_millis(750));
    }
}
