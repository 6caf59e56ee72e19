//! # System Constants
//!
//! Compiled-in defaults, configuration parameter names and the fulfiller-visible
//! reason strings attached to task outcomes.

/// Fallback values used whenever a configuration parameter is absent or malformed
pub mod defaults {
    /// Hard ceiling on a participant's local queue, independent of the tunable thresholds
    pub const TASK_QUEUE_SIZE_MAX: usize = 500;
    pub const TASK_QUEUE_OFFLOAD_THRESHOLD: usize = 400;
    pub const TASK_QUEUE_ONLOAD_THRESHOLD: usize = 200;
    pub const TASK_QUEUE_BATCH_SIZE: usize = 10;
    pub const TASK_RETRY_DELAY_MS: u64 = 5_000;

    pub const DISCOVERY_INITIAL_DELAY_MS: u64 = 2_000;
    pub const DISCOVERY_PERIOD_MS: u64 = 5_000;
    pub const MAX_PROBE_RETRIES: u32 = 5;

    pub const SUBSCRIPTION_CHECK_INITIAL_DELAY_MS: u64 = 5_000;
    pub const SUBSCRIPTION_CHECK_PERIOD_MS: u64 = 10_000;

    pub const RPC_UNICAST_TIMEOUT_MS: u64 = 2_000;
    pub const HANDOVER_RECEIVE_TIMEOUT_MS: u64 = 2_000;

    pub const CLUSTER_PREFIX: &str = "petasos";
    pub const SITE: &str = "default-site";
    pub const ZONE: &str = "default-zone";
    pub const SERVICE: &str = "processing-plant";
}

/// Named configuration parameters, resolved through a `ConfigurationSource`
pub mod parameters {
    pub const NODE_SITE: &str = "node.site";
    pub const NODE_ZONE: &str = "node.zone";
    pub const NODE_SERVICE: &str = "node.service";
    pub const NODE_INSTANCE: &str = "node.instance";
    pub const NODE_CLUSTER_PREFIX: &str = "node.cluster_prefix";

    pub const TASK_QUEUE_SIZE_MAX: &str = "task_queue.size_max";
    pub const TASK_QUEUE_OFFLOAD_THRESHOLD: &str = "task_queue.offload_threshold";
    pub const TASK_QUEUE_ONLOAD_THRESHOLD: &str = "task_queue.onload_threshold";
    pub const TASK_QUEUE_BATCH_SIZE: &str = "task_queue.batch_size";
    pub const TASK_RETRY_DELAY_MS: &str = "task_queue.retry_delay_ms";

    pub const DISCOVERY_INITIAL_DELAY_MS: &str = "discovery.initial_delay_ms";
    pub const DISCOVERY_PERIOD_MS: &str = "discovery.period_ms";
    pub const MAX_PROBE_RETRIES: &str = "discovery.max_probe_retries";

    pub const SUBSCRIPTION_CHECK_INITIAL_DELAY_MS: &str = "subscription.initial_delay_ms";
    pub const SUBSCRIPTION_CHECK_PERIOD_MS: &str = "subscription.period_ms";
    pub const SUBSCRIPTION_CROSS_ZONE_FORWARDING: &str = "subscription.cross_zone_forwarding";
    pub const SUBSCRIPTION_CROSS_SITE_FORWARDING: &str = "subscription.cross_site_forwarding";

    pub const RPC_UNICAST_TIMEOUT_MS: &str = "rpc.unicast_timeout_ms";
    pub const HANDOVER_RECEIVE_TIMEOUT_MS: &str = "handover.receive_timeout_ms";
}

/// Reason strings recorded on task fulfillment/outcome records
pub mod reasons {
    pub const PARTICIPANT_DISABLED: &str = "Participant is Disabled";
    pub const MESSAGE_SEND_TIMED_OUT: &str = "Message Send Timed Out!";
    pub const MESSAGE_FAILED_DECODING: &str = "Message Failed Decoding!";
    pub const MISMATCH_MESSAGE_FLOWS: &str = "Mismatch Message Flows";
    pub const MESSAGE_SEND_FAILED: &str = "Message Send Failed";
    pub const DISTRIBUTION_FAILED: &str = "Task Distribution Failed";
}

/// Remote method names, used in RPC error reporting
pub mod methods {
    pub const PROBE: &str = "probe";
    pub const REGISTER_PUBLISHER: &str = "register_publisher";
    pub const REQUEST_SUBSCRIPTION: &str = "request_subscription";
    pub const HANDOVER: &str = "handover";
}
