//! # Endpoint Identity & Address Resolution
//!
//! Every functional role of a node (task distribution, discovery, subscription,
//! audit, metrics, IPC) is reachable at its own endpoint. Names and addresses are
//! derived deterministically from the node's site/zone/service/instance so that
//! any node can classify a membership address without a round trip:
//!
//! ```text
//! logical name   {service}.{function}
//! address name   {site}::{zone}::{service}::{function}::{instance}
//! cluster group  {cluster_prefix}-{function}
//! ```

use super::registration::DataParcelManifest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const ADDRESS_SEPARATOR: &str = "::";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointFunctionType {
    Discovery,
    Subscription,
    Tasking,
    Audit,
    Metrics,
    Ipc,
}

impl EndpointFunctionType {
    pub const ALL: [EndpointFunctionType; 6] = [
        Self::Discovery,
        Self::Subscription,
        Self::Tasking,
        Self::Audit,
        Self::Metrics,
        Self::Ipc,
    ];

    pub fn token(&self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::Subscription => "subscription",
            Self::Tasking => "tasking",
            Self::Audit => "audit",
            Self::Metrics => "metrics",
            Self::Ipc => "ipc",
        }
    }
}

impl fmt::Display for EndpointFunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for EndpointFunctionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|function| function.token() == s)
            .ok_or_else(|| format!("Unknown endpoint function type: {s}"))
    }
}

/// The components a node's endpoint names are derived from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeIdentity {
    pub site: String,
    pub zone: String,
    pub service: String,
    pub instance: String,
    pub cluster_prefix: String,
}

impl From<&crate::config::NodeConfig> for NodeIdentity {
    fn from(config: &crate::config::NodeConfig) -> Self {
        Self {
            site: config.site.clone(),
            zone: config.zone.clone(),
            service: config.service.clone(),
            instance: config.instance.clone(),
            cluster_prefix: config.cluster_prefix.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointIdentifier {
    pub name: String,
    pub address_name: String,
    pub cluster_group: String,
    pub function_type: EndpointFunctionType,
    pub site: String,
    pub zone: String,
    pub service: String,
    pub instance: String,
}

impl EndpointIdentifier {
    pub fn cluster_group_for(cluster_prefix: &str, function: EndpointFunctionType) -> String {
        format!("{cluster_prefix}-{}", function.token())
    }

    /// Recover an identifier from an address name. Returns `None` for any address
    /// that does not have exactly five non-empty components and a known function.
    pub fn parse_address(address_name: &str, cluster_prefix: &str) -> Option<Self> {
        let parts: Vec<&str> = address_name.split(ADDRESS_SEPARATOR).collect();
        if parts.len() != 5 || parts.iter().any(|part| part.trim().is_empty()) {
            return None;
        }
        let function_type = parts[3].parse::<EndpointFunctionType>().ok()?;
        Some(Self {
            name: format!("{}.{}", parts[2], function_type.token()),
            address_name: address_name.to_string(),
            cluster_group: Self::cluster_group_for(cluster_prefix, function_type),
            function_type,
            site: parts[0].to_string(),
            zone: parts[1].to_string(),
            service: parts[2].to_string(),
            instance: parts[4].to_string(),
        })
    }

    /// The same node's endpoint for another functional role
    pub fn for_function(&self, function: EndpointFunctionType) -> Self {
        let suffix = format!("-{}", self.function_type.token());
        let cluster_prefix = self
            .cluster_group
            .strip_suffix(suffix.as_str())
            .unwrap_or(&self.cluster_group);
        Self {
            name: format!("{}.{}", self.service, function.token()),
            address_name: [
                self.site.as_str(),
                self.zone.as_str(),
                self.service.as_str(),
                function.token(),
                self.instance.as_str(),
            ]
            .join(ADDRESS_SEPARATOR),
            cluster_group: Self::cluster_group_for(cluster_prefix, function),
            function_type: function,
            site: self.site.clone(),
            zone: self.zone.clone(),
            service: self.service.clone(),
            instance: self.instance.clone(),
        }
    }

    /// Same cluster group and same functional type
    pub fn same_scope(&self, other: &EndpointIdentifier) -> bool {
        self.cluster_group == other.cluster_group && self.function_type == other.function_type
    }

    pub fn is_same_endpoint(&self, other: &EndpointIdentifier) -> bool {
        self.address_name == other.address_name
    }

    pub fn same_site(&self, other: &EndpointIdentifier) -> bool {
        self.site == other.site
    }

    pub fn same_zone(&self, other: &EndpointIdentifier) -> bool {
        self.same_site(other) && self.zone == other.zone
    }
}

impl fmt::Display for EndpointIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address_name)
    }
}

/// Derives a node's endpoint identifiers for each functional role
#[derive(Debug, Clone)]
pub struct EndpointNameResolver {
    identity: NodeIdentity,
}

impl EndpointNameResolver {
    pub fn new(identity: NodeIdentity) -> Self {
        Self { identity }
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn address_name(&self, function: EndpointFunctionType) -> String {
        [
            self.identity.site.as_str(),
            self.identity.zone.as_str(),
            self.identity.service.as_str(),
            function.token(),
            self.identity.instance.as_str(),
        ]
        .join(ADDRESS_SEPARATOR)
    }

    pub fn resolve(&self, function: EndpointFunctionType) -> EndpointIdentifier {
        EndpointIdentifier {
            name: format!("{}.{}", self.identity.service, function.token()),
            address_name: self.address_name(function),
            cluster_group: EndpointIdentifier::cluster_group_for(
                &self.identity.cluster_prefix,
                function,
            ),
            function_type: function,
            site: self.identity.site.clone(),
            zone: self.identity.zone.clone(),
            service: self.identity.service.clone(),
            instance: self.identity.instance.clone(),
        }
    }

    /// Classify a remote address in this node's naming scheme
    pub fn classify(&self, address_name: &str) -> Option<EndpointIdentifier> {
        EndpointIdentifier::parse_address(address_name, &self.identity.cluster_prefix)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointStatus {
    Detected,
    Reachable,
    Unreachable,
}

/// What a node says about itself in a probe exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    pub identifier: EndpointIdentifier,
    pub status: EndpointStatus,
    #[serde(default)]
    pub manifests: Vec<DataParcelManifest>,
    pub last_activity: DateTime<Utc>,
}

impl EndpointDescriptor {
    pub fn new(identifier: EndpointIdentifier) -> Self {
        Self {
            identifier,
            status: EndpointStatus::Reachable,
            manifests: Vec::new(),
            last_activity: Utc::now(),
        }
    }

    pub fn with_manifests(mut self, manifests: Vec<DataParcelManifest>) -> Self {
        self.manifests = manifests;
        self
    }
}

/// A cached remote endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointRecord {
    pub identifier: EndpointIdentifier,
    pub status: EndpointStatus,
    pub descriptor: Option<EndpointDescriptor>,
    pub first_seen: DateTime<Utc>,
    pub last_successful_probe: Option<DateTime<Utc>>,
    pub probe_failures: u32,
}

impl EndpointRecord {
    pub fn detected(identifier: EndpointIdentifier) -> Self {
        Self {
            identifier,
            status: EndpointStatus::Detected,
            descriptor: None,
            first_seen: Utc::now(),
            last_successful_probe: None,
            probe_failures: 0,
        }
    }

    pub fn from_descriptor(descriptor: EndpointDescriptor) -> Self {
        let mut record = Self::detected(descriptor.identifier.clone());
        record.enrich(descriptor);
        record
    }

    /// Merge a successful probe result. The stored descriptor is only replaced by
    /// one at least as fresh; reachability is always restored.
    pub fn enrich(&mut self, descriptor: EndpointDescriptor) {
        self.status = EndpointStatus::Reachable;
        self.probe_failures = 0;
        self.last_successful_probe = Some(Utc::now());
        let fresher = self
            .descriptor
            .as_ref()
            .map_or(true, |existing| descriptor.last_activity >= existing.last_activity);
        if fresher {
            self.descriptor = Some(descriptor);
        }
    }

    pub fn mark_unreachable(&mut self) {
        self.status = EndpointStatus::Unreachable;
        self.probe_failures += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Add,
    Remove,
}

/// A unit of work for the discovery timer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckScheduleElement {
    pub identifier: EndpointIdentifier,
    pub kind: CheckKind,
    pub retry_count: u32,
}

impl CheckScheduleElement {
    pub fn add(identifier: EndpointIdentifier) -> Self {
        Self {
            identifier,
            kind: CheckKind::Add,
            retry_count: 0,
        }
    }

    pub fn remove(identifier: EndpointIdentifier) -> Self {
        Self {
            identifier,
            kind: CheckKind::Remove,
            retry_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(site: &str, zone: &str, instance: &str) -> NodeIdentity {
        NodeIdentity {
            site: site.to_string(),
            zone: zone.to_string(),
            service: "ehr-gateway".to_string(),
            instance: instance.to_string(),
            cluster_prefix: "petasos".to_string(),
        }
    }

    #[test]
    fn test_resolve_builds_stable_names() {
        let resolver = EndpointNameResolver::new(identity("site-a", "zone-1", "n1"));
        let id = resolver.resolve(EndpointFunctionType::Subscription);
        assert_eq!(id.name, "ehr-gateway.subscription");
        assert_eq!(id.address_name, "site-a::zone-1::ehr-gateway::subscription::n1");
        assert_eq!(id.cluster_group, "petasos-subscription");
        assert_eq!(resolver.resolve(EndpointFunctionType::Subscription), id);
    }

    #[test]
    fn test_parse_address_round_trips_resolved_identifier() {
        let resolver = EndpointNameResolver::new(identity("site-a", "zone-1", "n1"));
        for function in EndpointFunctionType::ALL {
            let id = resolver.resolve(function);
            assert_eq!(resolver.classify(&id.address_name), Some(id));
        }
    }

    #[test]
    fn test_for_function_matches_resolver() {
        let resolver = EndpointNameResolver::new(identity("site-a", "zone-1", "n1"));
        let discovery = resolver.resolve(EndpointFunctionType::Discovery);
        assert_eq!(
            discovery.for_function(EndpointFunctionType::Subscription),
            resolver.resolve(EndpointFunctionType::Subscription)
        );
    }

    #[test]
    fn test_parse_address_rejects_malformed() {
        assert!(EndpointIdentifier::parse_address("site::zone::svc::discovery", "p").is_none());
        assert!(EndpointIdentifier::parse_address("site::zone::svc::gossip::n1", "p").is_none());
        assert!(EndpointIdentifier::parse_address("site::::svc::discovery::n1", "p").is_none());
        assert!(EndpointIdentifier::parse_address("", "p").is_none());
    }

    #[test]
    fn test_scope_and_locality() {
        let a = EndpointNameResolver::new(identity("site-a", "zone-1", "n1"))
            .resolve(EndpointFunctionType::Discovery);
        let b = EndpointNameResolver::new(identity("site-a", "zone-2", "n2"))
            .resolve(EndpointFunctionType::Discovery);
        let c = EndpointNameResolver::new(identity("site-b", "zone-1", "n3"))
            .resolve(EndpointFunctionType::Tasking);
        assert!(a.same_scope(&b));
        assert!(!a.same_scope(&c));
        assert!(a.same_site(&b));
        assert!(!a.same_zone(&b));
        assert!(!a.same_zone(&c));
        assert!(!a.is_same_endpoint(&b));
    }

    #[test]
    fn test_enrich_keeps_fresher_descriptor() {
        let id = EndpointNameResolver::new(identity("s", "z", "n1"))
            .resolve(EndpointFunctionType::Discovery);
        let newer = EndpointDescriptor::new(id.clone());
        let mut older = EndpointDescriptor::new(id.clone());
        older.last_activity = newer.last_activity - chrono::Duration::seconds(30);

        let mut record = EndpointRecord::from_descriptor(newer.clone());
        record.mark_unreachable();
        assert_eq!(record.status, EndpointStatus::Unreachable);

        record.enrich(older);
        assert_eq!(record.status, EndpointStatus::Reachable);
        assert_eq!(record.probe_failures, 0);
        assert_eq!(record.descriptor, Some(newer));
    }
}
