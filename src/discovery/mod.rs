//! # Endpoint Discovery
//!
//! Scans cluster membership, probes remote endpoints, keeps the endpoint cache
//! current, and evicts endpoints that stay unreachable.

pub mod endpoint_map;
pub mod engine;
pub mod policy;

pub use endpoint_map::EndpointMap;
pub use engine::{CheckCycleReport, DiscoveryEngine};
pub use policy::{DiscoveryPolicy, ScopedDiscoveryPolicy};
