//! # Publisher / Subscriber Registrations
//!
//! Registrations are keyed by publisher instance address (one per live
//! publisher endpoint) and by logical publisher service name (one per
//! subscription the local node holds).

use super::endpoint::{EndpointIdentifier, EndpointStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Typed descriptor of a payload shape a publisher produces or a subscriber wants
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataParcelManifest {
    pub data_type: String,
    pub version: String,
}

impl DataParcelManifest {
    pub fn new(data_type: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            data_type: data_type.into(),
            version: version.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublisherStatus {
    Registered,
    Active,
    Unreachable,
}

/// One publisher instance as known to the local registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublisherRegistration {
    pub publisher: EndpointIdentifier,
    pub status: PublisherStatus,
    pub registration_instant: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl PublisherRegistration {
    pub fn new(publisher: EndpointIdentifier) -> Self {
        let now = Utc::now();
        Self {
            publisher,
            status: PublisherStatus::Registered,
            registration_instant: now,
            last_activity: now,
        }
    }

    pub fn service_name(&self) -> &str {
        &self.publisher.service
    }

    pub fn needs_revalidation(&self) -> bool {
        matches!(
            self.status,
            PublisherStatus::Registered | PublisherStatus::Unreachable
        )
    }

    pub fn touch(&mut self, status: PublisherStatus) {
        self.status = status;
        self.last_activity = Utc::now();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Pending,
    Active,
    Failed,
}

/// The local subscriber's registration against a logical publisher service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRegistration {
    pub publisher_service: String,
    pub manifests: Vec<DataParcelManifest>,
    pub status: SubscriptionStatus,
    pub registration_instant: DateTime<Utc>,
    pub last_check: Option<DateTime<Utc>>,
}

impl SubscriptionRegistration {
    pub fn new(publisher_service: impl Into<String>, manifests: Vec<DataParcelManifest>) -> Self {
        Self {
            publisher_service: publisher_service.into(),
            manifests,
            status: SubscriptionStatus::Pending,
            registration_instant: Utc::now(),
            last_check: None,
        }
    }

    /// Add manifests not already present
    pub fn merge_manifests(&mut self, manifests: &[DataParcelManifest]) {
        for manifest in manifests {
            if !self.manifests.contains(manifest) {
                self.manifests.push(manifest.clone());
            }
        }
    }
}

/// A remote subscriber accepted by the local publisher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriberRegistration {
    pub subscriber: EndpointIdentifier,
    pub manifests: Vec<DataParcelManifest>,
    pub accepted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    pub subscriber: EndpointIdentifier,
    pub manifests: Vec<DataParcelManifest>,
    pub requested_at: DateTime<Utc>,
}

impl SubscriptionRequest {
    pub fn new(subscriber: EndpointIdentifier, manifests: Vec<DataParcelManifest>) -> Self {
        Self {
            subscriber,
            manifests,
            requested_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionResponse {
    pub successful: bool,
    pub commentary: String,
    pub network_status: EndpointStatus,
    pub registration_status: PublisherStatus,
}

impl SubscriptionResponse {
    pub fn accepted(commentary: impl Into<String>) -> Self {
        Self {
            successful: true,
            commentary: commentary.into(),
            network_status: EndpointStatus::Reachable,
            registration_status: PublisherStatus::Active,
        }
    }

    pub fn rejected(commentary: impl Into<String>) -> Self {
        Self {
            successful: false,
            commentary: commentary.into(),
            network_status: EndpointStatus::Reachable,
            registration_status: PublisherStatus::Registered,
        }
    }
}
