//! Error types for the Petasos orchestration layer.
//!

use crate::config::ConfigurationError;
use thiserror::Error;

pub use crate::messaging::errors::{RpcError, RpcResult};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PetasosError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Resource update failed for {resource}: {reason}")]
    ResourceUpdate { resource: String, reason: String },
    #[error("Participant not found: {0}")]
    ParticipantNotFound(String),
    #[error("Distribution error: {0}")]
    DistributionError(String),
    #[error("Offload store error: {0}")]
    OffloadError(String),
    #[error("Handover error: {0}")]
    HandoverError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

impl PetasosError {
    pub fn resource_update(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        PetasosError::ResourceUpdate {
            resource: resource.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for PetasosError {
    fn from(error: serde_json::Error) -> Self {
        PetasosError::SerializationError(format!("JSON serialization error: {error}"))
    }
}

impl From<ConfigurationError> for PetasosError {
    fn from(error: ConfigurationError) -> Self {
        PetasosError::ConfigurationError(error.to_string())
    }
}

pub type PetasosResult<T> = anyhow::Result<T, PetasosError>;
