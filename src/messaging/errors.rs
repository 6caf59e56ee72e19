//! # Messaging Error Types
//!
//! Failures at the node-to-node remote procedure boundary.

use thiserror::Error;

/// Failures surfaced at the remote procedure boundary.
///
/// These never escape the discovery or subscription loops; callers translate
/// them into endpoint/registration state instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    #[error("No remote method '{method}' available at {target}")]
    NoRemoteMethod { target: String, method: String },
    #[error("Target {target} is not reachable")]
    Unreachable { target: String },
    #[error("Transport failure calling {target}: {reason}")]
    Transport { target: String, reason: String },
    #[error("Call to {target} timed out after {timeout_ms}ms")]
    Timeout { target: String, timeout_ms: u64 },
}

impl RpcError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RpcError::Timeout { .. })
    }

    pub fn target(&self) -> &str {
        match self {
            RpcError::NoRemoteMethod { target, .. }
            | RpcError::Unreachable { target }
            | RpcError::Transport { target, .. }
            | RpcError::Timeout { target, .. } => target,
        }
    }
}

pub type RpcResult<T> = std::result::Result<T, RpcError>;
