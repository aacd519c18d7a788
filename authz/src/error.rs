//! Error types for the policy decision engine.
//!
//! # Security Note
//! Policy-logic outcomes (`NOT_APPLICABLE`, `INDETERMINATE`) are never errors.
//! Everything in here is either a policy-authoring defect detected while a tree
//! is loaded, a fault raised by a condition function, or the denial surfaced by
//! the authorization manager. Denial messages name the action and resource that
//! were evaluated but never the policy that produced the decision.

use serde_json::{Map, Value};
use thiserror::Error;

/// Errors that can occur while building, loading or enforcing policies.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// The policy tree is malformed.
    ///
    /// Raised at construction time (encode or load), never during evaluation.
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    /// A combining algorithm name could not be recognised.
    #[error("Unknown combining algorithm: {0}")]
    UnknownAlgorithm(String),

    /// Encoded policy (de)serialization failed.
    #[error("Policy encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Settings could not be loaded or are invalid.
    #[error("Invalid settings: {0}")]
    Settings(String),

    /// A condition function failed in a way that is not an evaluation outcome.
    ///
    /// This is a defect in the condition itself and callers should treat it
    /// as a deny.
    #[error("Condition fault in rule '{rule}': {message}")]
    ConditionFault { rule: String, message: String },

    /// The decision for the request was anything other than `PERMIT`.
    #[error("Access denied for action '{action}' on resource type '{resource_type}'")]
    AccessDenied {
        action: String,
        resource_type: String,
        resource_id: Option<String>,
        extra: Map<String, Value>,
    },

    /// An internal error occurred.
    #[error("Internal authorization error: {0}")]
    Internal(String),
}

/// A specialized Result type for authorization operations.
pub type Result<T> = std::result::Result<T, AuthzError>;
