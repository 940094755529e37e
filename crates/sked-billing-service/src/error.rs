//! Engine error types.

use sked_billing_core::{BillingCycleId, BillingError, SubscriptionId, TenantCycleId};
use sked_billing_store::StoreError;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors returned by the billing engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A domain rule rejected the operation.
    #[error(transparent)]
    Billing(#[from] BillingError),

    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// No subscription with this id.
    #[error("subscription not found: {0}")]
    SubscriptionNotFound(SubscriptionId),

    /// No billing cycle with this id.
    #[error("billing cycle not found: {0}")]
    CycleNotFound(BillingCycleId),

    /// No tenant cycle with this id.
    #[error("tenant cycle not found: {0}")]
    TenantCycleNotFound(TenantCycleId),

    /// Concurrent writers kept winning.
    #[error("{operation} gave up after {attempts} version conflicts")]
    ConflictRetriesExhausted {
        /// The engine operation.
        operation: &'static str,
        /// Attempts made.
        attempts: u32,
    },

    /// A background billing task panicked or was cancelled.
    #[error("billing task failed: {0}")]
    Task(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl EngineError {
    /// Whether this is a store version conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_conflict())
    }
}
