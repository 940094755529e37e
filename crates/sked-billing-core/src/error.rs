//! Error types for sked-billing.

use crate::ids::IdError;
use crate::money::Currency;

/// Result type for billing operations.
pub type Result<T> = std::result::Result<T, BillingError>;

/// Broad classification of a [`BillingError`].
///
/// Callers translate these into user-facing messages; the core itself never
/// recovers from its own errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or out-of-range input.
    Validation,
    /// The operation is not permitted from the entity's current state.
    InvalidState,
    /// Well-formed input that a domain rule forbids in this context.
    BusinessRule,
}

/// Errors that can occur in billing operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BillingError {
    /// Amount is negative, too precise, or out of range.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Currency code is malformed or not supported.
    #[error("unsupported currency: {0}")]
    UnsupportedCurrency(String),

    /// Any other malformed input (empty names, date ordering, limits).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// A lifecycle or settlement event is not allowed from the current status.
    #[error("cannot {event} {entity} in status {from}")]
    InvalidTransition {
        /// The entity kind (`subscription`, `billing cycle`, ...).
        entity: &'static str,
        /// The attempted event.
        event: &'static str,
        /// The status the entity was in.
        from: String,
    },

    /// Completion was attempted before charges were calculated.
    #[error("charges have not been calculated for billing cycle {cycle_id}")]
    ChargesNotCalculated {
        /// The billing cycle.
        cycle_id: String,
    },

    /// Arithmetic between two different currencies.
    #[error("currency mismatch: {left} vs {right}")]
    CurrencyMismatch {
        /// Currency of the left operand.
        left: Currency,
        /// Currency of the right operand.
        right: Currency,
    },

    /// Subtraction would produce a negative amount.
    #[error("negative result: {minuend_minor} - {subtrahend_minor} minor units")]
    NegativeResult {
        /// Left operand in minor units.
        minuend_minor: i64,
        /// Right operand in minor units.
        subtrahend_minor: i64,
    },

    /// Current usage does not fit the target plan.
    #[error("{resource} usage {usage} exceeds plan limit {limit}")]
    PlanLimitExceeded {
        /// The limited resource.
        resource: &'static str,
        /// Current usage.
        usage: u64,
        /// The target plan's limit.
        limit: u64,
    },

    /// A billing cycle was settled against a subscription it does not belong to.
    #[error("billing cycle belongs to subscription {expected}, got {actual}")]
    SubscriptionMismatch {
        /// The cycle's subscription.
        expected: String,
        /// The subscription passed in.
        actual: String,
    },
}

impl BillingError {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAmount(_)
            | Self::UnsupportedCurrency(_)
            | Self::Validation(_)
            | Self::InvalidId(_) => ErrorKind::Validation,
            Self::InvalidTransition { .. } | Self::ChargesNotCalculated { .. } => {
                ErrorKind::InvalidState
            }
            Self::CurrencyMismatch { .. }
            | Self::NegativeResult { .. }
            | Self::PlanLimitExceeded { .. }
            | Self::SubscriptionMismatch { .. } => ErrorKind::BusinessRule,
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(
            BillingError::InvalidAmount("x".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            BillingError::InvalidTransition {
                entity: "subscription",
                event: "activate",
                from: "active".into(),
            }
            .kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(
            BillingError::CurrencyMismatch {
                left: Currency::Eur,
                right: Currency::Usd,
            }
            .kind(),
            ErrorKind::BusinessRule
        );
    }

    #[test]
    fn transition_message_names_event_and_status() {
        let err = BillingError::InvalidTransition {
            entity: "billing cycle",
            event: "refund",
            from: "pending".into(),
        };
        assert_eq!(err.to_string(), "cannot refund billing cycle in status pending");
    }
}
