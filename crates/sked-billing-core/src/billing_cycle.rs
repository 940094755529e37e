//! Subscription-scoped billing cycles and their settlement state machine.
//!
//! A [`BillingCycle`] covers one paid period of a [`Subscription`]. Usage is
//! collected while the cycle is open, charges are computed once processing
//! starts, and the outcome is recorded as completed, failed or refunded.
//!
//! ```text
//! PENDING ──mark_as_processing──► PROCESSING ──mark_as_completed──► COMPLETED
//!    ▲  │                             │                                │
//!    └──┘ retry (no-op)               │ mark_as_failed                 │ refund
//!    ▲                                ▼                                ▼
//!    └────────────retry──────────── FAILED                          REFUNDED
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, Result};
use crate::ids::{BillingCycleId, BusinessId, SubscriptionId};
use crate::money::Cost;
use crate::period;
use crate::subscription::Subscription;
use crate::usage::{CumulativeMetric, PeakMetric, UsageCounters, UsageRecord};

/// Settlement status of a billing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycleStatus {
    /// Open; usage is still being collected.
    Pending,
    /// Charges are being settled.
    Processing,
    /// Settled.
    Completed,
    /// Settlement failed; can be retried.
    Failed,
    /// Settled and then refunded.
    Refunded,
}

impl BillingCycleStatus {
    /// Every status.
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Processing,
        Self::Completed,
        Self::Failed,
        Self::Refunded,
    ];

    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }

    /// The transition table: the status `event` leads to, or `None`.
    #[must_use]
    pub const fn on(self, event: CycleEvent) -> Option<Self> {
        match (event, self) {
            (CycleEvent::StartProcessing, Self::Pending) => Some(Self::Processing),
            (CycleEvent::Complete, Self::Processing) => Some(Self::Completed),
            (CycleEvent::Fail, Self::Processing) => Some(Self::Failed),
            (CycleEvent::Retry, Self::Failed | Self::Pending) => Some(Self::Pending),
            (CycleEvent::Refund, Self::Completed) => Some(Self::Refunded),
            _ => None,
        }
    }

    /// Apply `event`, failing with `InvalidTransition` when the table forbids it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` for any move not in the table.
    pub fn transition(self, event: CycleEvent) -> Result<Self> {
        self.on(event).ok_or_else(|| self.rejects(event.as_str()))
    }

    /// Whether usage may still be recorded.
    #[must_use]
    pub const fn accepts_usage(self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }

    /// Whether the cycle reached a settled outcome.
    #[must_use]
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Completed | Self::Refunded)
    }

    fn rejects(self, event: &'static str) -> BillingError {
        BillingError::InvalidTransition {
            entity: "billing cycle",
            event,
            from: self.as_str().to_string(),
        }
    }
}

impl fmt::Display for BillingCycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A settlement command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleEvent {
    /// Begin settlement.
    StartProcessing,
    /// Settlement succeeded.
    Complete,
    /// Settlement failed.
    Fail,
    /// Reopen a failed cycle.
    Retry,
    /// Refund a settled cycle.
    Refund,
}

impl CycleEvent {
    /// Every event.
    pub const ALL: [Self; 5] = [
        Self::StartProcessing,
        Self::Complete,
        Self::Fail,
        Self::Retry,
        Self::Refund,
    ];

    /// Name used in error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StartProcessing => "start processing",
            Self::Complete => "complete",
            Self::Fail => "fail",
            Self::Retry => "retry",
            Self::Refund => "refund",
        }
    }
}

/// The computed charges of a cycle.
///
/// `total_cost = base_cost + notification_overage + setup_fees + taxes - discounts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingCharges {
    /// Plan price for the billing frequency.
    pub base_cost: Cost,
    /// Notifications beyond the monthly quota.
    pub notification_overage: Cost,
    /// One-time setup fee on the first paid cycle.
    pub setup_fees: Cost,
    /// Discounts applied.
    pub discounts: Cost,
    /// Taxes applied.
    pub taxes: Cost,
    /// Amount due.
    pub total_cost: Cost,
}

impl BillingCharges {
    /// Assemble charges and compute the total.
    ///
    /// # Errors
    ///
    /// Returns `CurrencyMismatch` if components differ in currency and
    /// `NegativeResult` if discounts exceed the rest.
    pub fn new(
        base_cost: Cost,
        notification_overage: Cost,
        setup_fees: Cost,
        discounts: Cost,
        taxes: Cost,
    ) -> Result<Self> {
        let total_cost = base_cost
            .add(&notification_overage)?
            .add(&setup_fees)?
            .add(&taxes)?
            .subtract(&discounts)?;
        Ok(Self {
            base_cost,
            notification_overage,
            setup_fees,
            discounts,
            taxes,
            total_cost,
        })
    }
}

/// Input for [`BillingCycle::create`].
#[derive(Debug, Clone, Copy)]
pub struct NewBillingCycle {
    /// The subscription being billed.
    pub subscription_id: SubscriptionId,
    /// The subscribing business.
    pub business_id: BusinessId,
    /// Start of the covered period.
    pub start_date: DateTime<Utc>,
    /// End of the covered period.
    pub end_date: DateTime<Utc>,
}

/// Persisted form of a billing cycle, validated by [`BillingCycle::reconstruct`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingCycleRecord {
    /// Identifier.
    pub id: BillingCycleId,
    /// The subscription being billed.
    pub subscription_id: SubscriptionId,
    /// The subscribing business.
    pub business_id: BusinessId,
    /// Start of the covered period.
    pub start_date: DateTime<Utc>,
    /// End of the covered period.
    pub end_date: DateTime<Utc>,
    /// Settlement status.
    pub status: BillingCycleStatus,
    /// Usage collected for the period.
    pub usage: UsageCounters,
    /// Charges, once calculated.
    pub charges: Option<BillingCharges>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
    /// When settlement completed.
    pub processed_at: Option<DateTime<Utc>>,
    /// When the cycle was refunded.
    pub refunded_at: Option<DateTime<Utc>>,
    /// Why the last settlement attempt failed.
    pub failure_reason: Option<String>,
    /// Optimistic-concurrency version.
    pub version: u64,
}

/// One billing period of a subscription.
///
/// Equality is identity: two values are equal when they have the same id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "BillingCycleRecord")]
pub struct BillingCycle {
    id: BillingCycleId,
    subscription_id: SubscriptionId,
    business_id: BusinessId,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    status: BillingCycleStatus,
    usage: UsageCounters,
    charges: Option<BillingCharges>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
    refunded_at: Option<DateTime<Utc>>,
    failure_reason: Option<String>,
    version: u64,
}

impl BillingCycle {
    /// Open a `PENDING` cycle with empty usage.
    ///
    /// # Errors
    ///
    /// Returns `Validation` unless `start_date < end_date`.
    pub fn create(input: NewBillingCycle, now: DateTime<Utc>) -> Result<Self> {
        period::ensure_ordered(input.start_date, input.end_date)?;
        Ok(Self {
            id: BillingCycleId::generate(),
            subscription_id: input.subscription_id,
            business_id: input.business_id,
            start_date: input.start_date,
            end_date: input.end_date,
            status: BillingCycleStatus::Pending,
            usage: UsageCounters::default(),
            charges: None,
            created_at: now,
            updated_at: now,
            processed_at: None,
            refunded_at: None,
            failure_reason: None,
            version: 0,
        })
    }

    /// Open a cycle for `subscription` covering `[start, end)`.
    ///
    /// # Errors
    ///
    /// Returns `Validation` unless `start < end`.
    pub fn from_subscription(
        subscription: &Subscription,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        Self::create(
            NewBillingCycle {
                subscription_id: subscription.id(),
                business_id: subscription.business_id(),
                start_date: start,
                end_date: end,
            },
            now,
        )
    }

    /// Rebuild a cycle from its persisted form.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for inverted dates, invalid usage, or a settled
    /// cycle without charges.
    pub fn reconstruct(record: BillingCycleRecord) -> Result<Self> {
        period::ensure_ordered(record.start_date, record.end_date)?;
        record.usage.validate()?;
        if record.status.is_settled() && record.charges.is_none() {
            return Err(BillingError::validation(format!(
                "billing cycle {} is {} but has no charges",
                record.id, record.status
            )));
        }

        Ok(Self {
            id: record.id,
            subscription_id: record.subscription_id,
            business_id: record.business_id,
            start_date: record.start_date,
            end_date: record.end_date,
            status: record.status,
            usage: record.usage,
            charges: record.charges,
            created_at: record.created_at,
            updated_at: record.updated_at,
            processed_at: record.processed_at,
            refunded_at: record.refunded_at,
            failure_reason: record.failure_reason,
            version: record.version,
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Identifier.
    #[must_use]
    pub const fn id(&self) -> BillingCycleId {
        self.id
    }

    /// The subscription being billed.
    #[must_use]
    pub const fn subscription_id(&self) -> SubscriptionId {
        self.subscription_id
    }

    /// The subscribing business.
    #[must_use]
    pub const fn business_id(&self) -> BusinessId {
        self.business_id
    }

    /// Start of the covered period.
    #[must_use]
    pub const fn start_date(&self) -> DateTime<Utc> {
        self.start_date
    }

    /// End of the covered period.
    #[must_use]
    pub const fn end_date(&self) -> DateTime<Utc> {
        self.end_date
    }

    /// Settlement status.
    #[must_use]
    pub const fn status(&self) -> BillingCycleStatus {
        self.status
    }

    /// Usage collected for the period.
    #[must_use]
    pub const fn usage(&self) -> &UsageCounters {
        &self.usage
    }

    /// Charges, once calculated.
    #[must_use]
    pub const fn charges(&self) -> Option<&BillingCharges> {
        self.charges.as_ref()
    }

    /// Creation time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last modification time.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// When settlement completed.
    #[must_use]
    pub const fn processed_at(&self) -> Option<DateTime<Utc>> {
        self.processed_at
    }

    /// When the cycle was refunded.
    #[must_use]
    pub const fn refunded_at(&self) -> Option<DateTime<Utc>> {
        self.refunded_at
    }

    /// Why the last settlement attempt failed.
    #[must_use]
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Optimistic-concurrency version.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Bump the version after a successful write. For persistence adapters.
    pub fn increment_version(&mut self) {
        self.version += 1;
    }

    // =========================================================================
    // Settlement
    // =========================================================================

    /// `PENDING → PROCESSING`. Any previously computed charges are dropped.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` from any other status.
    pub fn mark_as_processing(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.status = self.status.transition(CycleEvent::StartProcessing)?;
        self.charges = None;
        self.updated_at = now;
        Ok(())
    }

    /// `PROCESSING → COMPLETED`. Charges must have been calculated.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` when not processing and
    /// `ChargesNotCalculated` when charges are missing.
    pub fn mark_as_completed(&mut self, now: DateTime<Utc>) -> Result<()> {
        let next = self.status.transition(CycleEvent::Complete)?;
        if self.charges.is_none() {
            return Err(BillingError::ChargesNotCalculated {
                cycle_id: self.id.to_string(),
            });
        }
        self.status = next;
        self.processed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// `PROCESSING → FAILED`, recording why.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` when not processing and `Validation` for
    /// a blank reason.
    pub fn mark_as_failed(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<()> {
        let next = self.status.transition(CycleEvent::Fail)?;
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(BillingError::validation("failure reason must not be empty"));
        }
        self.status = next;
        self.failure_reason = Some(reason);
        self.updated_at = now;
        Ok(())
    }

    /// `FAILED → PENDING`, clearing the failure and the charges. Usage is kept.
    /// Retrying a `PENDING` cycle does nothing.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` from any other status.
    pub fn retry(&mut self, now: DateTime<Utc>) -> Result<()> {
        let next = self.status.transition(CycleEvent::Retry)?;
        if self.status == BillingCycleStatus::Pending {
            return Ok(());
        }
        self.status = next;
        self.failure_reason = None;
        self.charges = None;
        self.updated_at = now;
        Ok(())
    }

    /// `COMPLETED → REFUNDED`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` from any other status.
    pub fn refund(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.status = self.status.transition(CycleEvent::Refund)?;
        self.refunded_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Compute and store charges for `subscription`. Requires `PROCESSING`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` when not processing, `SubscriptionMismatch`
    /// for a foreign subscription, and money errors from the arithmetic.
    pub fn calculate_charges(&mut self, subscription: &Subscription) -> Result<BillingCharges> {
        if self.status != BillingCycleStatus::Processing {
            return Err(self.status.rejects("calculate charges of"));
        }
        self.ensure_owned_by(subscription)?;

        let charges = self.charges_for(subscription, self.usage.notifications)?;
        self.charges = Some(charges);
        Ok(charges)
    }

    fn ensure_owned_by(&self, subscription: &Subscription) -> Result<()> {
        if subscription.id() == self.subscription_id {
            Ok(())
        } else {
            Err(BillingError::SubscriptionMismatch {
                expected: self.subscription_id.to_string(),
                actual: subscription.id().to_string(),
            })
        }
    }

    fn charges_for(&self, subscription: &Subscription, notifications: u64) -> Result<BillingCharges> {
        let plan = subscription.plan();
        let currency = plan.currency();
        let base_cost = plan.price_for_frequency(subscription.billing_frequency());
        let notification_overage = plan.notification_overage(notifications)?;
        let setup_fees = match plan.pricing().setup_fee {
            Some(fee) if self.start_date <= subscription.first_billable_date() => fee,
            _ => Cost::zero(currency),
        };
        BillingCharges::new(
            base_cost,
            notification_overage,
            setup_fees,
            Cost::zero(currency),
            Cost::zero(currency),
        )
    }

    // =========================================================================
    // Usage
    // =========================================================================

    /// Add sent notifications.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` once settlement started and `Validation`
    /// on overflow.
    pub fn record_notification_usage(&mut self, count: u64, now: DateTime<Utc>) -> Result<()> {
        self.record_usage(
            UsageRecord::Cumulative {
                metric: CumulativeMetric::Notifications,
                amount: count,
            },
            now,
        )
    }

    /// Add API calls.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` once settlement started and `Validation`
    /// on overflow.
    pub fn record_api_usage(&mut self, count: u64, now: DateTime<Utc>) -> Result<()> {
        self.record_usage(
            UsageRecord::Cumulative {
                metric: CumulativeMetric::ApiCalls,
                amount: count,
            },
            now,
        )
    }

    /// Observe the number of businesses.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` once settlement started.
    pub fn record_business_usage(&mut self, count: u64, now: DateTime<Utc>) -> Result<()> {
        self.record_usage(
            UsageRecord::Peak {
                metric: PeakMetric::Businesses,
                value: count,
            },
            now,
        )
    }

    /// Observe the number of staff members.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` once settlement started.
    pub fn record_staff_usage(&mut self, count: u64, now: DateTime<Utc>) -> Result<()> {
        self.record_usage(
            UsageRecord::Peak {
                metric: PeakMetric::Staff,
                value: count,
            },
            now,
        )
    }

    /// Observe the number of services.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` once settlement started.
    pub fn record_service_usage(&mut self, count: u64, now: DateTime<Utc>) -> Result<()> {
        self.record_usage(
            UsageRecord::Peak {
                metric: PeakMetric::Services,
                value: count,
            },
            now,
        )
    }

    /// Observe storage in use.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` once settlement started and `Validation`
    /// for negative or non-finite values.
    pub fn record_storage_usage(&mut self, gb: f64, now: DateTime<Utc>) -> Result<()> {
        self.record_usage(UsageRecord::Storage { gb }, now)
    }

    /// Apply any usage observation.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` once settlement started, plus the
    /// recorder's validation errors.
    pub fn record_usage(&mut self, record: UsageRecord, now: DateTime<Utc>) -> Result<()> {
        if !self.status.accepts_usage() {
            return Err(self.status.rejects("record usage on"));
        }
        self.usage.apply(record)?;
        self.updated_at = now;
        Ok(())
    }

    /// Replace the usage with a snapshot taken elsewhere. `PENDING` only.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` when not pending and `Validation` for an
    /// invalid snapshot.
    pub fn sync_usage(&mut self, usage: UsageCounters, now: DateTime<Utc>) -> Result<()> {
        if self.status != BillingCycleStatus::Pending {
            return Err(self.status.rejects("sync usage of"));
        }
        usage.validate()?;
        self.usage = usage;
        self.updated_at = now;
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Fraction of the period elapsed at `now`, in `[0, 1]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn get_usage_ratio(&self, now: DateTime<Utc>) -> f64 {
        let (elapsed, total) = self.elapsed_seconds(now);
        if total == 0 {
            return 1.0;
        }
        elapsed as f64 / total as f64
    }

    fn elapsed_seconds(&self, now: DateTime<Utc>) -> (u64, u64) {
        let total = (self.end_date - self.start_date)
            .num_seconds()
            .unsigned_abs();
        let elapsed = u64::try_from((now - self.start_date).num_seconds())
            .unwrap_or(0)
            .min(total);
        (elapsed, total)
    }

    /// Expected total at period end.
    ///
    /// Settled cycles return their stored total. Otherwise notifications are
    /// extrapolated linearly from the elapsed fraction of the period (rounded
    /// up) and charges recomputed; at the very start no extrapolation is done.
    ///
    /// # Errors
    ///
    /// Returns `SubscriptionMismatch` for a foreign subscription and money
    /// errors from the arithmetic.
    pub fn predict_total_cost(&self, subscription: &Subscription, now: DateTime<Utc>) -> Result<Cost> {
        if self.status.is_settled() {
            if let Some(charges) = &self.charges {
                return Ok(charges.total_cost);
            }
        }
        self.ensure_owned_by(subscription)?;

        let (elapsed, total) = self.elapsed_seconds(now);
        let notifications = if elapsed == 0 {
            self.usage.notifications
        } else {
            let projected = (u128::from(self.usage.notifications) * u128::from(total))
                .div_ceil(u128::from(elapsed));
            u64::try_from(projected).unwrap_or(u64::MAX)
        };
        Ok(self.charges_for(subscription, notifications)?.total_cost)
    }

    /// Length of the period in whole days.
    #[must_use]
    pub fn duration_in_days(&self) -> u64 {
        period::whole_days(self.end_date - self.start_date)
    }

    /// Whether `now` falls in `[start_date, end_date)`.
    #[must_use]
    pub fn is_current_period(&self, now: DateTime<Utc>) -> bool {
        self.start_date <= now && now < self.end_date
    }

    /// JSON projection with derived fields computed at `now`.
    #[must_use]
    pub fn view(&self, now: DateTime<Utc>) -> BillingCycleView {
        BillingCycleView {
            id: self.id,
            subscription_id: self.subscription_id,
            business_id: self.business_id,
            start_date: self.start_date,
            end_date: self.end_date,
            status: self.status,
            usage: self.usage,
            charges: self.charges,
            processed_at: self.processed_at,
            refunded_at: self.refunded_at,
            failure_reason: self.failure_reason.clone(),
            duration_in_days: self.duration_in_days(),
            is_current_period: self.is_current_period(now),
            usage_ratio: self.get_usage_ratio(now),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl PartialEq for BillingCycle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for BillingCycle {}

impl TryFrom<BillingCycleRecord> for BillingCycle {
    type Error = BillingError;

    fn try_from(record: BillingCycleRecord) -> Result<Self> {
        Self::reconstruct(record)
    }
}

/// Serializable snapshot of a billing cycle plus derived fields.
#[derive(Debug, Clone, Serialize)]
#[allow(missing_docs)]
pub struct BillingCycleView {
    pub id: BillingCycleId,
    pub subscription_id: SubscriptionId,
    pub business_id: BusinessId,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: BillingCycleStatus,
    pub usage: UsageCounters,
    pub charges: Option<BillingCharges>,
    pub processed_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub duration_in_days: u64,
    pub is_current_period: bool,
    pub usage_ratio: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
