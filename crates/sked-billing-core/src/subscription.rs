//! Subscription lifecycle for sked-billing.
//!
//! A [`Subscription`] binds a business to a [`Plan`]. It is a mutable entity
//! identified by its id: lifecycle commands and usage recorders mutate it in
//! place, and it is never destroyed, only moved to a terminal status.
//!
//! # State Machine
//!
//! ```text
//! TRIALING ──activate──► ACTIVE ◄──renew── PAST_DUE
//!     │                  │  ▲ │               │
//!     │          suspend │  └─┘ renew,        │ suspend
//!     │                  ▼      change_plan   ▼
//!     └──suspend──────► SUSPENDED ◄───────────┘
//!
//! every status except CANCELED ──cancel──► CANCELED
//! ```
//!
//! The legal moves live in one table, [`SubscriptionStatus::on`]; every
//! mutator consults it before touching any field.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, Result};
use crate::ids::{BusinessId, SubscriptionId, UserId};
use crate::money::Cost;
use crate::period;
use crate::plan::{BillingFrequency, Limit, Plan};
use crate::usage::{CumulativeMetric, PeakMetric, UsageCounters, UsageRecord};

// ============================================================================
// Status and transitions
// ============================================================================

/// Lifecycle status of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Paid and in good standing.
    Active,
    /// Free trial before the first paid period.
    Trialing,
    /// A payment failed; still renewable.
    PastDue,
    /// Terminated by the tenant or an operator.
    Canceled,
    /// Temporarily blocked.
    Suspended,
    /// Ran out without renewal.
    Expired,
}

impl SubscriptionStatus {
    /// Every status.
    pub const ALL: [Self; 6] = [
        Self::Active,
        Self::Trialing,
        Self::PastDue,
        Self::Canceled,
        Self::Suspended,
        Self::Expired,
    ];

    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Trialing => "trialing",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
            Self::Suspended => "suspended",
            Self::Expired => "expired",
        }
    }

    /// The transition table: the status `event` leads to, or `None` when the
    /// event is not allowed from `self`.
    #[must_use]
    pub const fn on(self, event: SubscriptionEvent) -> Option<Self> {
        match (event, self) {
            (SubscriptionEvent::Activate, Self::Trialing)
            | (SubscriptionEvent::Renew, Self::Active | Self::PastDue)
            | (SubscriptionEvent::ChangePlan, Self::Active) => Some(Self::Active),
            (SubscriptionEvent::Suspend, Self::Active | Self::Trialing | Self::PastDue) => {
                Some(Self::Suspended)
            }
            (SubscriptionEvent::Cancel, Self::Canceled) => None,
            (SubscriptionEvent::Cancel, _) => Some(Self::Canceled),
            _ => None,
        }
    }

    /// Apply `event`, failing with `InvalidTransition` when the table forbids it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` for any move not in the table.
    pub fn transition(self, event: SubscriptionEvent) -> Result<Self> {
        self.on(event).ok_or_else(|| BillingError::InvalidTransition {
            entity: "subscription",
            event: event.as_str(),
            from: self.as_str().to_string(),
        })
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionEvent {
    /// End the trial and start paying.
    Activate,
    /// Block the subscription.
    Suspend,
    /// Terminate the subscription.
    Cancel,
    /// Start the next billing period.
    Renew,
    /// Switch to another plan.
    ChangePlan,
}

impl SubscriptionEvent {
    /// Every event.
    pub const ALL: [Self; 5] = [
        Self::Activate,
        Self::Suspend,
        Self::Cancel,
        Self::Renew,
        Self::ChangePlan,
    ];

    /// Name used in error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Activate => "activate",
            Self::Suspend => "suspend",
            Self::Cancel => "cancel",
            Self::Renew => "renew",
            Self::ChangePlan => "change plan of",
        }
    }
}

/// A quota-guarded action a tenant wants to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionAction {
    /// Open another business.
    CreateBusiness,
    /// Add a staff member.
    AddStaff,
    /// Add a service.
    AddService,
    /// Send a notification.
    SendNotification,
}

// ============================================================================
// Subscription
// ============================================================================

/// Input for [`Subscription::create`].
#[derive(Debug, Clone)]
pub struct NewSubscription {
    /// The subscribing business.
    pub business_id: BusinessId,
    /// The chosen plan.
    pub plan: Plan,
    /// Monthly or yearly billing.
    pub billing_frequency: BillingFrequency,
    /// Length of the free trial; 0 starts the subscription active.
    pub trial_days: u32,
    /// The back-office user creating the subscription.
    pub created_by: UserId,
}

/// Persisted form of a subscription, validated by [`Subscription::reconstruct`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    /// Identifier.
    pub id: SubscriptionId,
    /// The subscribing business.
    pub business_id: BusinessId,
    /// Current plan.
    pub plan: Plan,
    /// Lifecycle status.
    pub status: SubscriptionStatus,
    /// Monthly or yearly billing.
    pub billing_frequency: BillingFrequency,
    /// When the subscription started.
    pub start_date: DateTime<Utc>,
    /// End of the current paid period.
    pub end_date: DateTime<Utc>,
    /// When the next charge is due.
    pub next_billing_date: DateTime<Utc>,
    /// End of the free trial, if any.
    pub trial_end_date: Option<DateTime<Utc>>,
    /// When the subscription was canceled.
    pub canceled_at: Option<DateTime<Utc>>,
    /// Usage in the current period.
    pub current_period_usage: UsageCounters,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
    /// Creator.
    pub created_by: UserId,
    /// Last modifier.
    pub updated_by: UserId,
    /// Optimistic-concurrency version.
    pub version: u64,
}

/// A business's subscription to a plan.
///
/// Equality is identity: two values are equal when they have the same id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "SubscriptionRecord")]
pub struct Subscription {
    id: SubscriptionId,
    business_id: BusinessId,
    plan: Plan,
    status: SubscriptionStatus,
    billing_frequency: BillingFrequency,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    next_billing_date: DateTime<Utc>,
    trial_end_date: Option<DateTime<Utc>>,
    canceled_at: Option<DateTime<Utc>>,
    current_period_usage: UsageCounters,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    created_by: UserId,
    updated_by: UserId,
    version: u64,
}

impl Subscription {
    /// Start a subscription at `now`.
    ///
    /// With a trial, the subscription is `TRIALING` until `now + trial_days`
    /// and the first paid period follows the trial. Without one it is `ACTIVE`
    /// immediately.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the computed dates are out of range.
    pub fn create(input: NewSubscription, now: DateTime<Utc>) -> Result<Self> {
        let (status, trial_end_date, period_start) = if input.trial_days > 0 {
            let trial_end = period::add_days(now, input.trial_days)?;
            (SubscriptionStatus::Trialing, Some(trial_end), trial_end)
        } else {
            (SubscriptionStatus::Active, None, now)
        };
        let end_date = period::add_months(period_start, input.billing_frequency.months())?;

        Ok(Self {
            id: SubscriptionId::generate(),
            business_id: input.business_id,
            plan: input.plan,
            status,
            billing_frequency: input.billing_frequency,
            start_date: now,
            end_date,
            next_billing_date: end_date,
            trial_end_date,
            canceled_at: None,
            current_period_usage: UsageCounters::default(),
            created_at: now,
            updated_at: now,
            created_by: input.created_by,
            updated_by: input.created_by,
            version: 0,
        })
    }

    /// Rebuild a subscription from its persisted form.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the dates are out of order or usage is invalid.
    pub fn reconstruct(record: SubscriptionRecord) -> Result<Self> {
        let ordered = record.start_date < record.end_date
            || (record.status == SubscriptionStatus::Canceled
                && record.start_date == record.end_date);
        if !ordered {
            return Err(BillingError::validation(format!(
                "subscription {}: start date {} must be before end date {}",
                record.id, record.start_date, record.end_date
            )));
        }
        if let Some(trial_end) = record.trial_end_date {
            if trial_end < record.start_date {
                return Err(BillingError::validation(format!(
                    "subscription {}: trial ends before it starts",
                    record.id
                )));
            }
        }
        record.current_period_usage.validate()?;

        Ok(Self {
            id: record.id,
            business_id: record.business_id,
            plan: record.plan,
            status: record.status,
            billing_frequency: record.billing_frequency,
            start_date: record.start_date,
            end_date: record.end_date,
            next_billing_date: record.next_billing_date,
            trial_end_date: record.trial_end_date,
            canceled_at: record.canceled_at,
            current_period_usage: record.current_period_usage,
            created_at: record.created_at,
            updated_at: record.updated_at,
            created_by: record.created_by,
            updated_by: record.updated_by,
            version: record.version,
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Identifier.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The subscribing business.
    #[must_use]
    pub const fn business_id(&self) -> BusinessId {
        self.business_id
    }

    /// Current plan.
    #[must_use]
    pub const fn plan(&self) -> &Plan {
        &self.plan
    }

    /// Lifecycle status.
    #[must_use]
    pub const fn status(&self) -> SubscriptionStatus {
        self.status
    }

    /// Billing frequency.
    #[must_use]
    pub const fn billing_frequency(&self) -> BillingFrequency {
        self.billing_frequency
    }

    /// When the subscription started.
    #[must_use]
    pub const fn start_date(&self) -> DateTime<Utc> {
        self.start_date
    }

    /// End of the current paid period.
    #[must_use]
    pub const fn end_date(&self) -> DateTime<Utc> {
        self.end_date
    }

    /// When the next charge is due.
    #[must_use]
    pub const fn next_billing_date(&self) -> DateTime<Utc> {
        self.next_billing_date
    }

    /// End of the trial, if there was one.
    #[must_use]
    pub const fn trial_end_date(&self) -> Option<DateTime<Utc>> {
        self.trial_end_date
    }

    /// When the subscription was canceled.
    #[must_use]
    pub const fn canceled_at(&self) -> Option<DateTime<Utc>> {
        self.canceled_at
    }

    /// Usage in the current period.
    #[must_use]
    pub const fn current_period_usage(&self) -> &UsageCounters {
        &self.current_period_usage
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

    /// Creator.
    #[must_use]
    pub const fn created_by(&self) -> UserId {
        self.created_by
    }

    /// Last modifier.
    #[must_use]
    pub const fn updated_by(&self) -> UserId {
        self.updated_by
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

    /// Start of the current paid period.
    #[must_use]
    pub fn current_period_start(&self) -> DateTime<Utc> {
        period::sub_months(self.end_date, self.billing_frequency.months())
            .map_or(self.start_date, |start| start.max(self.start_date))
    }

    /// Start of the first paid period (after the trial, if any).
    #[must_use]
    pub fn first_billable_date(&self) -> DateTime<Utc> {
        self.trial_end_date.unwrap_or(self.start_date)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// End the trial: `TRIALING → ACTIVE`.
    ///
    /// Notifications and API calls counted during the trial are free and are
    /// cleared, so the first paid period starts from zero.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` from any other status.
    pub fn activate(&mut self, actor: UserId, now: DateTime<Utc>) -> Result<()> {
        self.status = self.status.transition(SubscriptionEvent::Activate)?;
        self.current_period_usage.roll_over();
        self.touch(actor, now);
        Ok(())
    }

    /// Block the subscription: `ACTIVE | TRIALING | PAST_DUE → SUSPENDED`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` from any other status.
    pub fn suspend(&mut self, actor: UserId, now: DateTime<Utc>) -> Result<()> {
        self.status = self.status.transition(SubscriptionEvent::Suspend)?;
        self.touch(actor, now);
        Ok(())
    }

    /// Terminate the subscription. With `immediately`, the current period is
    /// cut short at `now`; otherwise it runs to its end date.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if already canceled.
    pub fn cancel(&mut self, immediately: bool, actor: UserId, now: DateTime<Utc>) -> Result<()> {
        self.status = self.status.transition(SubscriptionEvent::Cancel)?;
        self.canceled_at = Some(now);
        if immediately {
            self.end_date = now.max(self.start_date);
            self.next_billing_date = self.end_date;
        }
        self.touch(actor, now);
        Ok(())
    }

    /// Start the next period: `ACTIVE | PAST_DUE → ACTIVE`.
    ///
    /// The period starts at the later of the current end date and `now`.
    /// Notifications and API calls reset; footprint counters carry over.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` from any other status and `Validation` if
    /// the new end date is out of range.
    pub fn renew(&mut self, actor: UserId, now: DateTime<Utc>) -> Result<()> {
        let next = self.status.transition(SubscriptionEvent::Renew)?;
        let period_start = self.end_date.max(now);
        let end_date = period::add_months(period_start, self.billing_frequency.months())?;

        self.status = next;
        self.end_date = end_date;
        self.next_billing_date = end_date;
        self.current_period_usage.roll_over();
        self.touch(actor, now);
        Ok(())
    }

    /// Switch to `new_plan`. Only an `ACTIVE` subscription may change plan,
    /// and its current footprint must fit the new plan's limits.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` when not active and `PlanLimitExceeded`
    /// when businesses, staff or services exceed the new limits.
    pub fn change_plan(&mut self, new_plan: Plan, actor: UserId, now: DateTime<Utc>) -> Result<()> {
        let next = self.status.transition(SubscriptionEvent::ChangePlan)?;
        self.ensure_footprint_fits(&new_plan)?;

        self.status = next;
        self.plan = new_plan;
        self.touch(actor, now);
        Ok(())
    }

    fn ensure_footprint_fits(&self, plan: &Plan) -> Result<()> {
        let features = plan.features();
        let checks = [
            (PeakMetric::Businesses, features.max_businesses),
            (PeakMetric::Staff, features.max_staff_per_business),
            (PeakMetric::Services, features.max_services_per_business),
        ];
        for (metric, limit) in checks {
            let usage = self.current_period_usage.peak(metric);
            if let Limit::Max(max) = limit {
                if usage > max {
                    return Err(BillingError::PlanLimitExceeded {
                        resource: metric.as_str(),
                        usage,
                        limit: max,
                    });
                }
            }
        }
        Ok(())
    }

    fn touch(&mut self, actor: UserId, now: DateTime<Utc>) {
        self.updated_by = actor;
        self.updated_at = now;
    }

    // =========================================================================
    // Usage
    // =========================================================================

    /// Add sent notifications.
    ///
    /// # Errors
    ///
    /// Returns `Validation` on counter overflow.
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
    /// Returns `Validation` on counter overflow.
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
    /// Never fails; returns `Result` for symmetry with the other recorders.
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
    /// Never fails; returns `Result` for symmetry with the other recorders.
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
    /// Never fails; returns `Result` for symmetry with the other recorders.
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
    /// Returns `Validation` for negative or non-finite values.
    pub fn record_storage_usage(&mut self, gb: f64, now: DateTime<Utc>) -> Result<()> {
        self.record_usage(UsageRecord::Storage { gb }, now)
    }

    /// Apply any usage observation.
    ///
    /// # Errors
    ///
    /// Propagates the recorder's validation errors.
    pub fn record_usage(&mut self, record: UsageRecord, now: DateTime<Utc>) -> Result<()> {
        self.current_period_usage.apply(record)?;
        self.updated_at = now;
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// `ACTIVE` and not past its end date.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && !self.is_expired(now)
    }

    /// `TRIALING` and the trial has not ended.
    #[must_use]
    pub fn is_in_trial(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Trialing
            && self.trial_end_date.is_some_and(|end| now < end)
    }

    /// `EXPIRED`, or past the end date.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Expired || now > self.end_date
    }

    /// Whether the tenant may perform `action` right now.
    #[must_use]
    pub fn can_perform_action(&self, action: SubscriptionAction, now: DateTime<Utc>) -> bool {
        if !self.is_active(now) {
            return false;
        }
        let usage = &self.current_period_usage;
        match action {
            SubscriptionAction::CreateBusiness => self.plan.can_create_business(usage.businesses),
            SubscriptionAction::AddStaff => self.plan.can_add_staff(usage.staff),
            SubscriptionAction::AddService => self.plan.can_add_service(usage.services),
            SubscriptionAction::SendNotification => {
                !self.plan.has_notification_quota_exceeded(usage.notifications)
            }
        }
    }

    /// Whole days until the next charge, rounding up; 0 when due.
    #[must_use]
    pub fn days_until_renewal(&self, now: DateTime<Utc>) -> u64 {
        period::ceil_days(self.next_billing_date - now)
    }

    /// Plan price for the billing frequency plus notification overage so far.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` on overflow.
    pub fn calculate_current_period_cost(&self) -> Result<Cost> {
        let base = self.plan.price_for_frequency(self.billing_frequency);
        let overage = self
            .plan
            .notification_overage(self.current_period_usage.notifications)?;
        base.add(&overage)
    }

    /// Charge for switching to `new_plan` at `upgrade_date`.
    ///
    /// Both prices are scaled by the remaining fraction of the period
    /// (30 days monthly, 365 yearly). The positive difference is charged;
    /// a cheaper plan yields zero, not a credit.
    ///
    /// # Errors
    ///
    /// Returns `CurrencyMismatch` when the plans are priced in different
    /// currencies.
    pub fn calculate_proration_for_upgrade(
        &self,
        new_plan: &Plan,
        upgrade_date: DateTime<Utc>,
    ) -> Result<Cost> {
        let total_days = self.billing_frequency.proration_days();
        let remaining_days = period::ceil_days(self.end_date - upgrade_date).min(total_days);

        let current = self
            .plan
            .price_for_frequency(self.billing_frequency)
            .prorate(remaining_days, total_days)?;
        let upgraded = new_plan
            .price_for_frequency(self.billing_frequency)
            .prorate(remaining_days, total_days)?;

        if upgraded.checked_cmp(&current)?.is_gt() {
            upgraded.subtract(&current)
        } else {
            Ok(Cost::zero(upgraded.currency()))
        }
    }

    /// JSON projection with derived fields computed at `now`.
    #[must_use]
    pub fn view(&self, now: DateTime<Utc>) -> SubscriptionView {
        SubscriptionView {
            id: self.id,
            business_id: self.business_id,
            plan: self.plan.clone(),
            status: self.status,
            billing_frequency: self.billing_frequency,
            start_date: self.start_date,
            end_date: self.end_date,
            next_billing_date: self.next_billing_date,
            trial_end_date: self.trial_end_date,
            canceled_at: self.canceled_at,
            current_period_usage: self.current_period_usage,
            current_period_cost: self.calculate_current_period_cost().ok(),
            is_active: self.is_active(now),
            is_in_trial: self.is_in_trial(now),
            is_expired: self.is_expired(now),
            days_until_renewal: self.days_until_renewal(now),
            created_at: self.created_at,
            updated_at: self.updated_at,
            created_by: self.created_by,
            updated_by: self.updated_by,
        }
    }
}

impl PartialEq for Subscription {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Subscription {}

impl TryFrom<SubscriptionRecord> for Subscription {
    type Error = BillingError;

    fn try_from(record: SubscriptionRecord) -> Result<Self> {
        Self::reconstruct(record)
    }
}

/// Serializable snapshot of a subscription plus derived fields.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionView {
    /// Identifier.
    pub id: SubscriptionId,
    /// The subscribing business.
    pub business_id: BusinessId,
    /// Current plan.
    pub plan: Plan,
    /// Lifecycle status.
    pub status: SubscriptionStatus,
    /// Billing frequency.
    pub billing_frequency: BillingFrequency,
    /// When the subscription started.
    pub start_date: DateTime<Utc>,
    /// End of the current period.
    pub end_date: DateTime<Utc>,
    /// Next charge.
    pub next_billing_date: DateTime<Utc>,
    /// End of the trial.
    pub trial_end_date: Option<DateTime<Utc>>,
    /// Cancellation time.
    pub canceled_at: Option<DateTime<Utc>>,
    /// Usage in the current period.
    pub current_period_usage: UsageCounters,
    /// Base price plus overage so far.
    pub current_period_cost: Option<Cost>,
    /// Derived: active and not expired.
    pub is_active: bool,
    /// Derived: in an unexpired trial.
    pub is_in_trial: bool,
    /// Derived: expired status or past the end date.
    pub is_expired: bool,
    /// Derived: days until the next charge.
    pub days_until_renewal: u64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
    /// Creator.
    pub created_by: UserId,
    /// Last modifier.
    pub updated_by: UserId,
}
