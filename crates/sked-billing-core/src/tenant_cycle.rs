//! Per-tenant notification cost accumulation.
//!
//! A [`TenantBillingCycle`] sums the [`NotificationCost`]s a business incurs
//! over a calendar period. It only grows while `ACTIVE` and is closed once,
//! either finalized or cancelled.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, Result};
use crate::ids::{BusinessId, TenantCycleId};
use crate::money::{Cost, Currency, NotificationCost};
use crate::period;

const MONTHLY_MIN_DAYS: i64 = 28;
const MONTHLY_MAX_DAYS: i64 = 31;

/// Length of a tenant cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantCyclePeriod {
    /// One calendar month.
    Monthly,
    /// Three calendar months.
    Quarterly,
    /// Twelve calendar months.
    Yearly,
}

impl TenantCyclePeriod {
    /// Calendar months covered.
    #[must_use]
    pub const fn months(self) -> u32 {
        match self {
            Self::Monthly => 1,
            Self::Quarterly => 3,
            Self::Yearly => 12,
        }
    }
}

/// Status of a tenant cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantCycleStatus {
    /// Accumulating costs.
    Active,
    /// Closed with a final total.
    Finalized,
    /// Closed without billing.
    Cancelled,
}

impl TenantCycleStatus {
    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Finalized => "finalized",
            Self::Cancelled => "cancelled",
        }
    }

    fn rejects(self, event: &'static str) -> BillingError {
        BillingError::InvalidTransition {
            entity: "tenant billing cycle",
            event,
            from: self.as_str().to_string(),
        }
    }
}

impl fmt::Display for TenantCycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input for [`TenantBillingCycle::create`].
#[derive(Debug, Clone, Copy)]
pub struct NewTenantCycle {
    /// The tenant.
    pub business_id: BusinessId,
    /// Cycle length.
    pub period: TenantCyclePeriod,
    /// Start of the cycle.
    pub start_date: DateTime<Utc>,
    /// End of the cycle.
    pub end_date: DateTime<Utc>,
    /// Currency of the accumulated total.
    pub currency: Currency,
}

/// Persisted form of a tenant cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct TenantCycleRecord {
    pub id: TenantCycleId,
    pub business_id: BusinessId,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub period: TenantCyclePeriod,
    pub status: TenantCycleStatus,
    pub total_cost: Cost,
    pub email_count: u64,
    pub sms_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finalized_at: Option<DateTime<Utc>>,
    pub version: u64,
}

/// Notification costs of one business over one period.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "TenantCycleRecord")]
pub struct TenantBillingCycle {
    id: TenantCycleId,
    business_id: BusinessId,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    period: TenantCyclePeriod,
    status: TenantCycleStatus,
    total_cost: Cost,
    email_count: u64,
    sms_count: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    finalized_at: Option<DateTime<Utc>>,
    version: u64,
}

impl TenantBillingCycle {
    /// Open a cycle starting at `start` and spanning `period`.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the end date is out of range.
    pub fn open(
        business_id: BusinessId,
        period: TenantCyclePeriod,
        start: DateTime<Utc>,
        currency: Currency,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let end_date = period::add_months(start, period.months())?;
        Self::create(
            NewTenantCycle {
                business_id,
                period,
                start_date: start,
                end_date,
                currency,
            },
            now,
        )
    }

    /// Create an `ACTIVE` cycle with a zero total.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an empty period or a monthly cycle outside
    /// 28 to 31 days.
    pub fn create(input: NewTenantCycle, now: DateTime<Utc>) -> Result<Self> {
        validate_span(input.period, input.start_date, input.end_date)?;
        Ok(Self {
            id: TenantCycleId::generate(),
            business_id: input.business_id,
            start_date: input.start_date,
            end_date: input.end_date,
            period: input.period,
            status: TenantCycleStatus::Active,
            total_cost: Cost::zero(input.currency),
            email_count: 0,
            sms_count: 0,
            created_at: now,
            updated_at: now,
            finalized_at: None,
            version: 0,
        })
    }

    /// Rebuild a cycle from its persisted form.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an invalid span or a finalized cycle without
    /// a finalization time.
    pub fn reconstruct(record: TenantCycleRecord) -> Result<Self> {
        validate_span(record.period, record.start_date, record.end_date)?;
        if record.status == TenantCycleStatus::Finalized && record.finalized_at.is_none() {
            return Err(BillingError::validation(format!(
                "tenant cycle {} is finalized without a finalization time",
                record.id
            )));
        }
        Ok(Self {
            id: record.id,
            business_id: record.business_id,
            start_date: record.start_date,
            end_date: record.end_date,
            period: record.period,
            status: record.status,
            total_cost: record.total_cost,
            email_count: record.email_count,
            sms_count: record.sms_count,
            created_at: record.created_at,
            updated_at: record.updated_at,
            finalized_at: record.finalized_at,
            version: record.version,
        })
    }

    /// Identifier.
    #[must_use]
    pub const fn id(&self) -> TenantCycleId {
        self.id
    }

    /// The tenant.
    #[must_use]
    pub const fn business_id(&self) -> BusinessId {
        self.business_id
    }

    /// Start of the cycle.
    #[must_use]
    pub const fn start_date(&self) -> DateTime<Utc> {
        self.start_date
    }

    /// End of the cycle.
    #[must_use]
    pub const fn end_date(&self) -> DateTime<Utc> {
        self.end_date
    }

    /// Cycle length.
    #[must_use]
    pub const fn period(&self) -> TenantCyclePeriod {
        self.period
    }

    /// Status.
    #[must_use]
    pub const fn status(&self) -> TenantCycleStatus {
        self.status
    }

    /// Accumulated cost.
    #[must_use]
    pub const fn total_cost(&self) -> Cost {
        self.total_cost
    }

    /// Emails accounted for.
    #[must_use]
    pub const fn email_count(&self) -> u64 {
        self.email_count
    }

    /// SMS accounted for.
    #[must_use]
    pub const fn sms_count(&self) -> u64 {
        self.sms_count
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

    /// When the cycle was finalized.
    #[must_use]
    pub const fn finalized_at(&self) -> Option<DateTime<Utc>> {
        self.finalized_at
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

    /// Add a notification charge to the running total.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless active, `CurrencyMismatch` for a
    /// foreign currency, and `Validation` on counter overflow.
    pub fn add_usage(&mut self, usage: &NotificationCost, now: DateTime<Utc>) -> Result<()> {
        if self.status != TenantCycleStatus::Active {
            return Err(self.status.rejects("add usage to"));
        }
        let total_cost = self.total_cost.add(&usage.cost())?;
        let email_count = self
            .email_count
            .checked_add(usage.email_count())
            .ok_or_else(|| BillingError::validation("email count overflows"))?;
        let sms_count = self
            .sms_count
            .checked_add(usage.sms_count())
            .ok_or_else(|| BillingError::validation("sms count overflows"))?;

        self.total_cost = total_cost;
        self.email_count = email_count;
        self.sms_count = sms_count;
        self.updated_at = now;
        Ok(())
    }

    /// `ACTIVE → FINALIZED`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless active.
    pub fn finalize(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status != TenantCycleStatus::Active {
            return Err(self.status.rejects("finalize"));
        }
        self.status = TenantCycleStatus::Finalized;
        self.finalized_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// `ACTIVE → CANCELLED`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless active.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status != TenantCycleStatus::Active {
            return Err(self.status.rejects("cancel"));
        }
        self.status = TenantCycleStatus::Cancelled;
        self.updated_at = now;
        Ok(())
    }

    /// Length of the cycle in whole days.
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
    pub fn view(&self, now: DateTime<Utc>) -> TenantCycleView {
        TenantCycleView {
            id: self.id,
            business_id: self.business_id,
            start_date: self.start_date,
            end_date: self.end_date,
            period: self.period,
            status: self.status,
            total_cost: self.total_cost,
            email_count: self.email_count,
            sms_count: self.sms_count,
            finalized_at: self.finalized_at,
            duration_in_days: self.duration_in_days(),
            is_current_period: self.is_current_period(now),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl PartialEq for TenantBillingCycle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TenantBillingCycle {}

impl TryFrom<TenantCycleRecord> for TenantBillingCycle {
    type Error = BillingError;

    fn try_from(record: TenantCycleRecord) -> Result<Self> {
        Self::reconstruct(record)
    }
}

/// Serializable snapshot of a tenant cycle plus derived fields.
#[derive(Debug, Clone, Serialize)]
#[allow(missing_docs)]
pub struct TenantCycleView {
    pub id: TenantCycleId,
    pub business_id: BusinessId,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub period: TenantCyclePeriod,
    pub status: TenantCycleStatus,
    pub total_cost: Cost,
    pub email_count: u64,
    pub sms_count: u64,
    pub finalized_at: Option<DateTime<Utc>>,
    pub duration_in_days: u64,
    pub is_current_period: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn validate_span(period: TenantCyclePeriod, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<()> {
    period::ensure_ordered(start, end)?;
    if period == TenantCyclePeriod::Monthly {
        // Exact bounds: a partial day past 31 must not truncate back into range.
        let span = end - start;
        if span < Duration::days(MONTHLY_MIN_DAYS) || span > Duration::days(MONTHLY_MAX_DAYS) {
            return Err(BillingError::validation(format!(
                "monthly cycle spans {} hours, expected {MONTHLY_MIN_DAYS} to {MONTHLY_MAX_DAYS} days",
                span.num_hours()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn feb1() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap()
    }

    fn eur(amount: &str) -> Cost {
        Cost::parse(amount, "EUR").unwrap()
    }

    fn open_monthly() -> TenantBillingCycle {
        TenantBillingCycle::open(
            BusinessId::generate(),
            TenantCyclePeriod::Monthly,
            feb1(),
            Currency::Eur,
            feb1(),
        )
        .unwrap()
    }

    #[test]
    fn open_computes_end_date() {
        let cycle = open_monthly();
        assert_eq!(cycle.end_date(), Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(cycle.duration_in_days(), 28);
        assert!(cycle.total_cost().is_zero());

        let quarter = TenantBillingCycle::open(
            BusinessId::generate(),
            TenantCyclePeriod::Quarterly,
            feb1(),
            Currency::Eur,
            feb1(),
        )
        .unwrap();
        assert_eq!(quarter.end_date(), Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn monthly_span_is_validated() {
        let input = |days| NewTenantCycle {
            business_id: BusinessId::generate(),
            period: TenantCyclePeriod::Monthly,
            start_date: feb1(),
            end_date: feb1() + Duration::days(days),
            currency: Currency::Eur,
        };
        assert!(TenantBillingCycle::create(input(27), feb1()).is_err());
        assert!(TenantBillingCycle::create(input(28), feb1()).is_ok());
        assert!(TenantBillingCycle::create(input(31), feb1()).is_ok());
        assert!(TenantBillingCycle::create(input(32), feb1()).is_err());

        let mut almost_32 = input(31);
        almost_32.end_date += Duration::hours(23);
        assert!(TenantBillingCycle::create(almost_32, feb1()).is_err());

        let mut short = input(28);
        short.end_date -= Duration::hours(1);
        assert!(TenantBillingCycle::create(short, feb1()).is_err());
    }

    #[test]
    fn add_usage_accumulates() {
        let mut cycle = open_monthly();
        cycle
            .add_usage(&NotificationCost::from_email_count(10).unwrap(), feb1())
            .unwrap();
        cycle
            .add_usage(&NotificationCost::from_sms_count(4).unwrap(), feb1())
            .unwrap();
        assert_eq!(cycle.total_cost(), eur("0.40"));
        assert_eq!(cycle.email_count(), 10);
        assert_eq!(cycle.sms_count(), 4);
    }

    #[test]
    fn add_usage_rejects_foreign_currency() {
        let mut cycle = open_monthly();
        let usd = NotificationCost::from_email_count_with_price(
            3,
            Cost::parse("0.02", "USD").unwrap(),
        )
        .unwrap();
        let err = cycle.add_usage(&usd, feb1()).unwrap_err();
        assert!(matches!(err, BillingError::CurrencyMismatch { .. }));
        assert_eq!(cycle.email_count(), 0);
    }

    #[test]
    fn closed_cycles_are_frozen() {
        let mut cycle = open_monthly();
        cycle.finalize(feb1() + Duration::days(28)).unwrap();
        assert_eq!(cycle.status(), TenantCycleStatus::Finalized);
        assert!(cycle.finalized_at().is_some());
        assert!(cycle
            .add_usage(&NotificationCost::from_email_count(1).unwrap(), feb1())
            .is_err());
        assert!(cycle.finalize(feb1()).is_err());
        assert!(cycle.cancel(feb1()).is_err());

        let mut cancelled = open_monthly();
        cancelled.cancel(feb1()).unwrap();
        assert_eq!(cancelled.status(), TenantCycleStatus::Cancelled);
        assert!(cancelled.finalize(feb1()).is_err());
    }

    #[test]
    fn view_shape() {
        let cycle = open_monthly();
        let view = serde_json::to_value(cycle.view(feb1())).unwrap();
        assert_eq!(view["status"], "active");
        assert_eq!(view["period"], "monthly");
        assert_eq!(view["total_cost"]["amount"], "0.00");
        assert_eq!(view["is_current_period"], true);
        assert_eq!(view["duration_in_days"], 28);
    }

    #[test]
    fn serde_round_trip_validates() {
        let cycle = open_monthly();
        let mut json = serde_json::to_value(&cycle).unwrap();
        json["end_date"] = serde_json::json!("2025-04-01T00:00:00Z");
        assert!(serde_json::from_value::<TenantBillingCycle>(json).is_err());
    }
}
