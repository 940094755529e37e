//! Usage counters shared by subscriptions and billing cycles.
//!
//! Two accumulation policies exist and are kept apart on purpose:
//!
//! - **Cumulative** metrics (notifications, API calls) add up over a period.
//! - **Peak** metrics (businesses, staff, services, storage) are footprints:
//!   the counter holds the maximum value observed in the period.

use serde::{Deserialize, Serialize};

use crate::error::{BillingError, Result};

/// A metric that accumulates over the period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CumulativeMetric {
    /// Notifications sent.
    Notifications,
    /// API calls made.
    ApiCalls,
}

/// A footprint metric tracked as the peak value seen in the period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeakMetric {
    /// Businesses owned by the tenant.
    Businesses,
    /// Staff members.
    Staff,
    /// Services offered.
    Services,
}

impl PeakMetric {
    /// Name used in error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Businesses => "businesses",
            Self::Staff => "staff",
            Self::Services => "services",
        }
    }
}

/// A single usage observation, as reported by the scheduling backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UsageRecord {
    /// Add to a cumulative metric.
    Cumulative {
        /// Which metric.
        metric: CumulativeMetric,
        /// Amount to add.
        amount: u64,
    },
    /// Observe a footprint value.
    Peak {
        /// Which metric.
        metric: PeakMetric,
        /// Observed value.
        value: u64,
    },
    /// Observe storage in use.
    Storage {
        /// Gigabytes in use.
        gb: f64,
    },
}

/// Usage observed during one billing period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageCounters {
    /// Notifications sent (cumulative).
    pub notifications: u64,
    /// API calls (cumulative).
    pub api_calls: u64,
    /// Peak businesses.
    pub businesses: u64,
    /// Peak staff members.
    pub staff: u64,
    /// Peak services.
    pub services: u64,
    /// Peak storage in GB.
    pub storage_used_gb: f64,
}

impl UsageCounters {
    /// Add `amount` to a cumulative metric.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the counter would overflow.
    pub fn record_cumulative_usage(&mut self, metric: CumulativeMetric, amount: u64) -> Result<()> {
        let counter = match metric {
            CumulativeMetric::Notifications => &mut self.notifications,
            CumulativeMetric::ApiCalls => &mut self.api_calls,
        };
        *counter = counter
            .checked_add(amount)
            .ok_or_else(|| BillingError::validation(format!("{metric:?} counter overflows")))?;
        Ok(())
    }

    /// Raise a footprint metric to `value` if it is the highest seen so far.
    pub fn record_peak_usage(&mut self, metric: PeakMetric, value: u64) {
        let counter = match metric {
            PeakMetric::Businesses => &mut self.businesses,
            PeakMetric::Staff => &mut self.staff,
            PeakMetric::Services => &mut self.services,
        };
        *counter = (*counter).max(value);
    }

    /// Raise peak storage to `gb` if it is the highest seen so far.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for negative or non-finite values.
    pub fn record_peak_storage(&mut self, gb: f64) -> Result<()> {
        if !gb.is_finite() || gb < 0.0 {
            return Err(BillingError::validation(format!(
                "storage usage {gb} must be a non-negative number"
            )));
        }
        self.storage_used_gb = self.storage_used_gb.max(gb);
        Ok(())
    }

    /// Apply a [`UsageRecord`].
    ///
    /// # Errors
    ///
    /// Propagates the errors of the underlying recorder.
    pub fn apply(&mut self, record: UsageRecord) -> Result<()> {
        match record {
            UsageRecord::Cumulative { metric, amount } => {
                self.record_cumulative_usage(metric, amount)
            }
            UsageRecord::Peak { metric, value } => {
                self.record_peak_usage(metric, value);
                Ok(())
            }
            UsageRecord::Storage { gb } => self.record_peak_storage(gb),
        }
    }

    /// Current value of a footprint metric.
    #[must_use]
    pub const fn peak(&self, metric: PeakMetric) -> u64 {
        match metric {
            PeakMetric::Businesses => self.businesses,
            PeakMetric::Staff => self.staff,
            PeakMetric::Services => self.services,
        }
    }

    /// Start a new period: cumulative metrics reset, footprints carry over.
    pub fn roll_over(&mut self) {
        self.notifications = 0;
        self.api_calls = 0;
    }

    /// Check the snapshot for values that cannot come from the recorders.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for negative or non-finite storage.
    pub fn validate(&self) -> Result<()> {
        if !self.storage_used_gb.is_finite() || self.storage_used_gb < 0.0 {
            return Err(BillingError::validation(format!(
                "storage usage {} must be a non-negative number",
                self.storage_used_gb
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cumulative_usage_adds_up() {
        let mut usage = UsageCounters::default();
        usage
            .record_cumulative_usage(CumulativeMetric::Notifications, 5)
            .unwrap();
        usage
            .record_cumulative_usage(CumulativeMetric::Notifications, 7)
            .unwrap();
        usage
            .record_cumulative_usage(CumulativeMetric::ApiCalls, 3)
            .unwrap();
        assert_eq!(usage.notifications, 12);
        assert_eq!(usage.api_calls, 3);
    }

    #[test]
    fn cumulative_usage_rejects_overflow() {
        let mut usage = UsageCounters {
            notifications: u64::MAX,
            ..UsageCounters::default()
        };
        assert!(usage
            .record_cumulative_usage(CumulativeMetric::Notifications, 1)
            .is_err());
        assert_eq!(usage.notifications, u64::MAX);
    }

    #[test]
    fn peak_usage_keeps_maximum() {
        let mut usage = UsageCounters::default();
        usage.record_peak_usage(PeakMetric::Staff, 4);
        usage.record_peak_usage(PeakMetric::Staff, 2);
        assert_eq!(usage.staff, 4);
        usage.record_peak_usage(PeakMetric::Staff, 6);
        assert_eq!(usage.peak(PeakMetric::Staff), 6);
    }

    #[test]
    fn storage_rejects_negative_and_nan() {
        let mut usage = UsageCounters::default();
        assert!(usage.record_peak_storage(-0.5).is_err());
        assert!(usage.record_peak_storage(f64::NAN).is_err());
        usage.record_peak_storage(2.5).unwrap();
        usage.record_peak_storage(1.0).unwrap();
        assert!((usage.storage_used_gb - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn roll_over_keeps_footprint() {
        let mut usage = UsageCounters {
            notifications: 10,
            api_calls: 4,
            businesses: 1,
            staff: 3,
            services: 8,
            storage_used_gb: 0.5,
        };
        usage.roll_over();
        assert_eq!(usage.notifications, 0);
        assert_eq!(usage.api_calls, 0);
        assert_eq!(usage.businesses, 1);
        assert_eq!(usage.staff, 3);
        assert_eq!(usage.services, 8);
    }

    #[test]
    fn usage_record_json_shape() {
        let record: UsageRecord = serde_json::from_value(serde_json::json!({
            "type": "cumulative",
            "metric": "notifications",
            "amount": 3
        }))
        .unwrap();
        let mut usage = UsageCounters::default();
        usage.apply(record).unwrap();
        assert_eq!(usage.notifications, 3);
    }
}
