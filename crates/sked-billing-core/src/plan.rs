//! Plan catalog for sked-billing.
//!
//! A [`Plan`] is an immutable catalog entry: feature limits plus pricing. Plans
//! are replaced wholesale on a plan change and compare by value (type, name and
//! both price points), never by identity.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{BillingError, Result};
use crate::money::{Cost, Currency};

// ============================================================================
// Standard tier constants (EUR minor units)
// ============================================================================

/// Premium plan monthly price (29.99 EUR).
pub const PREMIUM_MONTHLY_PRICE_MINOR: i64 = 2999;

/// Premium plan yearly price (299.90 EUR).
pub const PREMIUM_YEARLY_PRICE_MINOR: i64 = 29_990;

/// Enterprise plan monthly price (99.99 EUR).
pub const ENTERPRISE_MONTHLY_PRICE_MINOR: i64 = 9999;

/// Enterprise plan yearly price (999.90 EUR).
pub const ENTERPRISE_YEARLY_PRICE_MINOR: i64 = 99_990;

/// Enterprise one-time setup fee (49.00 EUR).
pub const ENTERPRISE_SETUP_FEE_MINOR: i64 = 4900;

/// Freemium overage price per notification (0.05 EUR).
pub const FREEMIUM_OVERAGE_UNIT_PRICE_MINOR: i64 = 5;

/// Premium overage price per notification (0.02 EUR).
pub const PREMIUM_OVERAGE_UNIT_PRICE_MINOR: i64 = 2;

/// Enterprise overage price per notification (0.01 EUR).
pub const ENTERPRISE_OVERAGE_UNIT_PRICE_MINOR: i64 = 1;

/// Raw value that encodes an unlimited quota.
pub const UNLIMITED: i64 = -1;

// ============================================================================
// Enums
// ============================================================================

/// Catalog tier of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    /// Free tier with tight quotas.
    Freemium,
    /// Paid tier for small teams.
    Premium,
    /// Paid tier without quotas.
    Enterprise,
    /// Negotiated plan.
    Custom,
}

impl PlanType {
    /// Position in the standard upgrade ladder; `None` for custom plans.
    #[must_use]
    pub const fn rank(self) -> Option<u8> {
        match self {
            Self::Freemium => Some(0),
            Self::Premium => Some(1),
            Self::Enterprise => Some(2),
            Self::Custom => None,
        }
    }
}

/// How often a subscription is billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingFrequency {
    /// Billed every calendar month.
    Monthly,
    /// Billed every calendar year.
    Yearly,
}

impl BillingFrequency {
    /// Length of one billing period in calendar months.
    #[must_use]
    pub const fn months(self) -> u32 {
        match self {
            Self::Monthly => 1,
            Self::Yearly => 12,
        }
    }

    /// Nominal length of one period in days, used for proration.
    #[must_use]
    pub const fn proration_days(self) -> u64 {
        match self {
            Self::Monthly => 30,
            Self::Yearly => 365,
        }
    }
}

// ============================================================================
// Limits and features
// ============================================================================

/// A quota: either unlimited or a maximum count.
///
/// Serialized as an integer where `-1` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Limit {
    /// No quota.
    Unlimited,
    /// At most this many.
    Max(u64),
}

impl Limit {
    /// Build a limit from its raw encoding.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for values below `-1`.
    pub fn from_raw(raw: i64) -> Result<Self> {
        match raw {
            UNLIMITED => Ok(Self::Unlimited),
            n if n >= 0 => Ok(Self::Max(n.unsigned_abs())),
            n => Err(BillingError::validation(format!(
                "limit {n} is below {UNLIMITED}"
            ))),
        }
    }

    /// Whether one more unit fits when `current` are already in use.
    #[must_use]
    pub const fn allows(self, current: u64) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Max(max) => current < max,
        }
    }

    /// Units of `usage` beyond the quota.
    #[must_use]
    pub const fn excess(self, usage: u64) -> u64 {
        match self {
            Self::Unlimited => 0,
            Self::Max(max) => usage.saturating_sub(max),
        }
    }

    /// Whether this is the unlimited sentinel.
    #[must_use]
    pub const fn is_unlimited(self) -> bool {
        matches!(self, Self::Unlimited)
    }
}

impl TryFrom<i64> for Limit {
    type Error = BillingError;

    fn try_from(raw: i64) -> Result<Self> {
        Self::from_raw(raw)
    }
}

impl From<Limit> for i64 {
    fn from(limit: Limit) -> Self {
        match limit {
            Limit::Unlimited => UNLIMITED,
            Limit::Max(max) => i64::try_from(max).unwrap_or(i64::MAX),
        }
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unlimited => f.write_str("unlimited"),
            Self::Max(max) => write!(f, "{max}"),
        }
    }
}

/// A boolean capability of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    /// Customers can book online.
    OnlineBooking,
    /// SMS reminders.
    SmsNotifications,
    /// Custom logo and colors.
    CustomBranding,
    /// Analytics dashboards.
    AdvancedAnalytics,
    /// Public API access.
    ApiAccess,
    /// Priority support queue.
    PrioritySupport,
}

/// Boolean capabilities of a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct FeatureFlags {
    /// Customers can book online.
    pub online_booking: bool,
    /// SMS reminders.
    pub sms_notifications: bool,
    /// Custom logo and colors.
    pub custom_branding: bool,
    /// Analytics dashboards.
    pub advanced_analytics: bool,
    /// Public API access.
    pub api_access: bool,
    /// Priority support queue.
    pub priority_support: bool,
}

/// Quotas and capabilities of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanFeatures {
    /// Notifications included per month.
    pub max_notifications_per_month: Limit,
    /// Businesses a tenant may own.
    pub max_businesses: Limit,
    /// Staff members per business.
    pub max_staff_per_business: Limit,
    /// Services per business.
    pub max_services_per_business: Limit,
    /// Storage quota in GB.
    pub max_storage_gb: Limit,
    /// Boolean capabilities.
    pub flags: FeatureFlags,
}

/// Price points of a plan. All prices share one currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanPricing {
    /// Price of one monthly period.
    pub monthly_price: Cost,
    /// Price of one yearly period.
    pub yearly_price: Cost,
    /// One-time fee charged with the first billing cycle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_fee: Option<Cost>,
    /// Price per notification beyond the monthly quota.
    pub overage_unit_price: Cost,
}

// ============================================================================
// Plan
// ============================================================================

/// Unvalidated plan content, as supplied to [`Plan::from_definition`] and as
/// read back from storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDefinition {
    /// Catalog tier.
    pub plan_type: PlanType,
    /// Display name.
    pub name: String,
    /// Marketing description.
    pub description: String,
    /// Quotas and capabilities.
    pub features: PlanFeatures,
    /// Prices.
    pub pricing: PlanPricing,
}

/// An immutable pricing-catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "PlanDefinition")]
pub struct Plan {
    plan_type: PlanType,
    name: String,
    description: String,
    features: PlanFeatures,
    pricing: PlanPricing,
}

impl Plan {
    /// The free tier.
    #[must_use]
    pub fn freemium() -> Self {
        Self {
            plan_type: PlanType::Freemium,
            name: "Freemium".into(),
            description: "One business with basic booking and email reminders".into(),
            features: PlanFeatures {
                max_notifications_per_month: Limit::Max(100),
                max_businesses: Limit::Max(1),
                max_staff_per_business: Limit::Max(3),
                max_services_per_business: Limit::Max(10),
                max_storage_gb: Limit::Max(1),
                flags: FeatureFlags {
                    online_booking: true,
                    ..FeatureFlags::default()
                },
            },
            pricing: PlanPricing {
                monthly_price: Cost::zero(Currency::Eur),
                yearly_price: Cost::zero(Currency::Eur),
                setup_fee: None,
                overage_unit_price: eur(FREEMIUM_OVERAGE_UNIT_PRICE_MINOR),
            },
        }
    }

    /// The premium tier.
    #[must_use]
    pub fn premium() -> Self {
        Self {
            plan_type: PlanType::Premium,
            name: "Premium".into(),
            description: "Several businesses, SMS reminders and custom branding".into(),
            features: PlanFeatures {
                max_notifications_per_month: Limit::Max(1000),
                max_businesses: Limit::Max(3),
                max_staff_per_business: Limit::Max(15),
                max_services_per_business: Limit::Max(50),
                max_storage_gb: Limit::Max(10),
                flags: FeatureFlags {
                    online_booking: true,
                    sms_notifications: true,
                    custom_branding: true,
                    advanced_analytics: true,
                    ..FeatureFlags::default()
                },
            },
            pricing: PlanPricing {
                monthly_price: eur(PREMIUM_MONTHLY_PRICE_MINOR),
                yearly_price: eur(PREMIUM_YEARLY_PRICE_MINOR),
                setup_fee: None,
                overage_unit_price: eur(PREMIUM_OVERAGE_UNIT_PRICE_MINOR),
            },
        }
    }

    /// The enterprise tier.
    #[must_use]
    pub fn enterprise() -> Self {
        Self {
            plan_type: PlanType::Enterprise,
            name: "Enterprise".into(),
            description: "Unlimited businesses, staff and services with API access".into(),
            features: PlanFeatures {
                max_notifications_per_month: Limit::Unlimited,
                max_businesses: Limit::Unlimited,
                max_staff_per_business: Limit::Unlimited,
                max_services_per_business: Limit::Unlimited,
                max_storage_gb: Limit::Max(100),
                flags: FeatureFlags {
                    online_booking: true,
                    sms_notifications: true,
                    custom_branding: true,
                    advanced_analytics: true,
                    api_access: true,
                    priority_support: true,
                },
            },
            pricing: PlanPricing {
                monthly_price: eur(ENTERPRISE_MONTHLY_PRICE_MINOR),
                yearly_price: eur(ENTERPRISE_YEARLY_PRICE_MINOR),
                setup_fee: Some(eur(ENTERPRISE_SETUP_FEE_MINOR)),
                overage_unit_price: eur(ENTERPRISE_OVERAGE_UNIT_PRICE_MINOR),
            },
        }
    }

    /// A negotiated plan.
    ///
    /// # Errors
    ///
    /// See [`Plan::from_definition`].
    pub fn custom(
        name: impl Into<String>,
        description: impl Into<String>,
        features: PlanFeatures,
        pricing: PlanPricing,
    ) -> Result<Self> {
        Self::from_definition(PlanDefinition {
            plan_type: PlanType::Custom,
            name: name.into(),
            description: description.into(),
            features,
            pricing,
        })
    }

    /// Validate a definition into a plan.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an empty name or description,
    /// `CurrencyMismatch` when prices use different currencies, and
    /// `Validation` when the yearly price is not below twelve monthly
    /// payments (both non-zero).
    pub fn from_definition(def: PlanDefinition) -> Result<Self> {
        if def.name.trim().is_empty() {
            return Err(BillingError::validation("plan name is empty"));
        }
        if def.description.trim().is_empty() {
            return Err(BillingError::validation("plan description is empty"));
        }

        let pricing = &def.pricing;
        let currency = pricing.monthly_price.currency();
        for price in [
            Some(pricing.yearly_price),
            pricing.setup_fee,
            Some(pricing.overage_unit_price),
        ]
        .into_iter()
        .flatten()
        {
            if price.currency() != currency {
                return Err(BillingError::CurrencyMismatch {
                    left: currency,
                    right: price.currency(),
                });
            }
        }

        if !pricing.monthly_price.is_zero() && !pricing.yearly_price.is_zero() {
            let twelve_months = pricing.monthly_price.multiply(12.into())?;
            if pricing.yearly_price.amount_minor() >= twelve_months.amount_minor() {
                return Err(BillingError::validation(format!(
                    "yearly price {} must be below 12 x monthly price ({})",
                    pricing.yearly_price, twelve_months
                )));
            }
        }

        Ok(Self {
            plan_type: def.plan_type,
            name: def.name,
            description: def.description,
            features: def.features,
            pricing: def.pricing,
        })
    }

    /// Catalog tier.
    #[must_use]
    pub const fn plan_type(&self) -> PlanType {
        self.plan_type
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Marketing description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Quotas and capabilities.
    #[must_use]
    pub const fn features(&self) -> &PlanFeatures {
        &self.features
    }

    /// Prices.
    #[must_use]
    pub const fn pricing(&self) -> &PlanPricing {
        &self.pricing
    }

    /// Currency all prices are expressed in.
    #[must_use]
    pub const fn currency(&self) -> Currency {
        self.pricing.monthly_price.currency()
    }

    /// Price of one period at `frequency`.
    #[must_use]
    pub const fn price_for_frequency(&self, frequency: BillingFrequency) -> Cost {
        match frequency {
            BillingFrequency::Monthly => self.pricing.monthly_price,
            BillingFrequency::Yearly => self.pricing.yearly_price,
        }
    }

    /// Price of covering `months` at `frequency`.
    ///
    /// Yearly billing charges one yearly payment per started year; monthly
    /// billing charges one payment per month. Partial months are not prorated
    /// here.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` on overflow.
    pub fn calculate_price_for_period(
        &self,
        frequency: BillingFrequency,
        months: u32,
    ) -> Result<Cost> {
        let payments = match frequency {
            BillingFrequency::Monthly => months,
            BillingFrequency::Yearly => months.div_ceil(12),
        };
        self.price_for_frequency(frequency)
            .multiply(payments.into())
    }

    /// Charge for `excess_units` notifications beyond the quota.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` on overflow.
    pub fn calculate_overage_cost(&self, excess_units: i64) -> Result<Cost> {
        if excess_units <= 0 {
            return Ok(Cost::zero(self.currency()));
        }
        Cost::from_unit_count(excess_units.unsigned_abs(), self.pricing.overage_unit_price)
    }

    /// Overage charge for `notifications` sent in one month.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` on overflow.
    pub fn notification_overage(&self, notifications: u64) -> Result<Cost> {
        let excess = self.features.max_notifications_per_month.excess(notifications);
        self.calculate_overage_cost(i64::try_from(excess).unwrap_or(i64::MAX))
    }

    /// Whether another business may be created.
    #[must_use]
    pub const fn can_create_business(&self, current: u64) -> bool {
        self.features.max_businesses.allows(current)
    }

    /// Whether another staff member may be added.
    #[must_use]
    pub const fn can_add_staff(&self, current: u64) -> bool {
        self.features.max_staff_per_business.allows(current)
    }

    /// Whether another service may be added.
    #[must_use]
    pub const fn can_add_service(&self, current: u64) -> bool {
        self.features.max_services_per_business.allows(current)
    }

    /// Whether the monthly notification quota is used up.
    #[must_use]
    pub const fn has_notification_quota_exceeded(&self, current: u64) -> bool {
        !self.features.max_notifications_per_month.allows(current)
    }

    /// Whether the plan includes `feature`.
    #[must_use]
    pub const fn has_feature(&self, feature: Feature) -> bool {
        let flags = &self.features.flags;
        match feature {
            Feature::OnlineBooking => flags.online_booking,
            Feature::SmsNotifications => flags.sms_notifications,
            Feature::CustomBranding => flags.custom_branding,
            Feature::AdvancedAnalytics => flags.advanced_analytics,
            Feature::ApiAccess => flags.api_access,
            Feature::PrioritySupport => flags.priority_support,
        }
    }

    /// What yearly billing saves over twelve monthly payments.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` on overflow and `CurrencyMismatch` when the
    /// two prices are in different currencies.
    pub fn calculate_yearly_savings(&self) -> Result<Cost> {
        let monthly = self.pricing.monthly_price;
        let yearly = self.pricing.yearly_price;
        if monthly.is_zero() || yearly.is_zero() {
            return Ok(Cost::zero(self.currency()));
        }
        let twelve_months = monthly.multiply(12.into())?;
        if twelve_months.checked_cmp(&yearly)?.is_le() {
            return Ok(Cost::zero(self.currency()));
        }
        twelve_months.subtract(&yearly)
    }

    /// Whether moving from `other` to this plan is an upgrade.
    ///
    /// Standard tiers compare by rank; custom plans compare by monthly price.
    #[must_use]
    pub fn is_upgrade_from(&self, other: &Self) -> bool {
        match (self.plan_type.rank(), other.plan_type.rank()) {
            (Some(mine), Some(theirs)) => mine > theirs,
            _ => self
                .pricing
                .monthly_price
                .checked_cmp(&other.pricing.monthly_price)
                .is_ok_and(std::cmp::Ordering::is_gt),
        }
    }
}

impl PartialEq for Plan {
    fn eq(&self, other: &Self) -> bool {
        self.plan_type == other.plan_type
            && self.name == other.name
            && self.pricing.monthly_price == other.pricing.monthly_price
            && self.pricing.yearly_price == other.pricing.yearly_price
    }
}

impl Eq for Plan {}

impl TryFrom<PlanDefinition> for Plan {
    type Error = BillingError;

    fn try_from(def: PlanDefinition) -> Result<Self> {
        Self::from_definition(def)
    }
}

fn eur(amount_minor: i64) -> Cost {
    Cost::from_minor_units(amount_minor, Currency::Eur).unwrap_or(Cost::zero(Currency::Eur))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eur(amount: &str) -> Cost {
        Cost::parse(amount, "EUR").unwrap()
    }

    fn custom_features() -> PlanFeatures {
        PlanFeatures {
            max_notifications_per_month: Limit::Max(500),
            max_businesses: Limit::Max(2),
            max_staff_per_business: Limit::Max(5),
            max_services_per_business: Limit::Unlimited,
            max_storage_gb: Limit::Max(5),
            flags: FeatureFlags::default(),
        }
    }

    fn custom_pricing(monthly: &str, yearly: &str) -> PlanPricing {
        PlanPricing {
            monthly_price: eur(monthly),
            yearly_price: eur(yearly),
            setup_fee: None,
            overage_unit_price: eur("0.03"),
        }
    }

    #[test]
    fn standard_tiers_are_valid() {
        for plan in [Plan::freemium(), Plan::premium(), Plan::enterprise()] {
            let def = serde_json::from_value::<PlanDefinition>(serde_json::to_value(&plan).unwrap())
                .unwrap();
            assert_eq!(Plan::from_definition(def).unwrap(), plan);
        }
    }

    #[test]
    fn premium_prices() {
        let plan = Plan::premium();
        assert_eq!(plan.pricing().monthly_price, eur("29.99"));
        assert_eq!(
            plan.features().max_notifications_per_month,
            Limit::Max(1000)
        );
    }

    #[test]
    fn yearly_price_must_be_discounted() {
        let err = Plan::custom("Pro", "desc", custom_features(), custom_pricing("10", "120"))
            .unwrap_err();
        assert!(matches!(err, BillingError::Validation(_)));

        assert!(Plan::custom("Pro", "desc", custom_features(), custom_pricing("10", "119.99")).is_ok());
        // A zero price on either side skips the check.
        assert!(Plan::custom("Pro", "desc", custom_features(), custom_pricing("10", "0")).is_ok());
    }

    #[test]
    fn empty_name_or_description_rejected() {
        assert!(Plan::custom(" ", "desc", custom_features(), custom_pricing("10", "100")).is_err());
        assert!(Plan::custom("Pro", "", custom_features(), custom_pricing("10", "100")).is_err());
    }

    #[test]
    fn mixed_currency_pricing_rejected() {
        let mut pricing = custom_pricing("10", "100");
        pricing.overage_unit_price = Cost::parse("0.01", "USD").unwrap();
        let err = Plan::custom("Pro", "desc", custom_features(), pricing).unwrap_err();
        assert!(matches!(err, BillingError::CurrencyMismatch { .. }));
    }

    #[test]
    fn limits_below_unlimited_rejected() {
        assert_eq!(Limit::from_raw(-1).unwrap(), Limit::Unlimited);
        assert_eq!(Limit::from_raw(0).unwrap(), Limit::Max(0));
        assert!(Limit::from_raw(-2).is_err());

        let mut json = serde_json::to_value(Plan::premium()).unwrap();
        json["features"]["max_businesses"] = serde_json::json!(-5);
        assert!(serde_json::from_value::<Plan>(json).is_err());
    }

    #[test]
    fn limit_serializes_unlimited_as_minus_one() {
        let json = serde_json::to_value(Plan::enterprise()).unwrap();
        assert_eq!(json["features"]["max_businesses"], -1);
        assert_eq!(json["features"]["max_storage_gb"], 100);
    }

    #[test]
    fn price_for_period() {
        let plan = Plan::premium();
        assert_eq!(
            plan.calculate_price_for_period(BillingFrequency::Monthly, 3).unwrap(),
            eur("89.97")
        );
        assert_eq!(
            plan.calculate_price_for_period(BillingFrequency::Yearly, 1).unwrap(),
            eur("299.90")
        );
        assert_eq!(
            plan.calculate_price_for_period(BillingFrequency::Yearly, 13).unwrap(),
            eur("599.80")
        );
        assert!(plan
            .calculate_price_for_period(BillingFrequency::Yearly, 0)
            .unwrap()
            .is_zero());
    }

    #[test]
    fn overage_is_zero_for_non_positive_excess() {
        let plan = Plan::premium();
        assert!(plan.calculate_overage_cost(0).unwrap().is_zero());
        assert!(plan.calculate_overage_cost(-10).unwrap().is_zero());
        assert_eq!(plan.calculate_overage_cost(200).unwrap(), eur("4.00"));
    }

    #[test]
    fn overage_is_monotonic() {
        let plan = Plan::freemium();
        let mut previous = 0;
        for excess in -5..500 {
            let cost = plan.calculate_overage_cost(excess).unwrap().amount_minor();
            assert!(cost >= previous, "overage decreased at {excess}");
            previous = cost;
        }
    }

    #[test]
    fn notification_overage_uses_quota() {
        let plan = Plan::premium();
        assert!(plan.notification_overage(1000).unwrap().is_zero());
        assert_eq!(plan.notification_overage(1200).unwrap(), eur("4.00"));
        assert!(Plan::enterprise().notification_overage(1_000_000).unwrap().is_zero());
    }

    #[test]
    fn limit_checks_are_strict() {
        let plan = Plan::freemium();
        assert!(plan.can_create_business(0));
        assert!(!plan.can_create_business(1));
        assert!(plan.can_add_staff(2));
        assert!(!plan.can_add_staff(3));
        assert!(plan.can_add_service(9));
        assert!(!plan.can_add_service(10));
        assert!(!plan.has_notification_quota_exceeded(99));
        assert!(plan.has_notification_quota_exceeded(100));

        let enterprise = Plan::enterprise();
        assert!(enterprise.can_create_business(u64::MAX - 1));
        assert!(!enterprise.has_notification_quota_exceeded(u64::MAX));
    }

    #[test]
    fn yearly_savings() {
        // 12 * 29.99 = 359.88; 359.88 - 299.90 = 59.98
        assert_eq!(Plan::premium().calculate_yearly_savings().unwrap(), eur("59.98"));
        assert!(Plan::freemium().calculate_yearly_savings().unwrap().is_zero());
    }

    #[test]
    fn yearly_savings_of_unchecked_pricing() {
        let mut pricey = Plan::premium();
        pricey.pricing.yearly_price = eur("400.00");
        assert!(pricey.calculate_yearly_savings().unwrap().is_zero());

        let mut mixed = Plan::premium();
        mixed.pricing.yearly_price = Cost::parse("299.90", "USD").unwrap();
        assert!(matches!(
            mixed.calculate_yearly_savings(),
            Err(BillingError::CurrencyMismatch { .. })
        ));
    }

    #[test]
    fn upgrade_ordering() {
        let free = Plan::freemium();
        let premium = Plan::premium();
        let enterprise = Plan::enterprise();
        assert!(premium.is_upgrade_from(&free));
        assert!(enterprise.is_upgrade_from(&premium));
        assert!(!free.is_upgrade_from(&premium));
        assert!(!premium.is_upgrade_from(&premium));

        let custom = Plan::custom("Studio", "desc", custom_features(), custom_pricing("50", "500"))
            .unwrap();
        assert!(custom.is_upgrade_from(&premium));
        assert!(!custom.is_upgrade_from(&enterprise));
    }

    #[test]
    fn equality_is_structural() {
        assert_eq!(Plan::premium(), Plan::premium());
        assert_ne!(Plan::premium(), Plan::enterprise());

        let a = Plan::custom("Studio", "one", custom_features(), custom_pricing("50", "500"))
            .unwrap();
        let b = Plan::custom("Studio", "two", custom_features(), custom_pricing("50", "500"))
            .unwrap();
        let c = Plan::custom("Studio", "one", custom_features(), custom_pricing("50", "480"))
            .unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn feature_flags() {
        assert!(!Plan::freemium().has_feature(Feature::SmsNotifications));
        assert!(Plan::premium().has_feature(Feature::SmsNotifications));
        assert!(Plan::enterprise().has_feature(Feature::ApiAccess));
    }
}
