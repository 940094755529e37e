//! Money types for sked-billing.
//!
//! A [`Cost`] is an immutable, non-negative amount in a single [`Currency`],
//! stored as an integer count of minor units (cents). Decimal amounts are only
//! accepted and produced at the boundaries (`Cost::new`, `Cost::amount`,
//! formatting), so arithmetic never accumulates floating-point error.
//!
//! Every operation returns a new value. Mixing currencies and going below zero
//! are errors; credits and refunds are separate domain actions, not negative
//! costs.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, Result};

/// Number of decimal places every supported currency uses.
pub const MINOR_UNIT_DIGITS: u32 = 2;

const MINOR_PER_MAJOR: i64 = 100;

/// Default unit price of one email notification (0.02 EUR).
pub const DEFAULT_EMAIL_UNIT_PRICE_MINOR: i64 = 2;

/// Default unit price of one SMS notification (0.05 EUR).
pub const DEFAULT_SMS_UNIT_PRICE_MINOR: i64 = 5;

// ============================================================================
// Currency
// ============================================================================

/// Supported ISO-4217 currencies.
///
/// All of them have two minor digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// Euro.
    Eur,
    /// US dollar.
    Usd,
    /// Pound sterling.
    Gbp,
    /// Swiss franc.
    Chf,
    /// Canadian dollar.
    Cad,
    /// Australian dollar.
    Aud,
    /// Swedish krona.
    Sek,
    /// Norwegian krone.
    Nok,
    /// Danish krone.
    Dkk,
    /// Polish zloty.
    Pln,
}

impl Currency {
    /// Every supported currency.
    pub const ALL: [Self; 10] = [
        Self::Eur,
        Self::Usd,
        Self::Gbp,
        Self::Chf,
        Self::Cad,
        Self::Aud,
        Self::Sek,
        Self::Nok,
        Self::Dkk,
        Self::Pln,
    ];

    /// The ISO-4217 code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Eur => "EUR",
            Self::Usd => "USD",
            Self::Gbp => "GBP",
            Self::Chf => "CHF",
            Self::Cad => "CAD",
            Self::Aud => "AUD",
            Self::Sek => "SEK",
            Self::Nok => "NOK",
            Self::Dkk => "DKK",
            Self::Pln => "PLN",
        }
    }

    /// Display prefix used by [`Cost::formatted_amount`].
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eur => "€",
            Self::Usd => "$",
            Self::Gbp => "£",
            Self::Cad => "CA$",
            Self::Aud => "A$",
            Self::Chf => "CHF ",
            Self::Sek => "SEK ",
            Self::Nok => "NOK ",
            Self::Dkk => "DKK ",
            Self::Pln => "PLN ",
        }
    }
}

impl FromStr for Currency {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.len() != 3 || !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(BillingError::UnsupportedCurrency(format!(
                "{s:?} is not a 3-letter currency code"
            )));
        }
        let upper = trimmed.to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|c| c.code() == upper)
            .ok_or(BillingError::UnsupportedCurrency(upper))
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ============================================================================
// Cost
// ============================================================================

/// A non-negative amount of money in one currency.
///
/// Serializes as `{ "amount": "29.99", "currency": "EUR",
/// "formatted_amount": "€29.99" }`; `formatted_amount` is ignored on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "CostRepr", into = "CostRepr")]
pub struct Cost {
    amount_minor: i64,
    currency: Currency,
}

impl Cost {
    /// Create a cost from a decimal amount.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` if the amount is negative, has more than two
    /// decimal places, or does not fit in minor units.
    pub fn new(amount: Decimal, currency: Currency) -> Result<Self> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(BillingError::InvalidAmount(format!(
                "{amount} is negative"
            )));
        }
        if amount.normalize().scale() > MINOR_UNIT_DIGITS {
            return Err(BillingError::InvalidAmount(format!(
                "{amount} has more than {MINOR_UNIT_DIGITS} decimal places"
            )));
        }
        let amount_minor = amount
            .checked_mul(Decimal::from(MINOR_PER_MAJOR))
            .and_then(|m| m.to_i64())
            .ok_or_else(|| BillingError::InvalidAmount(format!("{amount} is out of range")))?;
        Ok(Self {
            amount_minor,
            currency,
        })
    }

    /// Parse a decimal amount and a currency code.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` for an unparsable or invalid amount and
    /// `UnsupportedCurrency` for a bad currency code.
    pub fn parse(amount: &str, currency: &str) -> Result<Self> {
        let currency = currency.parse()?;
        let amount = Decimal::from_str_exact(amount.trim())
            .map_err(|e| BillingError::InvalidAmount(format!("{amount:?}: {e}")))?;
        Self::new(amount, currency)
    }

    /// Create a cost from minor units (cents).
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` if `amount_minor` is negative.
    pub fn from_minor_units(amount_minor: i64, currency: Currency) -> Result<Self> {
        if amount_minor < 0 {
            return Err(BillingError::InvalidAmount(format!(
                "{amount_minor} minor units is negative"
            )));
        }
        Ok(Self {
            amount_minor,
            currency,
        })
    }

    /// A zero amount.
    #[must_use]
    pub const fn zero(currency: Currency) -> Self {
        Self {
            amount_minor: 0,
            currency,
        }
    }

    /// `unit_price × count`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` on overflow.
    pub fn from_unit_count(count: u64, unit_price: Self) -> Result<Self> {
        unit_price.multiply(Decimal::from(count))
    }

    /// The amount in minor units.
    #[must_use]
    pub const fn amount_minor(&self) -> i64 {
        self.amount_minor
    }

    /// The amount as a decimal with two places.
    #[must_use]
    pub fn amount(&self) -> Decimal {
        Decimal::new(self.amount_minor, MINOR_UNIT_DIGITS)
    }

    /// The currency.
    #[must_use]
    pub const fn currency(&self) -> Currency {
        self.currency
    }

    /// Whether the amount is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.amount_minor == 0
    }

    /// Add two costs of the same currency.
    ///
    /// # Errors
    ///
    /// Returns `CurrencyMismatch` if currencies differ, `InvalidAmount` on overflow.
    pub fn add(&self, other: &Self) -> Result<Self> {
        self.ensure_same_currency(other)?;
        let amount_minor = self
            .amount_minor
            .checked_add(other.amount_minor)
            .ok_or_else(|| BillingError::InvalidAmount("sum overflows".into()))?;
        Ok(Self {
            amount_minor,
            currency: self.currency,
        })
    }

    /// Subtract a cost of the same currency.
    ///
    /// # Errors
    ///
    /// Returns `CurrencyMismatch` if currencies differ and `NegativeResult` if
    /// `other` is larger than `self`.
    pub fn subtract(&self, other: &Self) -> Result<Self> {
        self.ensure_same_currency(other)?;
        if other.amount_minor > self.amount_minor {
            return Err(BillingError::NegativeResult {
                minuend_minor: self.amount_minor,
                subtrahend_minor: other.amount_minor,
            });
        }
        Ok(Self {
            amount_minor: self.amount_minor - other.amount_minor,
            currency: self.currency,
        })
    }

    /// Multiply by a non-negative factor, rounding to minor units (midpoint
    /// away from zero).
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` if the factor is negative or the result overflows.
    pub fn multiply(&self, factor: Decimal) -> Result<Self> {
        if factor.is_sign_negative() && !factor.is_zero() {
            return Err(BillingError::InvalidAmount(format!(
                "factor {factor} is negative"
            )));
        }
        let amount_minor = Decimal::from(self.amount_minor)
            .checked_mul(factor)
            .map(|p| p.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
            .and_then(|p| p.to_i64())
            .ok_or_else(|| BillingError::InvalidAmount("product overflows".into()))?;
        Ok(Self {
            amount_minor,
            currency: self.currency,
        })
    }

    /// Scale by `numerator / denominator` using exact integer arithmetic,
    /// rounding half up.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if `denominator` is zero and `InvalidAmount` on overflow.
    pub fn prorate(&self, numerator: u64, denominator: u64) -> Result<Self> {
        if denominator == 0 {
            return Err(BillingError::validation("proration denominator is zero"));
        }
        let scaled = i128::from(self.amount_minor) * i128::from(numerator);
        let den = i128::from(denominator);
        let rounded = (2 * scaled + den) / (2 * den);
        let amount_minor = i64::try_from(rounded)
            .map_err(|_| BillingError::InvalidAmount("prorated amount overflows".into()))?;
        Ok(Self {
            amount_minor,
            currency: self.currency,
        })
    }

    /// Compare two costs of the same currency.
    ///
    /// # Errors
    ///
    /// Returns `CurrencyMismatch` if currencies differ.
    pub fn checked_cmp(&self, other: &Self) -> Result<Ordering> {
        self.ensure_same_currency(other)?;
        Ok(self.amount_minor.cmp(&other.amount_minor))
    }

    /// The larger of two costs of the same currency.
    ///
    /// # Errors
    ///
    /// Returns `CurrencyMismatch` if currencies differ.
    pub fn max(&self, other: &Self) -> Result<Self> {
        Ok(if self.checked_cmp(other)?.is_lt() {
            *other
        } else {
            *self
        })
    }

    /// The smaller of two costs of the same currency.
    ///
    /// # Errors
    ///
    /// Returns `CurrencyMismatch` if currencies differ.
    pub fn min(&self, other: &Self) -> Result<Self> {
        Ok(if self.checked_cmp(other)?.is_gt() {
            *other
        } else {
            *self
        })
    }

    /// The amount formatted for display, e.g. `€1,234.50`.
    #[must_use]
    pub fn formatted_amount(&self) -> String {
        let major = self.amount_minor / MINOR_PER_MAJOR;
        let minor = self.amount_minor % MINOR_PER_MAJOR;
        format!(
            "{}{}.{minor:02}",
            self.currency.symbol(),
            group_thousands(major)
        )
    }

    fn ensure_same_currency(&self, other: &Self) -> Result<()> {
        if self.currency == other.currency {
            Ok(())
        } else {
            Err(BillingError::CurrencyMismatch {
                left: self.currency,
                right: other.currency,
            })
        }
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount(), self.currency)
    }
}

fn group_thousands(value: i64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[derive(Serialize, Deserialize)]
struct CostRepr {
    amount: Decimal,
    currency: Currency,
    #[serde(default, skip_deserializing)]
    formatted_amount: String,
}

impl From<Cost> for CostRepr {
    fn from(cost: Cost) -> Self {
        Self {
            amount: cost.amount(),
            currency: cost.currency,
            formatted_amount: cost.formatted_amount(),
        }
    }
}

impl TryFrom<CostRepr> for Cost {
    type Error = BillingError;

    fn try_from(repr: CostRepr) -> Result<Self> {
        Self::new(repr.amount, repr.currency)
    }
}

// ============================================================================
// NotificationCost
// ============================================================================

/// The charge for a batch of notifications, with the counts that produced it.
///
/// Feeds [`crate::TenantBillingCycle::add_usage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationCost {
    cost: Cost,
    email_count: u64,
    sms_count: u64,
}

impl NotificationCost {
    /// Default price of one email (0.02 EUR).
    #[must_use]
    pub const fn default_email_unit_price() -> Cost {
        Cost {
            amount_minor: DEFAULT_EMAIL_UNIT_PRICE_MINOR,
            currency: Currency::Eur,
        }
    }

    /// Default price of one SMS (0.05 EUR).
    #[must_use]
    pub const fn default_sms_unit_price() -> Cost {
        Cost {
            amount_minor: DEFAULT_SMS_UNIT_PRICE_MINOR,
            currency: Currency::Eur,
        }
    }

    /// Cost of `count` emails at the default unit price.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` on overflow.
    pub fn from_email_count(count: u64) -> Result<Self> {
        Self::from_email_count_with_price(count, Self::default_email_unit_price())
    }

    /// Cost of `count` SMS at the default unit price.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` on overflow.
    pub fn from_sms_count(count: u64) -> Result<Self> {
        Self::from_sms_count_with_price(count, Self::default_sms_unit_price())
    }

    /// Cost of `count` emails at `unit_price`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` on overflow.
    pub fn from_email_count_with_price(count: u64, unit_price: Cost) -> Result<Self> {
        Ok(Self {
            cost: Cost::from_unit_count(count, unit_price)?,
            email_count: count,
            sms_count: 0,
        })
    }

    /// Cost of `count` SMS at `unit_price`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` on overflow.
    pub fn from_sms_count_with_price(count: u64, unit_price: Cost) -> Result<Self> {
        Ok(Self {
            cost: Cost::from_unit_count(count, unit_price)?,
            email_count: 0,
            sms_count: count,
        })
    }

    /// Combine two notification costs.
    ///
    /// # Errors
    ///
    /// Returns `CurrencyMismatch` if currencies differ.
    pub fn add(&self, other: &Self) -> Result<Self> {
        Ok(Self {
            cost: self.cost.add(&other.cost)?,
            email_count: self.email_count.saturating_add(other.email_count),
            sms_count: self.sms_count.saturating_add(other.sms_count),
        })
    }

    /// The total charge.
    #[must_use]
    pub const fn cost(&self) -> Cost {
        self.cost
    }

    /// Number of emails.
    #[must_use]
    pub const fn email_count(&self) -> u64 {
        self.email_count
    }

    /// Number of SMS.
    #[must_use]
    pub const fn sms_count(&self) -> u64 {
        self.sms_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eur(amount: &str) -> Cost {
        Cost::parse(amount, "EUR").unwrap()
    }

    #[test]
    fn create_accepts_two_decimals() {
        let cost = eur("0.01");
        assert_eq!(cost.amount_minor(), 1);
        assert_eq!(cost.amount(), Decimal::new(1, 2));
    }

    #[test]
    fn create_rejects_three_decimals() {
        let err = Cost::parse("0.001", "EUR").unwrap_err();
        assert!(matches!(err, BillingError::InvalidAmount(_)));
    }

    #[test]
    fn trailing_zeros_do_not_count_as_precision() {
        assert_eq!(eur("1.500").amount_minor(), 150);
    }

    #[test]
    fn create_rejects_negative() {
        assert!(Cost::new(Decimal::new(-1, 2), Currency::Eur).is_err());
        assert!(Cost::from_minor_units(-5, Currency::Usd).is_err());
    }

    #[test]
    fn currency_parsing() {
        assert_eq!("eur".parse::<Currency>().unwrap(), Currency::Eur);
        assert!(matches!(
            "EURO".parse::<Currency>(),
            Err(BillingError::UnsupportedCurrency(_))
        ));
        assert!(matches!(
            "XYZ".parse::<Currency>(),
            Err(BillingError::UnsupportedCurrency(_))
        ));
        assert!("E1R".parse::<Currency>().is_err());
    }

    #[test]
    fn add_and_subtract_same_currency() {
        let a = eur("10.50");
        let b = eur("0.75");
        assert_eq!(a.add(&b).unwrap(), eur("11.25"));
        assert_eq!(a.subtract(&b).unwrap(), eur("9.75"));
        assert!(a.subtract(&a).unwrap().is_zero());
    }

    #[test]
    fn arithmetic_rejects_mixed_currencies() {
        let a = eur("0.02");
        let b = Cost::parse("0.02", "USD").unwrap();
        assert!(matches!(
            a.add(&b),
            Err(BillingError::CurrencyMismatch { .. })
        ));
        assert!(matches!(
            a.subtract(&b),
            Err(BillingError::CurrencyMismatch { .. })
        ));
        assert!(a.checked_cmp(&b).is_err());
        assert!(a.max(&b).is_err());
    }

    #[test]
    fn max_and_min() {
        let small = eur("1.50");
        let large = eur("12.00");
        assert_eq!(small.max(&large).unwrap(), large);
        assert_eq!(large.min(&small).unwrap(), small);
        assert_eq!(small.min(&small).unwrap(), small);
    }

    #[test]
    fn subtract_never_goes_negative() {
        let err = eur("1.00").subtract(&eur("1.01")).unwrap_err();
        assert!(matches!(err, BillingError::NegativeResult { .. }));
    }

    #[test]
    fn multiply_rounds_midpoint_away_from_zero() {
        // 0.05 * 0.5 = 0.025 -> 0.03
        let half = eur("0.05").multiply(Decimal::new(5, 1)).unwrap();
        assert_eq!(half.amount_minor(), 3);
        assert!(eur("1.00").multiply(Decimal::new(-1, 0)).is_err());
        assert!(eur("1.00").multiply(Decimal::ZERO).unwrap().is_zero());
    }

    #[test]
    fn from_unit_count_multiplies() {
        let total = Cost::from_unit_count(200, eur("0.02")).unwrap();
        assert_eq!(total, eur("4.00"));
    }

    #[test]
    fn prorate_is_exact() {
        // 29.99 * 15 / 30 = 14.995 -> 15.00
        assert_eq!(eur("29.99").prorate(15, 30).unwrap(), eur("15.00"));
        assert_eq!(eur("29.99").prorate(30, 30).unwrap(), eur("29.99"));
        assert!(eur("29.99").prorate(0, 30).unwrap().is_zero());
        assert!(eur("1.00").prorate(1, 0).is_err());
    }

    #[test]
    fn formatting() {
        assert_eq!(eur("1234.5").formatted_amount(), "€1,234.50");
        assert_eq!(eur("0.2").formatted_amount(), "€0.20");
        assert_eq!(
            Cost::parse("1000000", "USD").unwrap().formatted_amount(),
            "$1,000,000.00"
        );
        assert_eq!(Cost::parse("12", "chf").unwrap().formatted_amount(), "CHF 12.00");
    }

    #[test]
    fn serde_shape() {
        let json = serde_json::to_value(eur("29.99")).unwrap();
        assert_eq!(json["amount"], "29.99");
        assert_eq!(json["currency"], "EUR");
        assert_eq!(json["formatted_amount"], "€29.99");

        let back: Cost = serde_json::from_value(json).unwrap();
        assert_eq!(back, eur("29.99"));
    }

    #[test]
    fn deserialize_validates() {
        let bad = serde_json::json!({ "amount": "-1.00", "currency": "EUR" });
        assert!(serde_json::from_value::<Cost>(bad).is_err());
    }

    #[test]
    fn notification_cost_from_email_count() {
        let cost = NotificationCost::from_email_count(10).unwrap();
        assert_eq!(cost.cost().amount(), Decimal::new(20, 2));
        assert_eq!(cost.cost().currency(), Currency::Eur);
        assert_eq!(cost.email_count(), 10);
        assert_eq!(cost.sms_count(), 0);
    }

    #[test]
    fn notification_cost_add_sums_counts() {
        let email = NotificationCost::from_email_count(10).unwrap();
        let sms = NotificationCost::from_sms_count(4).unwrap();
        let both = email.add(&sms).unwrap();
        assert_eq!(both.cost(), eur("0.40"));
        assert_eq!(both.email_count(), 10);
        assert_eq!(both.sms_count(), 4);

        let usd = NotificationCost::from_email_count_with_price(
            1,
            Cost::parse("0.01", "USD").unwrap(),
        )
        .unwrap();
        assert!(email.add(&usd).is_err());
    }
}
