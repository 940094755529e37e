//! Core types for sked-billing.
//!
//! This crate provides the billing domain of the sked scheduling platform:
//!
//! - **Money**: `Cost`, `Currency`, `NotificationCost`
//! - **Catalog**: `Plan`, `PlanFeatures`, `PlanPricing`, `Limit`
//! - **Lifecycle**: `Subscription`, `SubscriptionStatus`, `SubscriptionEvent`
//! - **Settlement**: `BillingCycle`, `BillingCharges`, `BillingCycleStatus`
//! - **Tenant accounting**: `TenantBillingCycle`
//! - **Identifiers**: `BusinessId`, `UserId`, `SubscriptionId`, `BillingCycleId`, `TenantCycleId`
//!
//! # Money
//!
//! Amounts are stored as `i64` minor units (cents) with two decimal places.
//! `rust_decimal::Decimal` appears only where amounts enter or leave the
//! crate.
//!
//! # Time
//!
//! Nothing here reads the wall clock. Every time-dependent operation takes
//! `now: DateTime<Utc>`, normally supplied by a [`Clock`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod billing_cycle;
pub mod clock;
pub mod error;
pub mod ids;
pub mod money;
mod period;
pub mod plan;
pub mod subscription;
pub mod tenant_cycle;
pub mod usage;

pub use billing_cycle::{
    BillingCharges, BillingCycle, BillingCycleRecord, BillingCycleStatus, BillingCycleView,
    CycleEvent, NewBillingCycle,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{BillingError, ErrorKind, Result};
pub use ids::{BillingCycleId, BusinessId, IdError, SubscriptionId, TenantCycleId, UserId};
pub use money::{Cost, Currency, NotificationCost, MINOR_UNIT_DIGITS};
pub use plan::{
    BillingFrequency, Feature, FeatureFlags, Limit, Plan, PlanDefinition, PlanFeatures,
    PlanPricing, PlanType,
};
pub use subscription::{
    NewSubscription, Subscription, SubscriptionAction, SubscriptionEvent, SubscriptionRecord,
    SubscriptionStatus, SubscriptionView,
};
pub use tenant_cycle::{
    NewTenantCycle, TenantBillingCycle, TenantCyclePeriod, TenantCycleRecord, TenantCycleStatus,
    TenantCycleView,
};
pub use usage::{CumulativeMetric, PeakMetric, UsageCounters, UsageRecord};
