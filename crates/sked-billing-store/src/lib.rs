//! `RocksDB` storage layer for sked-billing.
//!
//! This crate persists subscriptions, billing cycles and tenant cycles using
//! `RocksDB` with column families for indexing.
//!
//! # Architecture
//!
//! - `subscriptions`: subscription records, keyed by `subscription_id`
//! - `billing_cycles`: billing cycle records, keyed by `cycle_id`
//! - `cycles_by_subscription`: index for listing the cycles of a subscription
//! - `cycles_by_period`: at most one cycle per subscription and period start
//! - `tenant_cycles`: tenant cycle records, keyed by `tenant_cycle_id`
//! - `tenant_cycles_by_business`: index for listing the tenant cycles of a business
//!
//! # Concurrency
//!
//! Every record carries a `version`. Inserts require a fresh id; updates
//! require the stored version to match the caller's and write `version + 1`.
//! A stale write fails with [`StoreError::VersionConflict`] and the caller
//! reloads and retries.
//!
//! # Example
//!
//! ```no_run
//! use chrono::Utc;
//! use sked_billing_core::{BillingFrequency, BusinessId, NewSubscription, Plan, Subscription, UserId};
//! use sked_billing_store::{RocksStore, Store};
//!
//! let store = RocksStore::open("/tmp/sked-billing-db").unwrap();
//!
//! let subscription = Subscription::create(
//!     NewSubscription {
//!         business_id: BusinessId::generate(),
//!         plan: Plan::premium(),
//!         billing_frequency: BillingFrequency::Monthly,
//!         trial_days: 14,
//!         created_by: UserId::generate(),
//!     },
//!     Utc::now(),
//! )
//! .unwrap();
//! store.insert_subscription(&subscription).unwrap();
//!
//! let retrieved = store.get_subscription(&subscription.id()).unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;

use sked_billing_core::{
    BillingCycle, BillingCycleId, BusinessId, Subscription, SubscriptionId, TenantBillingCycle,
    TenantCycleId,
};

/// The storage trait defining all database operations.
///
/// Update methods take the entity mutably and bump its version on success,
/// so the caller's copy stays in step with what was written.
pub trait Store: Send + Sync {
    // =========================================================================
    // Subscription Operations
    // =========================================================================

    /// Insert a new subscription.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the id is taken.
    fn insert_subscription(&self, subscription: &Subscription) -> Result<()>;

    /// Write a modified subscription.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if it was never inserted.
    /// - `StoreError::VersionConflict` if it changed since it was read.
    fn update_subscription(&self, subscription: &mut Subscription) -> Result<()>;

    /// Get a subscription by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_subscription(&self, id: &SubscriptionId) -> Result<Option<Subscription>>;

    /// List every subscription, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_subscriptions(&self) -> Result<Vec<Subscription>>;

    // =========================================================================
    // Billing Cycle Operations
    // =========================================================================

    /// Insert a new billing cycle. This also maintains the subscription and
    /// period indexes.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the id is taken or the
    /// subscription already has a cycle starting at the same instant.
    fn insert_billing_cycle(&self, cycle: &BillingCycle) -> Result<()>;

    /// Insert `cycle` unless its subscription already has a cycle starting at
    /// the same instant.
    ///
    /// The check and the insert happen under one write lock, so concurrent
    /// callers opening the same period end up with a single cycle. Returns
    /// the existing cycle when nothing was written.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the id is taken.
    fn insert_billing_cycle_if_absent(&self, cycle: &BillingCycle) -> Result<Option<BillingCycle>>;

    /// Write a modified billing cycle.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if it was never inserted.
    /// - `StoreError::VersionConflict` if it changed since it was read.
    fn update_billing_cycle(&self, cycle: &mut BillingCycle) -> Result<()>;

    /// Get a billing cycle by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_billing_cycle(&self, id: &BillingCycleId) -> Result<Option<BillingCycle>>;

    /// List the cycles of a subscription, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_cycles_by_subscription(
        &self,
        subscription_id: &SubscriptionId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<BillingCycle>>;

    // =========================================================================
    // Tenant Cycle Operations
    // =========================================================================

    /// Insert a new tenant cycle. This also maintains the business index.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the id is taken.
    fn insert_tenant_cycle(&self, cycle: &TenantBillingCycle) -> Result<()>;

    /// Write a modified tenant cycle.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if it was never inserted.
    /// - `StoreError::VersionConflict` if it changed since it was read.
    fn update_tenant_cycle(&self, cycle: &mut TenantBillingCycle) -> Result<()>;

    /// Get a tenant cycle by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_tenant_cycle(&self, id: &TenantCycleId) -> Result<Option<TenantBillingCycle>>;

    /// List the tenant cycles of a business, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_tenant_cycles_by_business(
        &self,
        business_id: &BusinessId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<TenantBillingCycle>>;

    // =========================================================================
    // Compound Operations
    // =========================================================================

    /// Write a settled cycle and its renewed subscription atomically.
    ///
    /// Both are version-checked; either both writes land or neither does.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if either was never inserted.
    /// - `StoreError::VersionConflict` if either changed since it was read.
    fn commit_settlement(
        &self,
        cycle: &mut BillingCycle,
        subscription: &mut Subscription,
    ) -> Result<()>;
}
