//! Common test utilities for sked-billing integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use sked_billing_core::{
    BillingCycle, BillingCycleId, BusinessId, Cost, FixedClock, Subscription, SubscriptionId,
    TenantBillingCycle, TenantCycleId, UserId,
};
use sked_billing_service::{BillingEngine, EngineConfig};
use sked_billing_store::{RocksStore, Store, StoreError};

/// Store wrapper that fails a chosen number of subscription updates with a
/// version conflict, as if another writer had won the race.
pub struct ConflictingStore {
    inner: RocksStore,
    pending_conflicts: AtomicU32,
}

impl ConflictingStore {
    /// Fail the next `count` subscription updates.
    pub fn inject_subscription_conflicts(&self, count: u32) {
        self.pending_conflicts.store(count, Ordering::SeqCst);
    }

    fn take_conflict(&self) -> bool {
        self.pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Store for ConflictingStore {
    fn insert_subscription(&self, subscription: &Subscription) -> sked_billing_store::Result<()> {
        self.inner.insert_subscription(subscription)
    }

    fn update_subscription(
        &self,
        subscription: &mut Subscription,
    ) -> sked_billing_store::Result<()> {
        if self.take_conflict() {
            return Err(StoreError::VersionConflict {
                expected: subscription.version(),
                found: subscription.version() + 1,
            });
        }
        self.inner.update_subscription(subscription)
    }

    fn get_subscription(
        &self,
        id: &SubscriptionId,
    ) -> sked_billing_store::Result<Option<Subscription>> {
        self.inner.get_subscription(id)
    }

    fn list_subscriptions(&self) -> sked_billing_store::Result<Vec<Subscription>> {
        self.inner.list_subscriptions()
    }

    fn insert_billing_cycle(&self, cycle: &BillingCycle) -> sked_billing_store::Result<()> {
        self.inner.insert_billing_cycle(cycle)
    }

    fn insert_billing_cycle_if_absent(
        &self,
        cycle: &BillingCycle,
    ) -> sked_billing_store::Result<Option<BillingCycle>> {
        self.inner.insert_billing_cycle_if_absent(cycle)
    }

    fn update_billing_cycle(&self, cycle: &mut BillingCycle) -> sked_billing_store::Result<()> {
        self.inner.update_billing_cycle(cycle)
    }

    fn get_billing_cycle(
        &self,
        id: &BillingCycleId,
    ) -> sked_billing_store::Result<Option<BillingCycle>> {
        self.inner.get_billing_cycle(id)
    }

    fn list_cycles_by_subscription(
        &self,
        subscription_id: &SubscriptionId,
        limit: usize,
        offset: usize,
    ) -> sked_billing_store::Result<Vec<BillingCycle>> {
        self.inner
            .list_cycles_by_subscription(subscription_id, limit, offset)
    }

    fn insert_tenant_cycle(&self, cycle: &TenantBillingCycle) -> sked_billing_store::Result<()> {
        self.inner.insert_tenant_cycle(cycle)
    }

    fn update_tenant_cycle(
        &self,
        cycle: &mut TenantBillingCycle,
    ) -> sked_billing_store::Result<()> {
        self.inner.update_tenant_cycle(cycle)
    }

    fn get_tenant_cycle(
        &self,
        id: &TenantCycleId,
    ) -> sked_billing_store::Result<Option<TenantBillingCycle>> {
        self.inner.get_tenant_cycle(id)
    }

    fn list_tenant_cycles_by_business(
        &self,
        business_id: &BusinessId,
        limit: usize,
        offset: usize,
    ) -> sked_billing_store::Result<Vec<TenantBillingCycle>> {
        self.inner
            .list_tenant_cycles_by_business(business_id, limit, offset)
    }

    fn commit_settlement(
        &self,
        cycle: &mut BillingCycle,
        subscription: &mut Subscription,
    ) -> sked_billing_store::Result<()> {
        self.inner.commit_settlement(cycle, subscription)
    }
}

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The engine under test.
    pub engine: BillingEngine<ConflictingStore>,
    /// The engine's clock.
    pub clock: Arc<FixedClock>,
    /// The engine's store.
    pub store: Arc<ConflictingStore>,
    /// Temporary directory for the database (kept alive for test duration).
    pub _temp_dir: TempDir,
    /// The user making changes.
    pub actor: UserId,
}

impl TestHarness {
    /// Create a new test harness with a fresh database, starting at [`t0`].
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create a harness with a custom configuration.
    pub fn with_config(config: EngineConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let inner = RocksStore::open(temp_dir.path()).expect("Failed to open store");
        let store = Arc::new(ConflictingStore {
            inner,
            pending_conflicts: AtomicU32::new(0),
        });
        let clock = Arc::new(FixedClock::new(t0()));

        let config = EngineConfig {
            data_dir: temp_dir.path().to_string_lossy().to_string(),
            ..config
        };
        let engine = BillingEngine::new(Arc::clone(&store), clock.clone(), config);

        Self {
            engine,
            clock,
            store,
            _temp_dir: temp_dir,
            actor: UserId::generate(),
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// The instant every harness starts at.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

/// Midnight UTC on the given date.
pub fn date(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

/// Parse a euro amount.
pub fn eur(amount: &str) -> Cost {
    Cost::parse(amount, "EUR").unwrap()
}
