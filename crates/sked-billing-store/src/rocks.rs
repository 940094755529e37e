//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use sked_billing_core::{
    BillingCycle, BillingCycleId, BusinessId, Subscription, SubscriptionId, TenantBillingCycle,
    TenantCycleId,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::Store;

/// A stored entity with an optimistic-concurrency version.
trait Record: Serialize + DeserializeOwned + Clone {
    const ENTITY: &'static str;
    const CF: &'static str;

    fn key(&self) -> Vec<u8>;
    fn id_string(&self) -> String;
    fn stored_version(&self) -> u64;
    fn bump_version(&mut self);
}

impl Record for Subscription {
    const ENTITY: &'static str = "subscription";
    const CF: &'static str = cf::SUBSCRIPTIONS;

    fn key(&self) -> Vec<u8> {
        keys::subscription_key(&self.id())
    }
    fn id_string(&self) -> String {
        self.id().to_string()
    }
    fn stored_version(&self) -> u64 {
        self.version()
    }
    fn bump_version(&mut self) {
        self.increment_version();
    }
}

impl Record for BillingCycle {
    const ENTITY: &'static str = "billing cycle";
    const CF: &'static str = cf::BILLING_CYCLES;

    fn key(&self) -> Vec<u8> {
        keys::cycle_key(&self.id())
    }
    fn id_string(&self) -> String {
        self.id().to_string()
    }
    fn stored_version(&self) -> u64 {
        self.version()
    }
    fn bump_version(&mut self) {
        self.increment_version();
    }
}

impl Record for TenantBillingCycle {
    const ENTITY: &'static str = "tenant cycle";
    const CF: &'static str = cf::TENANT_CYCLES;

    fn key(&self) -> Vec<u8> {
        keys::tenant_cycle_key(&self.id())
    }
    fn id_string(&self) -> String {
        self.id().to_string()
    }
    fn stored_version(&self) -> u64 {
        self.version()
    }
    fn bump_version(&mut self) {
        self.increment_version();
    }
}

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Serialize compare-and-write sections.
    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn load<T: Record>(&self, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(T::CF)?;
        self.db
            .get_cf(&cf, key)?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    /// Add an insert of `record` to `batch`, refusing a taken id.
    fn stage_insert<T: Record>(&self, batch: &mut WriteBatch, record: &T) -> Result<()> {
        let cf = self.cf(T::CF)?;
        let key = record.key();
        if self.db.get_cf(&cf, &key)?.is_some() {
            return Err(StoreError::AlreadyExists {
                entity: T::ENTITY,
                id: record.id_string(),
            });
        }
        batch.put_cf(&cf, &key, Self::serialize(record)?);
        Ok(())
    }

    /// Add a version-checked update of `record` to `batch`. The staged value
    /// carries `version + 1`.
    fn stage_update<T: Record>(&self, batch: &mut WriteBatch, record: &T) -> Result<()> {
        let key = record.key();
        let stored: T = self.load(&key)?.ok_or_else(|| StoreError::NotFound {
            entity: T::ENTITY,
            id: record.id_string(),
        })?;
        if stored.stored_version() != record.stored_version() {
            debug!(
                entity = T::ENTITY,
                id = %record.id_string(),
                expected = record.stored_version(),
                found = stored.stored_version(),
                "Version conflict"
            );
            return Err(StoreError::VersionConflict {
                expected: record.stored_version(),
                found: stored.stored_version(),
            });
        }

        let mut next = record.clone();
        next.bump_version();
        let cf = self.cf(T::CF)?;
        batch.put_cf(&cf, &key, Self::serialize(&next)?);
        Ok(())
    }

    fn update<T: Record>(&self, record: &mut T) -> Result<()> {
        let _guard = self.lock();
        let mut batch = WriteBatch::default();
        self.stage_update(&mut batch, record)?;
        self.db.write(batch)?;
        record.bump_version();
        Ok(())
    }

    /// The stored cycle of `cycle`'s subscription that starts when `cycle`
    /// starts.
    fn cycle_for_period(&self, cycle: &BillingCycle) -> Result<Option<BillingCycle>> {
        let cf_by_period = self.cf(cf::CYCLES_BY_PERIOD)?;
        let period_key = keys::subscription_period_key(
            &cycle.subscription_id(),
            cycle.start_date().timestamp_millis(),
        );
        let Some(value) = self.db.get_cf(&cf_by_period, &period_key)? else {
            return Ok(None);
        };

        let id: [u8; 16] = value
            .as_slice()
            .try_into()
            .map_err(|_| StoreError::Database("malformed entry in cycles_by_period".into()))?;
        let id = BillingCycleId::from_bytes(id);
        self.load::<BillingCycle>(&keys::cycle_key(&id))?
            .map(Some)
            .ok_or_else(|| StoreError::Database(format!("period index points at missing cycle {id}")))
    }

    /// Write a cycle with both of its index entries. Callers hold the write lock.
    fn write_new_cycle(&self, cycle: &BillingCycle) -> Result<()> {
        let cf_by_subscription = self.cf(cf::CYCLES_BY_SUBSCRIPTION)?;
        let cf_by_period = self.cf(cf::CYCLES_BY_PERIOD)?;
        let index_key = keys::subscription_cycle_key(&cycle.subscription_id(), &cycle.id());
        let period_key = keys::subscription_period_key(
            &cycle.subscription_id(),
            cycle.start_date().timestamp_millis(),
        );

        let mut batch = WriteBatch::default();
        self.stage_insert(&mut batch, cycle)?;
        batch.put_cf(&cf_by_subscription, &index_key, []);
        batch.put_cf(&cf_by_period, &period_key, cycle.id().to_bytes());
        self.db.write(batch)?;
        Ok(())
    }

    /// Collect the records referenced by an index prefix, newest first.
    fn list_index<T: Record>(
        &self,
        index_cf: &str,
        prefix: &[u8],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<T>> {
        let cf_index = self.cf(index_cf)?;

        // ULID suffixes keep the index in creation order; collect, then walk backwards.
        let mut child_keys = Vec::new();
        for item in self
            .db
            .iterator_cf(&cf_index, IteratorMode::From(prefix, Direction::Forward))
        {
            let (key, _) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            let child = keys::child_id_bytes(&key)
                .ok_or_else(|| StoreError::Database(format!("malformed index key in {index_cf}")))?;
            child_keys.push(child);
        }

        let mut records = Vec::new();
        for child in child_keys.into_iter().rev().skip(offset).take(limit) {
            if let Some(record) = self.load(&child)? {
                records.push(record);
            }
        }
        Ok(records)
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Subscription Operations
    // =========================================================================

    fn insert_subscription(&self, subscription: &Subscription) -> Result<()> {
        let _guard = self.lock();
        let mut batch = WriteBatch::default();
        self.stage_insert(&mut batch, subscription)?;
        self.db.write(batch)?;
        Ok(())
    }

    fn update_subscription(&self, subscription: &mut Subscription) -> Result<()> {
        self.update(subscription)
    }

    fn get_subscription(&self, id: &SubscriptionId) -> Result<Option<Subscription>> {
        self.load(&keys::subscription_key(id))
    }

    fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        let cf = self.cf(cf::SUBSCRIPTIONS)?;
        let mut subscriptions = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item?;
            subscriptions.push(Self::deserialize(&value)?);
        }
        Ok(subscriptions)
    }

    // =========================================================================
    // Billing Cycle Operations
    // =========================================================================

    fn insert_billing_cycle(&self, cycle: &BillingCycle) -> Result<()> {
        let _guard = self.lock();
        if self.cycle_for_period(cycle)?.is_some() {
            return Err(StoreError::AlreadyExists {
                entity: "billing cycle period",
                id: format!("{} @ {}", cycle.subscription_id(), cycle.start_date()),
            });
        }
        self.write_new_cycle(cycle)
    }

    fn insert_billing_cycle_if_absent(&self, cycle: &BillingCycle) -> Result<Option<BillingCycle>> {
        let _guard = self.lock();
        if let Some(existing) = self.cycle_for_period(cycle)? {
            debug!(
                cycle_id = %existing.id(),
                subscription_id = %cycle.subscription_id(),
                "Period already has a billing cycle"
            );
            return Ok(Some(existing));
        }
        self.write_new_cycle(cycle)?;
        Ok(None)
    }

    fn update_billing_cycle(&self, cycle: &mut BillingCycle) -> Result<()> {
        self.update(cycle)
    }

    fn get_billing_cycle(&self, id: &BillingCycleId) -> Result<Option<BillingCycle>> {
        self.load(&keys::cycle_key(id))
    }

    fn list_cycles_by_subscription(
        &self,
        subscription_id: &SubscriptionId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<BillingCycle>> {
        self.list_index(
            cf::CYCLES_BY_SUBSCRIPTION,
            &keys::subscription_cycles_prefix(subscription_id),
            limit,
            offset,
        )
    }

    // =========================================================================
    // Tenant Cycle Operations
    // =========================================================================

    fn insert_tenant_cycle(&self, cycle: &TenantBillingCycle) -> Result<()> {
        let cf_by_business = self.cf(cf::TENANT_CYCLES_BY_BUSINESS)?;
        let index_key = keys::business_tenant_cycle_key(&cycle.business_id(), &cycle.id());

        let _guard = self.lock();
        let mut batch = WriteBatch::default();
        self.stage_insert(&mut batch, cycle)?;
        batch.put_cf(&cf_by_business, &index_key, []);
        self.db.write(batch)?;
        Ok(())
    }

    fn update_tenant_cycle(&self, cycle: &mut TenantBillingCycle) -> Result<()> {
        self.update(cycle)
    }

    fn get_tenant_cycle(&self, id: &TenantCycleId) -> Result<Option<TenantBillingCycle>> {
        self.load(&keys::tenant_cycle_key(id))
    }

    fn list_tenant_cycles_by_business(
        &self,
        business_id: &BusinessId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<TenantBillingCycle>> {
        self.list_index(
            cf::TENANT_CYCLES_BY_BUSINESS,
            &keys::business_tenant_cycles_prefix(business_id),
            limit,
            offset,
        )
    }

    // =========================================================================
    // Compound Operations
    // =========================================================================

    fn commit_settlement(
        &self,
        cycle: &mut BillingCycle,
        subscription: &mut Subscription,
    ) -> Result<()> {
        let _guard = self.lock();

        // Write atomically
        let mut batch = WriteBatch::default();
        self.stage_update(&mut batch, cycle)?;
        self.stage_update(&mut batch, subscription)?;
        self.db.write(batch)?;

        cycle.bump_version();
        subscription.bump_version();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use sked_billing_core::{
        BillingCycleStatus, BillingFrequency, Currency, NewSubscription, NotificationCost, Plan,
        TenantCyclePeriod, UserId,
    };
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap()
    }

    fn subscription() -> Subscription {
        Subscription::create(
            NewSubscription {
                business_id: BusinessId::generate(),
                plan: Plan::premium(),
                billing_frequency: BillingFrequency::Monthly,
                trial_days: 0,
                created_by: UserId::generate(),
            },
            now(),
        )
        .unwrap()
    }

    fn cycle_for(subscription: &Subscription, offset_days: i64) -> BillingCycle {
        let start = subscription.start_date() + Duration::days(offset_days);
        BillingCycle::from_subscription(subscription, start, start + Duration::days(30), now())
            .unwrap()
    }

    #[test]
    fn subscription_crud() {
        let (store, _dir) = create_test_store();
        let mut sub = subscription();

        // Create
        store.insert_subscription(&sub).unwrap();
        assert!(matches!(
            store.insert_subscription(&sub),
            Err(StoreError::AlreadyExists { .. })
        ));

        // Read
        let retrieved = store.get_subscription(&sub.id()).unwrap().unwrap();
        assert_eq!(retrieved.plan(), &Plan::premium());
        assert_eq!(retrieved.version(), 0);

        // Update
        sub.record_notification_usage(42, now()).unwrap();
        store.update_subscription(&mut sub).unwrap();
        assert_eq!(sub.version(), 1);

        let updated = store.get_subscription(&sub.id()).unwrap().unwrap();
        assert_eq!(updated.current_period_usage().notifications, 42);
        assert_eq!(updated.version(), 1);

        assert_eq!(store.list_subscriptions().unwrap().len(), 1);
    }

    #[test]
    fn update_unknown_subscription_fails() {
        let (store, _dir) = create_test_store();
        let mut sub = subscription();
        assert!(matches!(
            store.update_subscription(&mut sub),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn stale_update_is_rejected() {
        let (store, _dir) = create_test_store();
        let sub = subscription();
        store.insert_subscription(&sub).unwrap();

        let mut first = store.get_subscription(&sub.id()).unwrap().unwrap();
        let mut second = first.clone();

        first.record_api_usage(1, now()).unwrap();
        store.update_subscription(&mut first).unwrap();

        second.record_api_usage(5, now()).unwrap();
        let err = store.update_subscription(&mut second).unwrap_err();
        assert!(matches!(
            err,
            StoreError::VersionConflict {
                expected: 0,
                found: 1
            }
        ));
        assert!(err.is_conflict());
        assert_eq!(second.version(), 0);

        let stored = store.get_subscription(&sub.id()).unwrap().unwrap();
        assert_eq!(stored.current_period_usage().api_calls, 1);
    }

    #[test]
    fn cycles_listed_newest_first() {
        let (store, _dir) = create_test_store();
        let sub = subscription();
        store.insert_subscription(&sub).unwrap();

        let first = cycle_for(&sub, 0);
        store.insert_billing_cycle(&first).unwrap();

        let second = cycle_for(&sub, 30);
        store.insert_billing_cycle(&second).unwrap();

        let other = subscription();
        store.insert_billing_cycle(&cycle_for(&other, 0)).unwrap();

        let cycles = store.list_cycles_by_subscription(&sub.id(), 10, 0).unwrap();
        assert_eq!(cycles.len(), 2);
        assert_eq!(cycles[0].id(), second.id());
        assert_eq!(cycles[1].id(), first.id());

        // Pagination
        let page2 = store.list_cycles_by_subscription(&sub.id(), 1, 1).unwrap();
        assert_eq!(page2.len(), 1);
        assert_eq!(page2[0].id(), first.id());
    }

    #[test]
    fn one_cycle_per_period() {
        let (store, _dir) = create_test_store();
        let sub = subscription();
        store.insert_subscription(&sub).unwrap();

        let january = cycle_for(&sub, 0);
        assert!(store.insert_billing_cycle_if_absent(&january).unwrap().is_none());

        // A second opener for the same period gets the stored cycle back.
        let duplicate = cycle_for(&sub, 0);
        let existing = store
            .insert_billing_cycle_if_absent(&duplicate)
            .unwrap()
            .unwrap();
        assert_eq!(existing.id(), january.id());
        assert!(store.get_billing_cycle(&duplicate.id()).unwrap().is_none());

        assert!(matches!(
            store.insert_billing_cycle(&cycle_for(&sub, 0)),
            Err(StoreError::AlreadyExists { .. })
        ));

        // The next period and other subscriptions are unaffected.
        assert!(store
            .insert_billing_cycle_if_absent(&cycle_for(&sub, 30))
            .unwrap()
            .is_none());
        let other = subscription();
        store.insert_billing_cycle(&cycle_for(&other, 0)).unwrap();

        assert_eq!(store.list_cycles_by_subscription(&sub.id(), 10, 0).unwrap().len(), 2);
    }

    #[test]
    fn concurrent_openers_share_one_cycle() {
        let (store, _dir) = create_test_store();
        let store = Arc::new(store);
        let sub = subscription();
        store.insert_subscription(&sub).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let candidate = cycle_for(&sub, 0);
                std::thread::spawn(move || store.insert_billing_cycle_if_absent(&candidate).unwrap())
            })
            .collect();
        let inserted = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(Option::is_none)
            .count();

        assert_eq!(inserted, 1);
        assert_eq!(store.list_cycles_by_subscription(&sub.id(), 10, 0).unwrap().len(), 1);
    }

    #[test]
    fn settlement_commits_both_or_neither() {
        let (store, _dir) = create_test_store();
        let sub = subscription();
        store.insert_subscription(&sub).unwrap();
        let cycle = cycle_for(&sub, 0);
        store.insert_billing_cycle(&cycle).unwrap();

        // A concurrent writer bumps the subscription first.
        let mut concurrent = sub.clone();
        store.update_subscription(&mut concurrent).unwrap();

        let mut stale_sub = sub.clone();
        let mut settling = cycle.clone();
        settling.mark_as_processing(now()).unwrap();
        let err = store
            .commit_settlement(&mut settling, &mut stale_sub)
            .unwrap_err();
        assert!(err.is_conflict());

        let stored_cycle = store.get_billing_cycle(&cycle.id()).unwrap().unwrap();
        assert_eq!(stored_cycle.status(), BillingCycleStatus::Pending);
        assert_eq!(stored_cycle.version(), 0);

        // With fresh copies the same settlement lands.
        let mut fresh_sub = store.get_subscription(&sub.id()).unwrap().unwrap();
        let mut settling = store.get_billing_cycle(&cycle.id()).unwrap().unwrap();
        settling.mark_as_processing(now()).unwrap();
        settling.calculate_charges(&fresh_sub).unwrap();
        settling.mark_as_completed(now()).unwrap();
        fresh_sub.renew(UserId::generate(), now()).unwrap();
        store
            .commit_settlement(&mut settling, &mut fresh_sub)
            .unwrap();
        assert_eq!(settling.version(), 1);
        assert_eq!(fresh_sub.version(), 2);

        let stored_cycle = store.get_billing_cycle(&cycle.id()).unwrap().unwrap();
        assert_eq!(stored_cycle.status(), BillingCycleStatus::Completed);
        let stored_sub = store.get_subscription(&sub.id()).unwrap().unwrap();
        assert_eq!(stored_sub.end_date(), fresh_sub.end_date());
    }

    #[test]
    fn tenant_cycles_by_business() {
        let (store, _dir) = create_test_store();
        let business_id = BusinessId::generate();
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        let mut january = TenantBillingCycle::open(
            business_id,
            TenantCyclePeriod::Monthly,
            start,
            Currency::Eur,
            now(),
        )
        .unwrap();
        store.insert_tenant_cycle(&january).unwrap();

        january
            .add_usage(&NotificationCost::from_sms_count(2).unwrap(), now())
            .unwrap();
        store.update_tenant_cycle(&mut january).unwrap();

        let stored = store.get_tenant_cycle(&january.id()).unwrap().unwrap();
        assert_eq!(stored.sms_count(), 2);
        assert_eq!(stored.version(), 1);

        let listed = store
            .list_tenant_cycles_by_business(&business_id, 10, 0)
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert!(store
            .list_tenant_cycles_by_business(&BusinessId::generate(), 10, 0)
            .unwrap()
            .is_empty());
    }
}
