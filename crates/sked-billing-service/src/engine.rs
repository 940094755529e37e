//! The billing engine.
//!
//! [`BillingEngine`] loads entities from a [`Store`], applies one domain
//! operation and writes the result back. Every mutating operation runs inside
//! a conflict loop: when another writer got there first the store reports a
//! version conflict, and the operation reloads and reapplies itself against
//! fresh state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use sked_billing_core::{
    BillingCycle, BillingCycleId, BillingCycleStatus, BillingFrequency, BusinessId, Clock, Cost,
    NewSubscription, NotificationCost, Plan, Subscription, SubscriptionEvent, SubscriptionId,
    SubscriptionStatus, TenantBillingCycle, TenantCycleId, TenantCyclePeriod, UsageRecord, UserId,
};
use sked_billing_store::Store;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

/// Outcome of one scheduled billing run.
#[derive(Debug, Clone, Serialize)]
pub struct BillingRunSummary {
    /// When the run started.
    pub run_at: DateTime<Utc>,
    /// Subscriptions that were due.
    pub due: usize,
    /// Cycles settled by this run.
    pub completed: Vec<BillingCycleId>,
    /// Subscriptions whose settlement failed.
    pub failed: Vec<BillingRunFailure>,
    /// Subscriptions left alone because their cycle awaits a manual retry.
    pub skipped: Vec<SubscriptionId>,
}

/// A subscription the run could not settle.
#[derive(Debug, Clone, Serialize)]
pub struct BillingRunFailure {
    /// The subscription.
    pub subscription_id: SubscriptionId,
    /// Why settlement failed.
    pub reason: String,
}

enum Settlement {
    Closed(BillingCycle),
    Skipped,
}

/// Applies billing operations against a store.
pub struct BillingEngine<S: Store> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl<S: Store> BillingEngine<S> {
    /// Create an engine.
    #[must_use]
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Create and persist a subscription.
    ///
    /// # Errors
    ///
    /// Returns domain validation errors and store failures.
    pub fn start_subscription(
        &self,
        business_id: BusinessId,
        plan: Plan,
        billing_frequency: BillingFrequency,
        trial_days: u32,
        actor: UserId,
    ) -> Result<Subscription> {
        let subscription = Subscription::create(
            NewSubscription {
                business_id,
                plan,
                billing_frequency,
                trial_days,
                created_by: actor,
            },
            self.clock.now(),
        )?;
        self.store.insert_subscription(&subscription)?;

        tracing::info!(
            subscription_id = %subscription.id(),
            business_id = %business_id,
            plan = %subscription.plan().name(),
            status = %subscription.status(),
            "Subscription started"
        );
        Ok(subscription)
    }

    /// End the trial of a subscription.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless the subscription is trialing.
    pub fn activate(&self, id: &SubscriptionId, actor: UserId) -> Result<Subscription> {
        self.mutate_subscription("activate", id, |subscription, now| {
            subscription.activate(actor, now)
        })
    }

    /// Suspend a subscription.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` from canceled, suspended or expired.
    pub fn suspend(&self, id: &SubscriptionId, actor: UserId) -> Result<Subscription> {
        self.mutate_subscription("suspend", id, |subscription, now| {
            subscription.suspend(actor, now)
        })
    }

    /// Cancel a subscription, either now or at the end of the paid period.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if it is already canceled.
    pub fn cancel(
        &self,
        id: &SubscriptionId,
        immediately: bool,
        actor: UserId,
    ) -> Result<Subscription> {
        let subscription = self.mutate_subscription("cancel", id, |subscription, now| {
            subscription.cancel(immediately, actor, now)
        })?;
        tracing::info!(subscription_id = %id, immediately, "Subscription canceled");
        Ok(subscription)
    }

    /// Move a subscription to another plan.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless active and `PlanLimitExceeded` when
    /// the current footprint does not fit.
    pub fn change_plan(
        &self,
        id: &SubscriptionId,
        plan: Plan,
        actor: UserId,
    ) -> Result<Subscription> {
        let subscription = self.mutate_subscription("change_plan", id, |subscription, now| {
            subscription.change_plan(plan.clone(), actor, now)
        })?;
        tracing::info!(
            subscription_id = %id,
            plan = %subscription.plan().name(),
            "Subscription plan changed"
        );
        Ok(subscription)
    }

    /// Record a usage observation on a subscription's current period.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for overflowing or malformed values.
    pub fn record_usage(&self, id: &SubscriptionId, record: UsageRecord) -> Result<Subscription> {
        let subscription = self.mutate_subscription("record_usage", id, |subscription, now| {
            subscription.record_usage(record, now)
        })?;
        tracing::debug!(subscription_id = %id, ?record, "Usage recorded");
        Ok(subscription)
    }

    /// The extra charge for switching to `plan` right now.
    ///
    /// # Errors
    ///
    /// Returns `SubscriptionNotFound` and currency mismatches.
    pub fn preview_upgrade(&self, id: &SubscriptionId, plan: &Plan) -> Result<Cost> {
        let subscription = self.load_subscription(id)?;
        Ok(subscription.calculate_proration_for_upgrade(plan, self.clock.now())?)
    }

    /// Fetch a subscription.
    ///
    /// # Errors
    ///
    /// Returns `SubscriptionNotFound` for an unknown id.
    pub fn subscription(&self, id: &SubscriptionId) -> Result<Subscription> {
        self.load_subscription(id)
    }

    // =========================================================================
    // Billing cycles
    // =========================================================================

    /// Open the billing cycle for a subscription's current period.
    ///
    /// Returns the existing cycle when one already covers the current
    /// period, so concurrent and repeated calls share a single cycle.
    ///
    /// # Errors
    ///
    /// Returns `SubscriptionNotFound` and store failures.
    pub fn open_cycle(&self, subscription_id: &SubscriptionId) -> Result<BillingCycle> {
        let subscription = self.load_subscription(subscription_id)?;
        let cycle = BillingCycle::from_subscription(
            &subscription,
            subscription.current_period_start(),
            subscription.end_date(),
            self.clock.now(),
        )?;

        if let Some(existing) = self.store.insert_billing_cycle_if_absent(&cycle)? {
            return Ok(existing);
        }

        tracing::info!(
            cycle_id = %cycle.id(),
            subscription_id = %subscription_id,
            start = %cycle.start_date(),
            end = %cycle.end_date(),
            "Billing cycle opened"
        );
        Ok(cycle)
    }

    /// Settle a cycle.
    ///
    /// Copies the subscription's period usage into a pending cycle, computes
    /// charges and completes it. On success the subscription is renewed in
    /// the same write. When the charges cannot be computed the cycle is
    /// marked failed with the reason and the subscription is left untouched.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless the cycle is pending, plus lookup
    /// and store failures.
    pub fn close_cycle(&self, id: &BillingCycleId) -> Result<BillingCycle> {
        self.with_retries("close_cycle", |now| {
            let mut cycle = self.load_cycle(id)?;
            let mut subscription = self.load_subscription(&cycle.subscription_id())?;

            if cycle.status() == BillingCycleStatus::Pending {
                cycle.sync_usage(*subscription.current_period_usage(), now)?;
            }
            cycle.mark_as_processing(now)?;

            match cycle.calculate_charges(&subscription) {
                Ok(charges) => {
                    cycle.mark_as_completed(now)?;
                    if subscription.status().on(SubscriptionEvent::Renew).is_some() {
                        subscription.renew(UserId::system(), now)?;
                        self.store.commit_settlement(&mut cycle, &mut subscription)?;
                    } else {
                        self.store.update_billing_cycle(&mut cycle)?;
                    }
                    tracing::info!(
                        cycle_id = %id,
                        subscription_id = %subscription.id(),
                        total = %charges.total_cost,
                        "Billing cycle completed"
                    );
                }
                Err(err) => {
                    cycle.mark_as_failed(err.to_string(), now)?;
                    self.store.update_billing_cycle(&mut cycle)?;
                    tracing::warn!(cycle_id = %id, error = %err, "Billing cycle failed");
                }
            }
            Ok(cycle)
        })
    }

    /// Return a failed cycle to pending.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` from processing, completed or refunded.
    pub fn retry_cycle(&self, id: &BillingCycleId) -> Result<BillingCycle> {
        self.mutate_cycle("retry_cycle", id, BillingCycle::retry)
    }

    /// Refund a completed cycle.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless the cycle is completed.
    pub fn refund_cycle(&self, id: &BillingCycleId) -> Result<BillingCycle> {
        let cycle = self.mutate_cycle("refund_cycle", id, BillingCycle::refund)?;
        tracing::info!(cycle_id = %id, "Billing cycle refunded");
        Ok(cycle)
    }

    /// Projected total of a cycle at the current rate of usage.
    ///
    /// A pending cycle is projected from the subscription's usage so far;
    /// nothing is written.
    ///
    /// # Errors
    ///
    /// Returns lookup failures and money overflow.
    pub fn predict_cycle_cost(&self, id: &BillingCycleId) -> Result<Cost> {
        let now = self.clock.now();
        let mut cycle = self.load_cycle(id)?;
        let subscription = self.load_subscription(&cycle.subscription_id())?;
        if cycle.status() == BillingCycleStatus::Pending {
            cycle.sync_usage(*subscription.current_period_usage(), now)?;
        }
        Ok(cycle.predict_total_cost(&subscription, now)?)
    }

    /// Fetch a billing cycle.
    ///
    /// # Errors
    ///
    /// Returns `CycleNotFound` for an unknown id.
    pub fn cycle(&self, id: &BillingCycleId) -> Result<BillingCycle> {
        self.load_cycle(id)
    }

    /// The cycles of a subscription, newest first.
    ///
    /// # Errors
    ///
    /// Returns store failures.
    pub fn cycles(
        &self,
        subscription_id: &SubscriptionId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<BillingCycle>> {
        Ok(self
            .store
            .list_cycles_by_subscription(subscription_id, limit, offset)?)
    }

    /// Settle every subscription whose billing date has passed.
    ///
    /// Only active and past-due subscriptions are considered. A due
    /// subscription whose current cycle failed is skipped until the cycle is
    /// retried. Running twice at the same instant settles nothing the second
    /// time, since settlement moves the billing date forward.
    ///
    /// # Errors
    ///
    /// Returns an error only if the subscriptions cannot be listed; per
    /// subscription failures are reported in the summary.
    pub fn run_billing(&self) -> Result<BillingRunSummary> {
        let run_at = self.clock.now();
        let due: Vec<SubscriptionId> = self
            .store
            .list_subscriptions()?
            .into_iter()
            .filter(|s| {
                matches!(
                    s.status(),
                    SubscriptionStatus::Active | SubscriptionStatus::PastDue
                ) && s.next_billing_date() <= run_at
            })
            .map(|s| s.id())
            .collect();

        let mut summary = BillingRunSummary {
            run_at,
            due: due.len(),
            completed: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
        };

        for subscription_id in due {
            match self.settle_due(&subscription_id) {
                Ok(Settlement::Closed(cycle)) => {
                    if cycle.status() == BillingCycleStatus::Completed {
                        summary.completed.push(cycle.id());
                    } else {
                        summary.failed.push(BillingRunFailure {
                            subscription_id,
                            reason: cycle.failure_reason().unwrap_or_default().to_string(),
                        });
                    }
                }
                Ok(Settlement::Skipped) => summary.skipped.push(subscription_id),
                Err(err) => {
                    tracing::error!(subscription_id = %subscription_id, error = %err, "Settlement failed");
                    summary.failed.push(BillingRunFailure {
                        subscription_id,
                        reason: err.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            due = summary.due,
            completed = summary.completed.len(),
            failed = summary.failed.len(),
            skipped = summary.skipped.len(),
            "Billing run finished"
        );
        Ok(summary)
    }

    /// Open the current cycle of a due subscription and close it if pending.
    fn settle_due(&self, subscription_id: &SubscriptionId) -> Result<Settlement> {
        let cycle = self.open_cycle(subscription_id)?;
        if cycle.status() == BillingCycleStatus::Pending {
            return self.close_cycle(&cycle.id()).map(Settlement::Closed);
        }
        tracing::debug!(
            cycle_id = %cycle.id(),
            status = %cycle.status(),
            "Current cycle is not pending, skipping"
        );
        Ok(Settlement::Skipped)
    }

    // =========================================================================
    // Tenant cycles
    // =========================================================================

    /// Open a notification accounting cycle for a business.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an out-of-range period.
    pub fn open_tenant_cycle(
        &self,
        business_id: BusinessId,
        period: TenantCyclePeriod,
        start: DateTime<Utc>,
    ) -> Result<TenantBillingCycle> {
        let cycle = TenantBillingCycle::open(
            business_id,
            period,
            start,
            self.config.currency,
            self.clock.now(),
        )?;
        self.store.insert_tenant_cycle(&cycle)?;
        tracing::info!(
            tenant_cycle_id = %cycle.id(),
            business_id = %business_id,
            "Tenant cycle opened"
        );
        Ok(cycle)
    }

    /// Add notification usage to an active tenant cycle.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` once the cycle is closed and
    /// `CurrencyMismatch` for foreign-currency usage.
    pub fn add_tenant_usage(
        &self,
        id: &TenantCycleId,
        usage: &NotificationCost,
    ) -> Result<TenantBillingCycle> {
        self.mutate_tenant_cycle("add_tenant_usage", id, |cycle, now| {
            cycle.add_usage(usage, now)
        })
    }

    /// Finalize a tenant cycle.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless the cycle is active.
    pub fn finalize_tenant_cycle(&self, id: &TenantCycleId) -> Result<TenantBillingCycle> {
        let cycle =
            self.mutate_tenant_cycle("finalize_tenant_cycle", id, TenantBillingCycle::finalize)?;
        tracing::info!(
            tenant_cycle_id = %id,
            total = %cycle.total_cost(),
            "Tenant cycle finalized"
        );
        Ok(cycle)
    }

    /// Cancel a tenant cycle.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless the cycle is active.
    pub fn cancel_tenant_cycle(&self, id: &TenantCycleId) -> Result<TenantBillingCycle> {
        self.mutate_tenant_cycle("cancel_tenant_cycle", id, TenantBillingCycle::cancel)
    }

    /// Fetch a tenant cycle.
    ///
    /// # Errors
    ///
    /// Returns `TenantCycleNotFound` for an unknown id.
    pub fn tenant_cycle(&self, id: &TenantCycleId) -> Result<TenantBillingCycle> {
        self.load_tenant_cycle(id)
    }

    /// The tenant cycles of a business, newest first.
    ///
    /// # Errors
    ///
    /// Returns store failures.
    pub fn tenant_cycles(
        &self,
        business_id: &BusinessId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<TenantBillingCycle>> {
        Ok(self
            .store
            .list_tenant_cycles_by_business(business_id, limit, offset)?)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Run `attempt` until it stops hitting version conflicts.
    fn with_retries<T>(
        &self,
        operation: &'static str,
        mut attempt: impl FnMut(DateTime<Utc>) -> Result<T>,
    ) -> Result<T> {
        let attempts = self.config.max_conflict_retries.saturating_add(1);
        for n in 1..=attempts {
            match attempt(self.clock.now()) {
                Err(err) if err.is_conflict() => {
                    tracing::warn!(operation, attempt = n, "Version conflict, reloading");
                }
                outcome => return outcome,
            }
        }
        Err(EngineError::ConflictRetriesExhausted {
            operation,
            attempts,
        })
    }

    fn mutate_subscription(
        &self,
        operation: &'static str,
        id: &SubscriptionId,
        mut apply: impl FnMut(&mut Subscription, DateTime<Utc>) -> sked_billing_core::Result<()>,
    ) -> Result<Subscription> {
        self.with_retries(operation, |now| {
            let mut subscription = self.load_subscription(id)?;
            apply(&mut subscription, now)?;
            self.store.update_subscription(&mut subscription)?;
            Ok(subscription)
        })
    }

    fn mutate_cycle(
        &self,
        operation: &'static str,
        id: &BillingCycleId,
        mut apply: impl FnMut(&mut BillingCycle, DateTime<Utc>) -> sked_billing_core::Result<()>,
    ) -> Result<BillingCycle> {
        self.with_retries(operation, |now| {
            let mut cycle = self.load_cycle(id)?;
            apply(&mut cycle, now)?;
            self.store.update_billing_cycle(&mut cycle)?;
            Ok(cycle)
        })
    }

    fn mutate_tenant_cycle(
        &self,
        operation: &'static str,
        id: &TenantCycleId,
        mut apply: impl FnMut(&mut TenantBillingCycle, DateTime<Utc>) -> sked_billing_core::Result<()>,
    ) -> Result<TenantBillingCycle> {
        self.with_retries(operation, |now| {
            let mut cycle = self.load_tenant_cycle(id)?;
            apply(&mut cycle, now)?;
            self.store.update_tenant_cycle(&mut cycle)?;
            Ok(cycle)
        })
    }

    fn load_subscription(&self, id: &SubscriptionId) -> Result<Subscription> {
        self.store
            .get_subscription(id)?
            .ok_or(EngineError::SubscriptionNotFound(*id))
    }

    fn load_cycle(&self, id: &BillingCycleId) -> Result<BillingCycle> {
        self.store
            .get_billing_cycle(id)?
            .ok_or(EngineError::CycleNotFound(*id))
    }

    fn load_tenant_cycle(&self, id: &TenantCycleId) -> Result<TenantBillingCycle> {
        self.store
            .get_tenant_cycle(id)?
            .ok_or(EngineError::TenantCycleNotFound(*id))
    }
}
