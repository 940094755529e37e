//! Column families of the billing database.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Subscriptions, keyed by `subscription_id` (ULID).
    pub const SUBSCRIPTIONS: &str = "subscriptions";

    /// Billing cycles, keyed by `cycle_id` (ULID).
    pub const BILLING_CYCLES: &str = "billing_cycles";

    /// Index: billing cycles by subscription, keyed by
    /// `subscription_id || cycle_id`. Value is empty.
    pub const CYCLES_BY_SUBSCRIPTION: &str = "cycles_by_subscription";

    /// Index: the billing cycle covering a period, keyed by
    /// `subscription_id || period_start_millis`. Value is the `cycle_id`.
    pub const CYCLES_BY_PERIOD: &str = "cycles_by_period";

    /// Tenant billing cycles, keyed by `tenant_cycle_id` (ULID).
    pub const TENANT_CYCLES: &str = "tenant_cycles";

    /// Index: tenant cycles by business, keyed by
    /// `business_id || tenant_cycle_id`. Value is empty.
    pub const TENANT_CYCLES_BY_BUSINESS: &str = "tenant_cycles_by_business";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::SUBSCRIPTIONS,
        cf::BILLING_CYCLES,
        cf::CYCLES_BY_SUBSCRIPTION,
        cf::CYCLES_BY_PERIOD,
        cf::TENANT_CYCLES,
        cf::TENANT_CYCLES_BY_BUSINESS,
    ]
}
