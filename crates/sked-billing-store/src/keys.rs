//! Key encoding for the column families.
//!
//! Entity keys are the 16 raw bytes of the identifier. Index keys append the
//! child's ULID to the parent's 16 bytes, so a prefix scan yields children in
//! creation order. The period index instead appends the period start, so a
//! point lookup finds the cycle covering a given period.

use sked_billing_core::{BillingCycleId, BusinessId, SubscriptionId, TenantCycleId};

const ID_LEN: usize = 16;

/// Key of a subscription record.
#[must_use]
pub fn subscription_key(id: &SubscriptionId) -> Vec<u8> {
    id.to_bytes().to_vec()
}

/// Key of a billing cycle record.
#[must_use]
pub fn cycle_key(id: &BillingCycleId) -> Vec<u8> {
    id.to_bytes().to_vec()
}

/// Key of a tenant cycle record.
#[must_use]
pub fn tenant_cycle_key(id: &TenantCycleId) -> Vec<u8> {
    id.to_bytes().to_vec()
}

/// Index key `subscription_id (16 bytes) || cycle_id (16 bytes)`.
#[must_use]
pub fn subscription_cycle_key(subscription_id: &SubscriptionId, cycle_id: &BillingCycleId) -> Vec<u8> {
    index_key(&subscription_id.to_bytes(), &cycle_id.to_bytes())
}

/// Prefix for iterating the cycles of a subscription.
#[must_use]
pub fn subscription_cycles_prefix(subscription_id: &SubscriptionId) -> Vec<u8> {
    subscription_id.to_bytes().to_vec()
}

/// Period index key `subscription_id (16 bytes) || period_start_millis (8 bytes, big-endian)`.
#[must_use]
pub fn subscription_period_key(subscription_id: &SubscriptionId, period_start_millis: i64) -> Vec<u8> {
    let mut key = Vec::with_capacity(ID_LEN + 8);
    key.extend_from_slice(&subscription_id.to_bytes());
    key.extend_from_slice(&period_start_millis.to_be_bytes());
    key
}

/// Index key `business_id (16 bytes) || tenant_cycle_id (16 bytes)`.
#[must_use]
pub fn business_tenant_cycle_key(business_id: &BusinessId, cycle_id: &TenantCycleId) -> Vec<u8> {
    index_key(business_id.as_bytes(), &cycle_id.to_bytes())
}

/// Prefix for iterating the tenant cycles of a business.
#[must_use]
pub fn business_tenant_cycles_prefix(business_id: &BusinessId) -> Vec<u8> {
    business_id.as_bytes().to_vec()
}

/// The trailing 16-byte child id of an index key, or `None` if the key is
/// malformed.
#[must_use]
pub fn child_id_bytes(index_key: &[u8]) -> Option<[u8; 16]> {
    if index_key.len() != 2 * ID_LEN {
        return None;
    }
    index_key[ID_LEN..].try_into().ok()
}

fn index_key(parent: &[u8; 16], child: &[u8; 16]) -> Vec<u8> {
    let mut key = Vec::with_capacity(2 * ID_LEN);
    key.extend_from_slice(parent);
    key.extend_from_slice(child);
    key
}
