//! Identifier types for sked-billing.
//!
//! Tenants and users come from the scheduling backend and are UUIDs.
//! Billing entities created here use ULIDs so that keys sort by creation time.
//! ULIDs are drawn from one process-wide monotonic generator: two ids minted
//! in the same millisecond still compare in the order they were created.

use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use ulid::{Generator, Ulid};
use uuid::Uuid;

static ULID_GENERATOR: Mutex<Generator> = Mutex::new(Generator::new());

/// The next ULID, strictly greater than every ULID minted before it in this
/// process.
fn next_ulid() -> Ulid {
    let mut generator = ULID_GENERATOR
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    // The random part only overflows after 2^80 ids in one millisecond.
    generator.generate().unwrap_or_else(|_| Ulid::new())
}

/// Declare an id newtype.
///
/// `uuid` ids wrap an external UUID; `ulid` ids are minted here and expose a
/// fixed 16-byte form for ordered storage keys. Both serialize as strings.
macro_rules! id_newtype {
    (uuid $name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(Uuid);

        impl $name {
            /// A fresh random id.
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            /// The 16 raw bytes.
            #[must_use]
            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }
        }

        id_newtype!(@text $name, |s: &str| Uuid::parse_str(s).map_err(|_| IdError::InvalidUuid));
    };

    (ulid $name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(Ulid);

        impl $name {
            /// A new id, ordered after every id generated before it.
            #[must_use]
            pub fn generate() -> Self {
                Self(next_ulid())
            }

            /// The 16-byte big-endian form.
            #[must_use]
            pub fn to_bytes(&self) -> [u8; 16] {
                self.0.to_bytes()
            }

            /// Rebuild an id from [`Self::to_bytes`].
            #[must_use]
            pub fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Ulid::from_bytes(bytes))
            }
        }

        id_newtype!(@text $name, |s: &str| Ulid::from_string(s).map_err(|_| IdError::InvalidUlid));
    };

    (@text $name:ident, $parse:expr) => {
        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                ($parse)(s).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0.to_string()
            }
        }
    };
}

id_newtype!(uuid BusinessId, "A tenant (business) identifier from the scheduling backend.");
id_newtype!(uuid UserId, "A back-office user identifier, recorded as `created_by`/`updated_by`.");

id_newtype!(ulid SubscriptionId, "A subscription identifier.");
id_newtype!(
    ulid BillingCycleId,
    "A subscription billing cycle identifier.\n\nCycles of a subscription list in the order they were opened."
);
id_newtype!(ulid TenantCycleId, "A tenant-scoped billing cycle identifier.");

impl UserId {
    /// The identity recorded for changes made by scheduled billing runs.
    #[must_use]
    pub const fn system() -> Self {
        Self(Uuid::nil())
    }
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input is not a valid UUID.
    #[error("invalid UUID format")]
    InvalidUuid,

    /// The input is not a valid ULID.
    #[error("invalid ULID format")]
    InvalidUlid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_id_roundtrip() {
        let id = BusinessId::generate();
        let parsed = BusinessId::from_str(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn business_id_rejects_garbage() {
        assert_eq!(
            BusinessId::from_str("not-a-uuid"),
            Err(IdError::InvalidUuid)
        );
    }

    #[test]
    fn subscription_id_serde_json() {
        let id = SubscriptionId::generate();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let parsed: SubscriptionId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn billing_cycle_id_bytes_roundtrip() {
        let id = BillingCycleId::generate();
        assert_eq!(BillingCycleId::from_bytes(id.to_bytes()), id);
    }

    #[test]
    fn ulid_ids_increase_within_a_millisecond() {
        let ids: Vec<BillingCycleId> = (0..1000).map(|_| BillingCycleId::generate()).collect();
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(ids
            .windows(2)
            .all(|pair| pair[0].to_bytes() < pair[1].to_bytes()));
    }

    #[test]
    fn ulid_ids_reject_uuid_strings() {
        let uuid = Uuid::new_v4().to_string();
        assert_eq!(TenantCycleId::from_str(&uuid), Err(IdError::InvalidUlid));
    }

    #[test]
    fn debug_names_the_type() {
        let id = UserId::generate();
        assert!(format!("{id:?}").starts_with("UserId("));
        assert_eq!(format!("{:?}", UserId::system()), format!("UserId({})", Uuid::nil()));
    }
}
