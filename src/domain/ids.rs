//! Type-safe entity identifiers.
//!
//! Relational rows are keyed by `BIGSERIAL` columns, wrapped here in
//! newtypes so that a product id can never be passed where a user id is
//! expected. QR sessions are keyed by an opaque UUID v4 token
//! ([`SessionId`]) because the id itself is printed into the QR code.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw database key.
            #[must_use]
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// Returns the raw database key.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

entity_id!(
    /// Identifier of an end-user account holding a points balance.
    UserId
);
entity_id!(
    /// Identifier of a partner store that owns products and receives
    /// recycling drop-offs.
    StoreId
);
entity_id!(
    /// Identifier of a redeemable product.
    ProductId
);
entity_id!(
    /// Identifier of a recyclable object type (reference data).
    ObjectTypeId
);
entity_id!(
    /// Identifier of a recycling ledger entry.
    RecyclingId
);
entity_id!(
    /// Identifier of a redemption ledger entry.
    RedemptionId
);
entity_id!(
    /// Identifier of a points-history snapshot row.
    HistoryId
);
entity_id!(
    /// Identifier of a guide profile (Waylo).
    GuideProfileId
);
entity_id!(
    /// Identifier of a client profile (Waylo).
    ClientProfileId
);
entity_id!(
    /// Identifier of a reservation (Waylo).
    ReservationId
);
entity_id!(
    /// Identifier of a payment transaction recorded for a reservation.
    PaymentId
);

/// Opaque single-use token identifying a QR session.
///
/// Wraps a UUID v4 generated when the store creates the session. The
/// token is what the user's device scans, so it must not be guessable
/// from neighbouring sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(uuid::Uuid);

impl SessionId {
    /// Creates a new random `SessionId` (UUID v4).
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Creates a `SessionId` from an existing [`uuid::Uuid`].
    #[must_use]
    pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner [`uuid::Uuid`].
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<uuid::Uuid> for SessionId {
    fn from(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }
}

impl From<SessionId> for uuid::Uuid {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_unique() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn session_id_displays_as_uuid() {
        let id = SessionId::new();
        let s = id.to_string();
        assert_eq!(s.len(), 36);
        assert!(s.contains('-'));
    }

    #[test]
    fn entity_ids_serialize_transparently() {
        let id = ProductId::new(42);
        let Ok(json) = serde_json::to_string(&id) else {
            panic!("serialization failed");
        };
        assert_eq!(json, "42");

        let Ok(back) = serde_json::from_str::<ProductId>(&json) else {
            panic!("deserialization failed");
        };
        assert_eq!(back, id);
    }

    #[test]
    fn entity_ids_of_different_kinds_keep_raw_value() {
        let user = UserId::from(7);
        let store = StoreId::new(7);
        assert_eq!(user.get(), store.get());
        assert_eq!(i64::from(user), 7);
        assert_eq!(format!("{store}"), "7");
    }
}
