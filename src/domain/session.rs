//! Single-use QR sessions for in-person redemption and recycling.
//!
//! A store creates a session; the user's device scans the token and
//! confirms it. The state machine is
//!
//! ```text
//! PENDING ──confirm──▶ CONFIRMED
//!    │
//!    └────expire─────▶ EXPIRED
//! ```
//!
//! Both target states are terminal. Expiry is evaluated lazily when a
//! confirmation is attempted.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{ObjectTypeId, ProductId, SessionId, StoreId, UserId};
use crate::error::LedgerError;

/// Lifecycle state of a QR session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Created and waiting for a scan.
    Pending,
    /// Fulfilled by a user.
    Confirmed,
    /// Scanned after its deadline.
    Expired,
}

impl SessionState {
    /// Stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Expired => "EXPIRED",
        }
    }

    /// Returns `true` for states that admit no further transition.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionState {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "CONFIRMED" => Ok(Self::Confirmed),
            "EXPIRED" => Ok(Self::Expired),
            other => Err(LedgerError::Internal(format!(
                "unknown session state {other:?}"
            ))),
        }
    }
}

/// Which of the two session tables a session lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// Product redemption ("sesión de canje").
    Redemption,
    /// Recycling drop-off ("sesión de reciclaje").
    Recycling,
}

/// What a redemption session promises: `quantity` units of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionTerms {
    /// Product to hand out.
    pub product_id: ProductId,
    /// Units to hand out.
    pub quantity: i64,
}

/// What a recycling session records: a measured weight of a material.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecyclingTerms {
    /// Material received.
    pub object_type_id: ObjectTypeId,
    /// Weight measured by the store.
    pub weight: f64,
}

/// A QR session parameterized over its terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrSession<T> {
    /// Opaque token printed into the QR code.
    pub id: SessionId,
    /// Store that created the session.
    pub store_id: StoreId,
    /// Kind-specific terms.
    pub terms: T,
    /// Points quoted when the session was created.
    pub points_required: i64,
    /// Current lifecycle state.
    pub state: SessionState,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Deadline for confirmation.
    pub expires_at: DateTime<Utc>,
    /// User who confirmed, once confirmed.
    pub confirmed_by: Option<UserId>,
    /// Confirmation timestamp, once confirmed.
    pub confirmed_at: Option<DateTime<Utc>>,
}

/// Session for redeeming a product.
pub type RedemptionSession = QrSession<RedemptionTerms>;

/// Session for recording a recycling drop-off.
pub type RecyclingSession = QrSession<RecyclingTerms>;

impl<T> QrSession<T> {
    /// Opens a new pending session valid for `ttl` from `now`.
    #[must_use]
    pub fn open(
        store_id: StoreId,
        terms: T,
        points_required: i64,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id: SessionId::new(),
            store_id,
            terms,
            points_required,
            state: SessionState::Pending,
            created_at: now,
            expires_at: now + ttl,
            confirmed_by: None,
            confirmed_at: None,
        }
    }

    /// Returns `true` once `now` is strictly past the deadline.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Fails unless the session is still pending.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::SessionNotPending`] for terminal sessions.
    pub fn ensure_pending(&self) -> Result<(), LedgerError> {
        if self.state == SessionState::Pending {
            Ok(())
        } else {
            Err(LedgerError::SessionNotPending(self.id))
        }
    }

    /// Transitions `PENDING -> EXPIRED`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::SessionNotPending`] for terminal sessions.
    pub fn expire(&mut self) -> Result<(), LedgerError> {
        self.ensure_pending()?;
        self.state = SessionState::Expired;
        Ok(())
    }

    /// Transitions `PENDING -> CONFIRMED`, stamping the confirming user.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::SessionNotPending`] for terminal sessions.
    pub fn confirm(&mut self, user_id: UserId, now: DateTime<Utc>) -> Result<(), LedgerError> {
        self.ensure_pending()?;
        self.state = SessionState::Confirmed;
        self.confirmed_by = Some(user_id);
        self.confirmed_at = Some(now);
        Ok(())
    }

    /// Checks an optional caller-supplied store id against the session.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ValidationFailed`] on mismatch.
    pub fn check_store(&self, claimed: Option<StoreId>) -> Result<(), LedgerError> {
        match claimed {
            Some(store_id) if store_id != self.store_id => Err(LedgerError::ValidationFailed(
                "store id does not match the session".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

impl RedemptionSession {
    /// Checks the caller's view of the terms against the stored terms.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ValidationFailed`] naming the first
    /// mismatching field.
    pub fn check_terms(&self, claimed: &RedemptionTerms) -> Result<(), LedgerError> {
        if claimed.product_id != self.terms.product_id {
            return Err(LedgerError::ValidationFailed(
                "product id does not match the session".to_string(),
            ));
        }
        if claimed.quantity != self.terms.quantity {
            return Err(LedgerError::ValidationFailed(
                "quantity does not match the session".to_string(),
            ));
        }
        Ok(())
    }
}

impl RecyclingSession {
    /// Checks the caller's view of the terms against the stored terms.
    ///
    /// Weights must match exactly.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ValidationFailed`] naming the first
    /// mismatching field.
    #[allow(clippy::float_cmp)]
    pub fn check_terms(&self, claimed: &RecyclingTerms) -> Result<(), LedgerError> {
        if claimed.object_type_id != self.terms.object_type_id {
            return Err(LedgerError::ValidationFailed(
                "object type does not match the session".to_string(),
            ));
        }
        if claimed.weight != self.terms.weight {
            return Err(LedgerError::ValidationFailed(
                "weight does not match the session".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn pending(now: DateTime<Utc>) -> RedemptionSession {
        QrSession::open(
            StoreId::new(1),
            RedemptionTerms {
                product_id: ProductId::new(2),
                quantity: 2,
            },
            300,
            now,
            Duration::minutes(1),
        )
    }

    #[test]
    fn new_session_is_pending_until_deadline() {
        let now = Utc::now();
        let session = pending(now);
        assert_eq!(session.state, SessionState::Pending);
        assert!(!session.is_expired_at(now));
        assert!(!session.is_expired_at(now + Duration::minutes(1)));
        assert!(session.is_expired_at(now + Duration::minutes(2)));
    }

    #[test]
    fn confirm_is_single_use() {
        let now = Utc::now();
        let mut session = pending(now);
        assert!(session.confirm(UserId::new(9), now).is_ok());
        assert_eq!(session.confirmed_by, Some(UserId::new(9)));
        assert!(matches!(
            session.confirm(UserId::new(10), now),
            Err(LedgerError::SessionNotPending(_))
        ));
        assert!(session.expire().is_err());
    }

    #[test]
    fn expired_session_is_terminal() {
        let mut session = pending(Utc::now());
        assert!(session.expire().is_ok());
        assert!(session.state.is_terminal());
        assert!(session.confirm(UserId::new(1), Utc::now()).is_err());
    }

    #[test]
    fn mismatching_terms_are_rejected() {
        let session = pending(Utc::now());
        let wrong_quantity = RedemptionTerms {
            product_id: ProductId::new(2),
            quantity: 3,
        };
        assert!(session.check_terms(&wrong_quantity).is_err());
        assert!(session.check_store(Some(StoreId::new(5))).is_err());
        assert!(session.check_store(None).is_ok());
        assert!(session.check_terms(&session.terms).is_ok());
    }

    #[test]
    fn state_round_trips_through_storage_form() {
        for state in [
            SessionState::Pending,
            SessionState::Confirmed,
            SessionState::Expired,
        ] {
            let Ok(parsed) = state.as_str().parse::<SessionState>() else {
                panic!("state should parse");
            };
            assert_eq!(parsed, state);
        }
        assert!("PENDIENTE".parse::<SessionState>().is_err());
    }
}
