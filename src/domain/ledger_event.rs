//! Domain events published after a ledger transaction commits.
//!
//! Events are never emitted for rolled-back work. Subscribers (the
//! notifier, tests) receive them through the [`super::EventBus`].

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{
    GuideProfileId, ProductId, RecyclingId, RedemptionId, ReservationId, SessionId, SessionKind,
    StoreId, UserId,
};

/// Fact recorded by a committed ledger transaction.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// Points were debited for a product.
    PointsRedeemed {
        /// Redemption entry created.
        redemption_id: RedemptionId,
        /// User debited.
        user_id: UserId,
        /// Store that handed out the product.
        store_id: StoreId,
        /// Product redeemed.
        product_id: ProductId,
        /// Units redeemed.
        quantity: i64,
        /// Points debited.
        points_spent: i64,
        /// Balance after the debit.
        new_balance: i64,
        /// Stock after the decrement.
        remaining_stock: i64,
        /// Commit timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Points were credited for a recycling drop-off.
    PointsEarned {
        /// Recycling entry created.
        recycling_id: RecyclingId,
        /// User credited.
        user_id: UserId,
        /// Store that received the material.
        store_id: StoreId,
        /// Points credited.
        points_awarded: i64,
        /// Balance after the credit.
        new_balance: i64,
        /// Commit timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A product's stock was replenished.
    StockReplenished {
        /// Product restocked.
        product_id: ProductId,
        /// Units added.
        quantity: i64,
        /// Stock after the increment.
        new_stock: i64,
        /// Commit timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A QR session was opened by a store.
    SessionOpened {
        /// Session token.
        session_id: SessionId,
        /// Redemption or recycling.
        kind: SessionKind,
        /// Store that opened it.
        store_id: StoreId,
        /// Confirmation deadline.
        expires_at: DateTime<Utc>,
    },

    /// A QR session was confirmed by a user.
    SessionConfirmed {
        /// Session token.
        session_id: SessionId,
        /// Redemption or recycling.
        kind: SessionKind,
        /// Confirming user.
        user_id: UserId,
        /// Commit timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A QR session was found past its deadline and closed.
    SessionExpired {
        /// Session token.
        session_id: SessionId,
        /// Redemption or recycling.
        kind: SessionKind,
        /// Commit timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A reservation changed state (including creation).
    ReservationChanged {
        /// Reservation affected.
        reservation_id: ReservationId,
        /// Guide booked.
        guide_profile_id: GuideProfileId,
        /// New state label.
        state: String,
        /// New payment label.
        payment_state: String,
        /// Commit timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl LedgerEvent {
    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::PointsRedeemed { .. } => "points_redeemed",
            Self::PointsEarned { .. } => "points_earned",
            Self::StockReplenished { .. } => "stock_replenished",
            Self::SessionOpened { .. } => "session_opened",
            Self::SessionConfirmed { .. } => "session_confirmed",
            Self::SessionExpired { .. } => "session_expired",
            Self::ReservationChanged { .. } => "reservation_changed",
        }
    }

    /// Returns the user the event concerns, if any.
    #[must_use]
    pub const fn user_id(&self) -> Option<UserId> {
        match self {
            Self::PointsRedeemed { user_id, .. }
            | Self::PointsEarned { user_id, .. }
            | Self::SessionConfirmed { user_id, .. } => Some(*user_id),
            _ => None,
        }
    }
}
