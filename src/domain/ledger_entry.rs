//! Append-only ledger entries and points-history snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{HistoryId, ObjectTypeId, ProductId, RecyclingId, RedemptionId, StoreId, UserId};

/// A recycling drop-off that earned points ("reciclaje").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecyclingEvent {
    /// Entry identifier.
    pub id: RecyclingId,
    /// User credited.
    pub user_id: UserId,
    /// Store that received the material.
    pub store_id: StoreId,
    /// Material recycled.
    pub object_type_id: ObjectTypeId,
    /// Measured weight.
    pub weight: f64,
    /// `floor(weight * points_per_unit_weight)` at the time of recording.
    pub points_awarded: i64,
    /// QR token (or external code) that produced the entry, if any.
    pub qr_code: Option<String>,
    /// Recording timestamp.
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a [`RecyclingEvent`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecycling {
    /// User credited.
    pub user_id: UserId,
    /// Store that received the material.
    pub store_id: StoreId,
    /// Material recycled.
    pub object_type_id: ObjectTypeId,
    /// Measured weight.
    pub weight: f64,
    /// Points awarded.
    pub points_awarded: i64,
    /// Originating QR token or code.
    pub qr_code: Option<String>,
    /// Recording timestamp.
    pub created_at: DateTime<Utc>,
}

impl NewRecycling {
    /// Materializes the stored entry once the database assigned an id.
    #[must_use]
    pub fn into_event(self, id: RecyclingId) -> RecyclingEvent {
        RecyclingEvent {
            id,
            user_id: self.user_id,
            store_id: self.store_id,
            object_type_id: self.object_type_id,
            weight: self.weight,
            points_awarded: self.points_awarded,
            qr_code: self.qr_code,
            created_at: self.created_at,
        }
    }
}

/// A point-for-product redemption ("canje").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionEvent {
    /// Entry identifier.
    pub id: RedemptionId,
    /// User debited.
    pub user_id: UserId,
    /// Store that handed out the product.
    pub store_id: StoreId,
    /// Product redeemed.
    pub product_id: ProductId,
    /// Units redeemed.
    pub quantity: i64,
    /// `unit_point_cost * quantity`.
    pub points_spent: i64,
    /// Recording timestamp.
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a [`RedemptionEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRedemption {
    /// User debited.
    pub user_id: UserId,
    /// Store that handed out the product.
    pub store_id: StoreId,
    /// Product redeemed.
    pub product_id: ProductId,
    /// Units redeemed.
    pub quantity: i64,
    /// Points spent.
    pub points_spent: i64,
    /// Recording timestamp.
    pub created_at: DateTime<Utc>,
}

impl NewRedemption {
    /// Materializes the stored entry once the database assigned an id.
    #[must_use]
    pub fn into_event(self, id: RedemptionId) -> RedemptionEvent {
        RedemptionEvent {
            id,
            user_id: self.user_id,
            store_id: self.store_id,
            product_id: self.product_id,
            quantity: self.quantity,
            points_spent: self.points_spent,
            created_at: self.created_at,
        }
    }
}

/// Snapshot of a user's points total and approximate rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsHistorySnapshot {
    /// Snapshot identifier.
    pub id: HistoryId,
    /// User the snapshot belongs to.
    pub user_id: UserId,
    /// Points total when the snapshot was taken or last reconciled.
    pub total_points: i64,
    /// `count(active users with a higher balance) + 1`; `None` when
    /// written by reconciliation.
    pub rank: Option<i64>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last reconciliation timestamp (equals `created_at` until then).
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a [`PointsHistorySnapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHistorySnapshot {
    /// User the snapshot belongs to.
    pub user_id: UserId,
    /// Points total.
    pub total_points: i64,
    /// Approximate rank.
    pub rank: Option<i64>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl NewHistorySnapshot {
    /// Materializes the stored snapshot once the database assigned an id.
    #[must_use]
    pub fn into_snapshot(self, id: HistoryId) -> PointsHistorySnapshot {
        PointsHistorySnapshot {
            id,
            user_id: self.user_id,
            total_points: self.total_points,
            rank: self.rank,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}
