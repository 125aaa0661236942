//! DTOs for direct redemption, recycling and product upkeep.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::HistorySnapshotDto;
use crate::domain::{ProductPatch, RecyclingEvent, RedemptionEvent};
use crate::service::{
    AvailabilityReason, RecyclingReceipt, RedemptionAvailability, RedemptionReceipt,
};

/// Request body for `POST /redemptions`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RedeemRequest {
    /// Product to redeem.
    pub product_id: i64,
    /// Units; values below 1 (or absent) mean 1.
    #[serde(default)]
    pub quantity: Option<i64>,
}

/// Redemption ledger entry.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RedemptionDto {
    /// Entry id.
    pub id: i64,
    /// User debited.
    pub user_id: i64,
    /// Store.
    pub store_id: i64,
    /// Product.
    pub product_id: i64,
    /// Units.
    pub quantity: i64,
    /// Points debited.
    pub points_spent: i64,
    /// Insert timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<RedemptionEvent> for RedemptionDto {
    fn from(e: RedemptionEvent) -> Self {
        Self {
            id: e.id.get(),
            user_id: e.user_id.get(),
            store_id: e.store_id.get(),
            product_id: e.product_id.get(),
            quantity: e.quantity,
            points_spent: e.points_spent,
            created_at: e.created_at,
        }
    }
}

/// Response body of a successful redemption.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RedemptionReceiptDto {
    /// Ledger entry written.
    pub redemption: RedemptionDto,
    /// Product name.
    pub product_name: String,
    /// Store name.
    pub store_name: String,
    /// Balance after the debit.
    pub new_balance: i64,
    /// Stock after the decrement.
    pub remaining_stock: i64,
}

impl From<RedemptionReceipt> for RedemptionReceiptDto {
    fn from(r: RedemptionReceipt) -> Self {
        Self {
            redemption: r.redemption.into(),
            product_name: r.product_name,
            store_name: r.store_name,
            new_balance: r.new_balance,
            remaining_stock: r.remaining_stock,
        }
    }
}

/// Query parameters for the availability check.
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct AvailabilityQuery {
    /// Units to check; defaults to 1.
    #[serde(default)]
    pub quantity: Option<i64>,
}

/// Read-only redemption precheck.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AvailabilityDto {
    /// Whether the redemption would succeed now.
    pub can_redeem: bool,
    /// `available`, `insufficient_points` or `out_of_stock`.
    pub reason: String,
    /// Units checked.
    pub quantity: i64,
    /// Cost at the current price.
    pub points_required: i64,
    /// Caller's balance.
    pub points_balance: i64,
    /// Current stock.
    pub stock: i64,
}

impl From<RedemptionAvailability> for AvailabilityDto {
    fn from(a: RedemptionAvailability) -> Self {
        let reason = match a.reason {
            AvailabilityReason::Available => "available",
            AvailabilityReason::InsufficientPoints => "insufficient_points",
            AvailabilityReason::OutOfStock => "out_of_stock",
        };
        Self {
            can_redeem: a.can_redeem,
            reason: reason.to_string(),
            quantity: a.quantity,
            points_required: a.points_required,
            points_balance: a.points_balance,
            stock: a.stock,
        }
    }
}

/// Request body for `POST /recyclings`, sent by the receiving store.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RecycleRequest {
    /// User to credit.
    pub user_id: i64,
    /// Material.
    pub object_type_id: i64,
    /// Measured weight.
    pub weight: f64,
    /// Optional external code printed on the drop-off.
    #[serde(default)]
    pub qr_code: Option<String>,
}

/// Recycling ledger entry.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RecyclingDto {
    /// Entry id.
    pub id: i64,
    /// User credited.
    pub user_id: i64,
    /// Store.
    pub store_id: i64,
    /// Material.
    pub object_type_id: i64,
    /// Weight.
    pub weight: f64,
    /// Points credited.
    pub points_awarded: i64,
    /// Originating code, if any.
    pub qr_code: Option<String>,
    /// Insert timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<RecyclingEvent> for RecyclingDto {
    fn from(e: RecyclingEvent) -> Self {
        Self {
            id: e.id.get(),
            user_id: e.user_id.get(),
            store_id: e.store_id.get(),
            object_type_id: e.object_type_id.get(),
            weight: e.weight,
            points_awarded: e.points_awarded,
            qr_code: e.qr_code,
            created_at: e.created_at,
        }
    }
}

/// Response body of a successful recycling credit.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RecyclingReceiptDto {
    /// Ledger entry written.
    pub recycling: RecyclingDto,
    /// Material name.
    pub object_type_name: String,
    /// Balance after the credit.
    pub new_balance: i64,
    /// History snapshot appended.
    pub snapshot: HistorySnapshotDto,
}

impl From<RecyclingReceipt> for RecyclingReceiptDto {
    fn from(r: RecyclingReceipt) -> Self {
        Self {
            recycling: r.recycling.into(),
            object_type_name: r.object_type_name,
            new_balance: r.new_balance,
            snapshot: r.snapshot.into(),
        }
    }
}

/// Request body for `PATCH /products/{id}`. Absent fields stay unchanged.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateProductRequest {
    /// New display name.
    #[serde(default)]
    pub name: Option<String>,
    /// New points cost per unit.
    #[serde(default)]
    pub unit_point_cost: Option<i64>,
    /// New active flag.
    #[serde(default)]
    pub active: Option<bool>,
}

impl From<UpdateProductRequest> for ProductPatch {
    fn from(r: UpdateProductRequest) -> Self {
        Self {
            name: r.name,
            unit_point_cost: r.unit_point_cost,
            active: r.active,
        }
    }
}

/// Request body for `POST /products/{id}/restock`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RestockRequest {
    /// Units to add; must be positive.
    pub quantity: i64,
}

/// Response body of a restock.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StockResponse {
    /// Product restocked.
    pub product_id: i64,
    /// Stock after the increment.
    pub stock: i64,
}
