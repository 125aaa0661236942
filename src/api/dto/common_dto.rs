//! Shared DTO types used across multiple endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{PointsHistorySnapshot, Product};
use crate::service::LoginStatus;

/// Product as returned to stores.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProductDto {
    /// Product id.
    pub id: i64,
    /// Owning store.
    pub store_id: i64,
    /// Owning store's name.
    pub store_name: String,
    /// Display name.
    pub name: String,
    /// Points per unit.
    pub unit_point_cost: i64,
    /// Units in stock.
    pub stock: i64,
    /// Active flag.
    pub active: bool,
}

impl From<Product> for ProductDto {
    fn from(p: Product) -> Self {
        Self {
            id: p.id.get(),
            store_id: p.store_id.get(),
            store_name: p.store_name,
            name: p.name,
            unit_point_cost: p.unit_point_cost,
            stock: p.stock,
            active: p.active,
        }
    }
}

/// Points-history snapshot.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HistorySnapshotDto {
    /// Snapshot id.
    pub id: i64,
    /// User.
    pub user_id: i64,
    /// Points total at snapshot time.
    pub total_points: i64,
    /// Approximate rank, if computed.
    pub rank: Option<i64>,
    /// Insert timestamp.
    pub created_at: DateTime<Utc>,
    /// Last reconciliation.
    pub updated_at: DateTime<Utc>,
}

impl From<PointsHistorySnapshot> for HistorySnapshotDto {
    fn from(s: PointsHistorySnapshot) -> Self {
        Self {
            id: s.id.get(),
            user_id: s.user_id.get(),
            total_points: s.total_points,
            rank: s.rank,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

/// Result of a reconciliation sweep over all active users.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReconcileAllResponse {
    /// Users whose latest snapshot was reconciled.
    pub reconciled_users: usize,
}

/// Login attempt key as seen by the auth layer.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LoginAttemptRequest {
    /// Email typed by the user; compared case-insensitively.
    pub email: String,
    /// Client IP address.
    pub ip: String,
}

/// Throttling state of a login key.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LoginStatusDto {
    /// Failures still allowed before a lockout.
    pub remaining_attempts: u32,
    /// End of the current lockout, if any.
    pub locked_until: Option<DateTime<Utc>>,
}

impl From<LoginStatus> for LoginStatusDto {
    fn from(s: LoginStatus) -> Self {
        Self {
            remaining_attempts: s.remaining_attempts,
            locked_until: s.locked_until,
        }
    }
}
