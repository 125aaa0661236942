//! Database row models and their conversion into domain types.
//!
//! Rows mirror the tables in `migrations/` column for column. State
//! columns are `TEXT` and are parsed on the way out, so an unexpected
//! value surfaces as [`LedgerError::Internal`] instead of a panic.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{
    Account, FeeBreakdown, ObjectType, PaymentTransaction, PointsHistorySnapshot, Product,
    QrSession, RecyclingEvent, RecyclingSession, RecyclingTerms, RedemptionEvent,
    RedemptionSession, RedemptionTerms, Reservation, SessionId, Store, TimeSlot, UserId,
};
use crate::error::LedgerError;

/// A row of the `users` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AccountRow {
    /// Primary key.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Points balance.
    pub points_balance: i64,
    /// Active flag.
    pub active: bool,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Self {
            id: row.id.into(),
            name: row.name,
            points_balance: row.points_balance,
            active: row.active,
        }
    }
}

/// A row of the `stores` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoreRow {
    /// Primary key.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Active flag.
    pub active: bool,
}

impl From<StoreRow> for Store {
    fn from(row: StoreRow) -> Self {
        Self {
            id: row.id.into(),
            name: row.name,
            active: row.active,
        }
    }
}

/// A `products` row joined with its store.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    /// Primary key.
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
    /// Product active flag.
    pub active: bool,
    /// Store active flag.
    pub store_active: bool,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id.into(),
            store_id: row.store_id.into(),
            store_name: row.store_name,
            name: row.name,
            unit_point_cost: row.unit_point_cost,
            stock: row.stock,
            active: row.active,
            store_active: row.store_active,
        }
    }
}

/// A row of the `object_types` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ObjectTypeRow {
    /// Primary key.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Reward rate.
    pub points_per_unit_weight: f64,
    /// Active flag.
    pub active: bool,
}

impl From<ObjectTypeRow> for ObjectType {
    fn from(row: ObjectTypeRow) -> Self {
        Self {
            id: row.id.into(),
            name: row.name,
            points_per_unit_weight: row.points_per_unit_weight,
            active: row.active,
        }
    }
}

/// A row of the `redemptions` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RedemptionRow {
    /// Primary key.
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

impl From<RedemptionRow> for RedemptionEvent {
    fn from(row: RedemptionRow) -> Self {
        Self {
            id: row.id.into(),
            user_id: row.user_id.into(),
            store_id: row.store_id.into(),
            product_id: row.product_id.into(),
            quantity: row.quantity,
            points_spent: row.points_spent,
            created_at: row.created_at,
        }
    }
}

/// A row of the `recyclings` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RecyclingRow {
    /// Primary key.
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
    /// Originating QR token.
    pub qr_code: Option<String>,
    /// Insert timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<RecyclingRow> for RecyclingEvent {
    fn from(row: RecyclingRow) -> Self {
        Self {
            id: row.id.into(),
            user_id: row.user_id.into(),
            store_id: row.store_id.into(),
            object_type_id: row.object_type_id.into(),
            weight: row.weight,
            points_awarded: row.points_awarded,
            qr_code: row.qr_code,
            created_at: row.created_at,
        }
    }
}

/// A row of the `points_history` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HistoryRow {
    /// Primary key.
    pub id: i64,
    /// User.
    pub user_id: i64,
    /// Points total.
    pub total_points: i64,
    /// Approximate rank.
    pub rank: Option<i64>,
    /// Insert timestamp.
    pub created_at: DateTime<Utc>,
    /// Last reconciliation.
    pub updated_at: DateTime<Utc>,
}

impl From<HistoryRow> for PointsHistorySnapshot {
    fn from(row: HistoryRow) -> Self {
        Self {
            id: row.id.into(),
            user_id: row.user_id.into(),
            total_points: row.total_points,
            rank: row.rank,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// A row of the `redemption_sessions` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RedemptionSessionRow {
    /// Session token.
    pub id: Uuid,
    /// Creating store.
    pub store_id: i64,
    /// Product.
    pub product_id: i64,
    /// Units.
    pub quantity: i64,
    /// Snapshotted cost.
    pub points_required: i64,
    /// `PENDING`, `CONFIRMED` or `EXPIRED`.
    pub state: String,
    /// Insert timestamp.
    pub created_at: DateTime<Utc>,
    /// Deadline.
    pub expires_at: DateTime<Utc>,
    /// Confirming user.
    pub confirmed_by: Option<i64>,
    /// Confirmation timestamp.
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl TryFrom<RedemptionSessionRow> for RedemptionSession {
    type Error = LedgerError;

    fn try_from(row: RedemptionSessionRow) -> Result<Self, Self::Error> {
        Ok(QrSession {
            id: SessionId::from_uuid(row.id),
            store_id: row.store_id.into(),
            terms: RedemptionTerms {
                product_id: row.product_id.into(),
                quantity: row.quantity,
            },
            points_required: row.points_required,
            state: row.state.parse()?,
            created_at: row.created_at,
            expires_at: row.expires_at,
            confirmed_by: row.confirmed_by.map(UserId::new),
            confirmed_at: row.confirmed_at,
        })
    }
}

/// A row of the `recycling_sessions` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RecyclingSessionRow {
    /// Session token.
    pub id: Uuid,
    /// Creating store.
    pub store_id: i64,
    /// Material.
    pub object_type_id: i64,
    /// Measured weight.
    pub weight: f64,
    /// Snapshotted reward.
    pub points_required: i64,
    /// `PENDING`, `CONFIRMED` or `EXPIRED`.
    pub state: String,
    /// Insert timestamp.
    pub created_at: DateTime<Utc>,
    /// Deadline.
    pub expires_at: DateTime<Utc>,
    /// Confirming user.
    pub confirmed_by: Option<i64>,
    /// Confirmation timestamp.
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl TryFrom<RecyclingSessionRow> for RecyclingSession {
    type Error = LedgerError;

    fn try_from(row: RecyclingSessionRow) -> Result<Self, Self::Error> {
        Ok(QrSession {
            id: SessionId::from_uuid(row.id),
            store_id: row.store_id.into(),
            terms: RecyclingTerms {
                object_type_id: row.object_type_id.into(),
                weight: row.weight,
            },
            points_required: row.points_required,
            state: row.state.parse()?,
            created_at: row.created_at,
            expires_at: row.expires_at,
            confirmed_by: row.confirmed_by.map(UserId::new),
            confirmed_at: row.confirmed_at,
        })
    }
}

/// A row of the `reservations` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReservationRow {
    /// Primary key.
    pub id: i64,
    /// Guide booked.
    pub guide_profile_id: i64,
    /// Client.
    pub client_profile_id: i64,
    /// Meeting place.
    pub place: Option<String>,
    /// Party size.
    pub party_size: Option<i32>,
    /// Slot start.
    pub start_time: DateTime<Utc>,
    /// Slot end.
    pub end_time: DateTime<Utc>,
    /// Guide price.
    pub base_amount: Decimal,
    /// 15 % commission.
    pub guide_commission: Decimal,
    /// 2.5 % surcharge.
    pub client_surcharge: Decimal,
    /// Client total.
    pub total_amount: Decimal,
    /// Spanish state label.
    pub state: String,
    /// Payment label.
    pub payment_state: String,
    /// Insert timestamp.
    pub created_at: DateTime<Utc>,
    /// Last change.
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = LedgerError;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            guide_profile_id: row.guide_profile_id.into(),
            client_profile_id: row.client_profile_id.into(),
            place: row.place,
            party_size: row.party_size,
            slot: TimeSlot::new(row.start_time, row.end_time)?,
            fees: FeeBreakdown {
                base_amount: row.base_amount,
                guide_commission: row.guide_commission,
                client_surcharge: row.client_surcharge,
                total_amount: row.total_amount,
            },
            state: row.state.parse()?,
            payment_state: row.payment_state.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A row of the `payment_transactions` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PaymentRow {
    /// Primary key.
    pub id: i64,
    /// Reservation paid.
    pub reservation_id: i64,
    /// Method label.
    pub payment_method: Option<String>,
    /// Client total.
    pub total_amount: Decimal,
    /// Commission.
    pub guide_commission: Decimal,
    /// Surcharge.
    pub client_surcharge: Decimal,
    /// Status label.
    pub state: String,
    /// Insert timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<PaymentRow> for PaymentTransaction {
    fn from(row: PaymentRow) -> Self {
        Self {
            id: row.id.into(),
            reservation_id: row.reservation_id.into(),
            payment_method: row.payment_method,
            total_amount: row.total_amount,
            guide_commission: row.guide_commission,
            client_surcharge: row.client_surcharge,
            state: row.state,
            created_at: row.created_at,
        }
    }
}

/// A row of the `login_attempts` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AttemptRow {
    /// Failure timestamps as a JSON array.
    pub failures: serde_json::Value,
    /// Lockout end.
    pub locked_until: Option<DateTime<Utc>>,
}
