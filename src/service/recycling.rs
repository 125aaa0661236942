//! Recycling ("reciclaje") building blocks shared by the direct flow and
//! QR-session confirmation.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::points::{self, TransferReason};
use crate::domain::{
    NewHistorySnapshot, NewRecycling, ObjectType, ObjectTypeId, PointsHistorySnapshot,
    RecyclingEvent, Store, StoreId, UserId,
};
use crate::error::LedgerError;
use crate::persistence::{LedgerTx, ReadMode};

/// Result of a committed recycling drop-off.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecyclingReceipt {
    /// Ledger entry written.
    pub recycling: RecyclingEvent,
    /// Material name.
    pub object_type_name: String,
    /// Balance after the credit.
    pub new_balance: i64,
    /// History snapshot appended with the approximate rank.
    pub snapshot: PointsHistorySnapshot,
}

/// What a recycling credit is recorded against.
#[derive(Debug, Clone)]
pub(crate) struct DropOff<'a> {
    pub user_id: UserId,
    pub store_id: StoreId,
    pub object_type: &'a ObjectType,
    pub weight: f64,
    pub qr_code: Option<String>,
}

pub(crate) async fn load_active_object_type(
    tx: &mut dyn LedgerTx,
    id: ObjectTypeId,
    mode: ReadMode,
) -> Result<ObjectType, LedgerError> {
    tx.find_object_type(id, mode)
        .await?
        .filter(|o| o.active)
        .ok_or_else(|| LedgerError::not_found("object type", id))
}

pub(crate) async fn load_active_store(
    tx: &mut dyn LedgerTx,
    id: StoreId,
) -> Result<Store, LedgerError> {
    tx.find_store(id)
        .await?
        .filter(|s| s.active)
        .ok_or_else(|| LedgerError::not_found("store", id))
}

/// Applies the ledger effects of a drop-off: insert entry, credit
/// points, compute the approximate rank and append a history snapshot.
///
/// Rank is `count(active users with a strictly higher balance) + 1`;
/// ties share a rank.
pub(crate) async fn record_recycling(
    tx: &mut dyn LedgerTx,
    drop_off: DropOff<'_>,
    now: DateTime<Utc>,
) -> Result<RecyclingReceipt, LedgerError> {
    let points_awarded = drop_off.object_type.points_for(drop_off.weight)?;
    let recycling = tx
        .insert_recycling(NewRecycling {
            user_id: drop_off.user_id,
            store_id: drop_off.store_id,
            object_type_id: drop_off.object_type.id,
            weight: drop_off.weight,
            points_awarded,
            qr_code: drop_off.qr_code,
            created_at: now,
        })
        .await?;
    let new_balance = points::transfer(
        tx,
        drop_off.user_id,
        points_awarded,
        TransferReason::Recycling,
    )
    .await?;
    let rank = tx.count_users_above(new_balance).await?.saturating_add(1);
    let snapshot = tx
        .append_history(NewHistorySnapshot {
            user_id: drop_off.user_id,
            total_points: new_balance,
            rank: Some(rank),
            created_at: now,
        })
        .await?;
    Ok(RecyclingReceipt {
        recycling,
        object_type_name: drop_off.object_type.name.clone(),
        new_balance,
        snapshot,
    })
}
