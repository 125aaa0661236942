//! Redemption ("canje") building blocks shared by the direct flow and
//! QR-session confirmation.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::inventory::{self, StockMode};
use super::points::{self, TransferReason};
use crate::domain::{Account, NewRedemption, Product, ProductId, RedemptionEvent, UserId};
use crate::error::LedgerError;
use crate::persistence::{LedgerTx, ReadMode};

/// Result of a committed redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedemptionReceipt {
    /// Ledger entry written.
    pub redemption: RedemptionEvent,
    /// Product name at redemption time.
    pub product_name: String,
    /// Store name at redemption time.
    pub store_name: String,
    /// Balance after the debit.
    pub new_balance: i64,
    /// Stock after the decrement.
    pub remaining_stock: i64,
}

/// Why a redemption can or cannot go ahead right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityReason {
    /// Stock and balance both suffice.
    Available,
    /// The balance does not cover the cost.
    InsufficientPoints,
    /// The stock does not cover the quantity.
    OutOfStock,
}

/// Read-only redemption precheck.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedemptionAvailability {
    /// `true` iff `reason` is [`AvailabilityReason::Available`].
    pub can_redeem: bool,
    /// Outcome of the check.
    pub reason: AvailabilityReason,
    /// Units checked.
    pub quantity: i64,
    /// Cost at the current unit price.
    pub points_required: i64,
    /// User's current balance.
    pub points_balance: i64,
    /// Product's current stock.
    pub stock: i64,
}

/// Loads a product that is active and whose store is active.
pub(crate) async fn load_available_product(
    tx: &mut dyn LedgerTx,
    product_id: ProductId,
    mode: ReadMode,
) -> Result<Product, LedgerError> {
    tx.find_product(product_id, mode)
        .await?
        .filter(Product::is_available)
        .ok_or_else(|| LedgerError::not_found("product", product_id))
}

/// Loads an active user account.
pub(crate) async fn load_active_user(
    tx: &mut dyn LedgerTx,
    user_id: UserId,
    mode: ReadMode,
) -> Result<Account, LedgerError> {
    tx.find_user(user_id, mode)
        .await?
        .filter(|a| a.active)
        .ok_or_else(|| LedgerError::not_found("user", user_id))
}

pub(crate) fn ensure_stock(product: &Product, quantity: i64) -> Result<(), LedgerError> {
    if product.stock < quantity {
        return Err(LedgerError::OutOfStock {
            requested: quantity,
            available: product.stock,
        });
    }
    Ok(())
}

pub(crate) fn ensure_balance(account: &Account, cost: i64) -> Result<(), LedgerError> {
    if account.points_balance < cost {
        return Err(LedgerError::InsufficientPoints {
            required: cost,
            available: account.points_balance,
        });
    }
    Ok(())
}

/// Classifies a prospective redemption without changing anything.
pub(crate) fn availability(
    product: &Product,
    account: &Account,
    quantity: i64,
) -> Result<RedemptionAvailability, LedgerError> {
    let points_required = product.cost_for(quantity)?;
    let reason = if product.stock < quantity {
        AvailabilityReason::OutOfStock
    } else if account.points_balance < points_required {
        AvailabilityReason::InsufficientPoints
    } else {
        AvailabilityReason::Available
    };
    Ok(RedemptionAvailability {
        can_redeem: reason == AvailabilityReason::Available,
        reason,
        quantity,
        points_required,
        points_balance: account.points_balance,
        stock: product.stock,
    })
}

/// Applies the ledger effects of a redemption in the fixed order: insert
/// entry, debit points, decrement stock.
///
/// The caller has already validated the product, the user and the cost.
pub(crate) async fn record_redemption(
    tx: &mut dyn LedgerTx,
    user_id: UserId,
    product: &Product,
    quantity: i64,
    now: DateTime<Utc>,
) -> Result<RedemptionReceipt, LedgerError> {
    let points_spent = product.cost_for(quantity)?;
    let redemption = tx
        .insert_redemption(NewRedemption {
            user_id,
            store_id: product.store_id,
            product_id: product.id,
            quantity,
            points_spent,
            created_at: now,
        })
        .await?;
    let new_balance =
        points::transfer(tx, user_id, -points_spent, TransferReason::Redemption).await?;
    let remaining_stock =
        inventory::adjust_stock(tx, product.id, quantity, StockMode::Redeem).await?;
    Ok(RedemptionReceipt {
        redemption,
        product_name: product.name.clone(),
        store_name: product.store_name.clone(),
        new_balance,
        remaining_stock,
    })
}
