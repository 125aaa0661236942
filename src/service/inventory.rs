//! Inventory Reservation Operator.
//!
//! Stock moves only through [`adjust_stock`], which issues one
//! conditional `UPDATE` and never reads-then-writes.

use crate::domain::ProductId;
use crate::error::LedgerError;
use crate::persistence::{LedgerTx, ReadMode};

/// Direction of a stock adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockMode {
    /// Take units out for a redemption; fails if stock is short.
    Redeem,
    /// Put units back in (restock or refund); unconditional.
    Restock,
}

/// Moves `quantity` units of stock and returns the new stock level.
///
/// # Errors
///
/// - [`LedgerError::ValidationFailed`] unless `quantity > 0`.
/// - [`LedgerError::OutOfStock`] if a redemption would go negative.
/// - [`LedgerError::NotFound`] if the product does not exist.
pub async fn adjust_stock(
    tx: &mut dyn LedgerTx,
    product_id: ProductId,
    quantity: i64,
    mode: StockMode,
) -> Result<i64, LedgerError> {
    if quantity <= 0 {
        return Err(LedgerError::ValidationFailed(format!(
            "quantity must be positive, got {quantity}"
        )));
    }
    let delta = match mode {
        StockMode::Redeem => -quantity,
        StockMode::Restock => quantity,
    };
    if let Some(stock) = tx.apply_stock_delta(product_id, delta).await? {
        tracing::debug!(%product_id, delta, stock, "stock adjusted");
        return Ok(stock);
    }
    let product = tx
        .find_product(product_id, ReadMode::Plain)
        .await?
        .ok_or_else(|| LedgerError::not_found("product", product_id))?;
    match mode {
        StockMode::Redeem => Err(LedgerError::OutOfStock {
            requested: quantity,
            available: product.stock,
        }),
        StockMode::Restock => Err(LedgerError::Internal(format!(
            "restock of product {product_id} matched no row"
        ))),
    }
}
