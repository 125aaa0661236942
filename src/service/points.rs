//! Point Transfer Operator.
//!
//! The only code path that changes a points balance. Credits and debits
//! are a single conditional `UPDATE`; a debit that would take the balance
//! below zero matches no row and fails the surrounding transaction.

use std::fmt;

use crate::domain::UserId;
use crate::error::LedgerError;
use crate::persistence::{LedgerTx, ReadMode};

/// Why a balance moves; recorded in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferReason {
    /// Debit for a product redemption.
    Redemption,
    /// Credit for a recycling drop-off.
    Recycling,
}

impl fmt::Display for TransferReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Redemption => "redemption",
            Self::Recycling => "recycling",
        })
    }
}

/// Adds `delta` to the user's balance and returns the new balance.
///
/// Must run inside the same transaction as the ledger entry it pays for.
///
/// # Errors
///
/// - [`LedgerError::InsufficientPoints`] if a debit would overdraw.
/// - [`LedgerError::NotFound`] if the user is missing or inactive.
pub async fn transfer(
    tx: &mut dyn LedgerTx,
    user_id: UserId,
    delta: i64,
    reason: TransferReason,
) -> Result<i64, LedgerError> {
    if let Some(balance) = tx.apply_points_delta(user_id, delta).await? {
        tracing::debug!(%user_id, delta, balance, %reason, "points transferred");
        return Ok(balance);
    }
    let account = tx
        .find_user(user_id, ReadMode::Plain)
        .await?
        .filter(|a| a.active)
        .ok_or_else(|| LedgerError::not_found("user", user_id))?;
    if delta < 0 {
        Err(LedgerError::InsufficientPoints {
            required: delta.checked_neg().unwrap_or(i64::MAX),
            available: account.points_balance,
        })
    } else {
        Err(LedgerError::Internal(format!(
            "credit of {delta} points to user {user_id} matched no row"
        )))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::persistence::{InMemoryLedgerStore, LedgerStore};

    #[tokio::test]
    async fn credit_and_debit_return_new_balance() {
        let store = InMemoryLedgerStore::new();
        let user = store.seed_user("ana", 500).await;
        let Ok(mut tx) = store.begin().await else {
            panic!("begin");
        };
        let credited = transfer(tx.as_mut(), user, 37, TransferReason::Recycling).await;
        assert!(matches!(credited, Ok(537)));
        let debited = transfer(tx.as_mut(), user, -300, TransferReason::Redemption).await;
        assert!(matches!(debited, Ok(237)));
    }

    #[tokio::test]
    async fn overdraw_reports_required_and_available() {
        let store = InMemoryLedgerStore::new();
        let user = store.seed_user("ana", 100).await;
        let Ok(mut tx) = store.begin().await else {
            panic!("begin");
        };
        let result = transfer(tx.as_mut(), user, -150, TransferReason::Redemption).await;
        assert!(matches!(
            result,
            Err(LedgerError::InsufficientPoints {
                required: 150,
                available: 100
            })
        ));
    }

    #[tokio::test]
    async fn unknown_or_inactive_user_is_not_found() {
        let store = InMemoryLedgerStore::new();
        let user = store.seed_user("ana", 100).await;
        store.set_user_active(user, false).await;
        let Ok(mut tx) = store.begin().await else {
            panic!("begin");
        };
        let inactive = transfer(tx.as_mut(), user, 10, TransferReason::Recycling).await;
        assert!(matches!(inactive, Err(LedgerError::NotFound(_))));
        let missing = transfer(tx.as_mut(), UserId::new(999), -1, TransferReason::Redemption).await;
        assert!(matches!(missing, Err(LedgerError::NotFound(_))));
    }
}
