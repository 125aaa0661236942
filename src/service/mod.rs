//! Service layer: business logic orchestration.
//!
//! Each public service method runs one ledger transaction from start to
//! finish: it opens it on the [`crate::persistence::LedgerStore`], applies
//! the point-transfer and inventory operators in a fixed order, commits
//! or rolls back as a unit, and only then publishes
//! [`crate::domain::LedgerEvent`]s on the [`crate::domain::EventBus`].
//!
//! - [`RewardsService`]: direct redemption and recycling, product upkeep,
//!   history reconciliation.
//! - [`SessionService`]: QR session creation and confirmation.
//! - [`BookingService`]: guide reservations and their lifecycle.
//! - [`LoginGuard`]: failed-login throttling.

pub mod booking;
pub mod inventory;
pub mod login_guard;
pub mod points;
pub mod recycling;
pub mod redemption;
pub mod rewards;
pub mod sessions;

pub use booking::{BookingService, PaidReservation, ReservationRequest};
pub use inventory::StockMode;
pub use login_guard::{LoginGuard, LoginPolicy, LoginStatus};
pub use points::TransferReason;
pub use recycling::RecyclingReceipt;
pub use redemption::{AvailabilityReason, RedemptionAvailability, RedemptionReceipt};
pub use rewards::{RecyclingRequest, RewardsService};
pub use sessions::{ConfirmationOutcome, RecyclingClaim, RedemptionClaim, SessionService};

use crate::error::LedgerError;
use crate::persistence::LedgerTx;

/// Commits `tx` if `result` is `Ok`, rolls it back otherwise.
///
/// The flow's own error wins over a failed rollback, which is only
/// logged.
pub(crate) async fn finish<T>(
    tx: Box<dyn LedgerTx>,
    result: Result<T, LedgerError>,
) -> Result<T, LedgerError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "rollback failed");
            }
            tracing::debug!(error = %err, "transaction rolled back");
            Err(err)
        }
    }
}
