//! Guide reservations ("reservas"), fee computation and payments.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::{ClientProfileId, GuideProfileId, PaymentId, ReservationId};
use crate::error::LedgerError;

/// Booking lifecycle state. Stored with its Spanish name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationState {
    /// Requested by the client, awaiting the guide.
    #[serde(rename = "Pendiente")]
    Pending,
    /// Accepted by the guide.
    #[serde(rename = "Confirmada")]
    Confirmed,
    /// Service rendered.
    #[serde(rename = "Completada")]
    Completed,
    /// Cancelled by either party.
    #[serde(rename = "Cancelada")]
    Cancelled,
}

impl ReservationState {
    /// Stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pendiente",
            Self::Confirmed => "Confirmada",
            Self::Completed => "Completada",
            Self::Cancelled => "Cancelada",
        }
    }

    /// Returns `true` while the reservation occupies the guide's calendar.
    #[must_use]
    pub const fn blocks_calendar(self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }
}

impl fmt::Display for ReservationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationState {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pendiente" => Ok(Self::Pending),
            "Confirmada" => Ok(Self::Confirmed),
            "Completada" => Ok(Self::Completed),
            "Cancelada" => Ok(Self::Cancelled),
            other => Err(LedgerError::Internal(format!(
                "unknown reservation state {other:?}"
            ))),
        }
    }
}

/// Payment status of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentState {
    /// Not paid yet.
    #[serde(rename = "no_pagado")]
    Unpaid,
    /// Paid by the client.
    #[serde(rename = "pagado")]
    Paid,
}

impl PaymentState {
    /// Stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unpaid => "no_pagado",
            Self::Paid => "pagado",
        }
    }
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentState {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no_pagado" => Ok(Self::Unpaid),
            "pagado" => Ok(Self::Paid),
            other => Err(LedgerError::Internal(format!(
                "unknown payment state {other:?}"
            ))),
        }
    }
}

/// Half-open time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeSlot {
    /// Creates a slot.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidRange`] if `end <= start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, LedgerError> {
        if end <= start {
            return Err(LedgerError::InvalidRange);
        }
        Ok(Self { start, end })
    }

    /// Inclusive start.
    #[must_use]
    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Exclusive end.
    #[must_use]
    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Half-open intersection: `NOT (self.end <= other.start OR self.start >= other.end)`.
    ///
    /// Back-to-back slots (`[10:00,11:00)` and `[11:00,12:00)`) do not overlap.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        !(self.end <= other.start || self.start >= other.end)
    }
}

/// Guide commission rate (15 %).
pub const GUIDE_COMMISSION_RATE: Decimal = Decimal::from_parts(15, 0, 0, false, 2);

/// Client surcharge rate (2.5 %).
pub const CLIENT_SURCHARGE_RATE: Decimal = Decimal::from_parts(25, 0, 0, false, 3);

/// Rounds to two decimals, half away from zero.
#[must_use]
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Deterministic fee split of a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    /// Price set by the guide.
    pub base_amount: Decimal,
    /// Platform commission withheld from the guide.
    pub guide_commission: Decimal,
    /// Platform surcharge added for the client.
    pub client_surcharge: Decimal,
    /// What the client pays: `base + client_surcharge`.
    pub total_amount: Decimal,
}

impl FeeBreakdown {
    /// Computes the fee split for a base amount.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ValidationFailed`] unless `base > 0`.
    pub fn compute(base: Decimal) -> Result<Self, LedgerError> {
        if base <= Decimal::ZERO {
            return Err(LedgerError::ValidationFailed(format!(
                "base amount must be positive, got {base}"
            )));
        }
        let guide_commission = round2(base * GUIDE_COMMISSION_RATE);
        let client_surcharge = round2(base * CLIENT_SURCHARGE_RATE);
        Ok(Self {
            base_amount: base,
            guide_commission,
            client_surcharge,
            total_amount: round2(base + client_surcharge),
        })
    }

    /// What the guide receives.
    #[must_use]
    pub fn guide_payout(&self) -> Decimal {
        self.base_amount - self.guide_commission
    }

    /// What the platform keeps.
    #[must_use]
    pub fn platform_take(&self) -> Decimal {
        self.guide_commission + self.client_surcharge
    }
}

/// A booking of a guide's time by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Reservation identifier.
    pub id: ReservationId,
    /// Guide booked.
    pub guide_profile_id: GuideProfileId,
    /// Client who booked.
    pub client_profile_id: ClientProfileId,
    /// Meeting place.
    pub place: Option<String>,
    /// Number of people.
    pub party_size: Option<i32>,
    /// Booked interval.
    pub slot: TimeSlot,
    /// Fee split fixed at booking time.
    pub fees: FeeBreakdown,
    /// Lifecycle state.
    pub state: ReservationState,
    /// Payment status.
    pub payment_state: PaymentState,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last state change.
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// `Pendiente -> Confirmada`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidTransition`] from any other state.
    pub fn accept(&mut self, now: DateTime<Utc>) -> Result<(), LedgerError> {
        self.transition(ReservationState::Pending, ReservationState::Confirmed, now)
    }

    /// `Confirmada -> Completada`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidTransition`] from any other state.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), LedgerError> {
        self.transition(ReservationState::Confirmed, ReservationState::Completed, now)
    }

    /// Any state except `Cancelada` -> `Cancelada`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidTransition`] if already cancelled.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), LedgerError> {
        if self.state == ReservationState::Cancelled {
            return Err(LedgerError::InvalidTransition(format!(
                "reservation {} is already cancelled",
                self.id
            )));
        }
        self.state = ReservationState::Cancelled;
        self.updated_at = now;
        Ok(())
    }

    /// Marks a confirmed, unpaid reservation as paid.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidTransition`] unless the reservation
    /// is `Confirmada` and `no_pagado`.
    pub fn mark_paid(&mut self, now: DateTime<Utc>) -> Result<(), LedgerError> {
        if self.state != ReservationState::Confirmed {
            return Err(LedgerError::InvalidTransition(format!(
                "reservation {} must be {} to be paid, it is {}",
                self.id,
                ReservationState::Confirmed,
                self.state
            )));
        }
        if self.payment_state == PaymentState::Paid {
            return Err(LedgerError::InvalidTransition(format!(
                "reservation {} is already paid",
                self.id
            )));
        }
        self.payment_state = PaymentState::Paid;
        self.updated_at = now;
        Ok(())
    }

    fn transition(
        &mut self,
        from: ReservationState,
        to: ReservationState,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        if self.state != from {
            return Err(LedgerError::InvalidTransition(format!(
                "reservation {} must be {from} to become {to}, it is {}",
                self.id, self.state
            )));
        }
        self.state = to;
        self.updated_at = now;
        Ok(())
    }
}

/// Insert payload for a [`Reservation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    /// Guide booked.
    pub guide_profile_id: GuideProfileId,
    /// Client who booked.
    pub client_profile_id: ClientProfileId,
    /// Meeting place.
    pub place: Option<String>,
    /// Number of people.
    pub party_size: Option<i32>,
    /// Booked interval.
    pub slot: TimeSlot,
    /// Fee split.
    pub fees: FeeBreakdown,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl NewReservation {
    /// Materializes the stored reservation once the database assigned an id.
    #[must_use]
    pub fn into_reservation(self, id: ReservationId) -> Reservation {
        Reservation {
            id,
            guide_profile_id: self.guide_profile_id,
            client_profile_id: self.client_profile_id,
            place: self.place,
            party_size: self.party_size,
            slot: self.slot,
            fees: self.fees,
            state: ReservationState::Pending,
            payment_state: PaymentState::Unpaid,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

/// Payment recorded when a client pays a confirmed reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    /// Payment identifier.
    pub id: PaymentId,
    /// Reservation paid.
    pub reservation_id: ReservationId,
    /// Payment method label, e.g. `"card"`.
    pub payment_method: Option<String>,
    /// Amount charged to the client.
    pub total_amount: Decimal,
    /// Commission withheld from the guide.
    pub guide_commission: Decimal,
    /// Surcharge paid by the client.
    pub client_surcharge: Decimal,
    /// Payment status label.
    pub state: String,
    /// Recording timestamp.
    pub created_at: DateTime<Utc>,
}

/// Status label stored on completed payments.
pub const PAYMENT_COMPLETED: &str = "completado";

/// Insert payload for a [`PaymentTransaction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    /// Reservation paid.
    pub reservation_id: ReservationId,
    /// Payment method label.
    pub payment_method: Option<String>,
    /// Fee split copied from the reservation.
    pub fees: FeeBreakdown,
    /// Recording timestamp.
    pub created_at: DateTime<Utc>,
}

impl NewPayment {
    /// Materializes the stored payment once the database assigned an id.
    #[must_use]
    pub fn into_payment(self, id: PaymentId) -> PaymentTransaction {
        PaymentTransaction {
            id,
            reservation_id: self.reservation_id,
            payment_method: self.payment_method,
            total_amount: self.fees.total_amount,
            guide_commission: self.fees.guide_commission,
            client_surcharge: self.fees.client_surcharge,
            state: PAYMENT_COMPLETED.to_string(),
            created_at: self.created_at,
        }
    }
}
