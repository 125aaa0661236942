//! DTOs for guide reservations.
//!
//! Money amounts are `rust_decimal::Decimal`, serialized as JSON strings
//! to avoid floating-point loss.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{
    ClientProfileId, FeeBreakdown, GuideProfileId, PaymentTransaction, Reservation,
};
use crate::service::{PaidReservation, ReservationRequest};

/// Request body for `POST /reservations`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateReservationRequest {
    /// Guide to book.
    pub guide_profile_id: i64,
    /// Booking client; must belong to the caller.
    pub client_profile_id: i64,
    /// Slot start.
    pub start_time: DateTime<Utc>,
    /// Slot end (exclusive).
    pub end_time: DateTime<Utc>,
    /// Guide's price before fees.
    #[schema(value_type = String, example = "100.00")]
    pub base_amount: Decimal,
    /// Meeting place.
    #[serde(default)]
    pub place: Option<String>,
    /// Number of people.
    #[serde(default)]
    pub party_size: Option<i32>,
}

impl From<CreateReservationRequest> for ReservationRequest {
    fn from(r: CreateReservationRequest) -> Self {
        Self {
            guide_profile_id: GuideProfileId::new(r.guide_profile_id),
            client_profile_id: ClientProfileId::new(r.client_profile_id),
            start: r.start_time,
            end: r.end_time,
            base_amount: r.base_amount,
            place: r.place,
            party_size: r.party_size,
        }
    }
}

/// Fee split of a reservation.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FeesDto {
    /// Guide's price.
    #[schema(value_type = String)]
    pub base_amount: Decimal,
    /// Commission withheld from the guide (15 %).
    #[schema(value_type = String)]
    pub guide_commission: Decimal,
    /// Surcharge paid by the client (2.5 %).
    #[schema(value_type = String)]
    pub client_surcharge: Decimal,
    /// Amount charged to the client.
    #[schema(value_type = String)]
    pub total_amount: Decimal,
    /// What the guide receives.
    #[schema(value_type = String)]
    pub guide_payout: Decimal,
    /// What the platform keeps.
    #[schema(value_type = String)]
    pub platform_take: Decimal,
}

impl From<FeeBreakdown> for FeesDto {
    fn from(f: FeeBreakdown) -> Self {
        Self {
            base_amount: f.base_amount,
            guide_commission: f.guide_commission,
            client_surcharge: f.client_surcharge,
            total_amount: f.total_amount,
            guide_payout: f.guide_payout(),
            platform_take: f.platform_take(),
        }
    }
}

/// Query parameters for the fee quote.
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct FeeQuery {
    /// Guide's price, e.g. `100.00`.
    #[param(value_type = String)]
    pub base_amount: Decimal,
}

/// A reservation.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReservationDto {
    /// Reservation id.
    pub id: i64,
    /// Guide booked.
    pub guide_profile_id: i64,
    /// Client.
    pub client_profile_id: i64,
    /// Meeting place.
    pub place: Option<String>,
    /// Number of people.
    pub party_size: Option<i32>,
    /// Slot start.
    pub start_time: DateTime<Utc>,
    /// Slot end.
    pub end_time: DateTime<Utc>,
    /// Fee split.
    pub fees: FeesDto,
    /// `Pendiente`, `Confirmada`, `Completada` or `Cancelada`.
    pub state: String,
    /// `no_pagado` or `pagado`.
    pub payment_state: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last change.
    pub updated_at: DateTime<Utc>,
}

impl From<Reservation> for ReservationDto {
    fn from(r: Reservation) -> Self {
        Self {
            id: r.id.get(),
            guide_profile_id: r.guide_profile_id.get(),
            client_profile_id: r.client_profile_id.get(),
            place: r.place,
            party_size: r.party_size,
            start_time: r.slot.start(),
            end_time: r.slot.end(),
            fees: r.fees.into(),
            state: r.state.to_string(),
            payment_state: r.payment_state.to_string(),
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Request body for `POST /reservations/{id}/pay`.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct PayRequest {
    /// Payment method label, e.g. `"card"`.
    #[serde(default)]
    pub payment_method: Option<String>,
}

/// A recorded payment.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaymentDto {
    /// Payment id.
    pub id: i64,
    /// Reservation paid.
    pub reservation_id: i64,
    /// Method label.
    pub payment_method: Option<String>,
    /// Amount charged.
    #[schema(value_type = String)]
    pub total_amount: Decimal,
    /// Commission.
    #[schema(value_type = String)]
    pub guide_commission: Decimal,
    /// Surcharge.
    #[schema(value_type = String)]
    pub client_surcharge: Decimal,
    /// Status label.
    pub state: String,
    /// Recording timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<PaymentTransaction> for PaymentDto {
    fn from(p: PaymentTransaction) -> Self {
        Self {
            id: p.id.get(),
            reservation_id: p.reservation_id.get(),
            payment_method: p.payment_method,
            total_amount: p.total_amount,
            guide_commission: p.guide_commission,
            client_surcharge: p.client_surcharge,
            state: p.state,
            created_at: p.created_at,
        }
    }
}

/// Response body of a payment.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaidReservationDto {
    /// Reservation after payment.
    pub reservation: ReservationDto,
    /// Payment written.
    pub payment: PaymentDto,
}

impl From<PaidReservation> for PaidReservationDto {
    fn from(p: PaidReservation) -> Self {
        Self {
            reservation: p.reservation.into(),
            payment: p.payment.into(),
        }
    }
}
