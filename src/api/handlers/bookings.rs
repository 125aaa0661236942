//! Guide reservation handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::caller::Caller;
use crate::api::dto::{
    CreateReservationRequest, FeeQuery, FeesDto, PaidReservationDto, PayRequest, ReservationDto,
};
use crate::app_state::AppState;
use crate::domain::{FeeBreakdown, ReservationId};
use crate::error::{ErrorResponse, LedgerError};

/// `POST /reservations` — Book a guide.
///
/// # Errors
///
/// Returns [`LedgerError`] for an empty range, a non-positive amount, an
/// unknown profile, a client profile not owned by the caller, or an
/// overlapping booking.
#[utoipa::path(
    post,
    path = "/api/v1/reservations",
    tag = "Reservations",
    summary = "Book a guide",
    description = "Creates a `Pendiente` reservation after checking that the guide has no active booking intersecting `[start_time, end_time)`.",
    request_body = CreateReservationRequest,
    responses(
        (status = 201, description = "Reservation created", body = ReservationDto),
        (status = 400, description = "Invalid range or amount", body = ErrorResponse),
        (status = 403, description = "Client profile not owned by caller", body = ErrorResponse),
        (status = 404, description = "Profile not found", body = ErrorResponse),
        (status = 409, description = "Overlapping booking", body = ErrorResponse),
    )
)]
pub async fn create_reservation(
    State(state): State<AppState>,
    caller: Caller,
    Json(req): Json<CreateReservationRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let user_id = caller.user()?;
    let reservation = state
        .bookings
        .create_reservation(user_id, req.into())
        .await?;
    Ok((StatusCode::CREATED, Json(ReservationDto::from(reservation))))
}

/// `GET /reservations/fees` — Quote the fee split for a base amount.
///
/// # Errors
///
/// Returns [`LedgerError::ValidationFailed`] for a non-positive amount.
#[utoipa::path(
    get,
    path = "/api/v1/reservations/fees",
    tag = "Reservations",
    summary = "Quote reservation fees",
    params(FeeQuery),
    responses(
        (status = 200, description = "Fee split", body = FeesDto),
        (status = 400, description = "Invalid amount", body = ErrorResponse),
    )
)]
pub async fn quote_fees(Query(query): Query<FeeQuery>) -> Result<impl IntoResponse, LedgerError> {
    let fees = FeeBreakdown::compute(query.base_amount)?;
    Ok(Json(FeesDto::from(fees)))
}

/// `POST /reservations/{id}/accept` — Guide accepts.
///
/// # Errors
///
/// Returns [`LedgerError`] if the reservation is unknown, not the caller's,
/// or not `Pendiente`.
#[utoipa::path(
    post,
    path = "/api/v1/reservations/{id}/accept",
    tag = "Reservations",
    summary = "Accept a reservation",
    params(("id" = i64, Path, description = "Reservation id")),
    responses(
        (status = 200, description = "Reservation confirmed", body = ReservationDto),
        (status = 403, description = "Caller is not the guide", body = ErrorResponse),
        (status = 404, description = "Reservation not found", body = ErrorResponse),
        (status = 409, description = "Invalid transition", body = ErrorResponse),
    )
)]
pub async fn accept(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, LedgerError> {
    let reservation = state
        .bookings
        .accept(caller.user()?, ReservationId::new(id))
        .await?;
    Ok(Json(ReservationDto::from(reservation)))
}

/// `POST /reservations/{id}/pay` — Client pays.
///
/// # Errors
///
/// Returns [`LedgerError`] if the reservation is unknown, not the caller's,
/// not confirmed or already paid.
#[utoipa::path(
    post,
    path = "/api/v1/reservations/{id}/pay",
    tag = "Reservations",
    summary = "Pay a reservation",
    params(("id" = i64, Path, description = "Reservation id")),
    request_body = PayRequest,
    responses(
        (status = 200, description = "Reservation paid", body = PaidReservationDto),
        (status = 403, description = "Caller is not the client", body = ErrorResponse),
        (status = 404, description = "Reservation not found", body = ErrorResponse),
        (status = 409, description = "Invalid transition", body = ErrorResponse),
    )
)]
pub async fn pay(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
    Json(req): Json<PayRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let paid = state
        .bookings
        .pay(caller.user()?, ReservationId::new(id), req.payment_method)
        .await?;
    Ok(Json(PaidReservationDto::from(paid)))
}

/// `POST /reservations/{id}/complete` — Guide completes.
///
/// # Errors
///
/// Returns [`LedgerError`] if the reservation is unknown, not the caller's,
/// or not `Confirmada`.
#[utoipa::path(
    post,
    path = "/api/v1/reservations/{id}/complete",
    tag = "Reservations",
    summary = "Complete a reservation",
    params(("id" = i64, Path, description = "Reservation id")),
    responses(
        (status = 200, description = "Reservation completed", body = ReservationDto),
        (status = 403, description = "Caller is not the guide", body = ErrorResponse),
        (status = 404, description = "Reservation not found", body = ErrorResponse),
        (status = 409, description = "Invalid transition", body = ErrorResponse),
    )
)]
pub async fn complete(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, LedgerError> {
    let reservation = state
        .bookings
        .complete(caller.user()?, ReservationId::new(id))
        .await?;
    Ok(Json(ReservationDto::from(reservation)))
}

/// `POST /reservations/{id}/cancel` — Guide or client cancels.
///
/// # Errors
///
/// Returns [`LedgerError`] if the reservation is unknown, not the caller's,
/// or already cancelled.
#[utoipa::path(
    post,
    path = "/api/v1/reservations/{id}/cancel",
    tag = "Reservations",
    summary = "Cancel a reservation",
    params(("id" = i64, Path, description = "Reservation id")),
    responses(
        (status = 200, description = "Reservation cancelled", body = ReservationDto),
        (status = 403, description = "Caller is neither guide nor client", body = ErrorResponse),
        (status = 404, description = "Reservation not found", body = ErrorResponse),
        (status = 409, description = "Already cancelled", body = ErrorResponse),
    )
)]
pub async fn cancel(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, LedgerError> {
    let reservation = state
        .bookings
        .cancel(caller.user()?, ReservationId::new(id))
        .await?;
    Ok(Json(ReservationDto::from(reservation)))
}

/// Reservation routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/reservations", post(create_reservation))
        .route("/reservations/fees", get(quote_fees))
        .route("/reservations/{id}/accept", post(accept))
        .route("/reservations/{id}/pay", post(pay))
        .route("/reservations/{id}/complete", post(complete))
        .route("/reservations/{id}/cancel", post(cancel))
}
