//! QR session handlers.
//!
//! Stores open sessions; users confirm them by scanning. An expired
//! session answers `410 Gone` with the closed session in the body.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::caller::Caller;
use crate::api::dto::{
    ConfirmRecyclingRequest, ConfirmRedemptionRequest, CreateRecyclingSessionRequest,
    CreateRedemptionSessionRequest, RecyclingConfirmationDto, RedemptionConfirmationDto,
    SessionDto,
};
use crate::app_state::AppState;
use crate::domain::{ObjectTypeId, ProductId, SessionId, StoreId};
use crate::error::{ErrorResponse, LedgerError};
use crate::service::{ConfirmationOutcome, RecyclingClaim, RedemptionClaim};

/// `POST /sessions/redemption` — Open a redemption QR session.
///
/// # Errors
///
/// Returns [`LedgerError`] if the store or product is unavailable, the
/// product belongs to another store, or stock is short.
#[utoipa::path(
    post,
    path = "/api/v1/sessions/redemption",
    tag = "Sessions",
    summary = "Open a redemption session",
    description = "Snapshots the cost of the requested units and returns a single-use token to render as a QR code.",
    request_body = CreateRedemptionSessionRequest,
    responses(
        (status = 201, description = "Session opened", body = SessionDto),
        (status = 400, description = "Out of stock or foreign product", body = ErrorResponse),
        (status = 404, description = "Store or product not found", body = ErrorResponse),
    )
)]
pub async fn create_redemption_session(
    State(state): State<AppState>,
    caller: Caller,
    Json(req): Json<CreateRedemptionSessionRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let store_id = caller.store()?;
    let session = state
        .sessions
        .create_redemption_session(store_id, ProductId::new(req.product_id), req.quantity)
        .await?;
    Ok((StatusCode::CREATED, Json(SessionDto::from(session))))
}

/// `POST /sessions/redemption/{id}/confirm` — Confirm a redemption
/// session as the scanning user.
///
/// # Errors
///
/// Returns [`LedgerError`] if the session is unknown or closed, the claim
/// does not match, the price changed, stock is short or the balance does
/// not cover the cost.
#[utoipa::path(
    post,
    path = "/api/v1/sessions/redemption/{id}/confirm",
    tag = "Sessions",
    summary = "Confirm a redemption session",
    params(("id" = uuid::Uuid, Path, description = "Session token")),
    request_body = ConfirmRedemptionRequest,
    responses(
        (status = 200, description = "Session confirmed", body = RedemptionConfirmationDto),
        (status = 410, description = "Session expired and is now closed", body = RedemptionConfirmationDto),
        (status = 400, description = "Session closed, claim mismatch, stock or balance short", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 409, description = "Price changed since the session was opened", body = ErrorResponse),
    )
)]
pub async fn confirm_redemption_session(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<uuid::Uuid>,
    Json(req): Json<ConfirmRedemptionRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let claim = RedemptionClaim {
        user_id: caller.user()?,
        store_id: req.store_id.map(StoreId::new),
        product_id: ProductId::new(req.product_id),
        quantity: req.quantity,
    };
    let outcome = state
        .sessions
        .confirm_redemption_session(SessionId::from_uuid(id), claim)
        .await?;
    let status = outcome_status(&outcome);
    Ok((status, Json(RedemptionConfirmationDto::from(outcome))))
}

/// `POST /sessions/recycling` — Open a recycling QR session.
///
/// # Errors
///
/// Returns [`LedgerError`] for an invalid weight or an unavailable store or
/// material.
#[utoipa::path(
    post,
    path = "/api/v1/sessions/recycling",
    tag = "Sessions",
    summary = "Open a recycling session",
    request_body = CreateRecyclingSessionRequest,
    responses(
        (status = 201, description = "Session opened", body = SessionDto),
        (status = 400, description = "Invalid weight", body = ErrorResponse),
        (status = 404, description = "Store or material not found", body = ErrorResponse),
    )
)]
pub async fn create_recycling_session(
    State(state): State<AppState>,
    caller: Caller,
    Json(req): Json<CreateRecyclingSessionRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let store_id = caller.store()?;
    let session = state
        .sessions
        .create_recycling_session(store_id, ObjectTypeId::new(req.object_type_id), req.weight)
        .await?;
    Ok((StatusCode::CREATED, Json(SessionDto::from(session))))
}

/// `POST /sessions/recycling/{id}/confirm` — Confirm a recycling session
/// as the scanning user.
///
/// # Errors
///
/// Returns [`LedgerError`] if the session is unknown or closed or the
/// claim does not match.
#[utoipa::path(
    post,
    path = "/api/v1/sessions/recycling/{id}/confirm",
    tag = "Sessions",
    summary = "Confirm a recycling session",
    params(("id" = uuid::Uuid, Path, description = "Session token")),
    request_body = ConfirmRecyclingRequest,
    responses(
        (status = 200, description = "Session confirmed", body = RecyclingConfirmationDto),
        (status = 410, description = "Session expired and is now closed", body = RecyclingConfirmationDto),
        (status = 400, description = "Session closed or claim mismatch", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse),
    )
)]
pub async fn confirm_recycling_session(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<uuid::Uuid>,
    Json(req): Json<ConfirmRecyclingRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let claim = RecyclingClaim {
        user_id: caller.user()?,
        store_id: req.store_id.map(StoreId::new),
        object_type_id: ObjectTypeId::new(req.object_type_id),
        weight: req.weight,
    };
    let outcome = state
        .sessions
        .confirm_recycling_session(SessionId::from_uuid(id), claim)
        .await?;
    let status = outcome_status(&outcome);
    Ok((status, Json(RecyclingConfirmationDto::from(outcome))))
}

const fn outcome_status<T, R>(outcome: &ConfirmationOutcome<T, R>) -> StatusCode {
    match outcome {
        ConfirmationOutcome::Confirmed { .. } => StatusCode::OK,
        ConfirmationOutcome::Expired { .. } => StatusCode::GONE,
    }
}

/// Session routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sessions/redemption", post(create_redemption_session))
        .route(
            "/sessions/redemption/{id}/confirm",
            post(confirm_redemption_session),
        )
        .route("/sessions/recycling", post(create_recycling_session))
        .route(
            "/sessions/recycling/{id}/confirm",
            post(confirm_recycling_session),
        )
}
