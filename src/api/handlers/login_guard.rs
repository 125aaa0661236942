//! Login throttling endpoints, called by the auth layer around each
//! password check. Only the `service` (or `admin`) role may use them.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::caller::Caller;
use crate::api::dto::{LoginAttemptRequest, LoginStatusDto};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, LedgerError};

/// `POST /login-attempts/check` — Fail fast if the key is locked out.
///
/// # Errors
///
/// - [`LedgerError::Forbidden`] unless the caller is the auth service.
/// - [`LedgerError::RateLimited`] while a lockout is active.
#[utoipa::path(
    post,
    path = "/api/v1/login-attempts/check",
    tag = "Login",
    summary = "Check a login key",
    request_body = LoginAttemptRequest,
    responses(
        (status = 200, description = "Key may attempt a login", body = LoginStatusDto),
        (status = 403, description = "Caller is not the auth service", body = ErrorResponse),
        (status = 429, description = "Key is locked out", body = ErrorResponse),
    )
)]
pub async fn check(
    State(state): State<AppState>,
    caller: Caller,
    Json(req): Json<LoginAttemptRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    caller.trusted_service()?;
    state.login_guard.check(&req.email, &req.ip).await?;
    let status = state.login_guard.status(&req.email, &req.ip).await?;
    Ok(Json(LoginStatusDto::from(status)))
}

/// `POST /login-attempts/failure` — Record a failed password check.
///
/// # Errors
///
/// Returns [`LedgerError::Forbidden`] unless the caller is the auth
/// service, or [`LedgerError::Internal`] if the attempt cache is
/// unavailable.
#[utoipa::path(
    post,
    path = "/api/v1/login-attempts/failure",
    tag = "Login",
    summary = "Record a failed login",
    request_body = LoginAttemptRequest,
    responses(
        (status = 200, description = "Updated throttling state", body = LoginStatusDto),
        (status = 403, description = "Caller is not the auth service", body = ErrorResponse),
    )
)]
pub async fn failure(
    State(state): State<AppState>,
    caller: Caller,
    Json(req): Json<LoginAttemptRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    caller.trusted_service()?;
    let status = state.login_guard.record_failure(&req.email, &req.ip).await?;
    Ok(Json(LoginStatusDto::from(status)))
}

/// `POST /login-attempts/success` — Clear the key after a good login.
///
/// # Errors
///
/// Returns [`LedgerError::Forbidden`] unless the caller is the auth
/// service, or [`LedgerError::Internal`] if the attempt cache is
/// unavailable.
#[utoipa::path(
    post,
    path = "/api/v1/login-attempts/success",
    tag = "Login",
    summary = "Record a successful login",
    request_body = LoginAttemptRequest,
    responses(
        (status = 204, description = "Key cleared"),
        (status = 403, description = "Caller is not the auth service", body = ErrorResponse),
    )
)]
pub async fn success(
    State(state): State<AppState>,
    caller: Caller,
    Json(req): Json<LoginAttemptRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    caller.trusted_service()?;
    state.login_guard.record_success(&req.email, &req.ip).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Login throttling routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/login-attempts/check", post(check))
        .route("/login-attempts/failure", post(failure))
        .route("/login-attempts/success", post(success))
}
