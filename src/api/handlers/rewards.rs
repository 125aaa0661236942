//! Direct redemption and recycling, product upkeep, history
//! reconciliation.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, patch, post};
use axum::{Json, Router};

use crate::api::caller::Caller;
use crate::api::dto::{
    AvailabilityDto, AvailabilityQuery, HistorySnapshotDto, ProductDto, ReconcileAllResponse,
    RecycleRequest, RecyclingReceiptDto, RedeemRequest, RedemptionReceiptDto, RestockRequest,
    StockResponse, UpdateProductRequest,
};
use crate::app_state::AppState;
use crate::domain::{ObjectTypeId, ProductId, UserId};
use crate::error::{ErrorResponse, LedgerError};
use crate::service::RecyclingRequest;

/// `POST /redemptions` — Redeem points for a product.
///
/// # Errors
///
/// Returns [`LedgerError`] if the product or user is unavailable, stock
/// is short or the balance does not cover the cost.
#[utoipa::path(
    post,
    path = "/api/v1/redemptions",
    tag = "Rewards",
    summary = "Redeem points for a product",
    description = "Debits the caller's balance, decrements stock and records a redemption in one transaction.",
    request_body = RedeemRequest,
    responses(
        (status = 201, description = "Redemption recorded", body = RedemptionReceiptDto),
        (status = 400, description = "Out of stock or insufficient points", body = ErrorResponse),
        (status = 404, description = "Product or user not found", body = ErrorResponse),
    )
)]
pub async fn redeem(
    State(state): State<AppState>,
    caller: Caller,
    Json(req): Json<RedeemRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let user_id = caller.user()?;
    let receipt = state
        .rewards
        .redeem(user_id, ProductId::new(req.product_id), req.quantity)
        .await?;
    Ok((StatusCode::CREATED, Json(RedemptionReceiptDto::from(receipt))))
}

/// `GET /products/{id}/availability` — Check whether a redemption would
/// succeed.
///
/// # Errors
///
/// Returns [`LedgerError::NotFound`] if the product or user is unavailable.
#[utoipa::path(
    get,
    path = "/api/v1/products/{id}/availability",
    tag = "Rewards",
    summary = "Check redemption availability",
    description = "Reports whether the caller could redeem the product now, and why not otherwise. Changes nothing.",
    params(
        ("id" = i64, Path, description = "Product id"),
        AvailabilityQuery,
    ),
    responses(
        (status = 200, description = "Availability report", body = AvailabilityDto),
        (status = 404, description = "Product or user not found", body = ErrorResponse),
    )
)]
pub async fn availability(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<impl IntoResponse, LedgerError> {
    let user_id = caller.user()?;
    let report = state
        .rewards
        .check_redemption(user_id, ProductId::new(id), query.quantity)
        .await?;
    Ok(Json(AvailabilityDto::from(report)))
}

/// `POST /recyclings` — Record a drop-off at the calling store.
///
/// # Errors
///
/// Returns [`LedgerError`] for an invalid weight or an unavailable store,
/// material or user.
#[utoipa::path(
    post,
    path = "/api/v1/recyclings",
    tag = "Rewards",
    summary = "Record a recycling drop-off",
    description = "Credits `floor(weight * rate)` points to the user, records the drop-off and appends a history snapshot.",
    request_body = RecycleRequest,
    responses(
        (status = 201, description = "Drop-off recorded", body = RecyclingReceiptDto),
        (status = 400, description = "Invalid weight", body = ErrorResponse),
        (status = 404, description = "Store, material or user not found", body = ErrorResponse),
    )
)]
pub async fn recycle(
    State(state): State<AppState>,
    caller: Caller,
    Json(req): Json<RecycleRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let store_id = caller.store()?;
    let receipt = state
        .rewards
        .recycle(RecyclingRequest {
            user_id: UserId::new(req.user_id),
            store_id,
            object_type_id: ObjectTypeId::new(req.object_type_id),
            weight: req.weight,
            qr_code: req.qr_code,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(RecyclingReceiptDto::from(receipt))))
}

/// `PATCH /products/{id}` — Edit a product of the calling store.
///
/// # Errors
///
/// Returns [`LedgerError`] for an empty or invalid patch, an unknown
/// product, or a product owned by another store.
#[utoipa::path(
    patch,
    path = "/api/v1/products/{id}",
    tag = "Products",
    summary = "Update a product",
    description = "Sparse update of name, unit point cost and active flag. Stock is changed through restock and redemptions only.",
    params(("id" = i64, Path, description = "Product id")),
    request_body = UpdateProductRequest,
    responses(
        (status = 200, description = "Updated product", body = ProductDto),
        (status = 400, description = "Invalid patch", body = ErrorResponse),
        (status = 403, description = "Product belongs to another store", body = ErrorResponse),
        (status = 404, description = "Product not found", body = ErrorResponse),
    )
)]
pub async fn update_product(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
    Json(req): Json<UpdateProductRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let store_id = caller.store()?;
    let product = state
        .rewards
        .update_product(store_id, ProductId::new(id), req.into())
        .await?;
    Ok(Json(ProductDto::from(product)))
}

/// `POST /products/{id}/restock` — Add stock to a product of the calling
/// store.
///
/// # Errors
///
/// Returns [`LedgerError`] for a non-positive quantity, an unknown product
/// or a product owned by another store.
#[utoipa::path(
    post,
    path = "/api/v1/products/{id}/restock",
    tag = "Products",
    summary = "Restock a product",
    params(("id" = i64, Path, description = "Product id")),
    request_body = RestockRequest,
    responses(
        (status = 200, description = "New stock level", body = StockResponse),
        (status = 400, description = "Invalid quantity", body = ErrorResponse),
        (status = 403, description = "Product belongs to another store", body = ErrorResponse),
        (status = 404, description = "Product not found", body = ErrorResponse),
    )
)]
pub async fn restock(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
    Json(req): Json<RestockRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let store_id = caller.store()?;
    let stock = state
        .rewards
        .restock(store_id, ProductId::new(id), req.quantity)
        .await?;
    Ok(Json(StockResponse {
        product_id: id,
        stock,
    }))
}

/// `POST /users/{id}/history/reconcile` — Recompute the user's latest
/// history total.
///
/// # Errors
///
/// Returns [`LedgerError::Forbidden`] when a user targets someone else.
#[utoipa::path(
    post,
    path = "/api/v1/users/{id}/history/reconcile",
    tag = "Rewards",
    summary = "Reconcile a user's points history",
    description = "Sets the latest snapshot's total to the sum of the user's active recycling points, inserting a snapshot if none exists.",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "Reconciled snapshot", body = HistorySnapshotDto),
        (status = 403, description = "Not the caller's history", body = ErrorResponse),
    )
)]
pub async fn reconcile_history(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, LedgerError> {
    let target = UserId::new(id);
    if caller.admin().is_err() && caller.user()? != target {
        return Err(LedgerError::Forbidden(format!(
            "user {} may not reconcile user {target}",
            caller.id
        )));
    }
    let snapshot = state.rewards.reconcile_history(target).await?;
    Ok(Json(HistorySnapshotDto::from(snapshot)))
}

/// `POST /admin/history/reconcile` — Reconcile every active user.
///
/// # Errors
///
/// Returns [`LedgerError::Forbidden`] for non-admin callers.
#[utoipa::path(
    post,
    path = "/api/v1/admin/history/reconcile",
    tag = "Rewards",
    summary = "Reconcile all users' points history",
    responses(
        (status = 200, description = "Number of users reconciled", body = ReconcileAllResponse),
        (status = 403, description = "Admin role required", body = ErrorResponse),
    )
)]
pub async fn reconcile_all(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<impl IntoResponse, LedgerError> {
    caller.admin()?;
    let reconciled_users = state.rewards.reconcile_all().await?;
    Ok(Json(ReconcileAllResponse { reconciled_users }))
}

/// Rewards routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/redemptions", post(redeem))
        .route("/recyclings", post(recycle))
        .route("/products/{id}", patch(update_product))
        .route("/products/{id}/availability", get(availability))
        .route("/products/{id}/restock", post(restock))
        .route("/users/{id}/history/reconcile", post(reconcile_history))
        .route("/admin/history/reconcile", post(reconcile_all))
}
