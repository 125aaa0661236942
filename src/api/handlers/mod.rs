//! REST endpoint handlers organized by resource.

pub mod bookings;
pub mod login_guard;
pub mod rewards;
pub mod sessions;
pub mod system;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(rewards::routes())
        .merge(sessions::routes())
        .merge(bookings::routes())
        .merge(login_guard::routes())
}
