//! # ecopoints-ledger
//!
//! Transaction core for the EcoPoints recycling-rewards marketplace and
//! the Waylo guide-booking marketplace.
//!
//! Every operation that moves points, stock or calendar time runs as one
//! database transaction: points are debited or credited through a
//! conditional update that can never drive a balance negative, stock the
//! same way, QR sessions are confirmed at most once behind a row lock, and
//! guide bookings are checked for overlap before insert.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP)
//!     │
//!     ├── REST Handlers (api/)
//!     │
//!     ├── RewardsService / SessionService / BookingService / LoginGuard (service/)
//!     ├── EventBus ──► notifier (notify)
//!     │
//!     ├── Domain rules (domain/)
//!     │
//!     └── LedgerStore: PostgreSQL | in-memory (persistence/)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod notify;
pub mod persistence;
pub mod service;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

/// Builds the HTTP application: API routes, tracing and CORS layers, bound
/// to `state`.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(api::build_router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
