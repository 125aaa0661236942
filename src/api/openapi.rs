//! OpenAPI document for the REST surface.

use utoipa::OpenApi;

use super::handlers::{bookings, login_guard, rewards, sessions, system};
use crate::error::{ErrorBody, ErrorResponse};

/// Generated OpenAPI description of every endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "ecopoints-ledger",
        description = "Points, inventory, QR-session and booking transaction core."
    ),
    paths(
        system::health_handler,
        rewards::redeem,
        rewards::availability,
        rewards::recycle,
        rewards::update_product,
        rewards::restock,
        rewards::reconcile_history,
        rewards::reconcile_all,
        sessions::create_redemption_session,
        sessions::confirm_redemption_session,
        sessions::create_recycling_session,
        sessions::confirm_recycling_session,
        bookings::create_reservation,
        bookings::quote_fees,
        bookings::accept,
        bookings::pay,
        bookings::complete,
        bookings::cancel,
        login_guard::check,
        login_guard::failure,
        login_guard::success,
    ),
    components(schemas(ErrorResponse, ErrorBody)),
    tags(
        (name = "System", description = "Health"),
        (name = "Rewards", description = "Direct redemption and recycling"),
        (name = "Products", description = "Store product upkeep"),
        (name = "Sessions", description = "Single-use QR sessions"),
        (name = "Reservations", description = "Guide bookings"),
        (name = "Login", description = "Failed-login throttling"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_the_ledger_paths() {
        let doc = ApiDoc::openapi();
        for path in [
            "/health",
            "/api/v1/redemptions",
            "/api/v1/sessions/redemption/{id}/confirm",
            "/api/v1/reservations",
            "/api/v1/login-attempts/failure",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
