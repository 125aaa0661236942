//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::config::LedgerConfig;
use crate::domain::{Clock, EventBus};
use crate::persistence::{AttemptCache, LedgerStore};
use crate::service::{BookingService, LoginGuard, RewardsService, SessionService};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Direct redemption, recycling, product upkeep.
    pub rewards: Arc<RewardsService>,
    /// QR sessions.
    pub sessions: Arc<SessionService>,
    /// Guide reservations.
    pub bookings: Arc<BookingService>,
    /// Failed-login throttle.
    pub login_guard: Arc<LoginGuard>,
    /// Event bus the services publish on.
    pub event_bus: EventBus,
    /// Storage backend, probed by the health check.
    pub store: Arc<dyn LedgerStore>,
}

impl AppState {
    /// Wires every service over one store, attempt cache and clock.
    #[must_use]
    pub fn new(
        store: Arc<dyn LedgerStore>,
        attempts: Arc<dyn AttemptCache>,
        clock: Arc<dyn Clock>,
        config: &LedgerConfig,
    ) -> Self {
        let event_bus = EventBus::new(config.event_bus_capacity);
        let rewards =
            RewardsService::new(Arc::clone(&store), event_bus.clone(), Arc::clone(&clock));
        let sessions = SessionService::new(
            Arc::clone(&store),
            event_bus.clone(),
            Arc::clone(&clock),
            config.session_ttl(),
        );
        let bookings =
            BookingService::new(Arc::clone(&store), event_bus.clone(), Arc::clone(&clock));
        let login_guard = LoginGuard::new(attempts, clock, config.login_policy());

        Self {
            rewards: Arc::new(rewards),
            sessions: Arc::new(sessions),
            bookings: Arc::new(bookings),
            login_guard: Arc::new(login_guard),
            event_bus,
            store,
        }
    }
}
