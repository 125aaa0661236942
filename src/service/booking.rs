//! Booking service: guide reservations ("reservas") with overlap
//! protection, fee computation and the accept / pay / complete / cancel
//! lifecycle.
//!
//! Overlap protection is layered. The guide profile row is locked before
//! the predicate check so that two bookings of the same guide serialize;
//! the Postgres schema additionally carries an exclusion constraint whose
//! violation surfaces as [`LedgerError::OverlapConflict`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::{
    ClientProfileId, Clock, EventBus, FeeBreakdown, GuideProfileId, LedgerEvent, NewPayment,
    NewReservation, PaymentTransaction, Reservation, ReservationId, TimeSlot, UserId,
};
use crate::error::LedgerError;
use crate::persistence::{LedgerStore, LedgerTx, ReadMode};

use super::finish;

/// Booking request submitted on behalf of a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationRequest {
    /// Guide to book.
    pub guide_profile_id: GuideProfileId,
    /// Booking client.
    pub client_profile_id: ClientProfileId,
    /// Slot start.
    pub start: DateTime<Utc>,
    /// Slot end (exclusive).
    pub end: DateTime<Utc>,
    /// Guide's price before fees.
    pub base_amount: Decimal,
    /// Meeting place.
    pub place: Option<String>,
    /// Number of people.
    pub party_size: Option<i32>,
}

/// A paid reservation and the payment recorded for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaidReservation {
    /// Reservation after payment.
    pub reservation: Reservation,
    /// Payment row written.
    pub payment: PaymentTransaction,
}

/// Who may drive a lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Party {
    Guide,
    Client,
    Either,
}

/// Orchestrates guide bookings.
#[derive(Debug, Clone)]
pub struct BookingService {
    store: Arc<dyn LedgerStore>,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
}

impl BookingService {
    /// Creates a new `BookingService`.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>, event_bus: EventBus, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            event_bus,
            clock,
        }
    }

    /// Books a guide for a client.
    ///
    /// The caller must own the client profile.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidRange`] if `end <= start`.
    /// - [`LedgerError::ValidationFailed`] if `base_amount <= 0` or the
    ///   party size is not positive.
    /// - [`LedgerError::NotFound`] for an unknown guide or client profile.
    /// - [`LedgerError::Forbidden`] if the caller does not own the client
    ///   profile.
    /// - [`LedgerError::OverlapConflict`] if the guide is already booked
    ///   for an intersecting interval.
    pub async fn create_reservation(
        &self,
        caller: UserId,
        request: ReservationRequest,
    ) -> Result<Reservation, LedgerError> {
        let slot = TimeSlot::new(request.start, request.end)?;
        let fees = FeeBreakdown::compute(request.base_amount)?;
        if let Some(size) = request.party_size
            && size <= 0
        {
            return Err(LedgerError::ValidationFailed(format!(
                "party size must be positive, got {size}"
            )));
        }

        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let result = async {
            let guide = request.guide_profile_id;
            tx.guide_owner(guide, ReadMode::ForUpdate)
                .await?
                .ok_or_else(|| LedgerError::not_found("guide profile", guide))?;
            let client_owner = tx
                .client_owner(request.client_profile_id)
                .await?
                .ok_or_else(|| LedgerError::not_found("client profile", request.client_profile_id))?;
            if client_owner != caller {
                return Err(LedgerError::Forbidden(format!(
                    "user {caller} does not own client profile {}",
                    request.client_profile_id
                )));
            }
            if let Some(existing) = tx.find_overlapping_reservation(guide, slot).await? {
                tracing::info!(%guide, %existing, "booking rejected: slot taken");
                return Err(LedgerError::OverlapConflict(guide));
            }
            tx.insert_reservation(NewReservation {
                guide_profile_id: guide,
                client_profile_id: request.client_profile_id,
                place: request.place,
                party_size: request.party_size,
                slot,
                fees,
                created_at: now,
            })
            .await
        }
        .await;
        let reservation = finish(tx, result).await?;

        tracing::info!(
            reservation_id = %reservation.id,
            guide = %reservation.guide_profile_id,
            total = %reservation.fees.total_amount,
            "reservation created"
        );
        self.changed(&reservation);
        Ok(reservation)
    }

    /// Guide accepts a pending reservation.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] if the reservation is unknown.
    /// - [`LedgerError::Forbidden`] unless the caller owns the guide profile.
    /// - [`LedgerError::InvalidTransition`] unless it is `Pendiente`.
    pub async fn accept(
        &self,
        caller: UserId,
        id: ReservationId,
    ) -> Result<Reservation, LedgerError> {
        self.transition(caller, id, Party::Guide, |r, now| r.accept(now))
            .await
    }

    /// Guide marks a confirmed reservation as completed.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] if the reservation is unknown.
    /// - [`LedgerError::Forbidden`] unless the caller owns the guide profile.
    /// - [`LedgerError::InvalidTransition`] unless it is `Confirmada`.
    pub async fn complete(
        &self,
        caller: UserId,
        id: ReservationId,
    ) -> Result<Reservation, LedgerError> {
        self.transition(caller, id, Party::Guide, |r, now| r.complete(now))
            .await
    }

    /// Guide or client cancels a reservation, freeing the slot.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] if the reservation is unknown.
    /// - [`LedgerError::Forbidden`] unless the caller is the guide or the
    ///   client.
    /// - [`LedgerError::InvalidTransition`] if already cancelled.
    pub async fn cancel(
        &self,
        caller: UserId,
        id: ReservationId,
    ) -> Result<Reservation, LedgerError> {
        self.transition(caller, id, Party::Either, |r, now| r.cancel(now))
            .await
    }

    /// Client pays a confirmed reservation; records a payment with the
    /// reservation's fee split.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] if the reservation is unknown.
    /// - [`LedgerError::Forbidden`] unless the caller owns the client profile.
    /// - [`LedgerError::InvalidTransition`] unless it is `Confirmada` and
    ///   unpaid.
    pub async fn pay(
        &self,
        caller: UserId,
        id: ReservationId,
        payment_method: Option<String>,
    ) -> Result<PaidReservation, LedgerError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let result = async {
            let mut reservation = load_for_party(tx.as_mut(), caller, id, Party::Client).await?;
            reservation.mark_paid(now)?;
            tx.update_reservation(&reservation).await?;
            let payment = tx
                .insert_payment(NewPayment {
                    reservation_id: id,
                    payment_method,
                    fees: reservation.fees,
                    created_at: now,
                })
                .await?;
            Ok(PaidReservation {
                reservation,
                payment,
            })
        }
        .await;
        let paid = finish(tx, result).await?;

        tracing::info!(
            reservation_id = %id,
            payment_id = %paid.payment.id,
            total = %paid.payment.total_amount,
            "reservation paid"
        );
        self.changed(&paid.reservation);
        Ok(paid)
    }

    async fn transition<F>(
        &self,
        caller: UserId,
        id: ReservationId,
        party: Party,
        apply: F,
    ) -> Result<Reservation, LedgerError>
    where
        F: FnOnce(&mut Reservation, DateTime<Utc>) -> Result<(), LedgerError> + Send,
    {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let result = async {
            let mut reservation = load_for_party(tx.as_mut(), caller, id, party).await?;
            apply(&mut reservation, now)?;
            tx.update_reservation(&reservation).await?;
            Ok(reservation)
        }
        .await;
        let reservation = finish(tx, result).await?;

        tracing::info!(reservation_id = %id, state = %reservation.state, "reservation updated");
        self.changed(&reservation);
        Ok(reservation)
    }

    fn changed(&self, reservation: &Reservation) {
        let _ = self.event_bus.publish(LedgerEvent::ReservationChanged {
            reservation_id: reservation.id,
            guide_profile_id: reservation.guide_profile_id,
            state: reservation.state.to_string(),
            payment_state: reservation.payment_state.to_string(),
            timestamp: reservation.updated_at,
        });
    }
}

async fn load_for_party(
    tx: &mut dyn LedgerTx,
    caller: UserId,
    id: ReservationId,
    party: Party,
) -> Result<Reservation, LedgerError> {
    let reservation = tx
        .lock_reservation(id)
        .await?
        .ok_or_else(|| LedgerError::not_found("reservation", id))?;

    let is_guide = tx
        .guide_owner(reservation.guide_profile_id, ReadMode::Plain)
        .await?
        == Some(caller);
    let is_client = tx.client_owner(reservation.client_profile_id).await? == Some(caller);
    let allowed = match party {
        Party::Guide => is_guide,
        Party::Client => is_client,
        Party::Either => is_guide || is_client,
    };
    if !allowed {
        return Err(LedgerError::Forbidden(format!(
            "user {caller} may not modify reservation {id}"
        )));
    }
    Ok(reservation)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    use crate::domain::{ManualClock, PaymentState, ReservationState};
    use crate::persistence::InMemoryLedgerStore;

    struct Fixture {
        store: InMemoryLedgerStore,
        service: BookingService,
        guide_user: UserId,
        client_user: UserId,
        guide: GuideProfileId,
        client: ClientProfileId,
    }

    async fn fixture() -> Fixture {
        let store = InMemoryLedgerStore::new();
        let guide_user = store.seed_user("guia", 0).await;
        let client_user = store.seed_user("cliente", 0).await;
        let guide = store.seed_guide_profile(guide_user).await;
        let client = store.seed_client_profile(client_user).await;
        let service = BookingService::new(
            Arc::new(store.clone()),
            EventBus::new(16),
            Arc::new(ManualClock::default()),
        );
        Fixture {
            store,
            service,
            guide_user,
            client_user,
            guide,
            client,
        }
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        let Some(t) = Utc.with_ymd_and_hms(2025, 6, 1, hour, minute, 0).single() else {
            panic!("valid timestamp");
        };
        t
    }

    fn dec(s: &str) -> Decimal {
        let Ok(d) = Decimal::from_str(s) else {
            panic!("valid decimal {s}");
        };
        d
    }

    fn request(f: &Fixture, from: (u32, u32), to: (u32, u32)) -> ReservationRequest {
        ReservationRequest {
            guide_profile_id: f.guide,
            client_profile_id: f.client,
            start: at(from.0, from.1),
            end: at(to.0, to.1),
            base_amount: dec("100"),
            place: Some("Plaza Mayor".to_string()),
            party_size: Some(2),
        }
    }

    #[tokio::test]
    async fn overlapping_booking_is_rejected_adjacent_is_accepted() {
        let f = fixture().await;
        let Ok(first) = f
            .service
            .create_reservation(f.client_user, request(&f, (10, 0), (11, 0)))
            .await
        else {
            panic!("first booking should succeed");
        };
        assert_eq!(first.state, ReservationState::Pending);
        assert_eq!(first.payment_state, PaymentState::Unpaid);
        assert_eq!(first.fees.total_amount, dec("102.50"));

        let clash = f
            .service
            .create_reservation(f.client_user, request(&f, (10, 30), (11, 30)))
            .await;
        assert!(matches!(clash, Err(LedgerError::OverlapConflict(g)) if g == f.guide));

        let adjacent = f
            .service
            .create_reservation(f.client_user, request(&f, (11, 0), (12, 0)))
            .await;
        tokio_test::assert_ok!(adjacent);
    }

    #[tokio::test]
    async fn cancelled_reservation_frees_the_slot() {
        let f = fixture().await;
        let Ok(first) = f
            .service
            .create_reservation(f.client_user, request(&f, (10, 0), (11, 0)))
            .await
        else {
            panic!("booking should succeed");
        };
        tokio_test::assert_ok!(f.service.cancel(f.client_user, first.id).await);
        let again = f
            .service
            .create_reservation(f.client_user, request(&f, (10, 30), (11, 30)))
            .await;
        tokio_test::assert_ok!(again);
    }

    #[tokio::test]
    async fn invalid_requests() {
        let f = fixture().await;
        let inverted = f
            .service
            .create_reservation(f.client_user, request(&f, (11, 0), (10, 0)))
            .await;
        assert!(matches!(inverted, Err(LedgerError::InvalidRange)));

        let mut free = request(&f, (10, 0), (11, 0));
        free.base_amount = Decimal::ZERO;
        let free = f.service.create_reservation(f.client_user, free).await;
        assert!(matches!(free, Err(LedgerError::ValidationFailed(_))));

        let mut ghost = request(&f, (10, 0), (11, 0));
        ghost.guide_profile_id = GuideProfileId::new(9999);
        let ghost = f.service.create_reservation(f.client_user, ghost).await;
        assert!(matches!(ghost, Err(LedgerError::NotFound(_))));

        let impostor = f
            .service
            .create_reservation(f.guide_user, request(&f, (10, 0), (11, 0)))
            .await;
        assert!(matches!(impostor, Err(LedgerError::Forbidden(_))));
    }

    #[tokio::test]
    async fn accept_pay_complete() {
        let f = fixture().await;
        let Ok(booked) = f
            .service
            .create_reservation(f.client_user, request(&f, (10, 0), (11, 0)))
            .await
        else {
            panic!("booking should succeed");
        };

        let by_client = f.service.accept(f.client_user, booked.id).await;
        assert!(matches!(by_client, Err(LedgerError::Forbidden(_))));

        let early_pay = f.service.pay(f.client_user, booked.id, None).await;
        assert!(matches!(early_pay, Err(LedgerError::InvalidTransition(_))));

        let Ok(accepted) = f.service.accept(f.guide_user, booked.id).await else {
            panic!("guide accepts");
        };
        assert_eq!(accepted.state, ReservationState::Confirmed);

        let Ok(paid) = f
            .service
            .pay(f.client_user, booked.id, Some("card".to_string()))
            .await
        else {
            panic!("client pays");
        };
        assert_eq!(paid.reservation.payment_state, PaymentState::Paid);
        assert_eq!(paid.payment.total_amount, dec("102.50"));
        assert_eq!(paid.payment.guide_commission, dec("15.00"));
        assert_eq!(f.store.payments().await.len(), 1);

        let twice = f.service.pay(f.client_user, booked.id, None).await;
        assert!(matches!(twice, Err(LedgerError::InvalidTransition(_))));

        let Ok(done) = f.service.complete(f.guide_user, booked.id).await else {
            panic!("guide completes");
        };
        assert_eq!(done.state, ReservationState::Completed);
        let Some(stored) = f.store.reservation(booked.id).await else {
            panic!("reservation stored");
        };
        assert_eq!(stored.state, ReservationState::Completed);
    }

    #[tokio::test]
    async fn strangers_cannot_cancel() {
        let f = fixture().await;
        let stranger = f.store.seed_user("otro", 0).await;
        let Ok(booked) = f
            .service
            .create_reservation(f.client_user, request(&f, (10, 0), (11, 0)))
            .await
        else {
            panic!("booking should succeed");
        };
        let denied = f.service.cancel(stranger, booked.id).await;
        assert!(matches!(denied, Err(LedgerError::Forbidden(_))));

        let missing = f
            .service
            .cancel(f.guide_user, ReservationId::new(4242))
            .await;
        assert!(matches!(missing, Err(LedgerError::NotFound(_))));
    }
}
