//! QR session service: stores open single-use sessions, users confirm
//! them by scanning.
//!
//! Confirmation locks the session row first. Only one confirmation of a
//! given session can get past that lock at a time; every later attempt
//! sees a terminal state and fails with
//! [`LedgerError::SessionNotPending`].

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::domain::{
    Clock, EventBus, LedgerEvent, ObjectTypeId, ProductId, QrSession, RecyclingSession,
    RecyclingTerms, RedemptionSession, RedemptionTerms, SessionId, SessionKind, StoreId, UserId,
    catalog::{normalize_quantity, validate_weight},
};
use crate::error::LedgerError;
use crate::persistence::{LedgerStore, LedgerTx, ReadMode};

use super::finish;
use super::recycling::{self, DropOff, RecyclingReceipt};
use super::redemption::{self, RedemptionReceipt};

/// Outcome of a confirmation attempt that did not fail.
///
/// `Expired` is committed: the session is closed even though nothing was
/// redeemed or credited.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmationOutcome<T, R> {
    /// The session was fulfilled.
    Confirmed {
        /// Session in its final state.
        session: QrSession<T>,
        /// Ledger effects applied.
        receipt: R,
    },
    /// The deadline had passed; the session is now `EXPIRED`.
    Expired {
        /// Session in its final state.
        session: QrSession<T>,
    },
}

impl<T, R> ConfirmationOutcome<T, R> {
    /// Treats expiry as a failure, for callers that only care about the
    /// confirmed case.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::SessionExpired`] for the `Expired` outcome.
    pub fn into_confirmed(self) -> Result<(QrSession<T>, R), LedgerError> {
        match self {
            Self::Confirmed { session, receipt } => Ok((session, receipt)),
            Self::Expired { session } => Err(LedgerError::SessionExpired(session.id)),
        }
    }
}

/// What the scanning user claims a redemption session contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedemptionClaim {
    /// Scanning user.
    pub user_id: UserId,
    /// Store, if the client supplies it.
    pub store_id: Option<StoreId>,
    /// Product shown to the user.
    pub product_id: ProductId,
    /// Quantity shown to the user.
    pub quantity: i64,
}

/// What the scanning user claims a recycling session contains.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecyclingClaim {
    /// Scanning user.
    pub user_id: UserId,
    /// Store, if the client supplies it.
    pub store_id: Option<StoreId>,
    /// Material shown to the user.
    pub object_type_id: ObjectTypeId,
    /// Weight shown to the user.
    pub weight: f64,
}

/// Orchestrates QR session creation and confirmation.
#[derive(Debug, Clone)]
pub struct SessionService {
    store: Arc<dyn LedgerStore>,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl SessionService {
    /// Creates a new `SessionService` whose sessions live for `ttl`.
    #[must_use]
    pub fn new(
        store: Arc<dyn LedgerStore>,
        event_bus: EventBus,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            event_bus,
            clock,
            ttl,
        }
    }

    /// Opens a redemption session for `quantity` units (minimum one).
    ///
    /// Stock is prechecked here and checked again at confirmation.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] for a missing or inactive store or product.
    /// - [`LedgerError::ValidationFailed`] if the product belongs to
    ///   another store.
    /// - [`LedgerError::OutOfStock`] if stock is already short.
    pub async fn create_redemption_session(
        &self,
        store_id: StoreId,
        product_id: ProductId,
        quantity: Option<i64>,
    ) -> Result<RedemptionSession, LedgerError> {
        let quantity = normalize_quantity(quantity);
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let result = async {
            recycling::load_active_store(tx.as_mut(), store_id).await?;
            let product =
                redemption::load_available_product(tx.as_mut(), product_id, ReadMode::Plain)
                    .await?;
            if product.store_id != store_id {
                return Err(LedgerError::ValidationFailed(format!(
                    "product {product_id} does not belong to store {store_id}"
                )));
            }
            redemption::ensure_stock(&product, quantity)?;
            let session = QrSession::open(
                store_id,
                RedemptionTerms {
                    product_id,
                    quantity,
                },
                product.cost_for(quantity)?,
                now,
                self.ttl,
            );
            tx.insert_redemption_session(&session).await?;
            Ok(session)
        }
        .await;
        let session = finish(tx, result).await?;
        self.opened(session.id, SessionKind::Redemption, store_id, session.expires_at);
        Ok(session)
    }

    /// Confirms a redemption session on behalf of the scanning user.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::SessionNotFound`] / [`LedgerError::SessionNotPending`].
    /// - [`LedgerError::ValidationFailed`] if the claim does not match.
    /// - [`LedgerError::StaleSession`] if the product cost changed since
    ///   the session was opened.
    /// - [`LedgerError::OutOfStock`] / [`LedgerError::InsufficientPoints`].
    pub async fn confirm_redemption_session(
        &self,
        session_id: SessionId,
        claim: RedemptionClaim,
    ) -> Result<ConfirmationOutcome<RedemptionTerms, RedemptionReceipt>, LedgerError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let result = confirm_redemption_in(tx.as_mut(), session_id, claim, now).await;
        let outcome = finish(tx, result).await?;

        match &outcome {
            ConfirmationOutcome::Confirmed { receipt, .. } => {
                let _ = self.event_bus.publish(LedgerEvent::PointsRedeemed {
                    redemption_id: receipt.redemption.id,
                    user_id: claim.user_id,
                    store_id: receipt.redemption.store_id,
                    product_id: receipt.redemption.product_id,
                    quantity: receipt.redemption.quantity,
                    points_spent: receipt.redemption.points_spent,
                    new_balance: receipt.new_balance,
                    remaining_stock: receipt.remaining_stock,
                    timestamp: now,
                });
                self.confirmed(session_id, SessionKind::Redemption, claim.user_id, now);
            }
            ConfirmationOutcome::Expired { .. } => {
                self.expired(session_id, SessionKind::Redemption, now);
            }
        }
        Ok(outcome)
    }

    /// Opens a recycling session for a measured weight of material.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] for a missing or inactive store or
    ///   object type.
    /// - [`LedgerError::ValidationFailed`] for a non-positive weight.
    pub async fn create_recycling_session(
        &self,
        store_id: StoreId,
        object_type_id: ObjectTypeId,
        weight: f64,
    ) -> Result<RecyclingSession, LedgerError> {
        validate_weight(weight)?;
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let result = async {
            recycling::load_active_store(tx.as_mut(), store_id).await?;
            let object_type =
                recycling::load_active_object_type(tx.as_mut(), object_type_id, ReadMode::Plain)
                    .await?;
            let session = QrSession::open(
                store_id,
                RecyclingTerms {
                    object_type_id,
                    weight,
                },
                object_type.points_for(weight)?,
                now,
                self.ttl,
            );
            tx.insert_recycling_session(&session).await?;
            Ok(session)
        }
        .await;
        let session = finish(tx, result).await?;
        self.opened(session.id, SessionKind::Recycling, store_id, session.expires_at);
        Ok(session)
    }

    /// Confirms a recycling session on behalf of the scanning user.
    ///
    /// Points are computed from the object type's current rate.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::SessionNotFound`] / [`LedgerError::SessionNotPending`].
    /// - [`LedgerError::ValidationFailed`] if the claim does not match.
    /// - [`LedgerError::NotFound`] if the object type or user is gone.
    pub async fn confirm_recycling_session(
        &self,
        session_id: SessionId,
        claim: RecyclingClaim,
    ) -> Result<ConfirmationOutcome<RecyclingTerms, RecyclingReceipt>, LedgerError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let result = confirm_recycling_in(tx.as_mut(), session_id, claim, now).await;
        let outcome = finish(tx, result).await?;

        match &outcome {
            ConfirmationOutcome::Confirmed { receipt, session } => {
                let _ = self.event_bus.publish(LedgerEvent::PointsEarned {
                    recycling_id: receipt.recycling.id,
                    user_id: claim.user_id,
                    store_id: session.store_id,
                    points_awarded: receipt.recycling.points_awarded,
                    new_balance: receipt.new_balance,
                    timestamp: now,
                });
                self.confirmed(session_id, SessionKind::Recycling, claim.user_id, now);
            }
            ConfirmationOutcome::Expired { .. } => {
                self.expired(session_id, SessionKind::Recycling, now);
            }
        }
        Ok(outcome)
    }

    fn opened(
        &self,
        session_id: SessionId,
        kind: SessionKind,
        store_id: StoreId,
        expires_at: DateTime<Utc>,
    ) {
        let _ = self.event_bus.publish(LedgerEvent::SessionOpened {
            session_id,
            kind,
            store_id,
            expires_at,
        });
        tracing::info!(%session_id, ?kind, %store_id, %expires_at, "session opened");
    }

    fn confirmed(
        &self,
        session_id: SessionId,
        kind: SessionKind,
        user_id: UserId,
        now: DateTime<Utc>,
    ) {
        let _ = self.event_bus.publish(LedgerEvent::SessionConfirmed {
            session_id,
            kind,
            user_id,
            timestamp: now,
        });
        tracing::info!(%session_id, ?kind, %user_id, "session confirmed");
    }

    fn expired(&self, session_id: SessionId, kind: SessionKind, now: DateTime<Utc>) {
        let _ = self.event_bus.publish(LedgerEvent::SessionExpired {
            session_id,
            kind,
            timestamp: now,
        });
        tracing::info!(%session_id, ?kind, "session expired at confirmation");
    }
}

async fn confirm_redemption_in(
    tx: &mut dyn LedgerTx,
    session_id: SessionId,
    claim: RedemptionClaim,
    now: DateTime<Utc>,
) -> Result<ConfirmationOutcome<RedemptionTerms, RedemptionReceipt>, LedgerError> {
    let mut session = tx
        .lock_redemption_session(session_id)
        .await?
        .ok_or(LedgerError::SessionNotFound(session_id))?;
    session.ensure_pending()?;
    if session.is_expired_at(now) {
        session.expire()?;
        tx.update_redemption_session(&session).await?;
        return Ok(ConfirmationOutcome::Expired { session });
    }

    session.check_store(claim.store_id)?;
    session.check_terms(&RedemptionTerms {
        product_id: claim.product_id,
        quantity: claim.quantity,
    })?;

    let quantity = session.terms.quantity;
    let product =
        redemption::load_available_product(tx, session.terms.product_id, ReadMode::ForUpdate)
            .await?;
    redemption::ensure_stock(&product, quantity)?;
    if product.cost_for(quantity)? != session.points_required {
        return Err(LedgerError::StaleSession(session_id));
    }
    let account = redemption::load_active_user(tx, claim.user_id, ReadMode::ForUpdate).await?;
    redemption::ensure_balance(&account, session.points_required)?;

    let receipt = redemption::record_redemption(tx, claim.user_id, &product, quantity, now).await?;
    session.confirm(claim.user_id, now)?;
    tx.update_redemption_session(&session).await?;
    Ok(ConfirmationOutcome::Confirmed { session, receipt })
}

async fn confirm_recycling_in(
    tx: &mut dyn LedgerTx,
    session_id: SessionId,
    claim: RecyclingClaim,
    now: DateTime<Utc>,
) -> Result<ConfirmationOutcome<RecyclingTerms, RecyclingReceipt>, LedgerError> {
    let mut session = tx
        .lock_recycling_session(session_id)
        .await?
        .ok_or(LedgerError::SessionNotFound(session_id))?;
    session.ensure_pending()?;
    if session.is_expired_at(now) {
        session.expire()?;
        tx.update_recycling_session(&session).await?;
        return Ok(ConfirmationOutcome::Expired { session });
    }

    validate_weight(claim.weight)?;
    session.check_store(claim.store_id)?;
    session.check_terms(&RecyclingTerms {
        object_type_id: claim.object_type_id,
        weight: claim.weight,
    })?;

    let object_type = recycling::load_active_object_type(
        tx,
        session.terms.object_type_id,
        ReadMode::ForUpdate,
    )
    .await?;
    redemption::load_active_user(tx, claim.user_id, ReadMode::ForUpdate).await?;

    let receipt = recycling::record_recycling(
        tx,
        DropOff {
            user_id: claim.user_id,
            store_id: session.store_id,
            object_type: &object_type,
            weight: session.terms.weight,
            qr_code: Some(session_id.to_string()),
        },
        now,
    )
    .await?;
    session.confirm(claim.user_id, now)?;
    tx.update_recycling_session(&session).await?;
    Ok(ConfirmationOutcome::Confirmed { session, receipt })
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{ManualClock, ProductPatch, SessionState};
    use crate::persistence::InMemoryLedgerStore;
    use crate::service::RewardsService;

    struct Fixture {
        store: InMemoryLedgerStore,
        clock: Arc<ManualClock>,
        sessions: SessionService,
        rewards: RewardsService,
    }

    fn fixture(ttl: Duration) -> Fixture {
        let store = InMemoryLedgerStore::new();
        let clock = Arc::new(ManualClock::default());
        let bus = EventBus::new(64);
        let sessions = SessionService::new(
            Arc::new(store.clone()),
            bus.clone(),
            Arc::clone(&clock) as Arc<dyn Clock>,
            ttl,
        );
        let rewards = RewardsService::new(
            Arc::new(store.clone()),
            bus,
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        Fixture {
            store,
            clock,
            sessions,
            rewards,
        }
    }

    struct Catalog {
        user: UserId,
        shop: StoreId,
        product: ProductId,
    }

    async fn catalog(f: &Fixture, balance: i64, stock: i64) -> Catalog {
        let user = f.store.seed_user("ana", balance).await;
        let shop = f.store.seed_store("Eco Market").await;
        let product = f.store.seed_product(shop, "Tote bag", 150, stock).await;
        Catalog {
            user,
            shop,
            product,
        }
    }

    fn claim(c: &Catalog, quantity: i64) -> RedemptionClaim {
        RedemptionClaim {
            user_id: c.user,
            store_id: Some(c.shop),
            product_id: c.product,
            quantity,
        }
    }

    async fn open(f: &Fixture, c: &Catalog, quantity: i64) -> RedemptionSession {
        let Ok(session) = f
            .sessions
            .create_redemption_session(c.shop, c.product, Some(quantity))
            .await
        else {
            panic!("session should open");
        };
        session
    }

    #[tokio::test]
    async fn redemption_session_confirms_once() {
        let f = fixture(Duration::minutes(5));
        let c = catalog(&f, 500, 5).await;
        let session = open(&f, &c, 2).await;
        assert_eq!(session.points_required, 300);
        assert_eq!(session.state, SessionState::Pending);

        let Ok(ConfirmationOutcome::Confirmed { session: done, receipt }) = f
            .sessions
            .confirm_redemption_session(session.id, claim(&c, 2))
            .await
        else {
            panic!("confirmation should succeed");
        };
        assert_eq!(done.state, SessionState::Confirmed);
        assert_eq!(done.confirmed_by, Some(c.user));
        assert_eq!(receipt.new_balance, 200);
        assert_eq!(receipt.remaining_stock, 3);

        let again = f
            .sessions
            .confirm_redemption_session(session.id, claim(&c, 2))
            .await;
        assert!(matches!(again, Err(LedgerError::SessionNotPending(_))));
    }

    #[tokio::test]
    async fn concurrent_confirmations_spend_exactly_once() {
        let f = fixture(Duration::minutes(5));
        let c = catalog(&f, 1000, 5).await;
        let session = open(&f, &c, 2).await;

        let (a, b) = tokio::join!(
            f.sessions.confirm_redemption_session(session.id, claim(&c, 2)),
            f.sessions.confirm_redemption_session(session.id, claim(&c, 2)),
        );
        let confirmed = [&a, &b]
            .iter()
            .filter(|r| matches!(r, Ok(ConfirmationOutcome::Confirmed { .. })))
            .count();
        let rejected = [&a, &b]
            .iter()
            .filter(|r| matches!(r, Err(LedgerError::SessionNotPending(_))))
            .count();
        assert_eq!(confirmed, 1);
        assert_eq!(rejected, 1);

        let Some(account) = f.store.user(c.user).await else {
            panic!("user exists");
        };
        assert_eq!(account.points_balance, 700);
        assert_eq!(f.store.redemptions().await.len(), 1);
    }

    #[tokio::test]
    async fn expired_session_is_closed_without_side_effects() {
        let f = fixture(Duration::minutes(1));
        let c = catalog(&f, 500, 5).await;
        let session = open(&f, &c, 1).await;

        f.clock.advance(Duration::minutes(2));
        let outcome = f
            .sessions
            .confirm_redemption_session(session.id, claim(&c, 1))
            .await;
        let Ok(outcome) = outcome else {
            panic!("expiry is a committed outcome");
        };
        assert!(matches!(
            outcome.into_confirmed(),
            Err(LedgerError::SessionExpired(id)) if id == session.id
        ));

        let Some(stored) = f.store.redemption_session(session.id).await else {
            panic!("session persisted");
        };
        assert_eq!(stored.state, SessionState::Expired);
        let Some(account) = f.store.user(c.user).await else {
            panic!("user exists");
        };
        assert_eq!(account.points_balance, 500);
        let Some(product) = f.store.product(c.product).await else {
            panic!("product exists");
        };
        assert_eq!(product.stock, 5);
    }

    #[tokio::test]
    async fn mismatched_claim_keeps_session_pending() {
        let f = fixture(Duration::minutes(5));
        let c = catalog(&f, 500, 5).await;
        let session = open(&f, &c, 2).await;

        let wrong = f
            .sessions
            .confirm_redemption_session(session.id, claim(&c, 3))
            .await;
        assert!(matches!(wrong, Err(LedgerError::ValidationFailed(_))));
        let Some(stored) = f.store.redemption_session(session.id).await else {
            panic!("session persisted");
        };
        assert_eq!(stored.state, SessionState::Pending);

        let right = f
            .sessions
            .confirm_redemption_session(session.id, claim(&c, 2))
            .await;
        assert!(matches!(right, Ok(ConfirmationOutcome::Confirmed { .. })));
    }

    #[tokio::test]
    async fn price_change_makes_the_session_stale() {
        let f = fixture(Duration::minutes(5));
        let c = catalog(&f, 500, 5).await;
        let session = open(&f, &c, 1).await;

        let patch = ProductPatch {
            unit_point_cost: Some(175),
            ..ProductPatch::default()
        };
        tokio_test::assert_ok!(f.rewards.update_product(c.shop, c.product, patch).await);

        let outcome = f
            .sessions
            .confirm_redemption_session(session.id, claim(&c, 1))
            .await;
        assert!(matches!(outcome, Err(LedgerError::StaleSession(_))));
    }

    #[tokio::test]
    async fn unknown_session_and_short_stock_at_creation() {
        let f = fixture(Duration::minutes(5));
        let c = catalog(&f, 500, 1).await;
        let missing = f
            .sessions
            .confirm_redemption_session(SessionId::new(), claim(&c, 1))
            .await;
        assert!(matches!(missing, Err(LedgerError::SessionNotFound(_))));

        let short = f
            .sessions
            .create_redemption_session(c.shop, c.product, Some(2))
            .await;
        assert!(matches!(short, Err(LedgerError::OutOfStock { .. })));
    }

    #[tokio::test]
    async fn recycling_session_credits_and_records_the_token() {
        let f = fixture(Duration::minutes(5));
        let user = f.store.seed_user("ana", 0).await;
        let shop = f.store.seed_store("Eco Market").await;
        let glass = f.store.seed_object_type("Glass", 2.5).await;

        let Ok(session) = f.sessions.create_recycling_session(shop, glass, 1.5).await else {
            panic!("session should open");
        };
        assert_eq!(session.points_required, 3);

        let recycling_claim = RecyclingClaim {
            user_id: user,
            store_id: None,
            object_type_id: glass,
            weight: 1.5,
        };
        let Ok(ConfirmationOutcome::Confirmed { receipt, .. }) = f
            .sessions
            .confirm_recycling_session(session.id, recycling_claim)
            .await
        else {
            panic!("confirmation should succeed");
        };
        assert_eq!(receipt.recycling.points_awarded, 3);
        assert_eq!(receipt.new_balance, 3);
        assert_eq!(receipt.snapshot.rank, Some(1));
        let token = session.id.to_string();
        assert_eq!(receipt.recycling.qr_code.as_deref(), Some(token.as_str()));
    }

    #[tokio::test]
    async fn recycling_session_rejects_wrong_weight() {
        let f = fixture(Duration::minutes(5));
        let user = f.store.seed_user("ana", 0).await;
        let shop = f.store.seed_store("Eco Market").await;
        let glass = f.store.seed_object_type("Glass", 2.5).await;
        let Ok(session) = f.sessions.create_recycling_session(shop, glass, 1.5).await else {
            panic!("session should open");
        };
        let wrong = RecyclingClaim {
            user_id: user,
            store_id: Some(shop),
            object_type_id: glass,
            weight: 1.6,
        };
        assert!(matches!(
            f.sessions.confirm_recycling_session(session.id, wrong).await,
            Err(LedgerError::ValidationFailed(_))
        ));
        assert!(f.store.recyclings().await.is_empty());
    }
    async fn recycling_setup(f: &Fixture) -> (UserId, RecyclingSession, RecyclingClaim) {
        let user = f.store.seed_user("ana", 10).await;
        let shop = f.store.seed_store("Eco Market").await;
        let glass = f.store.seed_object_type("Glass", 2.5).await;
        let Ok(session) = f.sessions.create_recycling_session(shop, glass, 1.5).await else {
            panic!("session should open");
        };
        let claim = RecyclingClaim {
            user_id: user,
            store_id: Some(shop),
            object_type_id: glass,
            weight: 1.5,
        };
        (user, session, claim)
    }

    #[tokio::test]
    async fn concurrent_recycling_confirmations_credit_once() {
        let f = fixture(Duration::minutes(5));
        let (user, session, recycling_claim) = recycling_setup(&f).await;

        let (a, b) = tokio::join!(
            f.sessions.confirm_recycling_session(session.id, recycling_claim),
            f.sessions.confirm_recycling_session(session.id, recycling_claim),
        );
        let confirmed = [&a, &b]
            .iter()
            .filter(|r| matches!(r, Ok(ConfirmationOutcome::Confirmed { .. })))
            .count();
        let rejected = [&a, &b]
            .iter()
            .filter(|r| matches!(r, Err(LedgerError::SessionNotPending(_))))
            .count();
        assert_eq!(confirmed, 1);
        assert_eq!(rejected, 1);

        let Some(account) = f.store.user(user).await else {
            panic!("user exists");
        };
        assert_eq!(account.points_balance, 13);
        assert_eq!(f.store.recyclings().await.len(), 1);
    }

    #[tokio::test]
    async fn expired_recycling_session_awards_nothing() {
        let f = fixture(Duration::minutes(1));
        let (user, session, recycling_claim) = recycling_setup(&f).await;

        f.clock.advance(Duration::minutes(2));
        let Ok(outcome) = f
            .sessions
            .confirm_recycling_session(session.id, recycling_claim)
            .await
        else {
            panic!("expiry is a committed outcome");
        };
        assert!(matches!(
            outcome.into_confirmed(),
            Err(LedgerError::SessionExpired(id)) if id == session.id
        ));

        let Some(stored) = f.store.recycling_session(session.id).await else {
            panic!("session persisted");
        };
        assert_eq!(stored.state, SessionState::Expired);
        let Some(account) = f.store.user(user).await else {
            panic!("user exists");
        };
        assert_eq!(account.points_balance, 10);
        assert!(f.store.recyclings().await.is_empty());

        let again = f
            .sessions
            .confirm_recycling_session(session.id, recycling_claim)
            .await;
        assert!(matches!(again, Err(LedgerError::SessionNotPending(_))));
    }
}
