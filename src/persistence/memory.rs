//! In-memory ledger store for tests and single-process deployments.
//!
//! The whole dataset sits behind one [`tokio::sync::Mutex`]. A
//! transaction owns the lock from `begin` until it commits or is
//! dropped, works on a private copy of the state, and swaps the copy in
//! on commit. Transactions are therefore fully serialized, which is a
//! stronger guarantee than the row locks of the Postgres store.

use std::collections::{BTreeMap, HashMap};
use std::future::ready;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{AttemptCache, AttemptRecord, AttemptUpdate, LedgerStore, LedgerTx, ReadMode, StoreFuture};
use crate::domain::{
    Account, ClientProfileId, GuideProfileId, HistoryId, NewHistorySnapshot, NewPayment,
    NewRecycling, NewRedemption, NewReservation, ObjectType, ObjectTypeId, PaymentId,
    PaymentTransaction, PointsHistorySnapshot, Product, ProductId, ProductPatch, RecyclingEvent,
    RecyclingId, RecyclingSession, RedemptionEvent, RedemptionId, RedemptionSession, Reservation,
    ReservationId, SessionId, Store, StoreId, TimeSlot, UserId,
};
use crate::error::LedgerError;

#[derive(Debug, Clone)]
struct StoredRecycling {
    event: RecyclingEvent,
    active: bool,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    next_id: i64,
    users: BTreeMap<UserId, Account>,
    stores: BTreeMap<StoreId, Store>,
    products: BTreeMap<ProductId, Product>,
    object_types: BTreeMap<ObjectTypeId, ObjectType>,
    redemptions: Vec<RedemptionEvent>,
    recyclings: Vec<StoredRecycling>,
    history: Vec<PointsHistorySnapshot>,
    redemption_sessions: HashMap<SessionId, RedemptionSession>,
    recycling_sessions: HashMap<SessionId, RecyclingSession>,
    guide_profiles: BTreeMap<GuideProfileId, UserId>,
    client_profiles: BTreeMap<ClientProfileId, UserId>,
    reservations: BTreeMap<ReservationId, Reservation>,
    payments: Vec<PaymentTransaction>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Returns the product with its store columns filled in.
    fn product_view(&self, id: ProductId) -> Option<Product> {
        let mut product = self.products.get(&id)?.clone();
        if let Some(store) = self.stores.get(&product.store_id) {
            product.store_name.clone_from(&store.name);
            product.store_active = store.active;
        }
        Some(product)
    }
}

/// Ledger store holding all data in process memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryLedgerStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an active user with the given balance.
    pub async fn seed_user(&self, name: &str, points_balance: i64) -> UserId {
        let mut state = self.state.lock().await;
        let id = UserId::new(state.next_id());
        state.users.insert(
            id,
            Account {
                id,
                name: name.to_string(),
                points_balance,
                active: true,
            },
        );
        id
    }

    /// Adds an active store.
    pub async fn seed_store(&self, name: &str) -> StoreId {
        let mut state = self.state.lock().await;
        let id = StoreId::new(state.next_id());
        state.stores.insert(
            id,
            Store {
                id,
                name: name.to_string(),
                active: true,
            },
        );
        id
    }

    /// Adds an active product owned by `store_id`.
    pub async fn seed_product(
        &self,
        store_id: StoreId,
        name: &str,
        unit_point_cost: i64,
        stock: i64,
    ) -> ProductId {
        let mut state = self.state.lock().await;
        let id = ProductId::new(state.next_id());
        state.products.insert(
            id,
            Product {
                id,
                store_id,
                store_name: String::new(),
                name: name.to_string(),
                unit_point_cost,
                stock,
                active: true,
                store_active: true,
            },
        );
        id
    }

    /// Adds an active recyclable object type.
    pub async fn seed_object_type(&self, name: &str, points_per_unit_weight: f64) -> ObjectTypeId {
        let mut state = self.state.lock().await;
        let id = ObjectTypeId::new(state.next_id());
        state.object_types.insert(
            id,
            ObjectType {
                id,
                name: name.to_string(),
                points_per_unit_weight,
                active: true,
            },
        );
        id
    }

    /// Adds a guide profile owned by `user_id`.
    pub async fn seed_guide_profile(&self, user_id: UserId) -> GuideProfileId {
        let mut state = self.state.lock().await;
        let id = GuideProfileId::new(state.next_id());
        state.guide_profiles.insert(id, user_id);
        id
    }

    /// Adds a client profile owned by `user_id`.
    pub async fn seed_client_profile(&self, user_id: UserId) -> ClientProfileId {
        let mut state = self.state.lock().await;
        let id = ClientProfileId::new(state.next_id());
        state.client_profiles.insert(id, user_id);
        id
    }

    /// Toggles a user's active flag.
    pub async fn set_user_active(&self, user_id: UserId, active: bool) {
        if let Some(user) = self.state.lock().await.users.get_mut(&user_id) {
            user.active = active;
        }
    }

    /// Toggles a store's active flag.
    pub async fn set_store_active(&self, store_id: StoreId, active: bool) {
        if let Some(store) = self.state.lock().await.stores.get_mut(&store_id) {
            store.active = active;
        }
    }

    /// Toggles a recycling entry's active flag.
    pub async fn set_recycling_active(&self, id: RecyclingId, active: bool) {
        let mut state = self.state.lock().await;
        if let Some(stored) = state.recyclings.iter_mut().find(|r| r.event.id == id) {
            stored.active = active;
        }
    }

    /// Reads a user account.
    pub async fn user(&self, id: UserId) -> Option<Account> {
        self.state.lock().await.users.get(&id).cloned()
    }

    /// Reads a product with its store columns.
    pub async fn product(&self, id: ProductId) -> Option<Product> {
        self.state.lock().await.product_view(id)
    }

    /// Returns every redemption entry in insertion order.
    pub async fn redemptions(&self) -> Vec<RedemptionEvent> {
        self.state.lock().await.redemptions.clone()
    }

    /// Returns every recycling entry in insertion order.
    pub async fn recyclings(&self) -> Vec<RecyclingEvent> {
        self.state
            .lock()
            .await
            .recyclings
            .iter()
            .map(|r| r.event.clone())
            .collect()
    }

    /// Returns a user's history snapshots in insertion order.
    pub async fn history(&self, user_id: UserId) -> Vec<PointsHistorySnapshot> {
        self.state
            .lock()
            .await
            .history
            .iter()
            .filter(|h| h.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Reads a redemption session.
    pub async fn redemption_session(&self, id: SessionId) -> Option<RedemptionSession> {
        self.state.lock().await.redemption_sessions.get(&id).cloned()
    }

    /// Reads a recycling session.
    pub async fn recycling_session(&self, id: SessionId) -> Option<RecyclingSession> {
        self.state.lock().await.recycling_sessions.get(&id).cloned()
    }

    /// Reads a reservation.
    pub async fn reservation(&self, id: ReservationId) -> Option<Reservation> {
        self.state.lock().await.reservations.get(&id).cloned()
    }

    /// Returns every payment in insertion order.
    pub async fn payments(&self) -> Vec<PaymentTransaction> {
        self.state.lock().await.payments.clone()
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn begin(&self) -> StoreFuture<'_, Box<dyn LedgerTx>> {
        Box::pin(async move {
            let guard = Arc::clone(&self.state).lock_owned().await;
            let working = guard.clone();
            Ok(Box::new(MemoryTx { guard, working }) as Box<dyn LedgerTx>)
        })
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

fn done<'a, T: Send + 'a>(result: Result<T, LedgerError>) -> StoreFuture<'a, T> {
    Box::pin(ready(result))
}

fn checked_delta(current: i64, delta: i64) -> Result<Option<i64>, LedgerError> {
    let next = current
        .checked_add(delta)
        .ok_or_else(|| LedgerError::Internal("balance overflow".to_string()))?;
    Ok((next >= 0).then_some(next))
}

impl LedgerTx for MemoryTx {
    fn find_user(&mut self, id: UserId, _mode: ReadMode) -> StoreFuture<'_, Option<Account>> {
        done(Ok(self.working.users.get(&id).cloned()))
    }

    fn find_store(&mut self, id: StoreId) -> StoreFuture<'_, Option<Store>> {
        done(Ok(self.working.stores.get(&id).cloned()))
    }

    fn find_product(
        &mut self,
        id: ProductId,
        _mode: ReadMode,
    ) -> StoreFuture<'_, Option<Product>> {
        done(Ok(self.working.product_view(id)))
    }

    fn find_object_type(
        &mut self,
        id: ObjectTypeId,
        _mode: ReadMode,
    ) -> StoreFuture<'_, Option<ObjectType>> {
        done(Ok(self.working.object_types.get(&id).cloned()))
    }

    fn update_product<'a>(
        &'a mut self,
        id: ProductId,
        patch: &'a ProductPatch,
    ) -> StoreFuture<'a, Option<Product>> {
        if let Some(product) = self.working.products.get_mut(&id) {
            patch.apply_to(product);
        }
        done(Ok(self.working.product_view(id)))
    }

    fn apply_points_delta(&mut self, user: UserId, delta: i64) -> StoreFuture<'_, Option<i64>> {
        let result = match self.working.users.get_mut(&user) {
            Some(account) if account.active => {
                checked_delta(account.points_balance, delta).map(|next| {
                    if let Some(balance) = next {
                        account.points_balance = balance;
                    }
                    next
                })
            }
            _ => Ok(None),
        };
        done(result)
    }

    fn apply_stock_delta(
        &mut self,
        product: ProductId,
        delta: i64,
    ) -> StoreFuture<'_, Option<i64>> {
        let result = match self.working.products.get_mut(&product) {
            Some(row) => checked_delta(row.stock, delta).map(|next| {
                if let Some(stock) = next {
                    row.stock = stock;
                }
                next
            }),
            None => Ok(None),
        };
        done(result)
    }

    fn count_users_above(&mut self, balance: i64) -> StoreFuture<'_, i64> {
        let count = self
            .working
            .users
            .values()
            .filter(|u| u.active && u.points_balance > balance)
            .count();
        done(i64::try_from(count).map_err(|e| LedgerError::Internal(e.to_string())))
    }

    fn insert_redemption(&mut self, entry: NewRedemption) -> StoreFuture<'_, RedemptionEvent> {
        let event = entry.into_event(RedemptionId::new(self.working.next_id()));
        self.working.redemptions.push(event.clone());
        done(Ok(event))
    }

    fn insert_recycling(&mut self, entry: NewRecycling) -> StoreFuture<'_, RecyclingEvent> {
        let event = entry.into_event(RecyclingId::new(self.working.next_id()));
        self.working.recyclings.push(StoredRecycling {
            event: event.clone(),
            active: true,
        });
        done(Ok(event))
    }

    fn append_history(
        &mut self,
        snapshot: NewHistorySnapshot,
    ) -> StoreFuture<'_, PointsHistorySnapshot> {
        let snapshot = snapshot.into_snapshot(HistoryId::new(self.working.next_id()));
        self.working.history.push(snapshot.clone());
        done(Ok(snapshot))
    }

    fn recycled_points_total(&mut self, user: UserId) -> StoreFuture<'_, i64> {
        let total = self
            .working
            .recyclings
            .iter()
            .filter(|r| r.active && r.event.user_id == user)
            .map(|r| r.event.points_awarded)
            .sum();
        done(Ok(total))
    }

    fn latest_history(
        &mut self,
        user: UserId,
    ) -> StoreFuture<'_, Option<PointsHistorySnapshot>> {
        let latest = self
            .working
            .history
            .iter()
            .filter(|h| h.user_id == user)
            .max_by_key(|h| (h.created_at, h.id))
            .cloned();
        done(Ok(latest))
    }

    fn overwrite_history_total(
        &mut self,
        id: HistoryId,
        total_points: i64,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, ()> {
        if let Some(row) = self.working.history.iter_mut().find(|h| h.id == id) {
            row.total_points = total_points;
            row.updated_at = now;
        }
        done(Ok(()))
    }

    fn list_active_user_ids(&mut self) -> StoreFuture<'_, Vec<UserId>> {
        let ids = self
            .working
            .users
            .values()
            .filter(|u| u.active)
            .map(|u| u.id)
            .collect();
        done(Ok(ids))
    }

    fn insert_redemption_session<'a>(
        &'a mut self,
        session: &'a RedemptionSession,
    ) -> StoreFuture<'a, ()> {
        self.working
            .redemption_sessions
            .insert(session.id, session.clone());
        done(Ok(()))
    }

    fn lock_redemption_session(
        &mut self,
        id: SessionId,
    ) -> StoreFuture<'_, Option<RedemptionSession>> {
        done(Ok(self.working.redemption_sessions.get(&id).cloned()))
    }

    fn update_redemption_session<'a>(
        &'a mut self,
        session: &'a RedemptionSession,
    ) -> StoreFuture<'a, ()> {
        self.working
            .redemption_sessions
            .insert(session.id, session.clone());
        done(Ok(()))
    }

    fn insert_recycling_session<'a>(
        &'a mut self,
        session: &'a RecyclingSession,
    ) -> StoreFuture<'a, ()> {
        self.working
            .recycling_sessions
            .insert(session.id, session.clone());
        done(Ok(()))
    }

    fn lock_recycling_session(
        &mut self,
        id: SessionId,
    ) -> StoreFuture<'_, Option<RecyclingSession>> {
        done(Ok(self.working.recycling_sessions.get(&id).cloned()))
    }

    fn update_recycling_session<'a>(
        &'a mut self,
        session: &'a RecyclingSession,
    ) -> StoreFuture<'a, ()> {
        self.working
            .recycling_sessions
            .insert(session.id, session.clone());
        done(Ok(()))
    }

    fn guide_owner(
        &mut self,
        guide: GuideProfileId,
        _mode: ReadMode,
    ) -> StoreFuture<'_, Option<UserId>> {
        done(Ok(self.working.guide_profiles.get(&guide).copied()))
    }

    fn client_owner(&mut self, client: ClientProfileId) -> StoreFuture<'_, Option<UserId>> {
        done(Ok(self.working.client_profiles.get(&client).copied()))
    }

    fn find_overlapping_reservation(
        &mut self,
        guide: GuideProfileId,
        slot: TimeSlot,
    ) -> StoreFuture<'_, Option<ReservationId>> {
        let hit = self
            .working
            .reservations
            .values()
            .find(|r| {
                r.guide_profile_id == guide && r.state.blocks_calendar() && r.slot.overlaps(&slot)
            })
            .map(|r| r.id);
        done(Ok(hit))
    }

    fn insert_reservation(
        &mut self,
        reservation: NewReservation,
    ) -> StoreFuture<'_, Reservation> {
        let guide = reservation.guide_profile_id;
        let clash = self.working.reservations.values().any(|r| {
            r.guide_profile_id == guide
                && r.state.blocks_calendar()
                && r.slot.overlaps(&reservation.slot)
        });
        if clash {
            return done(Err(LedgerError::OverlapConflict(guide)));
        }
        let stored = reservation.into_reservation(ReservationId::new(self.working.next_id()));
        self.working.reservations.insert(stored.id, stored.clone());
        done(Ok(stored))
    }

    fn lock_reservation(&mut self, id: ReservationId) -> StoreFuture<'_, Option<Reservation>> {
        done(Ok(self.working.reservations.get(&id).cloned()))
    }

    fn update_reservation<'a>(
        &'a mut self,
        reservation: &'a Reservation,
    ) -> StoreFuture<'a, ()> {
        if let Some(row) = self.working.reservations.get_mut(&reservation.id) {
            row.state = reservation.state;
            row.payment_state = reservation.payment_state;
            row.updated_at = reservation.updated_at;
        }
        done(Ok(()))
    }

    fn insert_payment(&mut self, payment: NewPayment) -> StoreFuture<'_, PaymentTransaction> {
        let payment = payment.into_payment(PaymentId::new(self.working.next_id()));
        self.working.payments.push(payment.clone());
        done(Ok(payment))
    }

    fn commit(self: Box<Self>) -> StoreFuture<'static, ()> {
        let Self { mut guard, working } = *self;
        *guard = working;
        done(Ok(()))
    }

    fn rollback(self: Box<Self>) -> StoreFuture<'static, ()> {
        done(Ok(()))
    }
}

/// Process-local login-attempt cache.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAttemptCache {
    entries: Arc<Mutex<HashMap<String, AttemptRecord>>>,
}

impl InMemoryAttemptCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AttemptCache for InMemoryAttemptCache {
    fn load<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<AttemptRecord>> {
        Box::pin(async move { Ok(self.entries.lock().await.get(key).cloned()) })
    }

    fn update<'a>(
        &'a self,
        key: &'a str,
        apply: AttemptUpdate<'a>,
    ) -> StoreFuture<'a, AttemptRecord> {
        Box::pin(async move {
            let mut entries = self.entries.lock().await;
            let record = apply(entries.remove(key).unwrap_or_default());
            entries.insert(key.to_string(), record.clone());
            Ok(record)
        })
    }

    fn clear<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.entries.lock().await.remove(key);
            Ok(())
        })
    }
}
