//! Persistence layer: the transactional ledger store.
//!
//! Services talk to storage exclusively through [`LedgerStore`] (opens a
//! transaction) and [`LedgerTx`] (everything that happens inside one).
//! Two implementations exist:
//!
//! - [`postgres::PostgresLedgerStore`]: `sqlx::PgPool`, row locks via
//!   `SELECT ... FOR [NO KEY] UPDATE`, conditional `UPDATE`s for balance and stock.
//! - [`memory::InMemoryLedgerStore`]: one async mutex held for the whole
//!   transaction, copy-on-begin and swap-on-commit. Used by tests and by
//!   `LEDGER_BACKEND=memory`.
//!
//! The traits return boxed futures so they can be used as trait objects
//! behind `Arc<dyn LedgerStore>` in the application state.
//!
//! A transaction dropped without [`LedgerTx::commit`] is rolled back.

pub mod memory;
pub mod models;
pub mod postgres;

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};

use crate::domain::{
    Account, ClientProfileId, GuideProfileId, HistoryId, NewHistorySnapshot, NewPayment,
    NewRecycling, NewRedemption, NewReservation, ObjectType, ObjectTypeId, PaymentTransaction,
    PointsHistorySnapshot, Product, ProductId, ProductPatch, RecyclingEvent, RecyclingSession,
    RedemptionEvent, RedemptionSession, Reservation, ReservationId, SessionId, Store, StoreId,
    TimeSlot, UserId,
};
use crate::error::LedgerError;

pub use memory::{InMemoryAttemptCache, InMemoryLedgerStore};
pub use postgres::{PostgresAttemptCache, PostgresLedgerStore};

/// Boxed, `Send` future returned by every storage operation.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, LedgerError>> + Send + 'a>>;

/// How a row is read inside a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Plain read.
    Plain,
    /// Locking read (`SELECT ... FOR NO KEY UPDATE`): concurrent transactions
    /// targeting the same row block until this one ends.
    ForUpdate,
}

/// Factory for ledger transactions.
pub trait LedgerStore: Send + Sync + fmt::Debug {
    /// Opens a new transaction.
    fn begin(&self) -> StoreFuture<'_, Box<dyn LedgerTx>>;
}

/// Operations available inside one ledger transaction.
///
/// Reads return `Ok(None)` for missing rows; deciding whether that is a
/// `NotFound` is up to the caller.
pub trait LedgerTx: Send {
    /// Loads a user account.
    fn find_user(&mut self, id: UserId, mode: ReadMode) -> StoreFuture<'_, Option<Account>>;

    /// Loads a store.
    fn find_store(&mut self, id: StoreId) -> StoreFuture<'_, Option<Store>>;

    /// Loads a product together with its store's name and active flag.
    fn find_product(&mut self, id: ProductId, mode: ReadMode)
    -> StoreFuture<'_, Option<Product>>;

    /// Loads a recyclable object type.
    fn find_object_type(
        &mut self,
        id: ObjectTypeId,
        mode: ReadMode,
    ) -> StoreFuture<'_, Option<ObjectType>>;

    /// Applies a sparse update to a product, returning the updated row.
    fn update_product<'a>(
        &'a mut self,
        id: ProductId,
        patch: &'a ProductPatch,
    ) -> StoreFuture<'a, Option<Product>>;

    /// Adds `delta` to an active user's balance unless the result would
    /// be negative. Returns the new balance, or `None` if no row matched.
    fn apply_points_delta(&mut self, user: UserId, delta: i64) -> StoreFuture<'_, Option<i64>>;

    /// Adds `delta` to a product's stock unless the result would be
    /// negative. Returns the new stock, or `None` if no row matched.
    fn apply_stock_delta(&mut self, product: ProductId, delta: i64)
    -> StoreFuture<'_, Option<i64>>;

    /// Counts active users whose balance is strictly greater than
    /// `balance`.
    fn count_users_above(&mut self, balance: i64) -> StoreFuture<'_, i64>;

    /// Appends a redemption ledger entry.
    fn insert_redemption(&mut self, entry: NewRedemption) -> StoreFuture<'_, RedemptionEvent>;

    /// Appends a recycling ledger entry.
    fn insert_recycling(&mut self, entry: NewRecycling) -> StoreFuture<'_, RecyclingEvent>;

    /// Appends a points-history snapshot.
    fn append_history(
        &mut self,
        snapshot: NewHistorySnapshot,
    ) -> StoreFuture<'_, PointsHistorySnapshot>;

    /// Sums the points of a user's active recycling entries.
    fn recycled_points_total(&mut self, user: UserId) -> StoreFuture<'_, i64>;

    /// Locks and returns the user's most recent history snapshot.
    fn latest_history(&mut self, user: UserId)
    -> StoreFuture<'_, Option<PointsHistorySnapshot>>;

    /// Overwrites a snapshot's total and bumps its `updated_at`.
    fn overwrite_history_total(
        &mut self,
        id: HistoryId,
        total_points: i64,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, ()>;

    /// Lists the ids of all active users.
    fn list_active_user_ids(&mut self) -> StoreFuture<'_, Vec<UserId>>;

    /// Persists a freshly opened redemption session.
    fn insert_redemption_session<'a>(
        &'a mut self,
        session: &'a RedemptionSession,
    ) -> StoreFuture<'a, ()>;

    /// Locks a redemption session row.
    fn lock_redemption_session(
        &mut self,
        id: SessionId,
    ) -> StoreFuture<'_, Option<RedemptionSession>>;

    /// Writes a redemption session's state and confirmation stamp.
    fn update_redemption_session<'a>(
        &'a mut self,
        session: &'a RedemptionSession,
    ) -> StoreFuture<'a, ()>;

    /// Persists a freshly opened recycling session.
    fn insert_recycling_session<'a>(
        &'a mut self,
        session: &'a RecyclingSession,
    ) -> StoreFuture<'a, ()>;

    /// Locks a recycling session row.
    fn lock_recycling_session(&mut self, id: SessionId)
    -> StoreFuture<'_, Option<RecyclingSession>>;

    /// Writes a recycling session's state and confirmation stamp.
    fn update_recycling_session<'a>(
        &'a mut self,
        session: &'a RecyclingSession,
    ) -> StoreFuture<'a, ()>;

    /// Returns the user owning a guide profile. With
    /// [`ReadMode::ForUpdate`] the profile row is locked, which serializes
    /// bookings of the same guide.
    fn guide_owner(
        &mut self,
        guide: GuideProfileId,
        mode: ReadMode,
    ) -> StoreFuture<'_, Option<UserId>>;

    /// Returns the user owning a client profile.
    fn client_owner(&mut self, client: ClientProfileId) -> StoreFuture<'_, Option<UserId>>;

    /// Finds an active (`Pendiente` or `Confirmada`) reservation of the
    /// guide whose interval intersects `slot`.
    fn find_overlapping_reservation(
        &mut self,
        guide: GuideProfileId,
        slot: TimeSlot,
    ) -> StoreFuture<'_, Option<ReservationId>>;

    /// Inserts a reservation in `Pendiente` / `no_pagado`.
    ///
    /// Fails with [`LedgerError::OverlapConflict`] if the storage layer
    /// itself detects an overlap.
    fn insert_reservation(&mut self, reservation: NewReservation)
    -> StoreFuture<'_, Reservation>;

    /// Locks a reservation row.
    fn lock_reservation(&mut self, id: ReservationId) -> StoreFuture<'_, Option<Reservation>>;

    /// Writes a reservation's state, payment state and `updated_at`.
    fn update_reservation<'a>(&'a mut self, reservation: &'a Reservation)
    -> StoreFuture<'a, ()>;

    /// Records a payment.
    fn insert_payment(&mut self, payment: NewPayment) -> StoreFuture<'_, PaymentTransaction>;

    /// Commits the transaction.
    fn commit(self: Box<Self>) -> StoreFuture<'static, ()>;

    /// Rolls the transaction back.
    fn rollback(self: Box<Self>) -> StoreFuture<'static, ()>;
}

/// Failed login attempts recorded for one key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttemptRecord {
    /// Timestamps of recent failures, oldest first.
    pub failures: Vec<DateTime<Utc>>,
    /// End of the current lockout, if any.
    pub locked_until: Option<DateTime<Utc>>,
}

/// Pure transformation applied to one key's record by
/// [`AttemptCache::update`].
pub type AttemptUpdate<'a> = Box<dyn FnOnce(AttemptRecord) -> AttemptRecord + Send + 'a>;

/// Shared cache of login attempts backing [`crate::service::LoginGuard`].
pub trait AttemptCache: Send + Sync + fmt::Debug {
    /// Loads the record for `key`.
    fn load<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<AttemptRecord>>;

    /// Applies `apply` to the record for `key` (empty if absent), stores
    /// the result and returns it.
    ///
    /// Read, apply and write happen as one atomic step: concurrent updates
    /// of the same key are serialized and none is lost.
    fn update<'a>(
        &'a self,
        key: &'a str,
        apply: AttemptUpdate<'a>,
    ) -> StoreFuture<'a, AttemptRecord>;

    /// Forgets `key`.
    fn clear<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;
}
