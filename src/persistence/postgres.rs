//! PostgreSQL implementation of the ledger store.
//!
//! Each [`LedgerTx`] wraps one `sqlx::Transaction`. Locking reads of rows
//! that other tables reference append `FOR NO KEY UPDATE`, which still
//! serializes writers but leaves the `FOR KEY SHARE` locks taken by
//! foreign-key checks unblocked; balance and stock move through conditional `UPDATE`
//! statements whose `WHERE` clause rejects a negative result, so no
//! read-modify-write happens in application code.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};

use super::models::{
    AccountRow, AttemptRow, HistoryRow, ObjectTypeRow, PaymentRow, ProductRow, RecyclingRow,
    RecyclingSessionRow, RedemptionRow, RedemptionSessionRow, ReservationRow, StoreRow,
};
use super::{AttemptCache, AttemptRecord, AttemptUpdate, LedgerStore, LedgerTx, ReadMode, StoreFuture};
use crate::config::LedgerConfig;
use crate::domain::{
    Account, ClientProfileId, GuideProfileId, HistoryId, NewHistorySnapshot, NewPayment,
    NewRecycling, NewRedemption, NewReservation, ObjectType, ObjectTypeId, PaymentTransaction,
    PointsHistorySnapshot, Product, ProductId, ProductPatch, RecyclingEvent, RecyclingSession,
    RedemptionEvent, RedemptionSession, Reservation, ReservationId, SessionId, Store, StoreId,
    TimeSlot, UserId,
};
use crate::error::LedgerError;

/// SQLSTATE raised by an `EXCLUDE` constraint violation.
const EXCLUSION_VIOLATION: &str = "23P01";

const PRODUCT_COLUMNS: &str = "p.id, p.store_id, s.name AS store_name, p.name, \
     p.unit_point_cost, p.stock, p.active, s.active AS store_active";

const RESERVATION_COLUMNS: &str = "id, guide_profile_id, client_profile_id, place, party_size, \
     start_time, end_time, base_amount, guide_commission, client_surcharge, total_amount, \
     state, payment_state, created_at, updated_at";

const fn product_lock_clause(mode: ReadMode) -> &'static str {
    match mode {
        ReadMode::Plain => "",
        ReadMode::ForUpdate => " FOR NO KEY UPDATE OF p",
    }
}

const fn lock_clause(mode: ReadMode) -> &'static str {
    match mode {
        ReadMode::Plain => "",
        ReadMode::ForUpdate => " FOR NO KEY UPDATE",
    }
}

/// PostgreSQL-backed ledger store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    /// Creates a store over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects using the pool settings in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Internal`] if the database is unreachable.
    pub async fn connect(config: &LedgerConfig) -> Result<Self, LedgerError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Applies the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Internal`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), LedgerError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Returns the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl LedgerStore for PostgresLedgerStore {
    fn begin(&self) -> StoreFuture<'_, Box<dyn LedgerTx>> {
        Box::pin(async move {
            let tx = self.pool.begin().await?;
            Ok(Box::new(PgLedgerTx { tx }) as Box<dyn LedgerTx>)
        })
    }
}

struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

impl LedgerTx for PgLedgerTx {
    fn find_user(&mut self, id: UserId, mode: ReadMode) -> StoreFuture<'_, Option<Account>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT id, name, points_balance, active FROM users WHERE id = $1{}",
                lock_clause(mode)
            );
            let row = sqlx::query_as::<_, AccountRow>(&sql)
                .bind(id.get())
                .fetch_optional(&mut *self.tx)
                .await?;
            Ok(row.map(Account::from))
        })
    }

    fn find_store(&mut self, id: StoreId) -> StoreFuture<'_, Option<Store>> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, StoreRow>(
                "SELECT id, name, active FROM stores WHERE id = $1",
            )
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await?;
            Ok(row.map(Store::from))
        })
    }

    fn find_product(
        &mut self,
        id: ProductId,
        mode: ReadMode,
    ) -> StoreFuture<'_, Option<Product>> {
        Box::pin(async move {
            let lock = product_lock_clause(mode);
            let sql = format!(
                "SELECT {PRODUCT_COLUMNS} FROM products p \
                 JOIN stores s ON s.id = p.store_id WHERE p.id = $1{lock}"
            );
            let row = sqlx::query_as::<_, ProductRow>(&sql)
                .bind(id.get())
                .fetch_optional(&mut *self.tx)
                .await?;
            Ok(row.map(Product::from))
        })
    }

    fn find_object_type(
        &mut self,
        id: ObjectTypeId,
        mode: ReadMode,
    ) -> StoreFuture<'_, Option<ObjectType>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT id, name, points_per_unit_weight, active FROM object_types \
                 WHERE id = $1{}",
                lock_clause(mode)
            );
            let row = sqlx::query_as::<_, ObjectTypeRow>(&sql)
                .bind(id.get())
                .fetch_optional(&mut *self.tx)
                .await?;
            Ok(row.map(ObjectType::from))
        })
    }

    fn update_product<'a>(
        &'a mut self,
        id: ProductId,
        patch: &'a ProductPatch,
    ) -> StoreFuture<'a, Option<Product>> {
        Box::pin(async move {
            if patch.is_empty() {
                return self.find_product(id, ReadMode::Plain).await;
            }
            let mut qb = QueryBuilder::<Postgres>::new("WITH p AS (UPDATE products SET ");
            let mut set = qb.separated(", ");
            if let Some(name) = &patch.name {
                set.push("name = ");
                set.push_bind_unseparated(name.clone());
            }
            if let Some(cost) = patch.unit_point_cost {
                set.push("unit_point_cost = ");
                set.push_bind_unseparated(cost);
            }
            if let Some(active) = patch.active {
                set.push("active = ");
                set.push_bind_unseparated(active);
            }
            qb.push(" WHERE id = ");
            qb.push_bind(id.get());
            qb.push(" RETURNING *) SELECT ");
            qb.push(PRODUCT_COLUMNS);
            qb.push(" FROM p JOIN stores s ON s.id = p.store_id");
            let row = qb
                .build_query_as::<ProductRow>()
                .fetch_optional(&mut *self.tx)
                .await?;
            Ok(row.map(Product::from))
        })
    }

    fn apply_points_delta(&mut self, user: UserId, delta: i64) -> StoreFuture<'_, Option<i64>> {
        Box::pin(async move {
            let balance = sqlx::query_scalar::<_, i64>(
                "UPDATE users SET points_balance = points_balance + $2 \
                 WHERE id = $1 AND active AND points_balance + $2 >= 0 \
                 RETURNING points_balance",
            )
            .bind(user.get())
            .bind(delta)
            .fetch_optional(&mut *self.tx)
            .await?;
            Ok(balance)
        })
    }

    fn apply_stock_delta(
        &mut self,
        product: ProductId,
        delta: i64,
    ) -> StoreFuture<'_, Option<i64>> {
        Box::pin(async move {
            let stock = sqlx::query_scalar::<_, i64>(
                "UPDATE products SET stock = stock + $2 \
                 WHERE id = $1 AND stock + $2 >= 0 RETURNING stock",
            )
            .bind(product.get())
            .bind(delta)
            .fetch_optional(&mut *self.tx)
            .await?;
            Ok(stock)
        })
    }

    fn count_users_above(&mut self, balance: i64) -> StoreFuture<'_, i64> {
        Box::pin(async move {
            let count = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM users WHERE active AND points_balance > $1",
            )
            .bind(balance)
            .fetch_one(&mut *self.tx)
            .await?;
            Ok(count)
        })
    }

    fn insert_redemption(&mut self, entry: NewRedemption) -> StoreFuture<'_, RedemptionEvent> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, RedemptionRow>(
                "INSERT INTO redemptions \
                 (user_id, store_id, product_id, quantity, points_spent, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 RETURNING id, user_id, store_id, product_id, quantity, points_spent, created_at",
            )
            .bind(entry.user_id.get())
            .bind(entry.store_id.get())
            .bind(entry.product_id.get())
            .bind(entry.quantity)
            .bind(entry.points_spent)
            .bind(entry.created_at)
            .fetch_one(&mut *self.tx)
            .await?;
            Ok(row.into())
        })
    }

    fn insert_recycling(&mut self, entry: NewRecycling) -> StoreFuture<'_, RecyclingEvent> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, RecyclingRow>(
                "INSERT INTO recyclings \
                 (user_id, store_id, object_type_id, weight, points_awarded, qr_code, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 RETURNING id, user_id, store_id, object_type_id, weight, points_awarded, \
                 qr_code, created_at",
            )
            .bind(entry.user_id.get())
            .bind(entry.store_id.get())
            .bind(entry.object_type_id.get())
            .bind(entry.weight)
            .bind(entry.points_awarded)
            .bind(entry.qr_code)
            .bind(entry.created_at)
            .fetch_one(&mut *self.tx)
            .await?;
            Ok(row.into())
        })
    }

    fn append_history(
        &mut self,
        snapshot: NewHistorySnapshot,
    ) -> StoreFuture<'_, PointsHistorySnapshot> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, HistoryRow>(
                "INSERT INTO points_history (user_id, total_points, rank, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $4) \
                 RETURNING id, user_id, total_points, rank, created_at, updated_at",
            )
            .bind(snapshot.user_id.get())
            .bind(snapshot.total_points)
            .bind(snapshot.rank)
            .bind(snapshot.created_at)
            .fetch_one(&mut *self.tx)
            .await?;
            Ok(row.into())
        })
    }

    fn recycled_points_total(&mut self, user: UserId) -> StoreFuture<'_, i64> {
        Box::pin(async move {
            let total = sqlx::query_scalar::<_, i64>(
                "SELECT COALESCE(SUM(points_awarded), 0)::BIGINT FROM recyclings \
                 WHERE user_id = $1 AND active",
            )
            .bind(user.get())
            .fetch_one(&mut *self.tx)
            .await?;
            Ok(total)
        })
    }

    fn latest_history(
        &mut self,
        user: UserId,
    ) -> StoreFuture<'_, Option<PointsHistorySnapshot>> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, HistoryRow>(
                "SELECT id, user_id, total_points, rank, created_at, updated_at \
                 FROM points_history WHERE user_id = $1 \
                 ORDER BY created_at DESC, id DESC LIMIT 1 FOR UPDATE",
            )
            .bind(user.get())
            .fetch_optional(&mut *self.tx)
            .await?;
            Ok(row.map(PointsHistorySnapshot::from))
        })
    }

    fn overwrite_history_total(
        &mut self,
        id: HistoryId,
        total_points: i64,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query("UPDATE points_history SET total_points = $2, updated_at = $3 WHERE id = $1")
                .bind(id.get())
                .bind(total_points)
                .bind(now)
                .execute(&mut *self.tx)
                .await?;
            Ok(())
        })
    }

    fn list_active_user_ids(&mut self) -> StoreFuture<'_, Vec<UserId>> {
        Box::pin(async move {
            let ids = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE active ORDER BY id")
                .fetch_all(&mut *self.tx)
                .await?;
            Ok(ids.into_iter().map(UserId::new).collect())
        })
    }

    fn insert_redemption_session<'a>(
        &'a mut self,
        session: &'a RedemptionSession,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO redemption_sessions \
                 (id, store_id, product_id, quantity, points_required, state, created_at, expires_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(*session.id.as_uuid())
            .bind(session.store_id.get())
            .bind(session.terms.product_id.get())
            .bind(session.terms.quantity)
            .bind(session.points_required)
            .bind(session.state.as_str())
            .bind(session.created_at)
            .bind(session.expires_at)
            .execute(&mut *self.tx)
            .await?;
            Ok(())
        })
    }

    fn lock_redemption_session(
        &mut self,
        id: SessionId,
    ) -> StoreFuture<'_, Option<RedemptionSession>> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, RedemptionSessionRow>(
                "SELECT id, store_id, product_id, quantity, points_required, state, created_at, \
                 expires_at, confirmed_by, confirmed_at \
                 FROM redemption_sessions WHERE id = $1 FOR UPDATE",
            )
            .bind(*id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
            row.map(RedemptionSession::try_from).transpose()
        })
    }

    fn update_redemption_session<'a>(
        &'a mut self,
        session: &'a RedemptionSession,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            sqlx::query(
                "UPDATE redemption_sessions \
                 SET state = $2, confirmed_by = $3, confirmed_at = $4 WHERE id = $1",
            )
            .bind(*session.id.as_uuid())
            .bind(session.state.as_str())
            .bind(session.confirmed_by.map(UserId::get))
            .bind(session.confirmed_at)
            .execute(&mut *self.tx)
            .await?;
            Ok(())
        })
    }

    fn insert_recycling_session<'a>(
        &'a mut self,
        session: &'a RecyclingSession,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO recycling_sessions \
                 (id, store_id, object_type_id, weight, points_required, state, created_at, \
                 expires_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(*session.id.as_uuid())
            .bind(session.store_id.get())
            .bind(session.terms.object_type_id.get())
            .bind(session.terms.weight)
            .bind(session.points_required)
            .bind(session.state.as_str())
            .bind(session.created_at)
            .bind(session.expires_at)
            .execute(&mut *self.tx)
            .await?;
            Ok(())
        })
    }

    fn lock_recycling_session(
        &mut self,
        id: SessionId,
    ) -> StoreFuture<'_, Option<RecyclingSession>> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, RecyclingSessionRow>(
                "SELECT id, store_id, object_type_id, weight, points_required, state, created_at, \
                 expires_at, confirmed_by, confirmed_at \
                 FROM recycling_sessions WHERE id = $1 FOR UPDATE",
            )
            .bind(*id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
            row.map(RecyclingSession::try_from).transpose()
        })
    }

    fn update_recycling_session<'a>(
        &'a mut self,
        session: &'a RecyclingSession,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            sqlx::query(
                "UPDATE recycling_sessions \
                 SET state = $2, confirmed_by = $3, confirmed_at = $4 WHERE id = $1",
            )
            .bind(*session.id.as_uuid())
            .bind(session.state.as_str())
            .bind(session.confirmed_by.map(UserId::get))
            .bind(session.confirmed_at)
            .execute(&mut *self.tx)
            .await?;
            Ok(())
        })
    }

    fn guide_owner(
        &mut self,
        guide: GuideProfileId,
        mode: ReadMode,
    ) -> StoreFuture<'_, Option<UserId>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT user_id FROM guide_profiles WHERE id = $1{}",
                lock_clause(mode)
            );
            let owner = sqlx::query_scalar::<_, i64>(&sql)
                .bind(guide.get())
                .fetch_optional(&mut *self.tx)
                .await?;
            Ok(owner.map(UserId::new))
        })
    }

    fn client_owner(&mut self, client: ClientProfileId) -> StoreFuture<'_, Option<UserId>> {
        Box::pin(async move {
            let owner =
                sqlx::query_scalar::<_, i64>("SELECT user_id FROM client_profiles WHERE id = $1")
                    .bind(client.get())
                    .fetch_optional(&mut *self.tx)
                    .await?;
            Ok(owner.map(UserId::new))
        })
    }

    fn find_overlapping_reservation(
        &mut self,
        guide: GuideProfileId,
        slot: TimeSlot,
    ) -> StoreFuture<'_, Option<ReservationId>> {
        Box::pin(async move {
            let id = sqlx::query_scalar::<_, i64>(
                "SELECT id FROM reservations \
                 WHERE guide_profile_id = $1 AND state IN ('Pendiente', 'Confirmada') \
                 AND NOT ($3 <= start_time OR $2 >= end_time) \
                 LIMIT 1",
            )
            .bind(guide.get())
            .bind(slot.start())
            .bind(slot.end())
            .fetch_optional(&mut *self.tx)
            .await?;
            Ok(id.map(ReservationId::new))
        })
    }

    fn insert_reservation(
        &mut self,
        reservation: NewReservation,
    ) -> StoreFuture<'_, Reservation> {
        Box::pin(async move {
            let guide = reservation.guide_profile_id;
            let sql = format!(
                "INSERT INTO reservations \
                 (guide_profile_id, client_profile_id, place, party_size, start_time, end_time, \
                 base_amount, guide_commission, client_surcharge, total_amount, created_at, \
                 updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11) \
                 RETURNING {RESERVATION_COLUMNS}"
            );
            let result = sqlx::query_as::<_, ReservationRow>(&sql)
                .bind(guide.get())
                .bind(reservation.client_profile_id.get())
                .bind(reservation.place)
                .bind(reservation.party_size)
                .bind(reservation.slot.start())
                .bind(reservation.slot.end())
                .bind(reservation.fees.base_amount)
                .bind(reservation.fees.guide_commission)
                .bind(reservation.fees.client_surcharge)
                .bind(reservation.fees.total_amount)
                .bind(reservation.created_at)
                .fetch_one(&mut *self.tx)
                .await;
            match result {
                Ok(row) => Reservation::try_from(row),
                Err(err) => {
                    let overlap = matches!(
                        &err,
                        sqlx::Error::Database(db) if db.code().as_deref() == Some(EXCLUSION_VIOLATION)
                    );
                    if overlap {
                        Err(LedgerError::OverlapConflict(guide))
                    } else {
                        Err(err.into())
                    }
                }
            }
        })
    }

    fn lock_reservation(&mut self, id: ReservationId) -> StoreFuture<'_, Option<Reservation>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1 FOR NO KEY UPDATE"
            );
            let row = sqlx::query_as::<_, ReservationRow>(&sql)
                .bind(id.get())
                .fetch_optional(&mut *self.tx)
                .await?;
            row.map(Reservation::try_from).transpose()
        })
    }

    fn update_reservation<'a>(
        &'a mut self,
        reservation: &'a Reservation,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            sqlx::query(
                "UPDATE reservations SET state = $2, payment_state = $3, updated_at = $4 \
                 WHERE id = $1",
            )
            .bind(reservation.id.get())
            .bind(reservation.state.as_str())
            .bind(reservation.payment_state.as_str())
            .bind(reservation.updated_at)
            .execute(&mut *self.tx)
            .await?;
            Ok(())
        })
    }

    fn insert_payment(&mut self, payment: NewPayment) -> StoreFuture<'_, PaymentTransaction> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, PaymentRow>(
                "INSERT INTO payment_transactions \
                 (reservation_id, payment_method, total_amount, guide_commission, \
                 client_surcharge, state, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 RETURNING id, reservation_id, payment_method, total_amount, guide_commission, \
                 client_surcharge, state, created_at",
            )
            .bind(payment.reservation_id.get())
            .bind(payment.payment_method)
            .bind(payment.fees.total_amount)
            .bind(payment.fees.guide_commission)
            .bind(payment.fees.client_surcharge)
            .bind(crate::domain::reservation::PAYMENT_COMPLETED)
            .bind(payment.created_at)
            .fetch_one(&mut *self.tx)
            .await?;
            Ok(row.into())
        })
    }

    fn commit(self: Box<Self>) -> StoreFuture<'static, ()> {
        let Self { tx } = *self;
        Box::pin(async move {
            tx.commit().await?;
            Ok(())
        })
    }

    fn rollback(self: Box<Self>) -> StoreFuture<'static, ()> {
        let Self { tx } = *self;
        Box::pin(async move {
            tx.rollback().await?;
            Ok(())
        })
    }
}

/// Login-attempt cache stored in the `login_attempts` table, shared by
/// every instance pointing at the same database.
#[derive(Debug, Clone)]
pub struct PostgresAttemptCache {
    pool: PgPool,
}

impl PostgresAttemptCache {
    /// Creates a cache over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl AttemptCache for PostgresAttemptCache {
    fn load<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<AttemptRecord>> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, AttemptRow>(
                "SELECT failures, locked_until FROM login_attempts WHERE key = $1",
            )
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
            row.map(attempt_record).transpose()
        })
    }

    fn update<'a>(
        &'a self,
        key: &'a str,
        apply: AttemptUpdate<'a>,
    ) -> StoreFuture<'a, AttemptRecord> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            sqlx::query("INSERT INTO login_attempts (key) VALUES ($1) ON CONFLICT (key) DO NOTHING")
                .bind(key)
                .execute(&mut *tx)
                .await?;
            let row = sqlx::query_as::<_, AttemptRow>(
                "SELECT failures, locked_until FROM login_attempts WHERE key = $1 FOR UPDATE",
            )
            .bind(key)
            .fetch_one(&mut *tx)
            .await?;
            let record = apply(attempt_record(row)?);
            let failures = serde_json::to_value(&record.failures)
                .map_err(|e| LedgerError::Internal(e.to_string()))?;
            sqlx::query(
                "UPDATE login_attempts SET failures = $2, locked_until = $3, updated_at = NOW() \
                 WHERE key = $1",
            )
            .bind(key)
            .bind(failures)
            .bind(record.locked_until)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            Ok(record)
        })
    }

    fn clear<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            sqlx::query("DELETE FROM login_attempts WHERE key = $1")
                .bind(key)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
    }
}

fn attempt_record(row: AttemptRow) -> Result<AttemptRecord, LedgerError> {
    let failures: Vec<DateTime<Utc>> = serde_json::from_value(row.failures)
        .map_err(|e| LedgerError::Internal(format!("corrupt login attempts: {e}")))?;
    Ok(AttemptRecord {
        failures,
        locked_until: row.locked_until,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locking_reads_leave_foreign_key_checks_unblocked() {
        assert_eq!(lock_clause(ReadMode::Plain), "");
        assert_eq!(lock_clause(ReadMode::ForUpdate), " FOR NO KEY UPDATE");
        assert_eq!(product_lock_clause(ReadMode::ForUpdate), " FOR NO KEY UPDATE OF p");
        assert!(!lock_clause(ReadMode::ForUpdate).ends_with(" FOR UPDATE"));
    }
}
