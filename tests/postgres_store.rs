//! PostgreSQL store tests.
//!
//! Ignored by default; run with a scratch database:
//!
//! ```text
//! DATABASE_URL=postgres://localhost/ecopoints_test cargo test -- --ignored
//! ```

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use ecopoints_ledger::domain::{
    ClientProfileId, Clock, EventBus, FeeBreakdown, GuideProfileId, ManualClock, NewReservation,
    ProductId, StoreId, TimeSlot, UserId,
};
use ecopoints_ledger::error::LedgerError;
use ecopoints_ledger::persistence::{LedgerStore, PostgresLedgerStore};
use ecopoints_ledger::service::{
    ConfirmationOutcome, RedemptionClaim, RewardsService, SessionService,
};

async fn store() -> PostgresLedgerStore {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPool::connect(&url).await.expect("database reachable");
    let store = PostgresLedgerStore::new(pool);
    store.migrate().await.expect("migrations apply");
    store
}

async fn insert_id(pool: &PgPool, sql: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(sql)
        .fetch_one(pool)
        .await
        .expect("seed row")
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn concurrent_redemptions_never_overdraw() {
    let store = store().await;
    let pool = store.pool().clone();
    let user = insert_id(
        &pool,
        "INSERT INTO users (name, points_balance) VALUES ('ana', 300) RETURNING id",
    )
    .await;
    let shop = insert_id(
        &pool,
        "INSERT INTO stores (name) VALUES ('Eco Market') RETURNING id",
    )
    .await;
    let product = insert_id(
        &pool,
        &format!(
            "INSERT INTO products (store_id, name, unit_point_cost, stock) \
             VALUES ({shop}, 'Tote bag', 200, 10) RETURNING id"
        ),
    )
    .await;

    let service = Arc::new(RewardsService::new(
        Arc::new(store.clone()),
        EventBus::new(16),
        Arc::new(ManualClock::default()) as Arc<dyn Clock>,
    ));
    let (a, b) = tokio::join!(
        service.redeem(UserId::new(user), ProductId::new(product), Some(1)),
        service.redeem(UserId::new(user), ProductId::new(product), Some(1)),
    );
    let succeeded = [a.is_ok(), b.is_ok()].into_iter().filter(|ok| *ok).count();
    assert_eq!(succeeded, 1);
    let failure = if a.is_err() { a } else { b };
    assert!(matches!(
        failure,
        Err(LedgerError::InsufficientPoints { required: 200, .. })
    ));

    let balance: i64 = sqlx::query_scalar("SELECT points_balance FROM users WHERE id = $1")
        .bind(user)
        .fetch_one(&pool)
        .await
        .expect("balance");
    let stock: i64 = sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
        .bind(product)
        .fetch_one(&pool)
        .await
        .expect("stock");
    assert_eq!((balance, stock), (100, 9));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn exclusion_constraint_maps_to_overlap_conflict() {
    let store = store().await;
    let pool = store.pool().clone();
    let guide_user =
        insert_id(&pool, "INSERT INTO users (name) VALUES ('guia') RETURNING id").await;
    let client_user =
        insert_id(&pool, "INSERT INTO users (name) VALUES ('cliente') RETURNING id").await;
    let guide = insert_id(
        &pool,
        &format!("INSERT INTO guide_profiles (user_id) VALUES ({guide_user}) RETURNING id"),
    )
    .await;
    let client = insert_id(
        &pool,
        &format!("INSERT INTO client_profiles (user_id) VALUES ({client_user}) RETURNING id"),
    )
    .await;

    let at = |h: u32, m: u32| Utc.with_ymd_and_hms(2025, 6, 1, h, m, 0).unwrap();
    let booking = |start, end| NewReservation {
        guide_profile_id: GuideProfileId::new(guide),
        client_profile_id: ClientProfileId::new(client),
        place: None,
        party_size: Some(2),
        slot: TimeSlot::new(start, end).expect("valid slot"),
        fees: FeeBreakdown::compute(Decimal::new(10000, 2)).expect("valid base"),
        created_at: at(9, 0),
    };

    // Skips the service-level overlap query so only the constraint stands.
    let mut tx = store.begin().await.expect("begin");
    tx.insert_reservation(booking(at(10, 0), at(11, 0)))
        .await
        .expect("first booking");
    tx.commit().await.expect("commit");

    let mut tx = store.begin().await.expect("begin");
    let clash = tx.insert_reservation(booking(at(10, 30), at(11, 30))).await;
    assert!(matches!(clash, Err(LedgerError::OverlapConflict(g)) if g.get() == guide));
    tx.rollback().await.expect("rollback");

    let mut tx = store.begin().await.expect("begin");
    tx.insert_reservation(booking(at(11, 0), at(12, 0)))
        .await
        .expect("adjacent booking");
    tx.commit().await.expect("commit");
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn direct_and_session_redemptions_run_side_by_side() {
    let store = store().await;
    let pool = store.pool().clone();
    let user = insert_id(
        &pool,
        "INSERT INTO users (name, points_balance) VALUES ('ana', 1000) RETURNING id",
    )
    .await;
    let shop = insert_id(
        &pool,
        "INSERT INTO stores (name) VALUES ('Eco Market') RETURNING id",
    )
    .await;
    let product = insert_id(
        &pool,
        &format!(
            "INSERT INTO products (store_id, name, unit_point_cost, stock) \
             VALUES ({shop}, 'Tote bag', 200, 10) RETURNING id"
        ),
    )
    .await;

    let bus = EventBus::new(16);
    let clock = Arc::new(ManualClock::default()) as Arc<dyn Clock>;
    let rewards = RewardsService::new(Arc::new(store.clone()), bus.clone(), Arc::clone(&clock));
    let sessions = SessionService::new(
        Arc::new(store.clone()),
        bus,
        clock,
        chrono::Duration::minutes(5),
    );
    let session = sessions
        .create_redemption_session(StoreId::new(shop), ProductId::new(product), Some(1))
        .await
        .expect("session opens");
    let claim = RedemptionClaim {
        user_id: UserId::new(user),
        store_id: Some(StoreId::new(shop)),
        product_id: ProductId::new(product),
        quantity: 1,
    };

    // Both paths lock the same user and product rows while inserting
    // rows that reference them.
    for _ in 0..3 {
        let (direct, scanned) = tokio::join!(
            rewards.redeem(UserId::new(user), ProductId::new(product), Some(1)),
            sessions.confirm_redemption_session(session.id, claim),
        );
        direct.expect("direct redemption commits");
        assert!(matches!(
            scanned,
            Ok(ConfirmationOutcome::Confirmed { .. }) | Err(LedgerError::SessionNotPending(_))
        ));
    }

    let balance: i64 = sqlx::query_scalar("SELECT points_balance FROM users WHERE id = $1")
        .bind(user)
        .fetch_one(&pool)
        .await
        .expect("balance");
    let stock: i64 = sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
        .bind(product)
        .fetch_one(&pool)
        .await
        .expect("stock");
    assert_eq!((balance, stock), (200, 6));
}
